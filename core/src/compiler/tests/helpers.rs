//! Shared test helpers for compiler tests

use indexmap::IndexMap;

use crate::ast::Step;
use crate::compiler::chunk::Chunk;
use crate::compiler::context::LoweringContext;
use crate::compiler::ir::{Call, Element, ProcessDefinition};
use crate::compiler::compile_flow;
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::parser::parse_document;

pub fn config() -> CompilerConfig {
    CompilerConfig::default()
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.trim_matches('\n')
        .lines()
        .map(|l| format!("{}{}\n", pad, l))
        .collect()
}

/// Parse a step list given as the body of a flow named `main`
pub fn parse_steps(steps_yaml: &str) -> Vec<Step> {
    let text = format!("flows:\n  main:\n{}", indent(steps_yaml, 4));
    let doc = parse_document("test.yml", &text).expect("Parse should succeed");
    doc.flows["main"].steps.clone()
}

/// Lower a step list without wrapping it into a process
pub fn lower(steps_yaml: &str) -> Chunk {
    let steps = parse_steps(steps_yaml);
    let config = config();
    let mut ctx = LoweringContext::new(&config);
    ctx.convert_steps(&steps).expect("Lowering should succeed")
}

/// Compile `main` with the default configuration
pub fn compile(steps_yaml: &str) -> ProcessDefinition {
    try_compile(steps_yaml).expect("Compilation should succeed")
}

pub fn compile_err(steps_yaml: &str) -> CompileError {
    match try_compile(steps_yaml) {
        Ok(process) => panic!("Expected compile error, got {:#?}", process.elements),
        Err(e) => e,
    }
}

pub fn try_compile(steps_yaml: &str) -> Result<ProcessDefinition, CompileError> {
    let text = format!("flows:\n  main:\n{}", indent(steps_yaml, 4));
    let doc = parse_document("test.yml", &text)?;
    compile_flow("main", &doc.flows["main"], &config())
}

/// Compile every flow of a whole document
pub fn compile_all(document_yaml: &str) -> IndexMap<String, ProcessDefinition> {
    let doc = parse_document("test.yml", document_yaml).expect("Parse should succeed");
    doc.flows
        .iter()
        .map(|(name, flow)| {
            let process = compile_flow(name, flow, &config()).expect("Compilation should succeed");
            (name.clone(), process)
        })
        .collect()
}

/// Service tasks invoking the named delegate
pub fn delegate_tasks<'a>(process: &'a ProcessDefinition, name: &'a str) -> Vec<&'a Element> {
    process
        .service_tasks(move |call| matches!(call, Call::Delegate { name: n, .. } if n == name))
        .collect()
}

/// Service tasks evaluating exactly `expression`
pub fn expression_tasks<'a>(
    process: &'a ProcessDefinition,
    expression: &'a str,
) -> Vec<&'a Element> {
    process
        .service_tasks(move |call| {
            matches!(call, Call::Expression { expression: e } if e == expression)
        })
        .collect()
}

/// Non-flow elements, in emission order
pub fn nodes(process: &ProcessDefinition) -> Vec<&Element> {
    process.elements.iter().filter(|e| !e.is_flow()).collect()
}
