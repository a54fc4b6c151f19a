//! Lowering of parsed flows into process graphs
//!
//! A flow's step list is lowered by a fresh [`LoweringContext`] into a
//! [`Chunk`](chunk::Chunk), closed into a [`ProcessDefinition`] and, unless
//! disabled in the configuration, checked by the structural [`verify`] rules.

pub mod chunk;
pub mod context;
pub mod expand;
pub mod ir;
pub mod steps;
pub mod verify;

pub use context::LoweringContext;
pub use ir::{Call, Element, ProcessDefinition, SourceMapEntry, VariableMapping};

use crate::ast::Flow;
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};

/// Compile one named flow.
///
/// Any error aborts the flow; no partial process is returned.
pub fn compile_flow(
    name: &str,
    flow: &Flow,
    config: &CompilerConfig,
) -> CompileResult<ProcessDefinition> {
    let mut ctx = LoweringContext::new(config);
    let chunk = ctx.convert_steps(&flow.steps)?;
    let process = ctx.wrap_as_process(name, &flow.location, chunk);

    if config.verify {
        let violations: Vec<String> = verify::verify_process(&process)
            .into_iter()
            .filter(verify::Violation::is_error)
            .map(|v| v.to_string())
            .collect();
        if !violations.is_empty() {
            return Err(CompileError::Structural {
                flow: name.to_string(),
                violations,
            });
        }
    }

    tracing::debug!(
        flow = name,
        elements = process.elements.len(),
        tasks = process.count_kind("ServiceTask"),
        gateways = process.count_kind("ExclusiveGateway"),
        "compiled flow"
    );

    Ok(process)
}

#[cfg(test)]
mod tests;
