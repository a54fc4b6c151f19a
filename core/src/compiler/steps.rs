//! Per-step lowering rules
//!
//! Every [`Step`] variant lowers to exactly one [`Chunk`]. Steps carrying an
//! options block go through [`expand::with_options`], which lowers the bare
//! step with [`lower_bare`] and then splices in error handling, retry and
//! iteration.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::ast::{is_expression, Arg, OutSpec, Step, StepOptions};
use crate::error::CompileResult;

use super::chunk::Chunk;
use super::context::LoweringContext;
use super::expand;
use super::ir::{Call, Element, SourceMapEntry, VariableMapping};

/// Variable the task result is bound to inside output mappings
pub const RESULT_EXPR: &str = "${result}";

/// Prefix of the synthetic variable holding a switch's evaluated expression
pub const SWITCH_VAR_PREFIX: &str = "__switch_";

pub fn lower(ctx: &mut LoweringContext<'_>, step: &Step) -> CompileResult<Chunk> {
    tracing::trace!(step = %step.describe(), location = %step.location(), "lowering step");

    match step.options() {
        Some(options) if needs_expansion(options) => expand::with_options(ctx, step, options),
        _ => lower_bare(ctx, step, None),
    }
}

fn needs_expansion(options: &StepOptions) -> bool {
    options.error.is_some() || options.retry.is_some() || options.with_items.is_some()
}

/// Lower a step without its error / retry / withItems options.
///
/// `input_override` replaces the `in` bindings; retry uses it for the
/// re-attempt.
pub fn lower_bare(
    ctx: &mut LoweringContext<'_>,
    step: &Step,
    input_override: Option<&IndexMap<String, Arg>>,
) -> CompileResult<Chunk> {
    let entry = SourceMapEntry::new(step.location(), step.describe());

    let chunk = match step {
        Step::ExpressionShort { expr, .. } => {
            let element = service_task(ctx, expression_call(expr), Vec::new(), Vec::new());
            Chunk::single(element, entry)
        }
        Step::Expression { expr, options, .. } => {
            let outputs = output_mappings(options.output.as_ref());
            let element = service_task(ctx, expression_call(expr), Vec::new(), outputs);
            Chunk::single(element, entry)
        }
        Step::Task { name, options, .. } => {
            let call = Call::Delegate {
                name: name.clone(),
                args: Vec::new(),
            };
            let inputs = input_mappings(input_override.or(options.input.as_ref()));
            let outputs = output_mappings(options.output.as_ref());
            let task = delegating_task(ctx, call, inputs, outputs, &options.extra);
            Chunk::single(task, entry)
        }
        Step::TaskShort { name, arg, .. } => {
            let call = Call::Delegate {
                name: name.clone(),
                args: vec![Arg::from_value(arg.clone())],
            };
            Chunk::single(service_task(ctx, call, Vec::new(), Vec::new()), entry)
        }
        Step::Call { name, options, .. } => {
            let call = Call::SubProcess { name: name.clone() };
            let inputs = input_mappings(input_override.or(options.input.as_ref()));
            let outputs = output_mappings(options.output.as_ref());
            let task = delegating_task(ctx, call, inputs, outputs, &options.extra);
            Chunk::single(task, entry)
        }
        Step::Group { steps, .. } => ctx.convert_steps(steps)?,
        Step::If {
            condition,
            then_steps,
            else_steps,
            ..
        } => lower_if(ctx, condition, then_steps, else_steps, entry)?,
        Step::Switch {
            expr,
            cases,
            default,
            ..
        } => lower_switch(ctx, expr, cases, default.as_deref(), entry)?,
        Step::FormCall { name, options, .. } => {
            let element = Element::UserTask {
                id: ctx.next_id(),
                form: name.clone(),
                options: options.clone(),
            };
            Chunk::single(element, entry)
        }
        Step::Script { name, body, .. } => {
            let call = match body {
                Some(body) => Call::InlineScript {
                    language: name.clone(),
                    body: body.clone(),
                },
                None => Call::ScriptRef {
                    reference: name.clone(),
                },
            };
            Chunk::single(service_task(ctx, call, Vec::new(), Vec::new()), entry)
        }
        Step::DockerCall {
            image,
            cmd,
            env,
            hosts,
            force_pull,
            debug,
            ..
        } => {
            let element = Element::DockerTask {
                id: ctx.next_id(),
                image: image.clone(),
                cmd: cmd.clone(),
                env: env.clone(),
                hosts: hosts.clone(),
                force_pull: *force_pull,
                debug: *debug,
            };
            Chunk::single(element, entry)
        }
        Step::SetVariables { variables, .. } => {
            let element = Element::SetVariablesTask {
                id: ctx.next_id(),
                variables: variables.clone(),
            };
            Chunk::single(element, entry)
        }
        Step::Checkpoint { name, .. } => {
            let element = Element::Checkpoint {
                id: ctx.next_id(),
                name: name.clone(),
            };
            Chunk::single(element, entry)
        }
        Step::Event { name, .. } => {
            let element = Element::IntermediateEvent {
                id: ctx.next_id(),
                name: name.clone(),
            };
            Chunk::single(element, entry)
        }
        Step::Exit { .. } => Chunk::single(Element::TerminateEvent { id: ctx.next_id() }, entry),
        Step::Return { error_code, .. } => {
            let element = Element::EndEvent {
                id: ctx.next_id(),
                error_code: error_code.clone(),
            };
            Chunk::single(element, entry)
        }
    };

    Ok(chunk)
}

/* ===================== Helpers ===================== */

pub fn expression_call(expr: &str) -> Call {
    Call::Expression {
        expression: expr.to_string(),
    }
}

pub fn service_task(
    ctx: &mut LoweringContext<'_>,
    call: Call,
    inputs: Vec<VariableMapping>,
    outputs: Vec<VariableMapping>,
) -> Element {
    Element::ServiceTask {
        id: ctx.next_id(),
        call,
        inputs,
        outputs,
        extra: IndexMap::new(),
    }
}

/// A task or call step; unknown option keys ride along unchanged
fn delegating_task(
    ctx: &mut LoweringContext<'_>,
    call: Call,
    inputs: Vec<VariableMapping>,
    outputs: Vec<VariableMapping>,
    extra: &IndexMap<String, JsonValue>,
) -> Element {
    Element::ServiceTask {
        id: ctx.next_id(),
        call,
        inputs,
        outputs,
        extra: extra.clone(),
    }
}

/// `in` bindings are always required
fn input_mappings(input: Option<&IndexMap<String, Arg>>) -> Vec<VariableMapping> {
    input
        .map(|bindings| {
            bindings
                .iter()
                .map(|(target, source)| VariableMapping::required(target, source.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Name-form outputs store the whole result best-effort; object-form
/// mappings are required.
fn output_mappings(output: Option<&OutSpec>) -> Vec<VariableMapping> {
    let result = || Arg::Expression(RESULT_EXPR.to_string());
    match output {
        None => Vec::new(),
        Some(OutSpec::Variable { name }) => vec![VariableMapping::optional(name, result())],
        Some(OutSpec::Variables { names }) => names
            .iter()
            .map(|name| VariableMapping::optional(name, result()))
            .collect(),
        Some(OutSpec::Mappings { mappings }) => mappings
            .iter()
            .map(|(target, source)| VariableMapping::required(target, source.clone()))
            .collect(),
    }
}

/* ===================== If ===================== */

fn lower_if(
    ctx: &mut LoweringContext<'_>,
    condition: &str,
    then_steps: &[Step],
    else_steps: &[Step],
    entry: SourceMapEntry,
) -> CompileResult<Chunk> {
    let gateway = ctx.next_id();
    let mut chunk = Chunk::single(Element::ExclusiveGateway { id: gateway.clone() }, entry);
    chunk.take_outputs();
    let mut attachables = Vec::new();

    let then_chunk = ctx.convert_steps(then_steps)?;
    match then_chunk.entry().map(str::to_string) {
        Some(target) => {
            ctx.connect(&mut chunk, &gateway, &target, Some(condition.to_string()));
            let (outputs, then_attachables) = chunk.absorb(then_chunk);
            outputs.into_iter().for_each(|o| chunk.add_output(o));
            attachables.extend(then_attachables);
        }
        None => chunk.add_output(gateway.clone()),
    }

    let else_chunk = ctx.convert_steps(else_steps)?;
    match else_chunk.entry().map(str::to_string) {
        Some(target) => {
            ctx.connect(&mut chunk, &gateway, &target, None);
            let (outputs, else_attachables) = chunk.absorb(else_chunk);
            outputs.into_iter().for_each(|o| chunk.add_output(o));
            attachables.extend(else_attachables);
        }
        // no else: falling through the gateway continues after the if
        None => chunk.add_output(gateway),
    }

    chunk.set_attachables(attachables);
    Ok(chunk)
}

/* ===================== Switch ===================== */

fn lower_switch(
    ctx: &mut LoweringContext<'_>,
    expr: &str,
    cases: &IndexMap<String, Vec<Step>>,
    default: Option<&[Step]>,
    entry: SourceMapEntry,
) -> CompileResult<Chunk> {
    let task_id = ctx.next_id();
    let variable = format!("{}{}", SWITCH_VAR_PREFIX, task_id);

    let task = Element::ServiceTask {
        id: task_id.clone(),
        call: expression_call(expr),
        inputs: Vec::new(),
        outputs: vec![VariableMapping::required(
            &variable,
            Arg::Expression(RESULT_EXPR.to_string()),
        )],
        extra: IndexMap::new(),
    };
    let mut chunk = Chunk::single(task, entry.clone());
    chunk.take_outputs();
    let mut attachables = chunk.attachables().to_vec();

    let gateway = ctx.next_id();
    chunk.push(Element::ExclusiveGateway { id: gateway.clone() }, Some(entry));
    ctx.connect(&mut chunk, &task_id, &gateway, None);

    // Guards are emitted in case order; the runtime takes the first match
    for (key, steps) in cases {
        let case_chunk = ctx.convert_steps(steps)?;
        let Some(target) = case_chunk.entry().map(str::to_string) else {
            continue;
        };
        ctx.connect(&mut chunk, &gateway, &target, Some(case_guard(&variable, key)));
        let (outputs, case_attachables) = chunk.absorb(case_chunk);
        outputs.into_iter().for_each(|o| chunk.add_output(o));
        attachables.extend(case_attachables);
    }

    let default_chunk = match default {
        Some(steps) => ctx.convert_steps(steps)?,
        None => Chunk::empty(),
    };
    match default_chunk.entry().map(str::to_string) {
        Some(target) => {
            ctx.connect(&mut chunk, &gateway, &target, None);
            let (outputs, default_attachables) = chunk.absorb(default_chunk);
            outputs.into_iter().for_each(|o| chunk.add_output(o));
            attachables.extend(default_attachables);
        }
        None => chunk.add_output(gateway),
    }

    chunk.set_attachables(attachables);
    Ok(chunk)
}

/// Guard comparing the switch variable with one case key.
///
/// `a` becomes `${var == 'a'}`, numbers are compared bare and an expression
/// key `${x}` compares against the raw expression `x`.
pub fn case_guard(variable: &str, key: &str) -> String {
    if is_expression(key) {
        let inner = &key[2..key.len() - 1];
        return format!("${{{} == {}}}", variable, inner.trim());
    }
    if key.parse::<i64>().is_ok() || key.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
        return format!("${{{} == {}}}", variable, key);
    }
    let escaped = key.replace('\\', "\\\\").replace('\'', "\\'");
    format!("${{{} == '{}'}}", variable, escaped)
}
