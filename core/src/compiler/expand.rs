//! Control-flow macro expansion
//!
//! `error`, `retry` and `withItems` are desugared into plain tasks,
//! gateways and boundary events around an already lowered step. The runtime
//! keeps retry counters and iteration frames as per-name stacks in process
//! variables; the helper calls below push on entry and pop on every exit so
//! nested loops and retries stay balanced.
//!
//! Order on one step: the bare invocation first, then either the error
//! handler or the retry loop, then the iteration harness around the result.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::ast::{is_expression, Arg, RetrySpec, Step, StepOptions};
use crate::error::{CompileError, CompileResult};
use crate::parser::atoms::Location;

use super::chunk::Chunk;
use super::context::LoweringContext;
use super::ir::{Element, SourceMapEntry, VariableMapping};
use super::steps::{self, expression_call, service_task, RESULT_EXPR};

/* ===================== Runtime helper calls ===================== */

pub const RETRY_PUSH: &str = "${__retryUtils.push(execution)}";
pub const RETRY_INCREMENT: &str = "${__retryUtils.increment(execution, times)}";
pub const RETRY_SLEEP: &str = "${__retryUtils.sleep(delay)}";
pub const RETRY_RETHROW: &str = "${__retryUtils.rethrow(execution)}";
pub const RETRY_POP: &str = "${__retryUtils.pop(execution)}";
/// Set by the increment task; true once the attempt budget is spent
pub const RETRY_EXCEEDED_VAR: &str = "__retryExceeded";

pub const ITEMS_PUSH: &str = "${__withItems.push(execution, items)}";
pub const ITEMS_NEXT: &str = "${__withItems.next(execution)}";
pub const ITEMS_HAS_NEXT: &str = "${__withItems.hasNext(execution)}";
pub const ITEMS_COLLECT: &str = "${__withItems.collect(execution, outVars)}";
pub const ITEMS_POP: &str = "${__withItems.pop(execution)}";

pub fn with_options(
    ctx: &mut LoweringContext<'_>,
    step: &Step,
    options: &StepOptions,
) -> CompileResult<Chunk> {
    let location = step.location();

    if options.error.is_some() && options.retry.is_some() {
        return Err(CompileError::ConflictingOptions {
            location: location.clone(),
            first: "error",
            second: "retry",
        });
    }

    let items = options
        .with_items
        .as_ref()
        .map(|source| items_source(source, location))
        .transpose()?;

    let mut chunk = steps::lower_bare(ctx, step, None)?;

    if let Some(handler) = &options.error {
        chunk = attach_error(ctx, chunk, handler, step)?;
    }

    if let Some(retry) = &options.retry {
        chunk = expand_retry(ctx, chunk, step, retry, options.input.as_ref())?;
    }

    if let Some(items) = items {
        let out_vars = options.output.as_ref().map(|o| o.names());
        chunk = expand_with_items(ctx, chunk, step, items, out_vars);
    }

    Ok(chunk)
}

/* ===================== Error handling ===================== */

/// Route faults of every attachable element of `chunk` into `handler`.
pub fn attach_error(
    ctx: &mut LoweringContext<'_>,
    mut chunk: Chunk,
    handler: &[Step],
    step: &Step,
) -> CompileResult<Chunk> {
    let handler_chunk = ctx.convert_steps(handler)?;

    let Some(handler_entry) = handler_chunk.entry().map(str::to_string) else {
        return Ok(chunk);
    };
    if chunk.attachables().is_empty() {
        tracing::warn!(
            location = %step.location(),
            step = %step.describe(),
            "error handler has nothing to attach to, dropping it"
        );
        return Ok(chunk);
    }

    let entry = SourceMapEntry::new(step.location(), format!("{} (error)", step.describe()));
    for attached_to in chunk.attachables().to_vec() {
        let event = ctx.next_id();
        chunk.push(
            Element::BoundaryEvent {
                id: event.clone(),
                attached_to,
            },
            Some(entry.clone()),
        );
        ctx.connect(&mut chunk, &event, &handler_entry, None);
    }

    let (outputs, attachables) = chunk.absorb(handler_chunk);
    outputs.into_iter().for_each(|o| chunk.add_output(o));
    chunk.set_attachables(attachables);
    Ok(chunk)
}

/* ===================== Retry ===================== */

/// Retry loop around the attachable elements of `original`:
///
/// ```text
/// init -> original ---------------------------------> cleanup
///           | fault                                      ^
///           v                                            |
///        increment -> gateway -(exceeded)-> rethrow -> end
///           ^            |
///           |          delay -> re-attempt -------------'
///           '-- fault ---------------'
/// ```
pub fn expand_retry(
    ctx: &mut LoweringContext<'_>,
    original: Chunk,
    step: &Step,
    retry: &RetrySpec,
    input: Option<&IndexMap<String, Arg>>,
) -> CompileResult<Chunk> {
    let times = retry_times(retry, ctx.config().default_retry_times)?;
    let delay = retry_delay(retry, ctx.config().default_retry_delay)?;

    let Some(original_entry) = original.entry().map(str::to_string) else {
        return Ok(original);
    };

    let entry = SourceMapEntry::new(step.location(), format!("{} (retry)", step.describe()));
    let mut chunk = Chunk::empty();

    // 1. push a fresh counter
    let init = service_task(ctx, expression_call(RETRY_PUSH), Vec::new(), Vec::new());
    let init_id = init.id().to_string();
    chunk.push(init, Some(entry.clone()));
    ctx.connect(&mut chunk, &init_id, &original_entry, None);
    let original_attachables = original.attachables().to_vec();
    let (original_outputs, _) = chunk.absorb(original);

    // 2. + 3. fault -> increment and test the budget
    let increment = service_task(
        ctx,
        expression_call(RETRY_INCREMENT),
        vec![VariableMapping::required("times", times)],
        vec![VariableMapping::required(
            RETRY_EXCEEDED_VAR,
            Arg::Expression(RESULT_EXPR.to_string()),
        )],
    );
    let increment_id = increment.id().to_string();
    attach_boundaries(ctx, &mut chunk, &original_attachables, &increment_id, &entry);
    chunk.push(increment, Some(entry.clone()));

    // 4. exceeded -> rethrow, otherwise delay and try again
    let gateway = ctx.next_id();
    chunk.push(Element::ExclusiveGateway { id: gateway.clone() }, Some(entry.clone()));
    ctx.connect(&mut chunk, &increment_id, &gateway, None);

    let rethrow = service_task(ctx, expression_call(RETRY_RETHROW), Vec::new(), Vec::new());
    let rethrow_id = rethrow.id().to_string();
    let delay_task = service_task(
        ctx,
        expression_call(RETRY_SLEEP),
        vec![VariableMapping::required("delay", delay)],
        Vec::new(),
    );
    let delay_id = delay_task.id().to_string();

    ctx.connect(
        &mut chunk,
        &gateway,
        &rethrow_id,
        Some(format!("${{{}}}", RETRY_EXCEEDED_VAR)),
    );
    ctx.connect(&mut chunk, &gateway, &delay_id, None);
    chunk.push(delay_task, Some(entry.clone()));

    let merged = merge_inputs(input, &retry.input);
    let attempt = steps::lower_bare(ctx, step, Some(&merged))?;
    let attempt_outputs = match attempt.entry().map(str::to_string) {
        Some(attempt_entry) => {
            ctx.connect(&mut chunk, &delay_id, &attempt_entry, None);
            let attempt_attachables = attempt.attachables().to_vec();
            let (outputs, _) = chunk.absorb(attempt);
            // the re-attempt's own faults loop back to the increment
            attach_boundaries(ctx, &mut chunk, &attempt_attachables, &increment_id, &entry);
            outputs
        }
        None => Vec::new(),
    };

    // budget spent: pop the counter and re-raise the last fault
    chunk.push(rethrow, Some(entry.clone()));
    let end = ctx.next_id();
    chunk.push(
        Element::EndEvent {
            id: end.clone(),
            error_code: None,
        },
        Some(entry.clone()),
    );
    ctx.connect(&mut chunk, &rethrow_id, &end, None);

    // 5. success on any attempt pops the counter
    let cleanup = service_task(ctx, expression_call(RETRY_POP), Vec::new(), Vec::new());
    let cleanup_id = cleanup.id().to_string();
    chunk.push(cleanup, Some(entry));
    ctx.connect_all(&mut chunk, &original_outputs, &cleanup_id);
    ctx.connect_all(&mut chunk, &attempt_outputs, &cleanup_id);

    chunk.set_outputs(vec![cleanup_id]);
    chunk.set_attachables(vec![rethrow_id]);
    Ok(chunk)
}

fn attach_boundaries(
    ctx: &mut LoweringContext<'_>,
    chunk: &mut Chunk,
    attachables: &[String],
    target: &str,
    entry: &SourceMapEntry,
) {
    for attached_to in attachables {
        let event = ctx.next_id();
        chunk.push(
            Element::BoundaryEvent {
                id: event.clone(),
                attached_to: attached_to.clone(),
            },
            Some(entry.clone()),
        );
        ctx.connect(chunk, &event, target, None);
    }
}

fn retry_times(retry: &RetrySpec, default: u64) -> CompileResult<Arg> {
    match &retry.times {
        None => Ok(Arg::Literal(JsonValue::from(default))),
        Some(Arg::Expression(expr)) => Ok(Arg::Expression(expr.clone())),
        Some(Arg::Literal(value)) => non_negative(value)
            .map(|n| Arg::Literal(JsonValue::from(n)))
            .ok_or_else(|| CompileError::InvalidRetry {
                location: retry.location.clone(),
                message: format!(
                    "'times' must be a non-negative integer or an expression, got {}",
                    value
                ),
            }),
    }
}

fn retry_delay(retry: &RetrySpec, default: u64) -> CompileResult<Arg> {
    match &retry.delay {
        None => Ok(Arg::Literal(JsonValue::from(default))),
        Some(Arg::Expression(expr)) => Ok(Arg::Expression(expr.clone())),
        Some(Arg::Literal(value)) => non_negative(value)
            .map(|n| Arg::Literal(JsonValue::from(n)))
            .ok_or_else(|| CompileError::InvalidDelay {
                location: retry.location.clone(),
                value: value.to_string(),
            }),
    }
}

/// Non-negative integer, given as a number or a string of digits
fn non_negative(value: &JsonValue) -> Option<u64> {
    match value {
        JsonValue::Number(n) => n.as_u64(),
        JsonValue::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Retry-scoped `in` bindings deep-merged over the step's own
pub fn merge_inputs(
    base: Option<&IndexMap<String, Arg>>,
    overrides: &IndexMap<String, Arg>,
) -> IndexMap<String, Arg> {
    let mut merged = base.cloned().unwrap_or_default();
    for (key, value) in overrides {
        let combined = match (merged.get(key), value) {
            (Some(Arg::Literal(old)), Arg::Literal(new)) => {
                Arg::Literal(merge_values(old.clone(), new.clone()))
            }
            _ => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}

fn merge_values(base: JsonValue, over: JsonValue) -> JsonValue {
    match (base, over) {
        (JsonValue::Object(mut base), JsonValue::Object(over)) => {
            for (key, value) in over {
                let combined = match base.remove(&key) {
                    Some(old) => merge_values(old, value),
                    None => value,
                };
                base.insert(key, combined);
            }
            JsonValue::Object(base)
        }
        (_, over) => over,
    }
}

/* ===================== withItems ===================== */

/// Iteration variable visible to the body
pub const ITEM_VAR: &str = "item";

/// Validate a `withItems` source: an expression or an array literal
pub fn items_source(source: &JsonValue, location: &Location) -> CompileResult<Arg> {
    match source {
        JsonValue::String(s) if is_expression(s) => Ok(Arg::Expression(s.clone())),
        JsonValue::Array(_) => Ok(Arg::Literal(source.clone())),
        other => Err(CompileError::InvalidWithItems {
            location: location.clone(),
            message: format!("expected an expression or an array, got {}", other),
        }),
    }
}

/// Iteration harness around `body`:
///
/// ```text
/// init -> fetch -> gateway -(hasNext)-> body -> collect --.
///           ^          |                                  |
///           |          '-(otherwise)-> cleanup            |
///           '---------------------------------------------'
/// ```
pub fn expand_with_items(
    ctx: &mut LoweringContext<'_>,
    body: Chunk,
    step: &Step,
    items: Arg,
    out_vars: Option<Vec<String>>,
) -> Chunk {
    let entry = SourceMapEntry::new(step.location(), format!("{} (withItems)", step.describe()));
    let mut chunk = Chunk::empty();

    let init = service_task(
        ctx,
        expression_call(ITEMS_PUSH),
        vec![VariableMapping::required("items", items)],
        Vec::new(),
    );
    let init_id = init.id().to_string();
    chunk.push(init, Some(entry.clone()));

    let fetch = service_task(ctx, expression_call(ITEMS_NEXT), Vec::new(), Vec::new());
    let fetch_id = fetch.id().to_string();
    chunk.push(fetch, Some(entry.clone()));
    ctx.connect(&mut chunk, &init_id, &fetch_id, None);

    let gateway = ctx.next_id();
    chunk.push(Element::ExclusiveGateway { id: gateway.clone() }, Some(entry.clone()));
    ctx.connect(&mut chunk, &fetch_id, &gateway, None);

    let cleanup = service_task(ctx, expression_call(ITEMS_POP), Vec::new(), Vec::new());
    let cleanup_id = cleanup.id().to_string();

    let body_attachables = body.attachables().to_vec();
    match body.entry().map(str::to_string) {
        Some(body_entry) => {
            ctx.connect(&mut chunk, &gateway, &body_entry, Some(ITEMS_HAS_NEXT.to_string()));
            let (body_outputs, _) = chunk.absorb(body);

            let out_vars = match out_vars {
                Some(names) => JsonValue::from(names),
                None => JsonValue::Null,
            };
            let collect = service_task(
                ctx,
                expression_call(ITEMS_COLLECT),
                vec![VariableMapping::required("outVars", Arg::Literal(out_vars))],
                Vec::new(),
            );
            let collect_id = collect.id().to_string();
            chunk.push(collect, Some(entry.clone()));
            ctx.connect_all(&mut chunk, &body_outputs, &collect_id);
            ctx.connect(&mut chunk, &collect_id, &fetch_id, None);
        }
        None => ctx.connect(&mut chunk, &gateway, &fetch_id, Some(ITEMS_HAS_NEXT.to_string())),
    }

    ctx.connect(&mut chunk, &gateway, &cleanup_id, None);
    chunk.push(cleanup, Some(entry));

    chunk.set_outputs(vec![cleanup_id]);
    chunk.set_attachables(body_attachables);
    chunk
}
