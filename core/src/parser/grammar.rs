//! Step grammar
//!
//! Informal token-level BNF:
//!
//! ```text
//! value       := scalar | array-of(value) | object-of(field -> value)
//! expression  := string matching ^\$\{.*\}$
//! steps       := array-of(step), non-empty
//! step        := "return" | expression | "exit" | string (call) | step-object
//! step-object := docker | try | switch | if | expr | form | set | task
//!              | call | checkpoint | event | return-with-code | script
//!              | task-short
//! ```
//!
//! Object forms are recognised by their first field. Once the keyword has
//! matched, the rest of the object is committed with `cut`, so a malformed
//! `task` reports its own problem instead of falling through to task-short.

use indexmap::IndexMap;
use nom::branch::alt;
use nom::combinator::{cut, map, opt};
use nom::error::context;
use nom::multi::{many0, many1};
use nom::sequence::{delimited, pair, preceded};
use nom::Parser;
use serde_json::{Map as JsonMap, Value as JsonValue};

use super::atoms::{Atom, AtomKind, Location};
use super::combinators::{
    any_field, commit_on_progress, field, kind, peek_kind, satisfy, Failure, Input, PResult,
};
use crate::ast::{is_expression, Arg, OutSpec, RetrySpec, Step, StepOptions};

/* ===================== Values ===================== */

pub fn scalar<'a>(input: Input<'a>) -> PResult<'a, JsonValue> {
    map(satisfy("scalar", |a| a.kind.is_scalar()), |a| {
        a.value.clone().unwrap_or(JsonValue::Null)
    })(input)
}

pub fn array_value<'a>(input: Input<'a>) -> PResult<'a, JsonValue> {
    map(
        delimited(
            kind(AtomKind::StartArray),
            many0(commit_on_progress(value)),
            kind(AtomKind::EndArray),
        ),
        JsonValue::Array,
    )(input)
}

pub fn object_value<'a>(input: Input<'a>) -> PResult<'a, JsonValue> {
    map(object_map, |m| {
        JsonValue::Object(m.into_iter().collect::<JsonMap<_, _>>())
    })(input)
}

/// `object-of(field -> value)` keeping field order
pub fn object_map<'a>(input: Input<'a>) -> PResult<'a, IndexMap<String, JsonValue>> {
    map(
        delimited(
            kind(AtomKind::StartObject),
            many0(commit_on_progress(pair(any_field, value))),
            kind(AtomKind::EndObject),
        ),
        |entries| {
            entries
                .into_iter()
                .map(|((name, _), v)| (name.to_string(), v))
                .collect()
        },
    )(input)
}

pub fn value<'a>(input: Input<'a>) -> PResult<'a, JsonValue> {
    context("value", alt((scalar, array_value, object_value)))(input)
}

pub fn string<'a>(input: Input<'a>) -> PResult<'a, String> {
    map(satisfy("string", |a| a.kind == AtomKind::String), |a| {
        a.as_str().unwrap_or_default().to_string()
    })(input)
}

pub fn string_array<'a>(input: Input<'a>) -> PResult<'a, Vec<String>> {
    context(
        "array of strings",
        delimited(kind(AtomKind::StartArray), many0(string), kind(AtomKind::EndArray)),
    )(input)
}

pub fn boolean<'a>(input: Input<'a>) -> PResult<'a, bool> {
    map(kind(AtomKind::Bool), |a| {
        a.value.as_ref().and_then(JsonValue::as_bool).unwrap_or(false)
    })(input)
}

pub fn expression<'a>(input: Input<'a>) -> PResult<'a, String> {
    map(
        satisfy("expression", |a| a.as_str().map(is_expression).unwrap_or(false)),
        |a| a.as_str().unwrap_or_default().to_string(),
    )(input)
}

/* ===================== Steps ===================== */

/// `array-of(step)`, at least one
pub fn steps<'a>(input: Input<'a>) -> PResult<'a, Vec<Step>> {
    context(
        "list of steps",
        delimited(
            kind(AtomKind::StartArray),
            many1(commit_on_progress(step)),
            kind(AtomKind::EndArray),
        ),
    )(input)
}

pub fn step<'a>(input: Input<'a>) -> PResult<'a, Step> {
    context(
        "step",
        alt((
            return_keyword,
            expression_short,
            exit_keyword,
            call_short,
            step_object,
        )),
    )(input)
}

fn keyword_string<'a>(word: &'static str) -> impl FnMut(Input<'a>) -> PResult<'a, Location> {
    map(satisfy(word, move |a| a.as_str() == Some(word)), |a| {
        a.location.clone()
    })
}

fn return_keyword<'a>(input: Input<'a>) -> PResult<'a, Step> {
    map(keyword_string("return"), |location| Step::Return {
        error_code: None,
        location,
    })(input)
}

fn exit_keyword<'a>(input: Input<'a>) -> PResult<'a, Step> {
    map(keyword_string("exit"), |location| Step::Exit { location })(input)
}

fn expression_short<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let is_expr = |a: &Atom| a.as_str().map(is_expression).unwrap_or(false);
    map(satisfy("expression", is_expr), |a| Step::ExpressionShort {
        expr: a.as_str().unwrap_or_default().to_string(),
        location: a.location.clone(),
    })(input)
}

/// A bare string names a flow to call
fn call_short<'a>(input: Input<'a>) -> PResult<'a, Step> {
    map(satisfy("flow name", |a| a.kind == AtomKind::String), |a| {
        Step::Call {
            name: a.as_str().unwrap_or_default().to_string(),
            options: StepOptions::default(),
            location: a.location.clone(),
        }
    })(input)
}

fn step_object<'a>(input: Input<'a>) -> PResult<'a, Step> {
    alt((
        docker,
        group,
        switch,
        if_step,
        expr_full,
        form_call,
        set_variables,
        task_full,
        call_full,
        checkpoint,
        event,
        error_return,
        script,
        task_short,
    ))(input)
}

/// `{ <kw>: body... }` - matches the opening brace and keyword, then commits
fn keyword<'a, T, P>(
    kw: &'static str,
    body: P,
) -> impl FnMut(Input<'a>) -> PResult<'a, (Location, T)>
where
    P: Parser<Input<'a>, T, Failure<'a>>,
{
    let mut body = cut(body);
    move |input: Input<'a>| {
        let (rest, start) = kind(AtomKind::StartObject)(input)?;
        let (rest, _) = field(kw)(rest)?;
        let (rest, value) = body(rest)?;
        let (rest, _) = cut(kind(AtomKind::EndObject))(rest)?;
        Ok((rest, (start.location.clone(), value)))
    }
}

fn docker<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let (rest, (location, (image, opts))) =
        keyword("docker", pair(string, docker_options))(input)?;
    Ok((
        rest,
        Step::DockerCall {
            image,
            cmd: opts.cmd,
            env: opts.env,
            hosts: opts.hosts,
            force_pull: opts.force_pull,
            debug: opts.debug,
            location,
        },
    ))
}

struct DockerOptions {
    cmd: Option<String>,
    env: IndexMap<String, JsonValue>,
    hosts: Vec<String>,
    force_pull: bool,
    debug: bool,
}

const DOCKER_FIELDS: &[&str] = &["cmd", "env", "hosts", "forcePull", "debug"];

/// The next atom, when it is a field name
fn next_field<'a>(input: Input<'a>) -> Option<(&'a str, Input<'a>)> {
    match input.split_first() {
        Some((atom, rest)) if atom.kind == AtomKind::FieldName => {
            Some((atom.name.as_deref().unwrap_or_default(), rest))
        }
        _ => None,
    }
}

fn docker_options<'a>(mut input: Input<'a>) -> PResult<'a, DockerOptions> {
    let mut opts = DockerOptions {
        cmd: None,
        env: IndexMap::new(),
        hosts: Vec::new(),
        force_pull: true,
        debug: false,
    };
    while let Some((name, rest)) = next_field(input) {
        input = match name {
            "cmd" => {
                let (r, v) = string(rest)?;
                opts.cmd = Some(v);
                r
            }
            "env" => {
                let (r, v) = context("object", object_map)(rest)?;
                opts.env = v;
                r
            }
            "hosts" => {
                let (r, v) = string_array(rest)?;
                opts.hosts = v;
                r
            }
            "forcePull" => {
                let (r, v) = boolean(rest)?;
                opts.force_pull = v;
                r
            }
            "debug" => {
                let (r, v) = boolean(rest)?;
                opts.debug = v;
                r
            }
            _ => return Err(unexpected_field(input, DOCKER_FIELDS)),
        };
    }
    Ok((input, opts))
}

fn group<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let (rest, (location, (steps, options))) =
        keyword("try", pair(steps, options(GROUP_OPTIONS)))(input)?;
    Ok((
        rest,
        Step::Group {
            steps,
            options,
            location,
        },
    ))
}

fn switch<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let branches = many1(commit_on_progress(pair(any_field, steps)));
    let (rest, (location, (expr, branches))) =
        keyword("switch", pair(expression, branches))(input)?;

    let mut cases = IndexMap::new();
    let mut default = None;
    for ((name, _), branch) in branches {
        if name == "default" {
            default = Some(branch);
        } else {
            cases.insert(name.to_string(), branch);
        }
    }

    Ok((
        rest,
        Step::Switch {
            expr,
            cases,
            default,
            location,
        },
    ))
}

fn if_step<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let else_steps = map(
        opt(commit_on_progress(preceded(field("else"), steps))),
        |e: Option<Vec<Step>>| e.unwrap_or_default(),
    );
    let body = pair(pair(expression, preceded(field("then"), steps)), else_steps);
    let (rest, (location, ((condition, then_steps), else_steps))) = keyword("if", body)(input)?;
    Ok((
        rest,
        Step::If {
            condition,
            then_steps,
            else_steps,
            location,
        },
    ))
}

fn expr_full<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let (rest, (location, (expr, options))) =
        keyword("expr", pair(expression, options(EXPR_OPTIONS)))(input)?;
    Ok((
        rest,
        Step::Expression {
            expr,
            options,
            location,
        },
    ))
}

fn form_call<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let raw_options = many0(commit_on_progress(pair(any_field, value)));
    let (rest, (location, (name, entries))) = keyword("form", pair(string, raw_options))(input)?;
    Ok((
        rest,
        Step::FormCall {
            name,
            options: entries
                .into_iter()
                .map(|((k, _), v)| (k.to_string(), v))
                .collect(),
            location,
        },
    ))
}

fn set_variables<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let (rest, (location, variables)) = keyword("set", context("object", object_map))(input)?;
    Ok((
        rest,
        Step::SetVariables {
            variables,
            location,
        },
    ))
}

fn task_full<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let (rest, (location, (name, options))) =
        keyword("task", pair(string, options(TASK_OPTIONS)))(input)?;
    Ok((
        rest,
        Step::Task {
            name,
            options,
            location,
        },
    ))
}

fn call_full<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let (rest, (location, (name, options))) =
        keyword("call", pair(string, options(CALL_OPTIONS)))(input)?;
    Ok((
        rest,
        Step::Call {
            name,
            options,
            location,
        },
    ))
}

fn checkpoint<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let (rest, (location, name)) = keyword("checkpoint", string)(input)?;
    Ok((rest, Step::Checkpoint { name, location }))
}

fn event<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let (rest, (location, name)) = keyword("event", string)(input)?;
    Ok((rest, Step::Event { name, location }))
}

fn error_return<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let (rest, (location, code)) = keyword("return", context("error code", string))(input)?;
    Ok((
        rest,
        Step::Return {
            error_code: Some(code),
            location,
        },
    ))
}

fn script<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let (rest, (location, (name, mut options))) =
        keyword("script", pair(string, options(SCRIPT_OPTIONS)))(input)?;
    let body = options
        .extra
        .shift_remove("body")
        .and_then(|v| v.as_str().map(str::to_string));
    Ok((
        rest,
        Step::Script {
            name,
            body,
            options,
            location,
        },
    ))
}

/// `{ name: arg }` - any single field not claimed by a keyword
fn task_short<'a>(input: Input<'a>) -> PResult<'a, Step> {
    let (rest, start) = kind(AtomKind::StartObject)(input)?;
    let (rest, (name, _)) = context("task name", any_field)(rest)?;
    let (rest, arg) = value(rest)?;
    let (rest, _) = kind(AtomKind::EndObject)(rest)?;
    Ok((
        rest,
        Step::TaskShort {
            name: name.to_string(),
            arg,
            location: start.location.clone(),
        },
    ))
}

/* ===================== Options ===================== */

/// Which option keys a step type accepts
#[derive(Debug, Clone, Copy)]
pub struct OptionSet {
    pub names: &'static [&'static str],
    /// Whether unknown keys are kept as opaque payload
    pub extras: bool,
}

const RESERVED: &[&str] = &["in", "out", "error", "retry", "withItems"];

pub const TASK_OPTIONS: OptionSet = OptionSet {
    names: &["in", "out", "error", "retry", "withItems"],
    extras: true,
};
pub const CALL_OPTIONS: OptionSet = TASK_OPTIONS;
pub const EXPR_OPTIONS: OptionSet = OptionSet {
    names: &["out", "error"],
    extras: false,
};
pub const GROUP_OPTIONS: OptionSet = OptionSet {
    names: &["error"],
    extras: false,
};
pub const SCRIPT_OPTIONS: OptionSet = OptionSet {
    names: &["body", "error"],
    extras: false,
};

fn unexpected_field<'a>(input: Input<'a>, allowed: &[&str]) -> nom::Err<Failure<'a>> {
    let mut failure = Failure::new(input, "end of object");
    failure
        .expected
        .extend(allowed.iter().map(|n| format!("'{}'", n)));
    nom::Err::Error(failure)
}

/// Option fields in any order until the closing brace
pub fn options<'a>(set: OptionSet) -> impl Fn(Input<'a>) -> PResult<'a, StepOptions> {
    move |mut input: Input<'a>| {
        let mut opts = StepOptions::default();
        while let Some((name, rest)) = next_field(input) {
            if !set.names.contains(&name) {
                if set.extras && !RESERVED.contains(&name) {
                    let (r, v) = value(rest)?;
                    opts.extra.insert(name.to_string(), v);
                    input = r;
                    continue;
                }
                return Err(unexpected_field(input, set.names));
            }

            input = match name {
                "in" => {
                    let (r, v) = bindings(rest)?;
                    opts.input = Some(v);
                    r
                }
                "out" => {
                    let (r, v) = out_spec(rest)?;
                    opts.output = Some(v);
                    r
                }
                "error" => {
                    let (r, v) = steps(rest)?;
                    opts.error = Some(v);
                    r
                }
                "retry" => {
                    let (r, v) = retry(rest)?;
                    opts.retry = Some(v);
                    r
                }
                "withItems" => {
                    let (r, v) = value(rest)?;
                    opts.with_items = Some(v);
                    r
                }
                "body" => {
                    let (r, v) = string(rest)?;
                    opts.extra.insert("body".to_string(), JsonValue::String(v));
                    r
                }
                _ => return Err(unexpected_field(input, set.names)),
            };
        }
        Ok((input, opts))
    }
}

/// `in: { target: value-or-expression }`
pub fn bindings<'a>(input: Input<'a>) -> PResult<'a, IndexMap<String, Arg>> {
    map(context("object", object_map), |m| {
        m.into_iter().map(|(k, v)| (k, Arg::from_value(v))).collect()
    })(input)
}

fn out_spec<'a>(input: Input<'a>) -> PResult<'a, OutSpec> {
    let variable = map(string, |name| OutSpec::Variable { name });
    let variables = map(string_array, |names| OutSpec::Variables { names });
    let mappings = map(bindings, |mappings| OutSpec::Mappings { mappings });
    context(
        "variable name, array of names or object",
        alt((variable, variables, mappings)),
    )(input)
}

const RETRY_FIELDS: &[&str] = &["times", "delay", "in"];

fn retry<'a>(input: Input<'a>) -> PResult<'a, RetrySpec> {
    let (mut input, start) = context("object", kind(AtomKind::StartObject))(input)?;
    let mut spec = RetrySpec {
        times: None,
        delay: None,
        input: IndexMap::new(),
        location: start.location.clone(),
    };

    while !peek_kind(input, AtomKind::EndObject) {
        let (rest, (name, _)) =
            any_field(input).map_err(|_| unexpected_field(input, RETRY_FIELDS))?;
        input = match name {
            "times" => {
                let (r, v) = scalar(rest)?;
                spec.times = Some(Arg::from_value(v));
                r
            }
            "delay" => {
                let (r, v) = scalar(rest)?;
                spec.delay = Some(Arg::from_value(v));
                r
            }
            "in" => {
                let (r, v) = bindings(rest)?;
                spec.input = v;
                r
            }
            _ => return Err(unexpected_field(input, RETRY_FIELDS)),
        };
    }

    let (rest, _) = kind(AtomKind::EndObject)(input)?;
    Ok((rest, spec))
}
