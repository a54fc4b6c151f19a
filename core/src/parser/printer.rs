//! Pretty-printer: AST back to flow-language YAML
//!
//! Output uses the shortest surface form that parses back to the same AST
//! (ignoring locations), so `fmt` output is a fixed point.

use serde_json::Value as JsonValue;
use serde_yaml::{Mapping, Value};

use crate::ast::{is_expression, Arg, Document, FormField, OutSpec, RetrySpec, Step, StepOptions};

/// Print a whole document
pub fn print_document(doc: &Document) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&document_value(doc))
}

/// Print a step list on its own (used by `tempo ast --yaml`)
pub fn print_steps(steps: &[Step]) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&steps_value(steps))
}

pub fn document_value(doc: &Document) -> Value {
    let mut root = Mapping::new();

    if let Some(configuration) = &doc.configuration {
        insert(&mut root, "configuration", json(configuration));
    }

    if !doc.flows.is_empty() {
        let mut flows = Mapping::new();
        for (name, flow) in &doc.flows {
            insert(&mut flows, name, steps_value(&flow.steps));
        }
        insert(&mut root, "flows", Value::Mapping(flows));
    }

    if !doc.forms.is_empty() {
        let mut forms = Mapping::new();
        for (name, fields) in &doc.forms {
            let fields = fields.iter().map(form_field_value).collect();
            insert(&mut forms, name, Value::Sequence(fields));
        }
        insert(&mut root, "forms", Value::Mapping(forms));
    }

    if !doc.triggers.is_empty() {
        let triggers = doc
            .triggers
            .iter()
            .map(|t| single(&t.kind, params(&t.params)))
            .collect();
        insert(&mut root, "triggers", Value::Sequence(triggers));
    }

    if !doc.imports.is_empty() {
        let imports = doc
            .imports
            .iter()
            .map(|i| single(&i.kind, params(&i.params)))
            .collect();
        insert(&mut root, "imports", Value::Sequence(imports));
    }

    if !doc.public_flows.is_empty() {
        let names = doc.public_flows.iter().cloned().map(Value::String).collect();
        insert(&mut root, "publicFlows", Value::Sequence(names));
    }

    Value::Mapping(root)
}

pub fn steps_value(steps: &[Step]) -> Value {
    Value::Sequence(steps.iter().map(step_value).collect())
}

pub fn step_value(step: &Step) -> Value {
    match step {
        Step::ExpressionShort { expr, .. } => Value::String(expr.clone()),
        Step::Expression { expr, options, .. } => {
            let mut m = keyword("expr", Value::String(expr.clone()));
            push_options(&mut m, options);
            Value::Mapping(m)
        }
        Step::Task { name, options, .. } => {
            let mut m = keyword("task", Value::String(name.clone()));
            push_options(&mut m, options);
            Value::Mapping(m)
        }
        Step::TaskShort { name, arg, .. } => single(name, json(arg)),
        Step::Call { name, options, .. } => {
            if options.is_empty() && !is_reserved_word(name) {
                Value::String(name.clone())
            } else {
                let mut m = keyword("call", Value::String(name.clone()));
                push_options(&mut m, options);
                Value::Mapping(m)
            }
        }
        Step::Group { steps, options, .. } => {
            let mut m = keyword("try", steps_value(steps));
            push_options(&mut m, options);
            Value::Mapping(m)
        }
        Step::If {
            condition,
            then_steps,
            else_steps,
            ..
        } => {
            let mut m = keyword("if", Value::String(condition.clone()));
            insert(&mut m, "then", steps_value(then_steps));
            if !else_steps.is_empty() {
                insert(&mut m, "else", steps_value(else_steps));
            }
            Value::Mapping(m)
        }
        Step::Switch {
            expr,
            cases,
            default,
            ..
        } => {
            let mut m = keyword("switch", Value::String(expr.clone()));
            for (case, steps) in cases {
                insert(&mut m, case, steps_value(steps));
            }
            if let Some(steps) = default {
                insert(&mut m, "default", steps_value(steps));
            }
            Value::Mapping(m)
        }
        Step::FormCall { name, options, .. } => {
            let mut m = keyword("form", Value::String(name.clone()));
            for (k, v) in options {
                insert(&mut m, k, json(v));
            }
            Value::Mapping(m)
        }
        Step::Script {
            name, body, options, ..
        } => {
            let mut m = keyword("script", Value::String(name.clone()));
            if let Some(body) = body {
                insert(&mut m, "body", Value::String(body.clone()));
            }
            push_options(&mut m, options);
            Value::Mapping(m)
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
            let mut m = keyword("docker", Value::String(image.clone()));
            if let Some(cmd) = cmd {
                insert(&mut m, "cmd", Value::String(cmd.clone()));
            }
            if !env.is_empty() {
                insert(&mut m, "env", params(env));
            }
            if !hosts.is_empty() {
                let hosts = hosts.iter().cloned().map(Value::String).collect();
                insert(&mut m, "hosts", Value::Sequence(hosts));
            }
            if !force_pull {
                insert(&mut m, "forcePull", Value::Bool(false));
            }
            if *debug {
                insert(&mut m, "debug", Value::Bool(true));
            }
            Value::Mapping(m)
        }
        Step::SetVariables { variables, .. } => single("set", params(variables)),
        Step::Checkpoint { name, .. } => single("checkpoint", Value::String(name.clone())),
        Step::Event { name, .. } => single("event", Value::String(name.clone())),
        Step::Exit { .. } => Value::String("exit".to_string()),
        Step::Return {
            error_code: None, ..
        } => Value::String("return".to_string()),
        Step::Return {
            error_code: Some(code),
            ..
        } => single("return", Value::String(code.clone())),
    }
}

/// Bare strings that would not parse back as a flow call
fn is_reserved_word(name: &str) -> bool {
    name == "return" || name == "exit" || is_expression(name)
}

fn push_options(m: &mut Mapping, options: &StepOptions) {
    if let Some(input) = &options.input {
        insert(m, "in", args(input.iter()));
    }
    if let Some(output) = &options.output {
        insert(m, "out", out_value(output));
    }
    if let Some(error) = &options.error {
        insert(m, "error", steps_value(error));
    }
    if let Some(retry) = &options.retry {
        insert(m, "retry", retry_value(retry));
    }
    if let Some(items) = &options.with_items {
        insert(m, "withItems", json(items));
    }
    for (k, v) in &options.extra {
        insert(m, k, json(v));
    }
}

fn out_value(out: &OutSpec) -> Value {
    match out {
        OutSpec::Variable { name } => Value::String(name.clone()),
        OutSpec::Variables { names } => {
            Value::Sequence(names.iter().cloned().map(Value::String).collect())
        }
        OutSpec::Mappings { mappings } => args(mappings.iter()),
    }
}

fn retry_value(retry: &RetrySpec) -> Value {
    let mut m = Mapping::new();
    if let Some(times) = &retry.times {
        insert(&mut m, "times", json(&times.to_value()));
    }
    if let Some(delay) = &retry.delay {
        insert(&mut m, "delay", json(&delay.to_value()));
    }
    if !retry.input.is_empty() {
        insert(&mut m, "in", args(retry.input.iter()));
    }
    Value::Mapping(m)
}

fn form_field_value(field: &FormField) -> Value {
    let mut m = Mapping::new();
    insert(
        &mut m,
        "type",
        Value::String(format!("{}{}", field.field_type, field.cardinality.suffix())),
    );
    if let Some(label) = &field.label {
        insert(&mut m, "label", Value::String(label.clone()));
    }
    if let Some(v) = &field.default_value {
        insert(&mut m, "value", json(v));
    }
    if let Some(v) = &field.allowed_value {
        insert(&mut m, "allow", json(v));
    }
    for (k, v) in &field.options {
        insert(&mut m, k, json(v));
    }
    single(&field.name, Value::Mapping(m))
}

/* ===================== Helpers ===================== */

fn insert(m: &mut Mapping, key: &str, value: Value) {
    m.insert(Value::String(key.to_string()), value);
}

fn keyword(key: &str, value: Value) -> Mapping {
    let mut m = Mapping::new();
    insert(&mut m, key, value);
    m
}

fn single(key: &str, value: Value) -> Value {
    Value::Mapping(keyword(key, value))
}

fn params<'a>(entries: impl IntoIterator<Item = (&'a String, &'a JsonValue)>) -> Value {
    let mut m = Mapping::new();
    for (k, v) in entries {
        insert(&mut m, k, json(v));
    }
    Value::Mapping(m)
}

fn args<'a>(entries: impl Iterator<Item = (&'a String, &'a Arg)>) -> Value {
    let mut m = Mapping::new();
    for (k, v) in entries {
        insert(&mut m, k, json(&v.to_value()));
    }
    Value::Mapping(m)
}

fn json(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                Value::Number(n.as_f64().unwrap_or_default().into())
            }
        }
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Array(items) => Value::Sequence(items.iter().map(json).collect()),
        JsonValue::Object(fields) => params(fields),
    }
}
