//! Abstract Syntax Tree node types
//!
//! The step set is closed: every surface form of the flow language maps to
//! exactly one [`Step`] variant, and the lowering pass matches on all of
//! them exhaustively.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::parser::atoms::Location;

/// Whether `s` is an expression for the runtime evaluator (`${...}`).
///
/// The contents are never inspected here, only the marker.
pub fn is_expression(s: &str) -> bool {
    s.len() >= 3 && s.starts_with("${") && s.ends_with('}')
}

/// Whether `s` contains an interpolated expression anywhere.
pub fn contains_expression(s: &str) -> bool {
    s.find("${")
        .map(|start| s[start..].contains('}'))
        .unwrap_or(false)
}

/// A value that is either passed through literally or evaluated by the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Arg {
    Literal(JsonValue),
    Expression(String),
}

impl Arg {
    /// Strings carrying the `${...}` marker become expressions, anything else
    /// stays a literal.
    pub fn from_value(value: JsonValue) -> Self {
        match value {
            JsonValue::String(s) if contains_expression(&s) => Arg::Expression(s),
            other => Arg::Literal(other),
        }
    }

    pub fn to_value(&self) -> JsonValue {
        match self {
            Arg::Literal(v) => v.clone(),
            Arg::Expression(s) => JsonValue::String(s.clone()),
        }
    }
}

/// Output form of a task or call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum OutSpec {
    /// `out: name` - stores the whole result
    Variable { name: String },
    /// `out: [a, b]` - stores the whole result in every listed variable
    Variables { names: Vec<String> },
    /// `out: {target: ${result.x}}`
    Mappings { mappings: IndexMap<String, Arg> },
}

impl OutSpec {
    /// Variable names this output writes, in declaration order
    pub fn names(&self) -> Vec<String> {
        match self {
            OutSpec::Variable { name } => vec![name.clone()],
            OutSpec::Variables { names } => names.clone(),
            OutSpec::Mappings { mappings } => mappings.keys().cloned().collect(),
        }
    }
}

/// `retry: {times, delay, in}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySpec {
    pub times: Option<Arg>,
    pub delay: Option<Arg>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub input: IndexMap<String, Arg>,
    pub location: Location,
}

/// Options attached to task, call, expression, group and script steps.
///
/// Reserved keys are extracted into typed fields; anything else a step type
/// accepts is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<IndexMap<String, Arg>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Vec<Step>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySpec>,
    /// Raw `withItems` source; validated during lowering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_items: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extra: IndexMap<String, JsonValue>,
}

impl StepOptions {
    pub fn is_empty(&self) -> bool {
        self == &StepOptions::default()
    }
}

/// Step AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Step {
    /// `- ${expr}`
    ExpressionShort { expr: String, location: Location },
    /// `- expr: ${expr}` with `out` / `error`
    Expression {
        expr: String,
        options: StepOptions,
        location: Location,
    },
    /// `- task: name` with the full option set
    Task {
        name: String,
        options: StepOptions,
        location: Location,
    },
    /// `- name: arg`
    TaskShort {
        name: String,
        arg: JsonValue,
        location: Location,
    },
    /// `- call: flow` or a bare `- flow`
    Call {
        name: String,
        options: StepOptions,
        location: Location,
    },
    /// `- try: [...]` with an optional `error` block
    Group {
        steps: Vec<Step>,
        options: StepOptions,
        location: Location,
    },
    If {
        condition: String,
        then_steps: Vec<Step>,
        else_steps: Vec<Step>,
        location: Location,
    },
    Switch {
        expr: String,
        cases: IndexMap<String, Vec<Step>>,
        default: Option<Vec<Step>>,
        location: Location,
    },
    FormCall {
        name: String,
        options: IndexMap<String, JsonValue>,
        location: Location,
    },
    Script {
        name: String,
        body: Option<String>,
        options: StepOptions,
        location: Location,
    },
    DockerCall {
        image: String,
        cmd: Option<String>,
        env: IndexMap<String, JsonValue>,
        hosts: Vec<String>,
        force_pull: bool,
        debug: bool,
        location: Location,
    },
    SetVariables {
        variables: IndexMap<String, JsonValue>,
        location: Location,
    },
    Checkpoint { name: String, location: Location },
    /// Debug-only marker event
    Event { name: String, location: Location },
    Exit { location: Location },
    Return {
        error_code: Option<String>,
        location: Location,
    },
}

impl Step {
    /// Get the location of this step
    pub fn location(&self) -> &Location {
        match self {
            Step::ExpressionShort { location, .. }
            | Step::Expression { location, .. }
            | Step::Task { location, .. }
            | Step::TaskShort { location, .. }
            | Step::Call { location, .. }
            | Step::Group { location, .. }
            | Step::If { location, .. }
            | Step::Switch { location, .. }
            | Step::FormCall { location, .. }
            | Step::Script { location, .. }
            | Step::DockerCall { location, .. }
            | Step::SetVariables { location, .. }
            | Step::Checkpoint { location, .. }
            | Step::Event { location, .. }
            | Step::Exit { location }
            | Step::Return { location, .. } => location,
        }
    }

    /// Options block of the step types that accept one
    pub fn options(&self) -> Option<&StepOptions> {
        match self {
            Step::Expression { options, .. }
            | Step::Task { options, .. }
            | Step::Call { options, .. }
            | Step::Group { options, .. }
            | Step::Script { options, .. } => Some(options),
            _ => None,
        }
    }

    /// Short label used in source maps and logs, e.g. `task: http`
    pub fn describe(&self) -> String {
        match self {
            Step::ExpressionShort { expr, .. } | Step::Expression { expr, .. } => {
                format!("expr: {}", expr)
            }
            Step::Task { name, .. } => format!("task: {}", name),
            Step::TaskShort { name, .. } => format!("{}: ...", name),
            Step::Call { name, .. } => format!("call: {}", name),
            Step::Group { .. } => "try".to_string(),
            Step::If { condition, .. } => format!("if: {}", condition),
            Step::Switch { expr, .. } => format!("switch: {}", expr),
            Step::FormCall { name, .. } => format!("form: {}", name),
            Step::Script { name, .. } => format!("script: {}", name),
            Step::DockerCall { image, .. } => format!("docker: {}", image),
            Step::SetVariables { .. } => "set".to_string(),
            Step::Checkpoint { name, .. } => format!("checkpoint: {}", name),
            Step::Event { name, .. } => format!("event: {}", name),
            Step::Exit { .. } => "exit".to_string(),
            Step::Return { error_code: None, .. } => "return".to_string(),
            Step::Return {
                error_code: Some(code),
                ..
            } => format!("return: {}", code),
        }
    }
}

/* ===================== Forms ===================== */

/// Cardinality suffix of a form field type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// no suffix
    One,
    /// `?`
    OptionalOne,
    /// `+`
    AtLeastOne,
    /// `*`
    Any,
}

impl Cardinality {
    pub fn suffix(self) -> &'static str {
        match self {
            Cardinality::One => "",
            Cardinality::OptionalOne => "?",
            Cardinality::AtLeastOne => "+",
            Cardinality::Any => "*",
        }
    }

    /// Split `string?` into (`string`, OptionalOne)
    pub fn split_type(raw: &str) -> (&str, Cardinality) {
        if let Some(base) = raw.strip_suffix('?') {
            (base, Cardinality::OptionalOne)
        } else if let Some(base) = raw.strip_suffix('+') {
            (base, Cardinality::AtLeastOne)
        } else if let Some(base) = raw.strip_suffix('*') {
            (base, Cardinality::Any)
        } else {
            (raw, Cardinality::One)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub field_type: String,
    pub cardinality: Cardinality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_value: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub options: IndexMap<String, JsonValue>,
    pub location: Location,
}

/* ===================== Triggers and imports ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: String,
    pub params: IndexMap<String, JsonValue>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub kind: String,
    pub params: IndexMap<String, JsonValue>,
    pub location: Location,
}

/* ===================== Document ===================== */

/// One flow-language document as parsed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub flows: IndexMap<String, Flow>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub forms: IndexMap<String, Vec<FormField>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<Import>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_flows: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub steps: Vec<Step>,
    pub location: Location,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expression_marker() {
        assert!(is_expression("${x}"));
        assert!(is_expression("${a.b(c)}"));
        assert!(!is_expression("x"));
        assert!(!is_expression("prefix ${x}"));
        assert!(!is_expression("${}x"));

        assert!(contains_expression("Hello, ${name}!"));
        assert!(!contains_expression("$name"));
        assert!(!contains_expression("${unterminated"));
    }

    #[test]
    fn test_arg_from_value() {
        assert_eq!(
            Arg::from_value(json!("${x}")),
            Arg::Expression("${x}".to_string())
        );
        assert_eq!(
            Arg::from_value(json!("Hi ${x}")),
            Arg::Expression("Hi ${x}".to_string())
        );
        assert_eq!(Arg::from_value(json!("plain")), Arg::Literal(json!("plain")));
        assert_eq!(Arg::from_value(json!(3)), Arg::Literal(json!(3)));
    }

    #[test]
    fn test_split_type() {
        assert_eq!(Cardinality::split_type("string"), ("string", Cardinality::One));
        assert_eq!(
            Cardinality::split_type("int?"),
            ("int", Cardinality::OptionalOne)
        );
        assert_eq!(
            Cardinality::split_type("file+"),
            ("file", Cardinality::AtLeastOne)
        );
        assert_eq!(Cardinality::split_type("string*"), ("string", Cardinality::Any));
    }

    #[test]
    fn test_out_names() {
        let out = OutSpec::Mappings {
            mappings: IndexMap::from([
                ("b".to_string(), Arg::Expression("${result.b}".to_string())),
                ("a".to_string(), Arg::Expression("${result.a}".to_string())),
            ]),
        };
        assert_eq!(out.names(), vec!["b".to_string(), "a".to_string()]);
    }
}
