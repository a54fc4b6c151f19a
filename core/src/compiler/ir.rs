//! Graph IR produced by lowering
//!
//! A [`ProcessDefinition`] is a flat list of [`Element`]s: nodes (events,
//! tasks, gateways) and the [`Element::SequenceFlow`] edges between them.
//! Every element carries an ID unique within its process.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::ast::Arg;
use crate::parser::atoms::Location;

/* ===================== Elements ===================== */

/// What a service task invokes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Call {
    /// Evaluate an inline `${...}` expression
    Expression { expression: String },
    /// Named task, optionally with positional arguments (task-short form)
    Delegate {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<Arg>,
    },
    /// Another flow of the same project
    SubProcess { name: String },
    InlineScript { language: String, body: String },
    /// Script resource resolved by the runtime
    ScriptRef { reference: String },
}

/// One variable binding of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableMapping {
    pub target: String,
    pub source: Arg,
    /// Required bindings fail the task when the source cannot be resolved
    pub required: bool,
}

impl VariableMapping {
    pub fn required(target: impl Into<String>, source: Arg) -> Self {
        Self {
            target: target.into(),
            source,
            required: true,
        }
    }

    pub fn optional(target: impl Into<String>, source: Arg) -> Self {
        Self {
            target: target.into(),
            source,
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Element {
    StartEvent {
        id: String,
    },
    EndEvent {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
    },
    /// Ends the whole process instance, not only the current flow
    TerminateEvent {
        id: String,
    },
    SequenceFlow {
        id: String,
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guard: Option<String>,
    },
    ServiceTask {
        id: String,
        call: Call,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        inputs: Vec<VariableMapping>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        outputs: Vec<VariableMapping>,
        /// Step options the compiler does not interpret, forwarded as is
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        extra: IndexMap<String, JsonValue>,
    },
    ExclusiveGateway {
        id: String,
    },
    /// Catches faults raised while `attached_to` executes
    BoundaryEvent {
        id: String,
        attached_to: String,
    },
    UserTask {
        id: String,
        form: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        options: IndexMap<String, JsonValue>,
    },
    DockerTask {
        id: String,
        image: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cmd: Option<String>,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        env: IndexMap<String, JsonValue>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        hosts: Vec<String>,
        force_pull: bool,
        debug: bool,
    },
    SetVariablesTask {
        id: String,
        variables: IndexMap<String, JsonValue>,
    },
    Checkpoint {
        id: String,
        name: String,
    },
    IntermediateEvent {
        id: String,
        name: String,
    },
}

impl Element {
    pub fn id(&self) -> &str {
        match self {
            Element::StartEvent { id }
            | Element::EndEvent { id, .. }
            | Element::TerminateEvent { id }
            | Element::SequenceFlow { id, .. }
            | Element::ServiceTask { id, .. }
            | Element::ExclusiveGateway { id }
            | Element::BoundaryEvent { id, .. }
            | Element::UserTask { id, .. }
            | Element::DockerTask { id, .. }
            | Element::SetVariablesTask { id, .. }
            | Element::Checkpoint { id, .. }
            | Element::IntermediateEvent { id, .. } => id,
        }
    }

    /// Elements that may raise a fault a boundary event can catch
    pub fn is_attachable(&self) -> bool {
        matches!(
            self,
            Element::ServiceTask { .. } | Element::UserTask { .. } | Element::DockerTask { .. }
        )
    }

    /// End and terminate events
    pub fn is_terminal(&self) -> bool {
        matches!(self, Element::EndEvent { .. } | Element::TerminateEvent { .. })
    }

    pub fn is_flow(&self) -> bool {
        matches!(self, Element::SequenceFlow { .. })
    }

    /// Type tag as it appears in serialized output
    pub fn kind(&self) -> &'static str {
        match self {
            Element::StartEvent { .. } => "StartEvent",
            Element::EndEvent { .. } => "EndEvent",
            Element::TerminateEvent { .. } => "TerminateEvent",
            Element::SequenceFlow { .. } => "SequenceFlow",
            Element::ServiceTask { .. } => "ServiceTask",
            Element::ExclusiveGateway { .. } => "ExclusiveGateway",
            Element::BoundaryEvent { .. } => "BoundaryEvent",
            Element::UserTask { .. } => "UserTask",
            Element::DockerTask { .. } => "DockerTask",
            Element::SetVariablesTask { .. } => "SetVariablesTask",
            Element::Checkpoint { .. } => "Checkpoint",
            Element::IntermediateEvent { .. } => "IntermediateEvent",
        }
    }
}

/* ===================== Process ===================== */

/// Where an element came from, for diagnostics only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMapEntry {
    pub location: Location,
    pub description: String,
}

impl SourceMapEntry {
    pub fn new(location: &Location, description: impl Into<String>) -> Self {
        Self {
            location: location.clone(),
            description: description.into(),
        }
    }
}

/// One lowered flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub name: String,
    pub elements: Vec<Element>,
    pub source_map: IndexMap<String, SourceMapEntry>,
}

impl ProcessDefinition {
    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id() == id)
    }

    pub fn start_event(&self) -> Option<&Element> {
        self.elements
            .iter()
            .find(|e| matches!(e, Element::StartEvent { .. }))
    }

    /// Outgoing flows of `id` as `(target, guard)` in emission order
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = (&'a str, Option<&'a str>)> {
        self.elements.iter().filter_map(move |e| match e {
            Element::SequenceFlow { from, to, guard, .. } if from == id => {
                Some((to.as_str(), guard.as_deref()))
            }
            _ => None,
        })
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> {
        self.elements.iter().filter_map(move |e| match e {
            Element::SequenceFlow { from, to, .. } if to == id => Some(from.as_str()),
            _ => None,
        })
    }

    /// Boundary events attached to `id`
    pub fn boundary_events<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> {
        self.elements.iter().filter_map(move |e| match e {
            Element::BoundaryEvent {
                id: event,
                attached_to,
            } if attached_to == id => Some(event.as_str()),
            _ => None,
        })
    }

    /// Non-flow elements of the given kind
    pub fn count_kind(&self, kind: &str) -> usize {
        self.elements.iter().filter(|e| e.kind() == kind).count()
    }

    /// Service tasks whose call matches `pred`
    pub fn service_tasks<'a>(
        &'a self,
        pred: impl Fn(&Call) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Element> {
        self.elements.iter().filter(move |e| match e {
            Element::ServiceTask { call, .. } => pred(call),
            _ => false,
        })
    }
}
