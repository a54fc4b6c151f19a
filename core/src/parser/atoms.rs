//! Atom model
//!
//! The grammar never looks at YAML directly. A document is first flattened
//! into an immutable, randomly indexable sequence of [`Atom`]s, one per
//! token of the hierarchical document: object/array boundaries, field
//! names and scalars, each with the position it came from.

use std::fmt;
use std::sync::Arc;

use marked_yaml::{LoadError, Marker, Node};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::CompileError;

/// Source location of an atom or AST node (1-based line and column)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Name of the document the location points into (usually a file path)
    pub source: Arc<str>,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(source: impl Into<Arc<str>>, line: usize, column: usize) -> Self {
        Self {
            source: source.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}

/// Token kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomKind {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    FieldName,
    String,
    Int,
    Float,
    Bool,
    Null,
}

impl AtomKind {
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            AtomKind::String | AtomKind::Int | AtomKind::Float | AtomKind::Bool | AtomKind::Null
        )
    }

    /// Human-readable name used in "expected X, got Y" messages
    pub fn describe(self) -> &'static str {
        match self {
            AtomKind::StartObject => "start of object",
            AtomKind::EndObject => "end of object",
            AtomKind::StartArray => "start of array",
            AtomKind::EndArray => "end of array",
            AtomKind::FieldName => "field name",
            AtomKind::String => "string",
            AtomKind::Int => "integer",
            AtomKind::Float => "float",
            AtomKind::Bool => "boolean",
            AtomKind::Null => "null",
        }
    }
}

/// One token of the document
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub kind: AtomKind,
    /// Present only for `FieldName`
    pub name: Option<String>,
    /// Present only for scalar kinds
    pub value: Option<JsonValue>,
    pub location: Location,
}

impl Atom {
    fn marker(kind: AtomKind, location: Location) -> Self {
        Self {
            kind,
            name: None,
            value: None,
            location,
        }
    }

    fn field(name: &str, location: Location) -> Self {
        Self {
            kind: AtomKind::FieldName,
            name: Some(name.to_string()),
            value: None,
            location,
        }
    }

    /// Quoted and block scalars are always strings; only plain ones are
    /// typed by their text
    fn scalar(raw: &str, plain: bool, location: Location) -> Self {
        let (kind, value) = if plain {
            classify_scalar(raw)
        } else {
            (AtomKind::String, JsonValue::String(raw.to_string()))
        };
        Self {
            kind,
            name: None,
            value: Some(value),
            location,
        }
    }

    /// The scalar as a string slice, when it is a string scalar
    pub fn as_str(&self) -> Option<&str> {
        match (&self.kind, &self.value) {
            (AtomKind::String, Some(JsonValue::String(s))) => Some(s),
            _ => None,
        }
    }

    /// Short rendering for diagnostics ("got 'task'", "got end of array")
    pub fn describe(&self) -> String {
        match (self.kind, &self.name, &self.value) {
            (AtomKind::FieldName, Some(name), _) => format!("field '{}'", name),
            (AtomKind::String, _, Some(JsonValue::String(s))) => format!("string '{}'", s),
            (kind, _, Some(value)) if kind.is_scalar() => format!("{} {}", kind.describe(), value),
            (kind, _, _) => kind.describe().to_string(),
        }
    }
}

/// Plain YAML scalars are typed by their text: null, booleans, integers and
/// floats follow the YAML 1.2 core schema, everything else is a string.
fn classify_scalar(raw: &str) -> (AtomKind, JsonValue) {
    match raw {
        "" | "~" | "null" | "Null" | "NULL" => return (AtomKind::Null, JsonValue::Null),
        "true" | "True" | "TRUE" => return (AtomKind::Bool, JsonValue::Bool(true)),
        "false" | "False" | "FALSE" => return (AtomKind::Bool, JsonValue::Bool(false)),
        _ => {}
    }

    if let Ok(i) = raw.parse::<i64>() {
        return (AtomKind::Int, JsonValue::from(i));
    }

    let looks_numeric = raw
        .chars()
        .next()
        .map(|c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
        .unwrap_or(false);
    if looks_numeric {
        if let Ok(f) = raw.parse::<f64>() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return (AtomKind::Float, JsonValue::Number(n));
            }
        }
    }

    (AtomKind::String, JsonValue::String(raw.to_string()))
}

/// The flattened token sequence of one document
#[derive(Debug, Clone)]
pub struct Atoms {
    source_name: Arc<str>,
    atoms: Vec<Atom>,
}

impl Atoms {
    /// Tokenize a YAML document. The top level must be a mapping.
    pub fn from_yaml(source_name: &str, text: &str) -> Result<Self, CompileError> {
        let source_name: Arc<str> = Arc::from(source_name);
        let root = marked_yaml::parse_yaml(0, text).map_err(|e| CompileError::Yaml {
            location: load_error_location(&e, &source_name),
            message: e.to_string(),
        })?;

        let mut atoms = Vec::new();
        let origin = Location::new(source_name.clone(), 1, 1);
        flatten(&root, &source_name, &origin, &mut atoms);

        tracing::trace!(source = %source_name, atoms = atoms.len(), "tokenized document");

        Ok(Self { source_name, atoms })
    }

    pub fn from_vec(source_name: &str, atoms: Vec<Atom>) -> Self {
        Self {
            source_name: Arc::from(source_name),
            atoms,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn as_slice(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Location one past the last atom, used for "unexpected end of input"
    pub fn end_location(&self) -> Location {
        self.atoms
            .last()
            .map(|a| a.location.clone())
            .unwrap_or_else(|| Location::new(self.source_name.clone(), 1, 1))
    }
}

fn marker_location(marker: &Marker, source: &Arc<str>) -> Location {
    Location::new(source.clone(), marker.line(), marker.column())
}

/// Where loading stopped; the document start when the error carries no marker
fn load_error_location(error: &LoadError, source: &Arc<str>) -> Location {
    let marker = match error {
        LoadError::TopLevelMustBeMapping(m)
        | LoadError::UnexpectedAnchor(m)
        | LoadError::MappingKeyMustBeScalar(m)
        | LoadError::UnexpectedTag(m)
        | LoadError::ScanError(m, _) => Some(m),
        _ => None,
    };
    marker
        .map(|m| marker_location(m, source))
        .unwrap_or_else(|| Location::new(source.clone(), 1, 1))
}

fn start_of(node_span: &marked_yaml::Span, source: &Arc<str>, fallback: &Location) -> Location {
    node_span
        .start()
        .map(|m| marker_location(m, source))
        .unwrap_or_else(|| fallback.clone())
}

fn end_of(node_span: &marked_yaml::Span, source: &Arc<str>, fallback: &Location) -> Location {
    node_span
        .end()
        .map(|m| marker_location(m, source))
        .unwrap_or_else(|| fallback.clone())
}

fn flatten(node: &Node, source: &Arc<str>, parent: &Location, out: &mut Vec<Atom>) {
    match node {
        Node::Scalar(scalar) => {
            let location = start_of(scalar.span(), source, parent);
            out.push(Atom::scalar(scalar.as_str(), scalar.may_coerce(), location));
        }
        Node::Sequence(seq) => {
            let location = start_of(seq.span(), source, parent);
            out.push(Atom::marker(AtomKind::StartArray, location.clone()));
            for item in seq.iter() {
                flatten(item, source, &location, out);
            }
            let end = end_of(seq.span(), source, &location);
            out.push(Atom::marker(AtomKind::EndArray, end));
        }
        Node::Mapping(map) => {
            let location = start_of(map.span(), source, parent);
            out.push(Atom::marker(AtomKind::StartObject, location.clone()));
            for (key, value) in map.iter() {
                let key_location = start_of(key.span(), source, &location);
                out.push(Atom::field(key.as_str(), key_location.clone()));
                flatten(value, source, &key_location, out);
            }
            let end = end_of(map.span(), source, &location);
            out.push(Atom::marker(AtomKind::EndObject, end));
        }
    }
}
