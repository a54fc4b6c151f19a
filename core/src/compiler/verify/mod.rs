//! Structural verification of produced graphs
//!
//! Lowering is expected to emit well-formed graphs by construction. This
//! module double-checks the obligations the runtime relies on (unique IDs,
//! flows between existing elements, boundary events on real tasks, gateways
//! with a way out) so a lowering defect surfaces as an error instead of a
//! broken process definition.
//!
//! # Architecture
//!
//! 1. **GraphRule trait** - Each rule implements this trait
//! 2. **Verifier** - Collects and runs all rules
//! 3. **Violation** - The output of verification (errors, warnings, hints)
//!
//! # Adding a New Rule
//!
//! 1. Create a new file in `verify/rules/`
//! 2. Implement `GraphRule` for your struct
//! 3. Add it to the `Verifier::new()` constructor

pub mod rules;

use std::collections::{HashMap, HashSet, VecDeque};

use super::ir::{Element, ProcessDefinition};

// ============================================================================
// Violation Types
// ============================================================================

/// A problem found in a process definition
#[derive(Debug, Clone)]
pub struct Violation {
    /// Element the problem is about, when there is one
    pub element: Option<String>,
    pub message: String,
    pub severity: Severity,
    /// Which rule produced this violation
    pub rule_id: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The graph cannot be executed as intended
    Error,
    /// Executable, but probably not what was meant
    Warning,
    Hint,
}

impl Violation {
    pub fn error(element: Option<&str>, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self::new(element, message, Severity::Error, rule_id)
    }

    pub fn warning(element: Option<&str>, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self::new(element, message, Severity::Warning, rule_id)
    }

    pub fn hint(element: Option<&str>, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self::new(element, message, Severity::Hint, rule_id)
    }

    fn new(
        element: Option<&str>,
        message: impl Into<String>,
        severity: Severity,
        rule_id: &'static str,
    ) -> Self {
        Self {
            element: element.map(str::to_string),
            message: message.into(),
            severity,
            rule_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Hint => "hint",
        };
        match &self.element {
            Some(id) => write!(f, "{} at {}: {} [{}]", severity, id, self.message, self.rule_id),
            None => write!(f, "{}: {} [{}]", severity, self.message, self.rule_id),
        }
    }
}

// ============================================================================
// GraphRule Trait
// ============================================================================

/// One structural check over a whole process definition
pub trait GraphRule: Send + Sync {
    /// Unique identifier for this rule (e.g., "dangling-flow")
    fn id(&self) -> &'static str;

    /// Human-readable description of what this rule checks
    fn description(&self) -> &'static str;

    fn check(&self, process: &ProcessDefinition) -> Vec<Violation>;
}

// ============================================================================
// Verifier - Runs All Rules
// ============================================================================

pub struct Verifier {
    rules: Vec<Box<dyn GraphRule>>,
}

impl Verifier {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(rules::UniqueIdsRule),
                Box::new(rules::SingleStartRule),
                Box::new(rules::DanglingFlowRule),
                Box::new(rules::BoundaryAttachmentRule),
                Box::new(rules::GatewayExitRule),
            ],
        }
    }

    pub fn check(&self, process: &ProcessDefinition) -> Vec<Violation> {
        self.rules
            .iter()
            .flat_map(|rule| rule.check(process))
            .collect()
    }

    /// Registered rules as `(id, description)`
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rules.iter().map(|r| (r.id(), r.description()))
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Run every registered rule against `process`
pub fn verify_process(process: &ProcessDefinition) -> Vec<Violation> {
    Verifier::new().check(process)
}

pub fn has_errors(process: &ProcessDefinition) -> bool {
    verify_process(process).iter().any(Violation::is_error)
}

// ============================================================================
// Graph helpers shared by rules
// ============================================================================

/// Successors of every node: sequence flows plus the implicit edge from a
/// task to each boundary event attached to it.
pub(crate) fn successors(process: &ProcessDefinition) -> HashMap<&str, Vec<&str>> {
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for element in &process.elements {
        match element {
            Element::SequenceFlow { from, to, .. } => {
                edges.entry(from.as_str()).or_default().push(to.as_str());
            }
            Element::BoundaryEvent { id, attached_to } => {
                edges.entry(attached_to.as_str()).or_default().push(id.as_str());
            }
            _ => {}
        }
    }
    edges
}

/// Nodes reachable from `start`, `start` included
pub(crate) fn reachable_from<'a>(
    edges: &HashMap<&'a str, Vec<&'a str>>,
    start: &'a str,
) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        if !seen.insert(node) {
            continue;
        }
        if let Some(next) = edges.get(node) {
            queue.extend(next.iter().copied());
        }
    }
    seen
}

#[cfg(test)]
mod tests;
