//! Rule: Dangling Flow
//!
//! Reports an error when a sequence flow starts or ends at an ID that was
//! never emitted, or at another flow.

use std::collections::HashMap;

use crate::compiler::ir::{Element, ProcessDefinition};

use super::super::{GraphRule, Violation};

pub struct DanglingFlowRule;

impl GraphRule for DanglingFlowRule {
    fn id(&self) -> &'static str {
        "dangling-flow"
    }

    fn description(&self) -> &'static str {
        "Sequence flows connect existing nodes"
    }

    fn check(&self, process: &ProcessDefinition) -> Vec<Violation> {
        let nodes: HashMap<&str, &Element> = process
            .elements
            .iter()
            .map(|e| (e.id(), e))
            .collect();

        let mut violations = Vec::new();
        for element in &process.elements {
            let Element::SequenceFlow { id, from, to, .. } = element else {
                continue;
            };

            for (end, target) in [("source", from), ("target", to)] {
                match nodes.get(target.as_str()) {
                    None => violations.push(Violation::error(
                        Some(id.as_str()),
                        format!("{} '{}' does not exist", end, target),
                        self.id(),
                    )),
                    Some(node) if node.is_flow() => violations.push(Violation::error(
                        Some(id.as_str()),
                        format!("{} '{}' is itself a flow", end, target),
                        self.id(),
                    )),
                    Some(_) => {}
                }
            }

            if let Some(node) = nodes.get(from.as_str()) {
                if node.is_terminal() {
                    violations.push(Violation::error(
                        Some(id.as_str()),
                        format!("flow leaves terminal event '{}'", from),
                        self.id(),
                    ));
                }
            }
        }

        violations
    }
}
