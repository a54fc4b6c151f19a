//! Rule: Single Start

use crate::compiler::ir::{Element, ProcessDefinition};

use super::super::{GraphRule, Violation};

pub struct SingleStartRule;

impl GraphRule for SingleStartRule {
    fn id(&self) -> &'static str {
        "single-start"
    }

    fn description(&self) -> &'static str {
        "A process has exactly one start event with no incoming flows"
    }

    fn check(&self, process: &ProcessDefinition) -> Vec<Violation> {
        let starts: Vec<&str> = process
            .elements
            .iter()
            .filter(|e| matches!(e, Element::StartEvent { .. }))
            .map(Element::id)
            .collect();

        let mut violations = Vec::new();
        if starts.len() != 1 {
            violations.push(Violation::error(
                None,
                format!("expected exactly one start event, found {}", starts.len()),
                self.id(),
            ));
        }

        for start in starts {
            if process.incoming(start).next().is_some() {
                violations.push(Violation::error(
                    Some(start),
                    "start event must not be the target of a flow",
                    self.id(),
                ));
            }
        }

        violations
    }
}
