//! Rule: Gateway Exit
//!
//! Every exclusive gateway needs at least one outgoing flow and at least one
//! path to an end or terminate event. A gateway whose flows are all guarded
//! is reported as a hint: the runtime fails when no guard holds.

use crate::compiler::ir::{Element, ProcessDefinition};

use super::super::{reachable_from, successors, GraphRule, Violation};

pub struct GatewayExitRule;

impl GraphRule for GatewayExitRule {
    fn id(&self) -> &'static str {
        "gateway-exit"
    }

    fn description(&self) -> &'static str {
        "Gateways have an outgoing flow and a path to a terminal event"
    }

    fn check(&self, process: &ProcessDefinition) -> Vec<Violation> {
        let edges = successors(process);
        let mut violations = Vec::new();

        for element in &process.elements {
            let Element::ExclusiveGateway { id } = element else {
                continue;
            };

            let outgoing: Vec<_> = process.outgoing(id).collect();
            if outgoing.is_empty() {
                violations.push(Violation::error(
                    Some(id.as_str()),
                    "gateway has no outgoing flow",
                    self.id(),
                ));
                continue;
            }

            let reaches_end = reachable_from(&edges, id)
                .into_iter()
                .filter_map(|node| process.element(node))
                .any(Element::is_terminal);
            if !reaches_end {
                violations.push(Violation::error(
                    Some(id.as_str()),
                    "no path from this gateway reaches an end event",
                    self.id(),
                ));
            }

            if outgoing.iter().all(|(_, guard)| guard.is_some()) {
                violations.push(Violation::hint(
                    Some(id.as_str()),
                    "every outgoing flow is guarded; the runtime fails if none holds",
                    self.id(),
                ));
            }
        }

        violations
    }
}
