//! Rule: Boundary Attachment
//!
//! A boundary event must be attached to an element that can raise a fault
//! (a service, user or docker task) and must lead somewhere.

use crate::compiler::ir::{Element, ProcessDefinition};

use super::super::{GraphRule, Violation};

pub struct BoundaryAttachmentRule;

impl GraphRule for BoundaryAttachmentRule {
    fn id(&self) -> &'static str {
        "boundary-attachment"
    }

    fn description(&self) -> &'static str {
        "Boundary events attach to existing tasks and have an outgoing flow"
    }

    fn check(&self, process: &ProcessDefinition) -> Vec<Violation> {
        let mut violations = Vec::new();

        for element in &process.elements {
            let Element::BoundaryEvent { id, attached_to } = element else {
                continue;
            };

            match process.element(attached_to) {
                None => violations.push(Violation::error(
                    Some(id.as_str()),
                    format!("attached to unknown element '{}'", attached_to),
                    self.id(),
                )),
                Some(target) if !target.is_attachable() => violations.push(Violation::error(
                    Some(id.as_str()),
                    format!(
                        "attached to {} '{}', which cannot raise faults",
                        target.kind(),
                        attached_to
                    ),
                    self.id(),
                )),
                Some(_) => {}
            }

            if process.outgoing(id).next().is_none() {
                violations.push(Violation::error(
                    Some(id.as_str()),
                    "boundary event has no outgoing flow",
                    self.id(),
                ));
            }
        }

        violations
    }
}
