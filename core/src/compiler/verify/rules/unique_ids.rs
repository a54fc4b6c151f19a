//! Rule: Unique IDs
//!
//! Reports an error when two elements of one process share an ID. Flows
//! and boundary events address elements by ID, so a duplicate makes every
//! reference to it ambiguous.

use std::collections::HashSet;

use crate::compiler::ir::ProcessDefinition;

use super::super::{GraphRule, Violation};

pub struct UniqueIdsRule;

impl GraphRule for UniqueIdsRule {
    fn id(&self) -> &'static str {
        "unique-ids"
    }

    fn description(&self) -> &'static str {
        "Element IDs are unique within a process"
    }

    fn check(&self, process: &ProcessDefinition) -> Vec<Violation> {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();

        process
            .elements
            .iter()
            .map(|e| e.id())
            .filter(|id| !seen.insert(*id) && reported.insert(*id))
            .map(|id| {
                Violation::error(
                    Some(id),
                    format!("ID '{}' is used more than once", id),
                    self.id(),
                )
            })
            .collect()
    }
}
