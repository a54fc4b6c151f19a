//! Lowering context
//!
//! Owns the element-ID counter of one flow's compilation and threads it
//! through every lowering call. One context per flow; never shared.

use crate::ast::Step;
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::parser::atoms::Location;

use super::chunk::Chunk;
use super::ir::{Element, ProcessDefinition, SourceMapEntry};
use super::steps;

pub struct LoweringContext<'c> {
    config: &'c CompilerConfig,
    counter: u64,
}

impl<'c> LoweringContext<'c> {
    pub fn new(config: &'c CompilerConfig) -> Self {
        Self { config, counter: 0 }
    }

    pub fn config(&self) -> &'c CompilerConfig {
        self.config
    }

    /// Fresh element ID: the configured prefix plus a monotonic counter
    pub fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("{}{}", self.config.id_prefix, self.counter)
    }

    /// Emit a sequence flow into `chunk`
    pub fn connect(&mut self, chunk: &mut Chunk, from: &str, to: &str, guard: Option<String>) {
        let id = self.next_id();
        chunk.push(
            Element::SequenceFlow {
                id,
                from: from.to_string(),
                to: to.to_string(),
                guard,
            },
            None,
        );
    }

    /// Connect every id in `from` to `to` with unguarded flows
    pub fn connect_all(&mut self, chunk: &mut Chunk, from: &[String], to: &str) {
        for source in from {
            self.connect(chunk, source, to, None);
        }
    }

    /// Lower one step
    pub fn convert(&mut self, step: &Step) -> CompileResult<Chunk> {
        steps::lower(self, step)
    }

    /// Lower a step list by sequential composition: the outputs of each
    /// fragment flow into the entry of the next.
    pub fn convert_steps(&mut self, steps: &[Step]) -> CompileResult<Chunk> {
        let mut result = Chunk::empty();
        let mut pending: Option<Vec<String>> = None;
        let mut attachables = Vec::new();

        for step in steps {
            let next = self.convert(step)?;
            let Some(entry) = next.entry().map(str::to_string) else {
                continue;
            };

            match pending.take() {
                Some(outputs) if outputs.is_empty() => {
                    return Err(CompileError::UnreachableStep {
                        location: step.location().clone(),
                    });
                }
                Some(outputs) => self.connect_all(&mut result, &outputs, &entry),
                None => {}
            }

            let (outputs, next_attachables) = result.absorb(next);
            attachables.extend(next_attachables);
            pending = Some(outputs);
        }

        result.set_outputs(pending.unwrap_or_default());
        result.set_attachables(attachables);
        Ok(result)
    }

    /// Close a fragment into a process: a start event in front and one
    /// shared end event behind the fragment's outputs. A fragment with no
    /// outputs never continues, which a terminate event records instead.
    pub fn wrap_as_process(
        &mut self,
        name: &str,
        location: &Location,
        chunk: Chunk,
    ) -> ProcessDefinition {
        let mut process = Chunk::empty();

        let start = self.next_id();
        process.push(
            Element::StartEvent { id: start.clone() },
            Some(SourceMapEntry::new(location, format!("flow: {}", name))),
        );

        let outputs = match chunk.entry().map(str::to_string) {
            Some(entry) => {
                self.connect(&mut process, &start, &entry, None);
                let (outputs, _) = process.absorb(chunk);
                outputs
            }
            None => vec![start],
        };

        if outputs.is_empty() {
            let terminate = self.next_id();
            process.push(
                Element::TerminateEvent { id: terminate },
                Some(SourceMapEntry::new(location, format!("end of flow: {}", name))),
            );
        } else {
            let end = self.next_id();
            process.push(
                Element::EndEvent {
                    id: end.clone(),
                    error_code: None,
                },
                Some(SourceMapEntry::new(location, format!("end of flow: {}", name))),
            );
            self.connect_all(&mut process, &outputs, &end);
        }

        let (elements, source_map) = process.into_parts();
        ProcessDefinition {
            name: name.to_string(),
            elements,
            source_map,
        }
    }
}
