//! Chunk algebra
//!
//! A [`Chunk`] is a fragment of the graph under construction: its elements,
//! their source-map entries, the dangling *outputs* still waiting to be
//! connected to whatever follows, and the *attachables* whose faults are not
//! yet handled inside the fragment. The entry point is the first element.

use indexmap::IndexMap;

use super::ir::{Element, SourceMapEntry};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    elements: Vec<Element>,
    source_map: IndexMap<String, SourceMapEntry>,
    outputs: Vec<String>,
    attachables: Vec<String>,
}

impl Chunk {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A one-element fragment. Terminal events have no outputs; anything
    /// else continues through itself.
    pub fn single(element: Element, entry: SourceMapEntry) -> Self {
        let id = element.id().to_string();
        let outputs = if element.is_terminal() {
            Vec::new()
        } else {
            vec![id.clone()]
        };
        let attachables = if element.is_attachable() {
            vec![id.clone()]
        } else {
            Vec::new()
        };

        let mut source_map = IndexMap::new();
        source_map.insert(id, entry);

        Self {
            elements: vec![element],
            source_map,
            outputs,
            attachables,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// ID of the entry element
    pub fn entry(&self) -> Option<&str> {
        self.elements.first().map(Element::id)
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn source_map(&self) -> &IndexMap<String, SourceMapEntry> {
        &self.source_map
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn attachables(&self) -> &[String] {
        &self.attachables
    }

    /// Append an element, recording its source if given
    pub fn push(&mut self, element: Element, entry: Option<SourceMapEntry>) {
        if let Some(entry) = entry {
            self.source_map.insert(element.id().to_string(), entry);
        }
        self.elements.push(element);
    }

    /// Take over another fragment's elements and source map. Its outputs and
    /// attachables are left to the caller.
    pub fn absorb(&mut self, other: Chunk) -> (Vec<String>, Vec<String>) {
        self.elements.extend(other.elements);
        self.source_map.extend(other.source_map);
        (other.outputs, other.attachables)
    }

    pub fn add_output(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.outputs.contains(&id) {
            self.outputs.push(id);
        }
    }

    pub fn set_outputs(&mut self, outputs: Vec<String>) {
        self.outputs.clear();
        for id in outputs {
            self.add_output(id);
        }
    }

    pub fn take_outputs(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outputs)
    }

    pub fn set_attachables(&mut self, attachables: Vec<String>) {
        self.attachables = attachables;
    }

    pub fn into_parts(self) -> (Vec<Element>, IndexMap<String, SourceMapEntry>) {
        (self.elements, self.source_map)
    }
}
