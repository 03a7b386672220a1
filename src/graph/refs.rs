//! Read-only audit of layer definitions and references.
//!
//! Uses the same walk as the rewriter. Reports dangling references, never
//! repairs them.

use crate::graph::nonfinite;
use crate::graph::walk::{LayerNameVisitor, walk};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct LayerGraph {
    pub definitions: BTreeSet<String>,
    /// In document order, duplicates kept.
    pub references: Vec<String>,
}

impl LayerNameVisitor for LayerGraph {
    fn definition(&mut self, name: &mut String) {
        self.definitions.insert(name.clone());
    }

    fn reference(&mut self, name: &mut String) {
        self.references.push(name.clone());
    }
}

impl LayerGraph {
    #[cfg(test)]
    pub(crate) fn from_value(value: &Value) -> Self {
        // The walk hands out `&mut String`; work on a scratch copy.
        let mut scratch = value.clone();
        let mut graph = Self::default();
        walk(&mut scratch, &mut graph);
        graph
    }

    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let mut value: Value = serde_json::from_str(&nonfinite::mask(text))?;
        let mut graph = Self::default();
        walk(&mut value, &mut graph);
        Ok(graph)
    }

    /// References with no matching definition, first occurrence order.
    pub fn dangling(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.references
            .iter()
            .map(String::as_str)
            .filter(|r| !self.definitions.contains(*r))
            .filter(|r| seen.insert(*r))
            .collect()
    }
}
