//! Recursive descent over a parsed descriptor.
//!
//! The walk knows where layer names live but not what to do with them; that
//! is the visitor's job. Shapes we do not expect are skipped, never fatal.

use serde_json::{Map, Value};

/// Callbacks for every place a descriptor names a layer.
pub trait LayerNameVisitor {
    /// A `name` field: the definition site of a layer (or of any other named
    /// config object, which is harmless to treat the same way).
    fn definition(&mut self, name: &mut String);

    /// The string head of a connection entry, an `input_layers` /
    /// `output_layers` triple or a `keras_history` triple.
    fn reference(&mut self, name: &mut String);
}

/// Keys whose value is a `[name, node_index, tensor_index]` triple or a list
/// of such triples.
const ENDPOINT_KEYS: [&str; 2] = ["input_layers", "output_layers"];

pub fn walk<V: LayerNameVisitor + ?Sized>(value: &mut Value, visitor: &mut V) {
    match value {
        Value::Object(map) => walk_map(map, visitor),
        Value::Array(items) => {
            for item in items {
                walk(item, visitor);
            }
        }
        _ => {}
    }
}

fn walk_map<V: LayerNameVisitor + ?Sized>(map: &mut Map<String, Value>, visitor: &mut V) {
    if let Some(Value::String(name)) = map.get_mut("name") {
        visitor.definition(name);
    }

    // inbound_nodes: [ [ [name, i, j, kwargs], ... ], ... ]
    if let Some(Value::Array(nodes)) = map.get_mut("inbound_nodes") {
        for node in nodes {
            if let Value::Array(connections) = node {
                for connection in connections {
                    reference_head(connection, visitor);
                }
            }
        }
    }

    for key in ENDPOINT_KEYS {
        if let Some(endpoints) = map.get_mut(key) {
            if is_triple(endpoints) {
                reference_head(endpoints, visitor);
            } else if let Value::Array(items) = endpoints {
                for item in items {
                    reference_head(item, visitor);
                }
            }
        }
    }

    if let Some(history) = map.get_mut("keras_history") {
        reference_head(history, visitor);
    }

    for child in map.values_mut() {
        walk(child, visitor);
    }
}

fn is_triple(value: &Value) -> bool {
    matches!(value, Value::Array(items) if matches!(items.first(), Some(Value::String(_))))
}

fn reference_head<V: LayerNameVisitor + ?Sized>(entry: &mut Value, visitor: &mut V) {
    if let Value::Array(items) = entry {
        if let Some(Value::String(name)) = items.first_mut() {
            visitor.reference(name);
        }
    }
}
