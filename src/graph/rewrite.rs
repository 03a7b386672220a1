//! Graph-aware rewrite of a descriptor.
//!
//! Every definition and every reference goes through the same sanitizer, so a
//! layer `X` becomes `sanitize(X)` wherever it is defined and wherever it is
//! used. No link resolution is needed.

use crate::graph::nonfinite;
use crate::graph::walk::{LayerNameVisitor, walk};
use crate::sanitize::Sanitizer;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Top-level `class_name`, e.g. `Functional`.
    pub class_name: Option<String>,
    /// Definition sites whose value changed.
    pub definitions: usize,
    /// Reference sites whose value changed.
    pub references: usize,
    pub input_len: usize,
    pub output_len: usize,
}

#[derive(Debug, Clone)]
pub struct Rewritten {
    pub text: String,
    pub stats: RewriteStats,
}

struct Renamer<'a> {
    sanitizer: &'a Sanitizer,
    definitions: usize,
    references: usize,
}

impl LayerNameVisitor for Renamer<'_> {
    fn definition(&mut self, name: &mut String) {
        if self.sanitizer.sanitize_in_place(name) {
            self.definitions += 1;
        }
    }

    fn reference(&mut self, name: &mut String) {
        if self.sanitizer.sanitize_in_place(name) {
            self.references += 1;
        }
    }
}

/// Rewrite layer names in an already parsed descriptor.
///
/// Returns (definitions, references) changed.
pub fn rewrite_value(value: &mut Value, sanitizer: &Sanitizer) -> (usize, usize) {
    let mut renamer = Renamer {
        sanitizer,
        definitions: 0,
        references: 0,
    };
    walk(value, &mut renamer);
    (renamer.definitions, renamer.references)
}

/// Parse descriptor text, rewrite every layer name, serialize it back.
///
/// Bare `NaN`, `Infinity` and `-Infinity` are accepted and written back
/// unchanged. A parse failure returns the error and nothing else; there is no
/// partial result.
pub fn rewrite_descriptor(text: &str, sanitizer: &Sanitizer) -> serde_json::Result<Rewritten> {
    let mut value: Value = serde_json::from_str(&nonfinite::mask(text))?;
    let class_name = value
        .get("class_name")
        .and_then(Value::as_str)
        .map(str::to_string);

    let (definitions, references) = rewrite_value(&mut value, sanitizer);
    let out = nonfinite::unmask(&serde_json::to_string(&value)?).into_owned();

    Ok(Rewritten {
        stats: RewriteStats {
            class_name,
            definitions,
            references,
            input_len: text.len(),
            output_len: out.len(),
        },
        text: out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::refs::LayerGraph;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn functional(names: &[&str]) -> Value {
        // Chain: names[0] -> names[1] -> ...
        let layers: Vec<Value> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let inbound = if i == 0 {
                    json!([])
                } else {
                    json!([[[names[i - 1], 0, 0, {}]]])
                };
                json!({
                    "class_name": "Dense",
                    "config": {"name": name, "units": 4},
                    "name": name,
                    "inbound_nodes": inbound
                })
            })
            .collect();
        json!({
            "class_name": "Functional",
            "config": {
                "name": "model",
                "layers": layers,
                "input_layers": [[names[0], 0, 0]],
                "output_layers": [[names[names.len() - 1], 0, 0]]
            }
        })
    }

    #[test]
    fn definition_and_reference_rewritten_together() {
        let text = json!({
            "class_name": "Functional",
            "config": {"layers": [
                {"class_name": "InputLayer", "config": {"name": "input"}, "inbound_nodes": []},
                {"class_name": "Conv2D", "config": {"name": "block1/conv"},
                 "inbound_nodes": [[["input", 0, 0, {}]]]},
                {"class_name": "ReLU", "config": {"name": "relu"},
                 "inbound_nodes": [[["block1/conv", 0, 0, {}]]]}
            ]}
        })
        .to_string();

        let out = rewrite_descriptor(&text, &Sanitizer::default()).unwrap();
        let v: Value = serde_json::from_str(&out.text).unwrap();
        assert_eq!(v["config"]["layers"][1]["config"]["name"], "block1_conv");
        assert_eq!(
            v["config"]["layers"][2]["inbound_nodes"][0][0],
            json!(["block1_conv", 0, 0, {}])
        );
        assert_eq!(out.stats.class_name.as_deref(), Some("Functional"));
        assert_eq!(out.stats.definitions, 1);
        assert_eq!(out.stats.references, 1);
        assert_eq!(out.stats.input_len, text.len());
        assert_eq!(out.stats.output_len, out.text.len());
    }

    #[test]
    fn endpoints_follow_renamed_layers() {
        let mut v = functional(&["in/put", "hidden", "out/put"]);
        rewrite_value(&mut v, &Sanitizer::default());
        assert_eq!(v["config"]["input_layers"], json!([["in_put", 0, 0]]));
        assert_eq!(v["config"]["output_layers"], json!([["out_put", 0, 0]]));
        assert!(LayerGraph::from_value(&v).dangling().is_empty());
    }

    #[test]
    fn unknown_fields_and_key_order_survive() {
        let text = r#"{"config":{"layers":[{"name":"a/b","zz":[1,2.5,true,null],"aa":{"k":"v/w"}}]},"class_name":"Sequential","keras_version":"2.13.1"}"#;
        let out = rewrite_descriptor(text, &Sanitizer::default()).unwrap();
        assert_eq!(
            out.text,
            r#"{"config":{"layers":[{"name":"a_b","zz":[1,2.5,true,null],"aa":{"k":"v/w"}}]},"class_name":"Sequential","keras_version":"2.13.1"}"#
        );
    }

    #[test]
    fn non_finite_floats_survive_next_to_renamed_layers() {
        let text = r#"{"class_name":"Sequential","config":{"layers":[{"class_name":"Dense","config":{"name":"a/b","clip":NaN,"note":"NaN"},"inbound_nodes":[]},{"class_name":"Dense","config":{"name":"c","lo":-Infinity,"hi":Infinity},"inbound_nodes":[[["a/b",0,0,{}]]]}]}}"#;
        let out = rewrite_descriptor(text, &Sanitizer::default()).unwrap();
        assert_eq!(
            out.text,
            r#"{"class_name":"Sequential","config":{"layers":[{"class_name":"Dense","config":{"name":"a_b","clip":NaN,"note":"NaN"},"inbound_nodes":[]},{"class_name":"Dense","config":{"name":"c","lo":-Infinity,"hi":Infinity},"inbound_nodes":[[["a_b",0,0,{}]]]}]}}"#
        );
        assert_eq!(out.stats.definitions, 1);
        assert_eq!(out.stats.references, 1);
        assert!(LayerGraph::parse(&out.text).unwrap().dangling().is_empty());
    }

    #[test]
    fn clean_descriptor_is_unchanged() {
        let text = functional(&["input", "dense", "out"]).to_string();
        let out = rewrite_descriptor(&text, &Sanitizer::default()).unwrap();
        assert_eq!(out.text, text);
        assert_eq!(out.stats.definitions, 0);
        assert_eq!(out.stats.references, 0);
    }

    #[test]
    fn malformed_text_is_an_error() {
        assert!(rewrite_descriptor("{\"config\": [", &Sanitizer::default()).is_err());
        assert!(rewrite_descriptor("", &Sanitizer::default()).is_err());
    }

    #[test]
    fn rewriting_twice_changes_nothing_more() {
        let text = functional(&["a/b", "c/d/e"]).to_string();
        let once = rewrite_descriptor(&text, &Sanitizer::default()).unwrap();
        let twice = rewrite_descriptor(&once.text, &Sanitizer::default()).unwrap();
        assert_eq!(twice.text, once.text);
        assert_eq!(twice.stats.definitions + twice.stats.references, 0);
    }

    proptest! {
        #[test]
        fn references_stay_resolvable(names in prop::collection::vec("[a-z/]{1,8}", 1..8)) {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            let mut v = functional(&names);
            prop_assert!(LayerGraph::from_value(&v).dangling().is_empty());

            rewrite_value(&mut v, &Sanitizer::default());
            let graph = LayerGraph::from_value(&v);
            prop_assert!(graph.dangling().is_empty());
            prop_assert!(graph.definitions.iter().all(|n| !n.contains('/')));
        }
    }
}
