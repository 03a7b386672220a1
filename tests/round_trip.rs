//! Library-level checks over whole HDF5 containers: what changes, what must
//! not.

mod common;

use common::{ContainerExt, GroupExt, read, write};
use h5_sanitizer::container::{
    AttrValue, Container, Dataset, Group, Node, Payload, RawArray, RawType, TypedArray,
};
use h5_sanitizer::{RepairConfig, RepairError, patch_descriptor, sanitize_container};
use pretty_assertions::assert_eq;

const CLEAN_DESCRIPTOR: &str = r#"{"class_name": "Sequential", "config": {"layers": [{"class_name": "Dense", "config": {"name": "dense", "units": 3}}]}}"#;

fn clean_model() -> Container {
    let dense = Group::new()
        .with_attr("weight_names", AttrValue::fixed_text_list(["kernel:0"]))
        .with_child(
            "kernel:0",
            Dataset::new(TypedArray::from_f32s(vec![1, 3], &[0.1, 0.2, 0.3])),
        )
        .with_child("bias:0", Dataset::new(RawArray::bytes(vec![0u8; 6])));
    Container::new(
        Group::new()
            .with_attr("model_config", AttrValue::fixed_text(CLEAN_DESCRIPTOR))
            .with_attr("training_config", AttrValue::text("{\"loss\": \"mse\"}"))
            .with_attr("signature", AttrValue::blob(vec![0u8, 159, 146, 150]))
            .with_child(
                "model_weights",
                Group::new()
                    .with_attr("layer_names", AttrValue::fixed_text_list(["dense"]))
                    .with_attr("counts", AttrValue::Numeric(TypedArray::from_i64s(&[1, 2, 3])))
                    .with_child("dense", dense),
            ),
    )
}

#[test]
fn sanitize_of_clean_model_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "in.h5", &clean_model());
    let output = dir.path().join("out.h5");

    let report = sanitize_container(&input, &output, &RepairConfig::default()).unwrap();
    assert_eq!(report.copy.renamed_nodes, 0);
    assert_eq!(report.copy.rewritten_attributes, 0);
    assert!(report.warnings.is_empty());
    assert_eq!(std::fs::read(&input).unwrap(), std::fs::read(&output).unwrap());
}

#[test]
fn patch_of_clean_model_touches_only_the_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "in.h5", &clean_model());
    let output = dir.path().join("out.h5");

    patch_descriptor(&input, &output, &RepairConfig::default()).unwrap();
    let before = read(&input);
    let mut after = read(&output);

    // Same JSON value, possibly different whitespace.
    let text = |c: &Container| {
        let t = c.root.attrs.get("model_config").and_then(AttrValue::as_text).unwrap();
        serde_json::from_str::<serde_json::Value>(t).unwrap()
    };
    assert_eq!(text(&before), text(&after));

    after
        .root
        .attrs
        .set("model_config", AttrValue::fixed_text(CLEAN_DESCRIPTOR));
    assert_eq!(after, before);
}

#[test]
fn opaque_and_numeric_values_survive_full_sanitize() {
    let dir = tempfile::tempdir().unwrap();
    let mut src = clean_model();
    src.root.attrs.set("notes", AttrValue::text_list(["a/b", "c"]));
    let input = write(dir.path(), "in.h5", &src);
    let output = dir.path().join("out.h5");

    sanitize_container(&input, &output, &RepairConfig::default()).unwrap();
    let before = read(&input);
    let out = read(&output);

    assert_eq!(out.root.attrs.get("notes"), Some(&AttrValue::text_list(["a_b", "c"])));
    let Some(AttrValue::Opaque(sig)) = out.root.attrs.get("signature") else {
        panic!("signature is not opaque");
    };
    assert!(matches!(sig.dtype, RawType::Encoded(_)));
    assert_eq!(sig.data, vec![0, 159, 146, 150]);
    assert_eq!(out.root.attrs.get("signature"), before.root.attrs.get("signature"));

    let Some(Node::Group(weights)) = out.lookup("model_weights") else {
        panic!("model_weights missing");
    };
    assert_eq!(
        weights.attrs.get("counts"),
        Some(&AttrValue::Numeric(TypedArray::from_i64s(&[1, 2, 3])))
    );
    let Some(Node::Dataset(bias)) = out.lookup("model_weights/dense/bias:0") else {
        panic!("bias missing");
    };
    assert!(matches!(&bias.payload, Payload::Opaque(raw) if raw.data == vec![0; 6]));
}

#[test]
fn slash_named_layers_in_nested_groups_are_repaired() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = r#"{"class_name":"Sequential","config":{"layers":[{"class_name":"Dense","config":{"name":"block1/dense"}}]}}"#;
    let layer = Group::new()
        .with_attr("weight_names", AttrValue::fixed_text_list(["block1/dense/kernel:0"]))
        .with_child("kernel:0", Dataset::new(TypedArray::from_f32s(vec![1], &[1.0])));
    let src = Container::new(
        Group::new()
            .with_attr("model_config", AttrValue::fixed_text(descriptor))
            .with_child(
                "model_weights",
                Group::new()
                    .with_attr("layer_names", AttrValue::fixed_text_list(["block1/dense"]))
                    .with_child("block1", Group::new().with_child("dense", layer)),
            ),
    );
    let input = write(dir.path(), "in.h5", &src);
    let output = dir.path().join("out.h5");

    let report = sanitize_container(&input, &output, &RepairConfig::default()).unwrap();
    assert_eq!(report.copy.renamed_nodes, 0);
    assert_eq!(report.copy.rewritten_attributes, 3);

    let out = read(&output);
    let Some(Node::Group(weights)) = out.lookup("model_weights") else {
        panic!("model_weights missing");
    };
    assert_eq!(
        weights.attrs.get("layer_names"),
        Some(&AttrValue::fixed_text_list(["block1_dense"]))
    );
    assert!(out.lookup("model_weights/block1/dense/kernel:0").is_some());
    let text = out.root.attrs.get("model_config").and_then(AttrValue::as_text).unwrap();
    assert!(text.contains("\"block1_dense\""));
}

#[test]
fn failed_run_leaves_existing_output_alone() {
    let dir = tempfile::tempdir().unwrap();
    let mut src = clean_model();
    src.root.attrs.set("model_config", AttrValue::text("{\"layers\": ["));
    let input = write(dir.path(), "in.h5", &src);
    let output = dir.path().join("out.h5");
    std::fs::write(&output, b"earlier good output").unwrap();

    let err = patch_descriptor(&input, &output, &RepairConfig::default()).unwrap_err();
    assert!(matches!(err, RepairError::DescriptorParse { .. }));
    assert_eq!(std::fs::read(&output).unwrap(), b"earlier good output");
}

#[test]
fn output_may_replace_input_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let mut src = clean_model();
    src.root.attrs.set("notes", AttrValue::text("p/q"));
    let path = write(dir.path(), "model.h5", &src);

    sanitize_container(&path, &path, &RepairConfig::default()).unwrap();
    let out = read(&path);
    assert_eq!(out.root.attrs.get("notes"), Some(&AttrValue::text("p_q")));
}
