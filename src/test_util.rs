//! Shared models for tests.

use crate::graph::builder::NodeSpec;
use crate::graph::{Attribute, Attributes, GraphBuilder, GraphError};
use crate::model::{EditOptions, InputModel};
use crate::shape::{ElementType, PartialShape};

fn split_attrs() -> Attributes {
    [("axis".to_string(), Attribute::Int(0))].into()
}

/// Create a model with the structure:
///
/// ```text
/// in1, in2 -> Add -> add_out -> Split "split1" -> out1, out2
///                    add_out, add_out -> Mul -> out4
/// in3 -> Relu -> out3
/// ```
///
/// Inputs and `add_out` are `[2, 2]` float tensors.
pub fn input_model_1(options: EditOptions) -> Result<InputModel, GraphError> {
    let f32 = Some(ElementType::Float32);
    let mut builder = GraphBuilder::new();
    for name in ["in1", "in2", "in3"] {
        builder.input(name, PartialShape::fixed(&[2, 2]), f32)?;
    }
    builder.value_info("add_out", PartialShape::fixed(&[2, 2]), f32)?;

    builder.node(NodeSpec::new("Add", &["in1", "in2"], &["add_out"]))?;
    builder.node(
        NodeSpec::new("Split", &["add_out"], &["out1", "out2"])
            .with_name("split1")
            .with_attrs(split_attrs()),
    )?;
    builder.node(NodeSpec::new("Relu", &["in3"], &["out3"]))?;
    builder.node(NodeSpec::new("Mul", &["add_out", "add_out"], &["out4"]))?;

    for (name, shape) in [
        ("out1", [1, 2]),
        ("out2", [1, 2]),
        ("out3", [2, 2]),
        ("out4", [2, 2]),
    ] {
        builder.value_info(name, PartialShape::fixed(&shape), f32)?;
        builder.output(name)?;
    }

    Ok(InputModel::new(builder.build()?, options).with_name(Some("test_graph")))
}

/// Create a model with the structure:
///
/// ```text
/// in1, in2 -> Add -> add_out -> Split "split2" -> sp_out1 -> Abs "abs1" -> out1
///                                              -> sp_out2 -> Sin -> out2
/// ```
pub fn input_model_2(options: EditOptions) -> Result<InputModel, GraphError> {
    let f32 = Some(ElementType::Float32);
    let mut builder = GraphBuilder::new();
    for name in ["in1", "in2"] {
        builder.input(name, PartialShape::fixed(&[2, 2]), f32)?;
    }

    builder.node(NodeSpec::new("Add", &["in1", "in2"], &["add_out"]))?;
    builder.node(
        NodeSpec::new("Split", &["add_out"], &["sp_out1", "sp_out2"])
            .with_name("split2")
            .with_attrs(split_attrs()),
    )?;
    builder.node(NodeSpec::new("Abs", &["sp_out1"], &["out1"]).with_name("abs1"))?;
    builder.node(NodeSpec::new("Sin", &["sp_out2"], &["out2"]))?;

    for name in ["out1", "out2"] {
        builder.value_info(name, PartialShape::fixed(&[1, 2]), f32)?;
        builder.output(name)?;
    }

    Ok(InputModel::new(builder.build()?, options).with_name(Some("test_graph_2")))
}

/// Return the primary names of a list of tensor places.
pub fn tensor_names(places: &[crate::place::Place]) -> Vec<String> {
    places
        .iter()
        .map(|p| p.names().first().cloned().unwrap_or_default())
        .collect()
}

/// Return the operator types of operations in a model, in graph order.
pub fn op_types(model: &InputModel) -> Vec<String> {
    model
        .graph()
        .operations()
        .map(|(_, op)| op.op_type().to_string())
        .collect()
}
