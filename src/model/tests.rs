use std::error::Error;

use rten_testing::TestCases;

use super::{EditErrorKind, EditOptions, InputModel, PlaceholderNaming};
use crate::dims;
use crate::graph::builder::NodeSpec;
use crate::graph::{GraphBuilder, Planner};
use crate::place::{PlaceId, PortSelector};
use crate::shape::{ElementType, PartialShape};
use crate::test_util::{input_model_1, input_model_2, op_types, tensor_names};

fn tensor_id(model: &InputModel, name: &str) -> PlaceId {
    model.place_by_tensor_name(name).unwrap().id()
}

fn input_port_id(model: &InputModel, op: &str, index: usize) -> PlaceId {
    model
        .place_by_operation_name_and_input_port(op, index)
        .unwrap()
        .id()
}

/// Return input port `index` of the operation which produces `tensor`.
fn producer_input_id(model: &InputModel, tensor: &str, index: usize) -> PlaceId {
    model
        .place_by_tensor_name(tensor)
        .unwrap()
        .input_port(PortSelector::Index(index))
        .unwrap()
        .id()
}

#[test]
fn test_place_by_tensor_name() -> Result<(), Box<dyn Error>> {
    let mut model = input_model_1(EditOptions::default())?;

    for name in ["in1", "in2", "in3", "add_out", "out1", "out2", "out3", "out4"] {
        let place = model.place_by_tensor_name(name).unwrap();
        assert!(place.is_tensor());
        assert!(place.names().iter().any(|n| n == name));
    }
    assert!(model.place_by_tensor_name("0:add_out").is_none());
    assert!(model.place_by_tensor_name("add").is_none());
    assert!(model.place_by_tensor_name("").is_none());

    model.add_name_for_tensor(tensor_id(&model, "add_out"), "sum")?;
    let by_alias = model.place_by_tensor_name("sum").unwrap();
    assert_eq!(by_alias.names(), &["add_out", "sum"]);
    assert!(by_alias.is_equal(&model.place_by_tensor_name("add_out").unwrap()));

    Ok(())
}

#[test]
fn test_place_by_operation_name() -> Result<(), Box<dyn Error>> {
    let model = input_model_1(EditOptions::default())?;

    let split = model.place_by_operation_name("split1").unwrap();
    assert!(split.is_operation());
    assert_eq!(split.operation_name(), Some("split1"));
    assert!(split.names().is_empty());
    assert!(model.place_by_operation_name("not_existed").is_none());

    let port = model
        .place_by_operation_name_and_input_port("split1", 0)
        .unwrap();
    assert!(port.is_input_port());
    assert_eq!(
        port.source_tensor(PortSelector::Default).unwrap().names()[0],
        "add_out"
    );
    assert!(model
        .place_by_operation_name_and_input_port("split1", 1)
        .is_none());

    let port = model
        .place_by_operation_name_and_output_port("split1", 1)
        .unwrap();
    assert_eq!(
        port.target_tensor(PortSelector::Default).unwrap().names()[0],
        "out2"
    );
    assert!(model
        .place_by_operation_name_and_output_port("split1", 2)
        .is_none());

    Ok(())
}

#[test]
fn test_inputs_and_outputs() -> Result<(), Box<dyn Error>> {
    let model = input_model_1(EditOptions::default())?;

    assert_eq!(tensor_names(&model.inputs()), ["in1", "in2", "in3"]);
    assert_eq!(tensor_names(&model.outputs()), ["out1", "out2", "out3", "out4"]);

    #[derive(Debug)]
    struct Case {
        tensor: &'static str,
        is_input: bool,
        is_output: bool,
    }

    let cases = [
        Case {
            tensor: "in2",
            is_input: true,
            is_output: false,
        },
        Case {
            tensor: "out2",
            is_input: false,
            is_output: true,
        },
        Case {
            tensor: "add_out",
            is_input: false,
            is_output: false,
        },
    ];

    cases.test_each(|case| {
        let place = model.place_by_tensor_name(case.tensor).unwrap();
        assert_eq!(place.is_input(), case.is_input);
        assert_eq!(place.is_output(), case.is_output);
    });

    let port = model
        .place_by_operation_name_and_input_port("split1", 0)
        .unwrap();
    assert!(!port.is_input() && !port.is_output());
    let op = model.place_by_operation_name("split1").unwrap();
    assert!(!op.is_input() && !op.is_output());

    Ok(())
}

#[test]
fn test_port_navigation() -> Result<(), Box<dyn Error>> {
    let model = input_model_1(EditOptions::default())?;
    let split = model.place_by_operation_name("split1").unwrap();

    // Output ports
    let out0 = split.output_port(PortSelector::Index(0)).unwrap();
    let out1 = split.output_port(PortSelector::Name("out2")).unwrap();
    assert_eq!(
        out0.target_tensor(PortSelector::Default).unwrap().names()[0],
        "out1"
    );
    assert_eq!(
        out1.target_tensor(PortSelector::Default).unwrap().names()[0],
        "out2"
    );
    assert!(split.output_port(PortSelector::Default).is_none());
    assert!(split.output_port(PortSelector::Index(3)).is_none());
    assert!(split.output_port(PortSelector::Name("not_existed")).is_none());

    // Input ports
    let in0 = split.input_port(PortSelector::Index(0)).unwrap();
    assert_eq!(
        in0.source_tensor(PortSelector::Default).unwrap().names()[0],
        "add_out"
    );
    assert!(in0.is_equal(&split.input_port(PortSelector::Default).unwrap()));
    assert!(in0.is_equal(&split.input_port(PortSelector::Name("add_out")).unwrap()));
    assert!(split.input_port(PortSelector::Index(1)).is_none());
    assert!(split.input_port(PortSelector::Name("not_existed")).is_none());

    // A name that matches several ports is ambiguous.
    let mul = model
        .place_by_tensor_name("out4")
        .unwrap()
        .producing_operation(PortSelector::Default)
        .unwrap();
    assert!(mul.input_port(PortSelector::Name("add_out")).is_none());
    assert!(mul.input_port(PortSelector::Default).is_none());

    Ok(())
}

#[test]
fn test_consuming_ports() -> Result<(), Box<dyn Error>> {
    let model = input_model_1(EditOptions::default())?;

    let add_out = model.place_by_tensor_name("add_out").unwrap();
    let consumers = add_out.consuming_ports(PortSelector::Default);
    assert_eq!(consumers.len(), 3);

    let expected = [
        model.place(input_port_id(&model, "split1", 0))?,
        model.place(producer_input_id(&model, "out4", 0))?,
        model.place(producer_input_id(&model, "out4", 1))?,
    ];
    for (actual, expected) in consumers.iter().zip(&expected) {
        assert!(actual.is_equal(expected));
    }

    let add_op = add_out.producing_operation(PortSelector::Default).unwrap();
    let op_consumers = add_op.consuming_ports(PortSelector::Default);
    assert_eq!(op_consumers.len(), consumers.len());
    for (a, b) in op_consumers.iter().zip(&consumers) {
        assert!(a.is_equal(b));
    }

    // An operation consuming a value on two ports is listed twice.
    let consuming_ops = add_out.consuming_operations(PortSelector::Default);
    assert_eq!(consuming_ops.len(), 3);
    assert!(consuming_ops[1].is_equal(&consuming_ops[2]));
    assert!(!consuming_ops[0].is_equal(&consuming_ops[1]));

    Ok(())
}

#[test]
fn test_consuming_ports_of_multi_output_op() -> Result<(), Box<dyn Error>> {
    let model = input_model_2(EditOptions::default())?;

    let split = model.place_by_operation_name("split2").unwrap();
    let abs_port = model
        .place_by_operation_name("abs1")
        .unwrap()
        .input_port(PortSelector::Index(0))
        .unwrap();
    let sin_port = model
        .place_by_tensor_name("out2")
        .unwrap()
        .input_port(PortSelector::Index(0))
        .unwrap();

    let consumers = split.consuming_ports(PortSelector::Default);
    assert_eq!(consumers.len(), 2);
    assert!(consumers[0].is_equal(&abs_port));
    assert!(consumers[1].is_equal(&sin_port));

    let port_consumers = split
        .output_port(PortSelector::Index(0))
        .unwrap()
        .consuming_ports(PortSelector::Default);
    assert_eq!(port_consumers.len(), 1);
    assert!(port_consumers[0].is_equal(&abs_port));

    let by_name = split.consuming_ports(PortSelector::Name("sp_out2"));
    assert_eq!(by_name.len(), 1);
    assert!(by_name[0].is_equal(&sin_port));

    Ok(())
}

#[test]
fn test_producing_operation() -> Result<(), Box<dyn Error>> {
    let model = input_model_2(EditOptions::default())?;

    let split = model.place_by_operation_name("split2").unwrap();
    let sp_out2 = model.place_by_tensor_name("sp_out2").unwrap();
    assert!(sp_out2
        .producing_operation(PortSelector::Default)
        .unwrap()
        .is_equal(&split));

    let split_out_1 = split.output_port(PortSelector::Index(1)).unwrap();
    assert!(split_out_1
        .producing_operation(PortSelector::Default)
        .unwrap()
        .is_equal(&split));

    let abs = model.place_by_operation_name("abs1").unwrap();
    let abs_port = abs.input_port(PortSelector::Default).unwrap();
    assert!(abs_port
        .producing_operation(PortSelector::Default)
        .unwrap()
        .is_equal(&split));
    assert!(abs
        .producing_operation(PortSelector::Default)
        .unwrap()
        .is_equal(&split));

    // Graph inputs have no producer, and the default port of a two-input
    // operation is ambiguous.
    let add = model
        .place_by_tensor_name("add_out")
        .unwrap()
        .producing_operation(PortSelector::Default)
        .unwrap();
    assert!(add.producing_operation(PortSelector::Default).is_none());
    assert!(add.producing_operation(PortSelector::Index(0)).is_none());
    assert!(model
        .place_by_tensor_name("in1")
        .unwrap()
        .producing_operation(PortSelector::Default)
        .is_none());

    assert!(split
        .producing_operation(PortSelector::Name("add_out"))
        .unwrap()
        .is_equal(&add));

    let sin = model
        .place_by_tensor_name("out2")
        .unwrap()
        .producing_operation(PortSelector::Default)
        .unwrap();
    assert!(sin
        .producing_operation(PortSelector::Index(0))
        .unwrap()
        .is_equal(&split));

    Ok(())
}

#[test]
fn test_consuming_operations() -> Result<(), Box<dyn Error>> {
    let model = input_model_2(EditOptions::default())?;

    let split = model.place_by_operation_name("split2").unwrap();
    let abs = model.place_by_operation_name("abs1").unwrap();
    let out2 = model.place_by_tensor_name("out2").unwrap();
    let sin = out2.producing_operation(PortSelector::Default).unwrap();

    let ops = split.consuming_operations(PortSelector::Default);
    assert_eq!(ops.len(), 2);
    assert!(ops[0].is_equal(&abs));
    assert!(ops[1].is_equal(&sin));

    let port_ops = split
        .input_port(PortSelector::Index(0))
        .unwrap()
        .consuming_operations(PortSelector::Default);
    assert_eq!(port_ops.len(), 1);
    assert!(port_ops[0].is_equal(&split));

    let add_out_port = model
        .place_by_tensor_name("add_out")
        .unwrap()
        .producing_port()
        .unwrap();
    let add_out_ops = add_out_port.consuming_operations(PortSelector::Default);
    assert_eq!(add_out_ops.len(), 1);
    assert!(add_out_ops[0].is_equal(&split));

    let sp_out2_ops = model
        .place_by_tensor_name("sp_out2")
        .unwrap()
        .consuming_operations(PortSelector::Default);
    assert_eq!(sp_out2_ops.len(), 1);
    assert!(sp_out2_ops[0].is_equal(&sin));

    assert!(out2.consuming_operations(PortSelector::Default).is_empty());
    assert!(out2
        .producing_port()
        .unwrap()
        .consuming_operations(PortSelector::Default)
        .is_empty());

    let by_index = split.consuming_operations(PortSelector::Index(1));
    let by_name = split.consuming_operations(PortSelector::Name("sp_out2"));
    assert_eq!(by_index.len(), 1);
    assert_eq!(by_name.len(), 1);
    assert!(by_index[0].is_equal(&by_name[0]));
    assert!(by_index[0].is_equal(&sin));

    Ok(())
}

#[test]
fn test_target_and_source_tensor() -> Result<(), Box<dyn Error>> {
    let model = input_model_2(EditOptions::default())?;

    let split = model.place_by_operation_name("split2").unwrap();
    let sp_out2 = model.place_by_tensor_name("sp_out2").unwrap();
    assert!(split.target_tensor(PortSelector::Default).is_none());
    let by_index = split.target_tensor(PortSelector::Index(1)).unwrap();
    assert!(by_index.is_equal(&sp_out2));
    let by_name = split.target_tensor(PortSelector::Name("sp_out2")).unwrap();
    assert!(by_name.is_equal(&by_index));

    let abs = model.place_by_operation_name("abs1").unwrap();
    let out1 = model.place_by_tensor_name("out1").unwrap();
    assert!(abs
        .target_tensor(PortSelector::Default)
        .unwrap()
        .is_equal(&out1));

    let add_out = model.place_by_tensor_name("add_out").unwrap();
    let add = add_out.producing_operation(PortSelector::Default).unwrap();
    let in2 = model.place_by_tensor_name("in2").unwrap();
    assert!(add.source_tensor(PortSelector::Default).is_none());
    assert!(add
        .source_tensor(PortSelector::Index(1))
        .unwrap()
        .is_equal(&in2));
    assert!(add
        .source_tensor(PortSelector::Name("in2"))
        .unwrap()
        .is_equal(&in2));
    assert!(split
        .source_tensor(PortSelector::Default)
        .unwrap()
        .is_equal(&add_out));

    // Tensors have no target or source tensor.
    assert!(add_out.target_tensor(PortSelector::Default).is_none());
    assert!(add_out.source_tensor(PortSelector::Default).is_none());

    Ok(())
}

#[test]
fn test_producing_port() -> Result<(), Box<dyn Error>> {
    let model = input_model_2(EditOptions::default())?;

    let split = model.place_by_operation_name("split2").unwrap();
    let producing_port = split
        .input_port(PortSelector::Default)
        .unwrap()
        .producing_port()
        .unwrap();
    let add = model
        .place_by_tensor_name("add_out")
        .unwrap()
        .producing_operation(PortSelector::Default)
        .unwrap();
    assert!(producing_port.is_equal(&add.output_port(PortSelector::Default).unwrap()));

    assert!(model
        .place_by_tensor_name("in1")
        .unwrap()
        .producing_port()
        .is_none());
    assert!(split.producing_port().is_none());

    Ok(())
}

#[test]
fn test_is_equal() -> Result<(), Box<dyn Error>> {
    let model = input_model_1(EditOptions::default())?;

    let in1 = model.place_by_tensor_name("in1").unwrap();
    let out2 = model.place_by_tensor_name("out2").unwrap();
    assert!(in1.is_equal(&in1));
    assert!(out2.is_equal(&out2));

    let mul_in_0 = model.place(producer_input_id(&model, "out4", 0))?;
    let mul_in_0_again = model.place(producer_input_id(&model, "out4", 0))?;
    assert!(mul_in_0.is_equal(&mul_in_0_again));

    let split_in = model.place(input_port_id(&model, "split1", 0))?;
    let split_in_2 = model.place(producer_input_id(&model, "out1", 0))?;
    assert!(split_in.is_equal(&split_in_2));

    let mul_out = model
        .place_by_tensor_name("out4")
        .unwrap()
        .producing_port()
        .unwrap();
    assert!(mul_out.is_equal(&mul_out));

    let add_out = model.place_by_tensor_name("add_out").unwrap();
    assert!(!in1.is_equal(&out2));
    assert!(!split_in_2.is_equal(&mul_out));
    assert!(!add_out.is_equal(&out2));

    let split = model.place_by_operation_name("split1").unwrap();
    assert!(out2
        .producing_operation(PortSelector::Default)
        .unwrap()
        .is_equal(&split));
    assert!(!split.is_equal(&out2));

    Ok(())
}

#[test]
fn test_is_equal_data() -> Result<(), Box<dyn Error>> {
    let model = input_model_1(EditOptions::default())?;

    let in1 = model.place_by_tensor_name("in1").unwrap();
    let in2 = model.place_by_tensor_name("in2").unwrap();
    let add_out = model.place_by_tensor_name("add_out").unwrap();
    assert!(in1.is_equal_data(&in1));
    assert!(add_out.is_equal_data(&add_out));
    assert!(!in1.is_equal_data(&in2));
    assert!(!add_out.is_equal_data(&in1));

    let add_out_port = add_out.producing_port().unwrap();
    assert!(add_out.is_equal_data(&add_out_port));
    assert!(add_out_port.is_equal_data(&add_out));

    let mul_in_0 = model.place(producer_input_id(&model, "out4", 0))?;
    let mul_in_1 = model.place(producer_input_id(&model, "out4", 1))?;
    assert!(add_out.is_equal_data(&mul_in_0));
    assert!(add_out_port.is_equal_data(&mul_in_0));
    assert!(mul_in_1.is_equal_data(&mul_in_0));
    assert!(!mul_in_1.is_equal(&mul_in_0));

    let split_in = model.place(input_port_id(&model, "split1", 0))?;
    assert!(split_in.is_equal_data(&split_in));

    let out1 = model.place_by_tensor_name("out1").unwrap();
    let out2 = model.place_by_tensor_name("out2").unwrap();
    let out1_port = out1.producing_port().unwrap();
    assert!(!out1.is_equal_data(&out2));
    assert!(!out2.is_equal_data(&out1_port));
    assert!(out1.is_equal_data(&out1_port));

    // Operations are only data-equal to themselves.
    let split = model.place_by_operation_name("split1").unwrap();
    assert!(split.is_equal_data(&split));
    assert!(!split.is_equal_data(&out1));

    Ok(())
}

#[test]
fn test_partial_shape() -> Result<(), Box<dyn Error>> {
    let mut model = input_model_1(EditOptions::default())?;

    let in1 = tensor_id(&model, "in1");
    let in3 = tensor_id(&model, "in3");
    let out1 = tensor_id(&model, "out1");
    let add_out = tensor_id(&model, "add_out");

    assert_eq!(model.partial_shape(in1)?, &PartialShape::fixed(&[2, 2]));
    assert_eq!(model.partial_shape(out1)?, &PartialShape::fixed(&[1, 2]));
    assert_eq!(model.partial_shape(add_out)?, &PartialShape::fixed(&[2, 2]));

    model.set_partial_shape(in3, PartialShape::fixed(&[4, 6]))?;
    assert_eq!(model.partial_shape(in3)?, &PartialShape::fixed(&[4, 6]));
    assert_eq!(model.partial_shape(out1)?, &PartialShape::fixed(&[1, 2]));

    // Shapes can be partially known.
    model.set_partial_shape(in1, dims!["batch", 16])?;
    assert_eq!(model.partial_shape(in1)?, &dims!["batch", 16]);
    assert_eq!(model.partial_shape(tensor_id(&model, "in2"))?, &PartialShape::fixed(&[2, 2]));

    // Ports resolve to the tensor they carry.
    let split_in = input_port_id(&model, "split1", 0);
    model.set_partial_shape(split_in, PartialShape::Dynamic)?;
    assert_eq!(model.partial_shape(add_out)?, &PartialShape::Dynamic);

    // Shape edits do not invalidate places.
    assert_eq!(model.generation(), 0);
    assert!(model.place(in1).is_ok());

    let split = model.place_by_operation_name("split1").unwrap().id();
    assert_eq!(
        model.partial_shape(split).err().map(|e| e.kind()),
        Some(EditErrorKind::InvalidPlace)
    );

    Ok(())
}

#[test]
fn test_element_type() -> Result<(), Box<dyn Error>> {
    let mut model = input_model_1(EditOptions::default())?;
    let in1 = tensor_id(&model, "in1");
    let in2 = tensor_id(&model, "in2");

    assert_eq!(model.element_type(in1)?, Some(ElementType::Float32));
    model.set_element_type(in1, Some(ElementType::Int32))?;
    assert_eq!(model.element_type(in1)?, Some(ElementType::Int32));
    assert_eq!(model.element_type(in2)?, Some(ElementType::Float32));

    Ok(())
}

#[test]
fn test_extract_subgraph() -> Result<(), Box<dyn Error>> {
    let mut model = input_model_1(EditOptions::default())?;

    let in1_port = producer_input_id(&model, "add_out", 0);
    let in2_port = producer_input_id(&model, "add_out", 1);
    let add_out = tensor_id(&model, "add_out");
    model.extract_subgraph(&[in1_port, in2_port], &[add_out])?;

    assert_eq!(op_types(&model), ["Add"]);
    assert_eq!(tensor_names(&model.inputs()), ["in1", "in2"]);
    assert_eq!(tensor_names(&model.outputs()), ["add_out"]);
    assert_eq!(model.generation(), 1);
    model.graph().check_invariants()?;

    // Places from before the edit are rejected.
    let err = model.place(add_out).err().unwrap();
    assert_eq!(err.kind(), EditErrorKind::InvalidPlace);
    let err = model.override_all_outputs(&[add_out]).err().unwrap();
    assert_eq!(err.kind(), EditErrorKind::InvalidPlace);

    Ok(())
}

#[test]
fn test_extract_subgraph_from_outputs() -> Result<(), Box<dyn Error>> {
    let mut model = input_model_1(EditOptions::default())?;

    let add_out = tensor_id(&model, "add_out");
    let out3 = tensor_id(&model, "out3");
    model.extract_subgraph(&[], &[add_out, out3])?;

    assert_eq!(op_types(&model), ["Add", "Relu"]);
    assert_eq!(tensor_names(&model.inputs()), ["in1", "in2", "in3"]);
    assert_eq!(tensor_names(&model.outputs()), ["add_out", "out3"]);

    Ok(())
}

#[test]
fn test_extract_subgraph_creates_placeholder() {
    #[derive(Debug)]
    struct Case {
        naming: PlaceholderNaming,
        expected_input: &'static str,
    }

    let cases = [
        Case {
            naming: PlaceholderNaming::Tensor,
            expected_input: "add_out/placeholder_port_0",
        },
        Case {
            naming: PlaceholderNaming::Consumer,
            expected_input: "out1/placeholder_port_0",
        },
    ];

    cases.test_each(|case| {
        let mut opts = EditOptions::default();
        opts.placeholder_naming(case.naming);
        let mut model = input_model_1(opts).unwrap();

        let split_in = input_port_id(&model, "split1", 0);
        let out1 = tensor_id(&model, "out1");
        let out2 = tensor_id(&model, "out2");
        model.extract_subgraph(&[split_in], &[out1, out2]).unwrap();

        assert_eq!(op_types(&model), ["Split"]);
        assert_eq!(tensor_names(&model.inputs()), [case.expected_input]);
        assert_eq!(tensor_names(&model.outputs()), ["out1", "out2"]);

        // The placeholder inherits the shape and type of the tensor it
        // replaces.
        let placeholder = model.place_by_tensor_name(case.expected_input).unwrap();
        assert_eq!(
            model.partial_shape(placeholder.id()).unwrap(),
            &PartialShape::fixed(&[2, 2])
        );
        assert_eq!(
            model.element_type(placeholder.id()).unwrap(),
            Some(ElementType::Float32)
        );
        assert!(model.place_by_tensor_name("add_out").is_none());

        // The operation keeps its name and attributes.
        let split = model.place_by_operation_name("split1").unwrap();
        assert!(split
            .source_tensor(PortSelector::Default)
            .unwrap()
            .is_equal(&placeholder));
    })
}

#[test]
fn test_extract_subgraph_placeholder_per_port() {
    #[derive(Debug)]
    struct Case {
        naming: PlaceholderNaming,
        expected_inputs: [&'static str; 3],
    }

    let cases = [
        Case {
            naming: PlaceholderNaming::Tensor,
            expected_inputs: [
                "add_out/placeholder_port_0",
                "add_out/placeholder_port_1",
                "add_out/placeholder_port_2",
            ],
        },
        Case {
            naming: PlaceholderNaming::Consumer,
            expected_inputs: [
                "out4/placeholder_port_0",
                "out4/placeholder_port_1",
                "out1/placeholder_port_0",
            ],
        },
    ];

    cases.test_each(|case| {
        let mut opts = EditOptions::default();
        opts.placeholder_naming(case.naming);
        let mut model = input_model_1(opts).unwrap();

        let inputs = [
            producer_input_id(&model, "out4", 0),
            producer_input_id(&model, "out4", 1),
            input_port_id(&model, "split1", 0),
        ];
        let outputs = [
            tensor_id(&model, "out1"),
            tensor_id(&model, "out2"),
            tensor_id(&model, "out4"),
        ];
        model.extract_subgraph(&inputs, &outputs).unwrap();

        assert_eq!(op_types(&model), ["Split", "Mul"]);
        assert_eq!(tensor_names(&model.inputs()), case.expected_inputs);
        assert_eq!(tensor_names(&model.outputs()), ["out1", "out2", "out4"]);

        // Each port of `Mul` reads from its own placeholder.
        let mul = model
            .place_by_tensor_name("out4")
            .unwrap()
            .producing_operation(PortSelector::Default)
            .unwrap();
        let lhs = mul.source_tensor(PortSelector::Index(0)).unwrap();
        let rhs = mul.source_tensor(PortSelector::Index(1)).unwrap();
        assert!(!lhs.is_equal_data(&rhs));
        assert_eq!(lhs.names()[0], case.expected_inputs[0]);
        assert_eq!(rhs.names()[0], case.expected_inputs[1]);

        model.graph().check_invariants().unwrap();
    })
}

#[test]
fn test_extract_subgraph_forward() -> Result<(), Box<dyn Error>> {
    let mut model = input_model_1(EditOptions::default())?;
    let in1_port = producer_input_id(&model, "add_out", 0);
    model.extract_subgraph(&[in1_port], &[])?;

    // Only the direct consumer is kept. Inputs it reads that were not
    // declared stay as graph inputs.
    assert_eq!(op_types(&model), ["Add"]);
    assert_eq!(tensor_names(&model.inputs()), ["in1", "in2"]);
    assert_eq!(tensor_names(&model.outputs()), ["add_out"]);
    model.graph().check_invariants()?;

    let mut model = input_model_1(EditOptions::default())?;
    let in1_port = producer_input_id(&model, "add_out", 0);
    let in2_port = producer_input_id(&model, "add_out", 1);
    model.extract_subgraph(&[in1_port, in2_port], &[])?;
    assert_eq!(op_types(&model), ["Add"]);
    assert_eq!(tensor_names(&model.outputs()), ["add_out"]);

    let mut model = input_model_1(EditOptions::default())?;
    let in3 = tensor_id(&model, "in3");
    model.extract_subgraph(&[in3], &[])?;
    assert_eq!(op_types(&model), ["Relu"]);
    assert_eq!(tensor_names(&model.outputs()), ["out3"]);

    // All outputs of the consumer are declared, even those used downstream.
    let mut model = input_model_1(EditOptions::default())?;
    let split = model.place_by_operation_name("split1").unwrap().id();
    model.extract_subgraph(&[split], &[])?;
    assert_eq!(op_types(&model), ["Split"]);
    assert_eq!(
        tensor_names(&model.inputs()),
        ["add_out/placeholder_port_0"]
    );
    assert_eq!(tensor_names(&model.outputs()), ["out1", "out2"]);

    Ok(())
}

#[test]
fn test_extract_subgraph_with_operation_places() -> Result<(), Box<dyn Error>> {
    let mut model = input_model_2(EditOptions::default())?;

    // Declaring an operation as an input cuts all of its input ports. As an
    // output, it declares all of its output tensors.
    let abs = model.place_by_operation_name("abs1").unwrap().id();
    let split = model.place_by_operation_name("split2").unwrap().id();
    model.extract_subgraph(&[split], &[split, abs])?;

    assert_eq!(op_types(&model), ["Split", "Abs"]);
    assert_eq!(
        tensor_names(&model.inputs()),
        ["add_out/placeholder_port_0"]
    );
    assert_eq!(
        tensor_names(&model.outputs()),
        ["sp_out1", "sp_out2", "out1"]
    );

    Ok(())
}

#[test]
fn test_extract_subgraph_no_op() -> Result<(), Box<dyn Error>> {
    let mut model = input_model_1(EditOptions::default())?;
    model.extract_subgraph(&[], &[])?;
    assert_eq!(op_types(&model), ["Add", "Split", "Relu", "Mul"]);
    assert_eq!(model.generation(), 0);
    Ok(())
}

#[test]
fn test_extract_subgraph_invalid_boundary() -> Result<(), Box<dyn Error>> {
    let model = input_model_1(EditOptions::default())?;

    #[derive(Debug)]
    struct Case {
        inputs: Vec<PlaceId>,
        outputs: Vec<PlaceId>,
        expected_error: &'static str,
    }

    let cases = [
        // Declared input which is not used.
        Case {
            inputs: vec![tensor_id(&model, "in3")],
            outputs: vec![tensor_id(&model, "out4")],
            expected_error: "input \"in3\" is not used by the subgraph",
        },
        // Declared input whose producer is part of the subgraph.
        Case {
            inputs: vec![
                tensor_id(&model, "in1"),
                tensor_id(&model, "in2"),
                tensor_id(&model, "out1"),
            ],
            outputs: vec![tensor_id(&model, "out2")],
            expected_error: "input \"out1\" is produced inside the subgraph",
        },
        // Declared output which does not depend on the inputs.
        Case {
            inputs: vec![input_port_id(&model, "split1", 0)],
            outputs: vec![tensor_id(&model, "out1"), tensor_id(&model, "out3")],
            expected_error: "output \"out3\" is not computed from the inputs",
        },
        Case {
            inputs: vec![tensor_id(&model, "in3")],
            outputs: vec![tensor_id(&model, "out3"), tensor_id(&model, "in1")],
            expected_error: "output \"in1\" is not computed from the inputs",
        },
        // Path to the outputs which depends on a value that is not declared.
        Case {
            inputs: vec![producer_input_id(&model, "out4", 0)],
            outputs: vec![tensor_id(&model, "out4")],
            expected_error: "input 1 of \"Mul\" is produced outside the subgraph",
        },
        // Consumer of the inputs which depends on a value that is not declared.
        Case {
            inputs: vec![producer_input_id(&model, "out4", 0)],
            outputs: vec![],
            expected_error: "input 1 of \"Mul\" is produced outside the subgraph",
        },
    ];

    cases.test_each(|case| {
        let mut model = model.clone();
        let err = model
            .extract_subgraph(&case.inputs, &case.outputs)
            .err()
            .unwrap();
        assert_eq!(err.kind(), EditErrorKind::InvalidBoundary);
        assert!(
            err.to_string().contains(case.expected_error),
            "unexpected error {}",
            err
        );

        // The model is unchanged.
        assert_eq!(model.generation(), 0);
        assert_eq!(op_types(&model), ["Add", "Split", "Relu", "Mul"]);
    });

    Ok(())
}

#[test]
fn test_override_all_outputs() -> Result<(), Box<dyn Error>> {
    let mut model = input_model_1(EditOptions::default())?;
    let out3 = tensor_id(&model, "out3");
    let add_out = tensor_id(&model, "add_out");
    model.override_all_outputs(&[out3, add_out])?;

    assert_eq!(op_types(&model), ["Add", "Relu"]);
    assert_eq!(tensor_names(&model.inputs()), ["in1", "in2", "in3"]);
    assert_eq!(tensor_names(&model.outputs()), ["out3", "add_out"]);

    let mut model = input_model_1(EditOptions::default())?;
    let out4 = tensor_id(&model, "out4");
    model.override_all_outputs(&[out4])?;

    assert_eq!(op_types(&model), ["Add", "Mul"]);
    assert_eq!(tensor_names(&model.inputs()), ["in1", "in2"]);
    assert_eq!(tensor_names(&model.outputs()), ["out4"]);

    let err = model.override_all_outputs(&[]).err().unwrap();
    assert_eq!(err.kind(), EditErrorKind::InvalidBoundary);

    Ok(())
}

#[test]
fn test_override_all_inputs() -> Result<(), Box<dyn Error>> {
    let mut model = input_model_1(EditOptions::default())?;
    let inputs = [
        input_port_id(&model, "split1", 0),
        producer_input_id(&model, "out4", 0),
        producer_input_id(&model, "out4", 1),
        tensor_id(&model, "in3"),
    ];
    model.override_all_inputs(&inputs)?;

    assert_eq!(op_types(&model), ["Split", "Relu", "Mul"]);
    assert_eq!(
        tensor_names(&model.inputs()),
        [
            "add_out/placeholder_port_0",
            "add_out/placeholder_port_1",
            "add_out/placeholder_port_2",
            "in3"
        ]
    );
    assert_eq!(tensor_names(&model.outputs()), ["out1", "out2", "out3", "out4"]);

    Ok(())
}

#[test]
fn test_override_all_inputs_invalid() -> Result<(), Box<dyn Error>> {
    let model = input_model_1(EditOptions::default())?;

    #[derive(Debug)]
    struct Case {
        inputs: Vec<PlaceId>,
        expected_error: &'static str,
    }

    let cases = [
        // Too few inputs to compute all outputs.
        Case {
            inputs: vec![tensor_id(&model, "in1"), tensor_id(&model, "in2")],
            expected_error: "output \"out3\" is not computed from the inputs",
        },
        Case {
            inputs: vec![input_port_id(&model, "split1", 0), tensor_id(&model, "in3")],
            expected_error: "output \"out4\" is not computed from the inputs",
        },
        // A complete set of inputs plus one which is no longer needed.
        Case {
            inputs: vec![
                input_port_id(&model, "split1", 0),
                producer_input_id(&model, "out4", 0),
                producer_input_id(&model, "out4", 1),
                tensor_id(&model, "in3"),
                tensor_id(&model, "in1"),
            ],
            expected_error: "input \"in1\" is not used by the subgraph",
        },
        // Inputs which leave an original input in use.
        Case {
            inputs: vec![tensor_id(&model, "in1"), tensor_id(&model, "in3")],
            expected_error: "unexpected number of inputs after override_all_inputs",
        },
    ];

    cases.test_each(|case| {
        let mut model = model.clone();
        let err = model.override_all_inputs(&case.inputs).err().unwrap();
        assert_eq!(err.kind(), EditErrorKind::InvalidBoundary);
        assert!(
            err.to_string().contains(case.expected_error),
            "unexpected error {}",
            err
        );

        // The model is unchanged and previously obtained places remain valid.
        assert_eq!(op_types(&model), ["Add", "Split", "Relu", "Mul"]);
        assert!(model.place(case.inputs[0]).is_ok());
    });

    Ok(())
}

#[test]
fn test_placeholder_name_conflict() -> Result<(), Box<dyn Error>> {
    let mut model = input_model_1(EditOptions::default())?;
    let in3 = tensor_id(&model, "in3");
    model.set_name_for_tensor(in3, "add_out/placeholder_port_0")?;

    let split_in = input_port_id(&model, "split1", 0);
    let out1 = tensor_id(&model, "out1");
    let relu_out = tensor_id(&model, "out3");
    model.extract_subgraph(&[split_in, in3], &[out1, relu_out])?;

    assert_eq!(
        tensor_names(&model.inputs()),
        ["add_out/placeholder_port_0_1", "add_out/placeholder_port_0"]
    );

    Ok(())
}

#[test]
fn test_add_and_remove_output() -> Result<(), Box<dyn Error>> {
    let mut model = input_model_1(EditOptions::default())?;

    let add_out = tensor_id(&model, "add_out");
    model.add_output(add_out)?;
    model.add_output(add_out)?;
    assert_eq!(
        tensor_names(&model.outputs()),
        ["out1", "out2", "out3", "out4", "add_out"]
    );

    model.remove_output(tensor_id(&model, "out4"))?;
    assert_eq!(
        tensor_names(&model.outputs()),
        ["out1", "out2", "out3", "add_out"]
    );

    // Removing an output does not prune operations until outputs are
    // overridden.
    assert_eq!(op_types(&model), ["Add", "Split", "Relu", "Mul"]);
    let outputs: Vec<PlaceId> = model.outputs().iter().map(|p| p.id()).collect();
    model.override_all_outputs(&outputs)?;
    assert_eq!(op_types(&model), ["Add", "Split", "Relu"]);

    Ok(())
}

#[test]
fn test_rename() -> Result<(), Box<dyn Error>> {
    let mut model = input_model_1(EditOptions::default())?;

    let in1 = tensor_id(&model, "in1");
    model.set_name_for_tensor(in1, "input_a")?;
    assert!(model.place_by_tensor_name("in1").is_none());
    assert_eq!(model.place(in1)?.names(), &["input_a"]);

    let err = model
        .add_name_for_tensor(tensor_id(&model, "in2"), "input_a")
        .err()
        .unwrap();
    assert_eq!(err.kind(), EditErrorKind::NameConflict);

    let split = model.place_by_operation_name("split1").unwrap().id();
    model.set_name_for_operation(split, "splitter")?;
    assert!(model.place_by_operation_name("split1").is_none());
    assert!(model
        .place_by_operation_name("splitter")
        .unwrap()
        .is_equal(&model.place(split)?));

    let err = model.set_name_for_operation(in1, "x").err().unwrap();
    assert_eq!(err.kind(), EditErrorKind::InvalidPlace);

    // Renames do not invalidate places.
    assert_eq!(model.generation(), 0);

    Ok(())
}

#[test]
fn test_validated_edits() -> Result<(), Box<dyn Error>> {
    let mut opts = EditOptions::default();
    opts.validate(true);
    let mut model = input_model_2(opts)?;

    let abs_in = input_port_id(&model, "abs1", 0);
    let out1 = tensor_id(&model, "out1");
    model.extract_subgraph(&[abs_in], &[out1])?;

    assert_eq!(op_types(&model), ["Abs"]);
    assert_eq!(
        tensor_names(&model.inputs()),
        ["sp_out1/placeholder_port_0"]
    );

    Ok(())
}

/// Build a random DAG with `n_inputs` inputs and `n_ops` operations.
fn random_model(rng: &mut fastrand::Rng, n_inputs: usize, n_ops: usize) -> InputModel {
    let mut builder = GraphBuilder::new();
    let mut tensors: Vec<String> = Vec::new();
    for i in 0..n_inputs {
        let name = format!("input_{}", i);
        builder
            .input(&name, PartialShape::fixed(&[i + 1]), Some(ElementType::Float32))
            .unwrap();
        tensors.push(name);
    }

    for op in 0..n_ops {
        let n_op_inputs = rng.usize(1..=3);
        let inputs: Vec<String> = (0..n_op_inputs)
            .map(|_| tensors[rng.usize(..tensors.len())].clone())
            .collect();
        let n_op_outputs = rng.usize(1..=2);
        let outputs: Vec<String> = (0..n_op_outputs)
            .map(|i| format!("op_{}_out_{}", op, i))
            .collect();

        let input_refs: Vec<&str> = inputs.iter().map(|s| s.as_str()).collect();
        let output_refs: Vec<&str> = outputs.iter().map(|s| s.as_str()).collect();
        let op_name = format!("op_{}", op);
        builder
            .node(NodeSpec::new("Op", &input_refs, &output_refs).with_name(&op_name))
            .unwrap();
        tensors.extend(outputs);
    }

    for name in &tensors[n_inputs..] {
        if rng.usize(..4) == 0 {
            builder.output(name).unwrap();
        }
    }
    builder.output(&tensors[tensors.len() - 1]).unwrap();

    InputModel::new(builder.build().unwrap(), EditOptions::default())
}

#[test]
fn test_random_extractions_preserve_invariants() {
    let mut rng = fastrand::Rng::with_seed(1234);
    let mut n_committed = 0;

    for _ in 0..200 {
        let mut model = random_model(&mut rng, 3, 12);
        let n_ops = model.graph().operation_count();

        // Choose random input ports and tensors as the new boundary.
        let ports: Vec<PlaceId> = model
            .graph()
            .operations()
            .flat_map(|(op_id, op)| {
                (0..op.inputs().len()).map(move |index| (op_id, index))
            })
            .map(|(op_id, index)| {
                let op_name = model.graph().operation(op_id).unwrap().name().unwrap().to_string();
                model
                    .place_by_operation_name_and_input_port(&op_name, index)
                    .unwrap()
                    .id()
            })
            .collect();
        let tensors: Vec<PlaceId> = model
            .graph()
            .tensors()
            .map(|(_, t)| tensor_id(&model, t.name().unwrap()))
            .collect();

        let inputs: Vec<PlaceId> = (0..rng.usize(0..3))
            .map(|_| ports[rng.usize(..ports.len())])
            .collect();
        let outputs: Vec<PlaceId> = (0..rng.usize(1..3))
            .map(|_| tensors[rng.usize(..tensors.len())])
            .collect();

        match model.extract_subgraph(&inputs, &outputs) {
            Ok(()) => {
                n_committed += 1;
                let graph = model.graph();
                graph.check_invariants().unwrap();
                assert!(Planner::with_graph(graph).unreachable_operations().is_empty());
                for &input in graph.input_ids() {
                    assert!(graph.producer_of(input).is_none());
                }
                assert!(graph.operation_count() <= n_ops);
            }
            Err(err) => {
                assert_eq!(err.kind(), EditErrorKind::InvalidBoundary);
                assert_eq!(model.generation(), 0);
                assert_eq!(model.graph().operation_count(), n_ops);
            }
        }
    }

    assert!(n_committed > 0);
}
