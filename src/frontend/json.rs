use serde::Deserialize;

use super::{load_error, Frontend, LoadError, LoadErrorImpl};
use crate::convert::{convert, ConvertError, ConvertedModel};
use crate::graph::{Attributes, GraphBuilder, NodeSpec};
use crate::infer_shapes::ShapeInferenceRegistry;
use crate::model::{EditOptions, InputModel};
use crate::shape::{Dimension, ElementType, PartialShape};

/// A dimension in a JSON shape: a size, a symbolic name or `null` for an
/// unknown size.
#[derive(Clone, Deserialize)]
#[serde(untagged)]
enum JsonDim {
    Fixed(usize),
    Symbolic(String),
}

#[derive(Deserialize)]
struct JsonValueInfo {
    name: String,

    /// Dimensions of the value. `null` or absent if the rank is unknown.
    #[serde(default)]
    shape: Option<Vec<Option<JsonDim>>>,

    #[serde(default)]
    dtype: Option<String>,

    /// Alternative names for the value.
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Deserialize)]
struct JsonNode {
    op_type: String,

    #[serde(default)]
    name: Option<String>,

    /// Input value names. `null` or `""` marks an absent optional input.
    #[serde(default)]
    inputs: Vec<Option<String>>,

    outputs: Vec<String>,

    #[serde(default)]
    attrs: Attributes,
}

#[derive(Deserialize)]
struct JsonModel {
    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    inputs: Vec<JsonValueInfo>,

    #[serde(default)]
    outputs: Vec<String>,

    #[serde(default)]
    value_info: Vec<JsonValueInfo>,

    #[serde(default)]
    nodes: Vec<JsonNode>,
}

/// Frontend which loads models from a JSON description.
///
/// The description lists the graph inputs with their shapes and types, the
/// operations, the names of output values and optionally shapes and types of
/// other values:
///
/// ```json
/// {
///   "name": "example",
///   "inputs": [{ "name": "x", "shape": ["batch", 16], "dtype": "f32" }],
///   "nodes": [{ "op_type": "Relu", "name": "relu", "inputs": ["x"], "outputs": ["y"] }],
///   "outputs": ["y"]
/// }
/// ```
///
/// A dimension is a number, a symbol name or `null` for an unknown size. A
/// value whose shape is `null` or omitted has a dynamic rank.
pub struct JsonFrontend {
    registry: ShapeInferenceRegistry,
}

impl JsonFrontend {
    /// Create a frontend which converts models using the default shape
    /// inference rules.
    pub fn new() -> JsonFrontend {
        Self::with_registry(ShapeInferenceRegistry::with_default_rules())
    }

    /// Create a frontend which converts models using the rules in `registry`.
    pub fn with_registry(registry: ShapeInferenceRegistry) -> JsonFrontend {
        JsonFrontend { registry }
    }
}

impl Default for JsonFrontend {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_shape(shape: Option<Vec<Option<JsonDim>>>) -> PartialShape {
    match shape {
        None => PartialShape::Dynamic,
        Some(dims) => PartialShape::Ranked(
            dims.into_iter()
                .map(|dim| match dim {
                    Some(JsonDim::Fixed(size)) => Dimension::Fixed(size),
                    Some(JsonDim::Symbolic(name)) => Dimension::Symbolic(name),
                    None => Dimension::Unknown,
                })
                .collect(),
        ),
    }
}

fn parse_dtype(value: &JsonValueInfo) -> Result<Option<ElementType>, LoadError> {
    value
        .dtype
        .as_deref()
        .map(|dtype| dtype.parse::<ElementType>())
        .transpose()
        .map_err(|err| load_error!(ParseFailed, Some(value.name.as_str()), err))
}

impl Frontend for JsonFrontend {
    fn name(&self) -> &str {
        "json"
    }

    fn load(&self, data: &[u8], options: EditOptions) -> Result<InputModel, LoadError> {
        let desc: JsonModel =
            serde_json::from_slice(data).map_err(|err| LoadErrorImpl::ParseFailed(err.into()))?;
        let mut builder = GraphBuilder::new();

        for input in &desc.inputs {
            let dtype = parse_dtype(input)?;
            builder
                .input(&input.name, parse_shape(input.shape.clone()), dtype)
                .map_err(|err| load_error!(GraphError, Some(input.name.as_str()), err))?;
        }
        for value in &desc.value_info {
            let dtype = parse_dtype(value)?;
            builder
                .value_info(&value.name, parse_shape(value.shape.clone()), dtype)
                .map_err(|err| load_error!(GraphError, Some(value.name.as_str()), err))?;
        }
        for value in desc.inputs.iter().chain(&desc.value_info) {
            for alias in &value.aliases {
                builder
                    .alias(&value.name, alias)
                    .map_err(|err| load_error!(GraphError, Some(value.name.as_str()), err))?;
            }
        }

        for node in &desc.nodes {
            let node_name = node.name.as_deref();
            let inputs: Vec<&str> = node
                .inputs
                .iter()
                .map(|input| input.as_deref().unwrap_or(""))
                .collect();
            let outputs: Vec<&str> = node.outputs.iter().map(|s| s.as_str()).collect();
            if outputs.iter().any(|name| name.is_empty()) {
                return Err(load_error!(
                    ParseFailed,
                    node_name,
                    "{} operator has an unnamed output",
                    node.op_type
                ));
            }

            let mut spec = NodeSpec::new(&node.op_type, &inputs, &outputs)
                .with_attrs(node.attrs.clone());
            spec.name = node_name;
            builder
                .node(spec)
                .map_err(|err| load_error!(GraphError, node_name, err))?;
        }

        for output in &desc.outputs {
            builder
                .output(output)
                .map_err(|err| load_error!(GraphError, Some(output.as_str()), err))?;
        }

        let graph = builder
            .build()
            .map_err(|err| LoadErrorImpl::GraphError(err.into()))?;
        Ok(InputModel::new(graph, options).with_name(desc.name.as_deref()))
    }

    fn convert(&self, model: &InputModel) -> Result<ConvertedModel, ConvertError> {
        convert(model, &self.registry)
    }
}
