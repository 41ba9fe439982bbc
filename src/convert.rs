//! Conversion of an edited model into a flat operator list.
//!
//! The converted form is what a runtime would consume after editing. It is
//! also convenient for checking the result of an edit, since two models with
//! the same structure convert to equal [`ConvertedModel`]s.

use std::error::Error;
use std::fmt;

use crate::graph::{Attributes, Graph, GraphError, NodeId, Planner};
use crate::infer_shapes::{infer_shapes, InferShapesError, ShapeInferenceRegistry};
use crate::model::InputModel;
use crate::shape::{ElementType, PartialShape};

/// Errors that occur when converting a model.
#[derive(Clone, Debug, PartialEq)]
pub enum ConvertError {
    /// Shape inference failed for an operation.
    InferShapes {
        operation: String,
        error: InferShapesError,
    },

    /// The graph is structurally invalid.
    GraphError(GraphError),
}

impl ConvertError {
    pub(crate) fn infer_shapes(operation: String, error: InferShapesError) -> ConvertError {
        ConvertError::InferShapes { operation, error }
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InferShapes { operation, error } => {
                write!(f, "shape inference failed for \"{}\": {}", operation, error)
            }
            Self::GraphError(err) => write!(f, "graph error: {}", err),
        }
    }
}

impl Error for ConvertError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InferShapes { error, .. } => Some(error),
            Self::GraphError(err) => Some(err),
        }
    }
}

impl From<GraphError> for ConvertError {
    fn from(val: GraphError) -> ConvertError {
        ConvertError::GraphError(val)
    }
}

/// Name, shape and type of a value in a converted model.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueDesc {
    pub name: String,
    pub shape: PartialShape,
    pub dtype: Option<ElementType>,
}

impl fmt::Display for ValueDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.shape)?;
        if let Some(dtype) = self.dtype {
            write!(f, " {}", dtype)?;
        }
        Ok(())
    }
}

/// An operation in a converted model.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertedOp {
    pub name: Option<String>,
    pub op_type: String,
    pub attrs: Attributes,

    /// Names of input values, or `None` for absent optional inputs.
    pub inputs: Vec<Option<String>>,
    pub outputs: Vec<ValueDesc>,
}

/// A model converted into parameters, operations in dependency order and
/// results.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertedModel {
    pub name: Option<String>,
    pub parameters: Vec<ValueDesc>,
    pub ops: Vec<ConvertedOp>,
    pub results: Vec<ValueDesc>,
}

impl ConvertedModel {
    /// Return the operator types in execution order.
    pub fn op_types(&self) -> Vec<&str> {
        self.ops.iter().map(|op| op.op_type.as_str()).collect()
    }

    /// Return the op which produces the value called `name`.
    pub fn producer(&self, name: &str) -> Option<&ConvertedOp> {
        self.ops
            .iter()
            .find(|op| op.outputs.iter().any(|output| output.name == name))
    }
}

impl fmt::Display for ConvertedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            writeln!(f, "Model: {}", name)?;
        }
        writeln!(f, "Parameters:")?;
        for param in &self.parameters {
            writeln!(f, "  {}", param)?;
        }
        writeln!(f, "Operations:")?;
        for op in &self.ops {
            let inputs: Vec<&str> = op
                .inputs
                .iter()
                .map(|input| input.as_deref().unwrap_or("-"))
                .collect();
            let outputs: Vec<String> = op.outputs.iter().map(|o| o.to_string()).collect();
            writeln!(
                f,
                "  {} {} ({}) -> {}",
                op.op_type,
                op.name.as_deref().unwrap_or("[unnamed]"),
                inputs.join(", "),
                outputs.join(", ")
            )?;
        }
        writeln!(f, "Results:")?;
        for result in &self.results {
            writeln!(f, "  {}", result)?;
        }
        Ok(())
    }
}

fn value_desc(graph: &Graph, id: NodeId) -> Result<ValueDesc, GraphError> {
    let tensor = graph.tensor(id)?;
    Ok(ValueDesc {
        name: graph.node_name(id),
        shape: tensor.shape().clone(),
        dtype: tensor.dtype(),
    })
}

/// Convert a model using shape inference rules from `registry`.
///
/// The model itself is not modified. Shape inference runs on a copy of its
/// graph, so the shapes in the result reflect any edits made to input
/// shapes.
pub fn convert(
    model: &InputModel,
    registry: &ShapeInferenceRegistry,
) -> Result<ConvertedModel, ConvertError> {
    let mut graph = model.graph().clone();
    infer_shapes(&mut graph, registry)?;

    let parameters = graph
        .input_ids()
        .iter()
        .map(|id| value_desc(&graph, *id))
        .collect::<Result<Vec<_>, _>>()?;

    let mut ops = Vec::with_capacity(graph.operation_count());
    for op_id in Planner::with_graph(&graph).sorted_operations()? {
        let op = graph.operation(op_id)?;
        ops.push(ConvertedOp {
            name: op.name().map(|s| s.to_string()),
            op_type: op.op_type().to_string(),
            attrs: op.attrs().clone(),
            inputs: op
                .input_ids()
                .map(|input| input.map(|id| graph.node_name(id)))
                .collect(),
            outputs: op
                .output_ids()
                .map(|id| value_desc(&graph, id))
                .collect::<Result<Vec<_>, _>>()?,
        });
    }

    let results = graph
        .output_ids()
        .iter()
        .map(|id| value_desc(&graph, *id))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ConvertedModel {
        name: model.name().map(|s| s.to_string()),
        parameters,
        ops,
        results,
    })
}
