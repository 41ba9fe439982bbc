//! Shape inference types and traits.
//!
//! This module also provides implementations of shape inference that are
//! reused by many operators, such as unary and binary ops, and the
//! [`infer_shapes`] pass which applies registered rules to a whole graph.
//!
//! Shape inference is never run implicitly when a model is edited. Editing
//! only updates the shapes it is told to, so stored shapes of tensors
//! downstream of an edit may be stale until this pass is run.

use std::error::Error;
use std::fmt;

use log::trace;
use rustc_hash::FxHashMap;

use crate::convert::ConvertError;
use crate::graph::{Graph, OperationNode, Planner};
use crate::shape::{Dimension, ElementType, PartialShape};

mod ops;

pub use ops::{RoiFeatureExtractorInfer, SplitInfer};

#[derive(Clone, Debug, PartialEq)]
pub enum InferShapesError {
    /// Too many or too few inputs were provided for this operator.
    IncorrectInputCount,

    /// The operator has a different number of outputs than the rule produces.
    IncorrectOutputCount,

    /// The input shapes are incompatible.
    ///
    /// Operator execution will fail if given inputs with these shapes.
    IncompatibleShapes,

    /// An input's rank does not match that expected by the operator.
    IncorrectRank,

    /// An attribute is missing or has an invalid value.
    InvalidAttribute(String),
}

impl fmt::Display for InferShapesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncorrectInputCount => write!(f, "incorrect number of inputs"),
            Self::IncorrectOutputCount => write!(f, "incorrect number of outputs"),
            Self::IncompatibleShapes => write!(f, "input shapes are incompatible"),
            Self::IncorrectRank => write!(f, "input has incorrect rank"),
            Self::InvalidAttribute(name) => write!(f, "invalid attribute \"{}\"", name),
        }
    }
}

impl Error for InferShapesError {}

/// Shape and element type of an operator input or output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueInfo {
    pub shape: PartialShape,
    pub dtype: Option<ElementType>,
}

impl ValueInfo {
    pub fn new(shape: PartialShape, dtype: Option<ElementType>) -> ValueInfo {
        ValueInfo { shape, dtype }
    }
}

/// Infer the shapes and types of an operator's outputs given its inputs.
///
/// `inputs` has one entry per input port. Absent optional inputs are
/// represented by an entry with a dynamic shape and no type.
pub trait InferShapes {
    fn infer_shapes(
        &self,
        op: &OperationNode,
        inputs: &[ValueInfo],
    ) -> Result<Vec<ValueInfo>, InferShapesError>;
}

/// Shared shape inference implementation for unary operators.
pub const UNARY_OP: UnaryOpInfer = UnaryOpInfer;

/// Shape inference implementation for unary operators.
///
/// These operators take a single input and return an output with the same
/// shape and type.
pub struct UnaryOpInfer;

impl InferShapes for UnaryOpInfer {
    fn infer_shapes(
        &self,
        _op: &OperationNode,
        inputs: &[ValueInfo],
    ) -> Result<Vec<ValueInfo>, InferShapesError> {
        let [input] = inputs else {
            return Err(InferShapesError::IncorrectInputCount);
        };
        Ok(vec![input.clone()])
    }
}

/// Shared shape inference implementation for binary operators which broadcast
/// their inputs together.
pub const BINARY_OP: BinaryOpInfer = BinaryOpInfer;

/// Shape inference implementation for binary operators.
///
/// These operators take two inputs and return an output whose shape is the
/// result of broadcasting the two input shapes together.
pub struct BinaryOpInfer;

impl InferShapes for BinaryOpInfer {
    fn infer_shapes(
        &self,
        _op: &OperationNode,
        inputs: &[ValueInfo],
    ) -> Result<Vec<ValueInfo>, InferShapesError> {
        let [a, b] = inputs else {
            return Err(InferShapesError::IncorrectInputCount);
        };
        let dtype = a.dtype.or(b.dtype);

        let (Some(a_dims), Some(b_dims)) = (a.shape.dims(), b.shape.dims()) else {
            return Ok(vec![ValueInfo::new(PartialShape::Dynamic, dtype)]);
        };

        let a_pad = b_dims.len().saturating_sub(a_dims.len());
        let b_pad = a_dims.len().saturating_sub(b_dims.len());

        let a_iter = std::iter::repeat(&Dimension::Fixed(1))
            .take(a_pad)
            .chain(a_dims);
        let b_iter = std::iter::repeat(&Dimension::Fixed(1))
            .take(b_pad)
            .chain(b_dims);

        let mut out_shape = Vec::with_capacity(a_dims.len().max(b_dims.len()));
        for (a, b) in a_iter.zip(b_iter) {
            let dim = match (a, b) {
                (Dimension::Unknown, _) | (_, Dimension::Unknown) => match (a, b) {
                    (Dimension::Fixed(size), _) | (_, Dimension::Fixed(size)) if *size != 1 => {
                        Dimension::Fixed(*size)
                    }
                    _ => Dimension::Unknown,
                },

                (a, b) if a == b => a.clone(),

                // If either size is 1, it will be broadcast against the other
                // size.
                (Dimension::Fixed(1), b) => b.clone(),
                (a, Dimension::Fixed(1)) => a.clone(),

                // If both sizes are fixed and different, we know execution
                // will fail.
                (Dimension::Fixed(_), Dimension::Fixed(_)) => {
                    return Err(InferShapesError::IncompatibleShapes);
                }

                // If one dim is a fixed value other than 1 and the other
                // dim is symbolic, execution can only succeed if the symbolic
                // dim has the same size as the fixed dim.
                (Dimension::Symbolic(_), Dimension::Fixed(b)) => Dimension::Fixed(*b),
                (Dimension::Fixed(a), Dimension::Symbolic(_)) => Dimension::Fixed(*a),

                // Two different symbolic dims may each be 1, or equal.
                (Dimension::Symbolic(_), Dimension::Symbolic(_)) => Dimension::Unknown,
            };
            out_shape.push(dim);
        }

        Ok(vec![ValueInfo::new(PartialShape::Ranked(out_shape), dtype)])
    }
}

/// Registry of shape inference rules keyed by operator type.
///
/// New registries have no rules registered. Use
/// [`with_default_rules`](ShapeInferenceRegistry::with_default_rules) to get a
/// registry with the built-in rules.
#[derive(Default)]
pub struct ShapeInferenceRegistry {
    rules: FxHashMap<String, Box<dyn InferShapes>>,
}

impl ShapeInferenceRegistry {
    /// Create a new empty registry.
    pub fn new() -> ShapeInferenceRegistry {
        Self::default()
    }

    /// Create a registry with rules for the built-in operators.
    pub fn with_default_rules() -> ShapeInferenceRegistry {
        let mut reg = ShapeInferenceRegistry::new();
        for op_type in ["Abs", "Identity", "Neg", "Relu", "Sigmoid", "Sin", "Cos", "Exp", "Tanh"] {
            reg.register(op_type, UNARY_OP);
        }
        for op_type in ["Add", "Sub", "Mul", "Div"] {
            reg.register(op_type, BINARY_OP);
        }
        reg.register("Split", SplitInfer);
        reg.register(
            "ExperimentalDetectronROIFeatureExtractor",
            RoiFeatureExtractorInfer,
        );
        reg
    }

    /// Register the rule for an operator type, replacing any existing rule.
    pub fn register(&mut self, op_type: &str, rule: impl InferShapes + 'static) {
        self.rules.insert(op_type.to_string(), Box::new(rule));
    }

    /// Return the rule for an operator type.
    pub fn get(&self, op_type: &str) -> Option<&dyn InferShapes> {
        self.rules.get(op_type).map(|rule| rule.as_ref())
    }
}

/// Run shape inference over a graph.
///
/// Operations are visited in dependency order. For each operation with a
/// registered rule, the stored shapes and types of its outputs are replaced
/// by the inferred ones. An inferred dynamic shape or unknown type does not
/// replace a stored value. Operations without a rule keep their stored
/// output shapes.
///
/// Returns the number of operations for which a rule was applied.
pub fn infer_shapes(
    graph: &mut Graph,
    registry: &ShapeInferenceRegistry,
) -> Result<usize, ConvertError> {
    let order = Planner::with_graph(graph).sorted_operations()?;
    let mut n_inferred = 0;

    for op_id in order {
        let op = graph.operation(op_id)?;
        let Some(rule) = registry.get(op.op_type()) else {
            continue;
        };

        let inputs = op
            .input_ids()
            .map(|input| match input {
                Some(id) => graph
                    .tensor(id)
                    .map(|tensor| ValueInfo::new(tensor.shape().clone(), tensor.dtype())),
                None => Ok(ValueInfo::default()),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let outputs = rule
            .infer_shapes(op, &inputs)
            .map_err(|error| ConvertError::infer_shapes(graph.node_name(op_id), error))?;
        if outputs.len() > op.outputs().len() {
            return Err(ConvertError::infer_shapes(
                graph.node_name(op_id),
                InferShapesError::IncorrectOutputCount,
            ));
        }

        let output_ids: Vec<_> = op.outputs().iter().map(|port| port.tensor).collect();
        for (output_id, info) in output_ids.into_iter().zip(outputs) {
            let Some(output_id) = output_id else {
                continue;
            };
            trace!(
                "Inferred {} {} for \"{}\"",
                info.shape,
                info.dtype.map(|dt| dt.to_string()).unwrap_or("?".into()),
                graph.node_name(output_id)
            );
            if info.shape != PartialShape::Dynamic {
                graph.set_tensor_shape(output_id, info.shape)?;
            }
            if info.dtype.is_some() {
                graph.set_tensor_type(output_id, info.dtype)?;
            }
        }
        n_inferred += 1;
    }

    Ok(n_inferred)
}
