//! Shape inference rules for operators which need their attributes.

use super::{InferShapes, InferShapesError, ValueInfo};
use crate::graph::OperationNode;
use crate::shape::{Dimension, PartialShape};

/// Resolve a possibly negative axis against a rank.
fn resolve_axis(ndim: usize, axis: i64) -> Result<usize, InferShapesError> {
    let resolved = if axis < 0 { axis + ndim as i64 } else { axis };
    if resolved < 0 || resolved >= ndim as i64 {
        return Err(InferShapesError::IncorrectRank);
    }
    Ok(resolved as usize)
}

/// Shape inference for the `Split` operator.
///
/// Split sizes are taken from the `split` attribute. If that is absent and
/// sizes are not provided as an input, the axis is divided into as many
/// equal chunks as the operator has outputs, with a smaller final chunk if
/// the size is not evenly divisible.
///
/// See <https://onnx.ai/onnx/operators/onnx__Split.html>.
pub struct SplitInfer;

impl InferShapes for SplitInfer {
    fn infer_shapes(
        &self,
        op: &OperationNode,
        inputs: &[ValueInfo],
    ) -> Result<Vec<ValueInfo>, InferShapesError> {
        let [data, rest @ ..] = inputs else {
            return Err(InferShapesError::IncorrectInputCount);
        };
        if rest.len() > 1 {
            return Err(InferShapesError::IncorrectInputCount);
        }

        let n_outputs = op.outputs().len();
        if n_outputs == 0 {
            return Err(InferShapesError::IncorrectOutputCount);
        }

        let Some(dims) = data.shape.dims() else {
            return Ok(vec![ValueInfo::new(PartialShape::Dynamic, data.dtype); n_outputs]);
        };
        let axis = resolve_axis(dims.len(), op.attr_int("axis").unwrap_or(0))?;

        let split_sizes: Vec<Dimension> = if let Some(split) = op.attr_ints("split") {
            if split.len() != n_outputs || split.iter().any(|size| *size < 0) {
                return Err(InferShapesError::InvalidAttribute("split".to_string()));
            }
            let total = split
                .iter()
                .try_fold(0i64, |total, size| total.checked_add(*size))
                .ok_or_else(|| InferShapesError::InvalidAttribute("split".to_string()))?;
            if let Dimension::Fixed(size) = dims[axis] {
                if total != size as i64 {
                    return Err(InferShapesError::IncompatibleShapes);
                }
            }
            split.iter().map(|size| Dimension::Fixed(*size as usize)).collect()
        } else if rest.first().is_some_and(|sizes| *sizes != ValueInfo::default()) {
            // Sizes are given by a tensor whose value is not known here.
            vec![Dimension::Unknown; n_outputs]
        } else if let Dimension::Fixed(size) = dims[axis] {
            let chunk = size.div_ceil(n_outputs);
            let last = size
                .checked_sub(chunk * (n_outputs - 1))
                .ok_or(InferShapesError::IncompatibleShapes)?;
            (0..n_outputs)
                .map(|i| {
                    Dimension::Fixed(if i + 1 == n_outputs { last } else { chunk })
                })
                .collect()
        } else {
            vec![Dimension::Unknown; n_outputs]
        };

        Ok(split_sizes
            .into_iter()
            .map(|size| {
                let mut out_dims = dims.to_vec();
                out_dims[axis] = size;
                ValueInfo::new(PartialShape::Ranked(out_dims), data.dtype)
            })
            .collect())
    }
}

/// Shape inference for `ExperimentalDetectronROIFeatureExtractor`.
///
/// Input 0 is a `[rois, 4]` box list and inputs 1.. are `[N, C, H, W]`
/// feature maps. Output 0 has shape `[rois, C, output_size, output_size]`
/// and the optional output 1 has shape `[rois, 4]`.
pub struct RoiFeatureExtractorInfer;

impl InferShapes for RoiFeatureExtractorInfer {
    fn infer_shapes(
        &self,
        op: &OperationNode,
        inputs: &[ValueInfo],
    ) -> Result<Vec<ValueInfo>, InferShapesError> {
        let [rois, features, ..] = inputs else {
            return Err(InferShapesError::IncorrectInputCount);
        };

        let output_size = op
            .attr_int("output_size")
            .filter(|size| *size > 0)
            .ok_or_else(|| InferShapesError::InvalidAttribute("output_size".to_string()))?
            as usize;

        let n_rois = match rois.shape.dims() {
            Some([n_rois, _]) => n_rois.clone(),
            Some(_) => return Err(InferShapesError::IncorrectRank),
            None => Dimension::Unknown,
        };
        let channels = match features.shape.dims() {
            Some([_, channels, _, _]) => channels.clone(),
            Some(_) => return Err(InferShapesError::IncorrectRank),
            None => Dimension::Unknown,
        };

        let dtype = rois.dtype.or(features.dtype);
        let mut outputs = vec![
            ValueInfo::new(
                PartialShape::Ranked(vec![
                    n_rois.clone(),
                    channels,
                    Dimension::Fixed(output_size),
                    Dimension::Fixed(output_size),
                ]),
                dtype,
            ),
            ValueInfo::new(
                PartialShape::Ranked(vec![n_rois, Dimension::Fixed(4)]),
                dtype,
            ),
        ];
        outputs.truncate(op.outputs().len());
        Ok(outputs)
    }
}
