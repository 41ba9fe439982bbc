//! rten-edit is a library for inspecting and editing the graphs of machine
//! learning models before they are converted for execution.
//!
//! # Loading and editing models
//!
//! The basic workflow is:
//!
//! 1. Load a model description into an [`InputModel`] using a [`Frontend`]
//!    from a [`FrontendRegistry`], or build a [`graph::Graph`] directly with
//!    [`graph::GraphBuilder`].
//! 2. Look up [`Place`]s (tensors, operations and their ports) by name and
//!    navigate between them.
//! 3. Edit the model: override the shapes and types of tensors, rename
//!    tensors and operations, or cut out a subgraph using
//!    [`InputModel::extract_subgraph`],
//!    [`InputModel::override_all_inputs`] or
//!    [`InputModel::override_all_outputs`].
//! 4. Convert the edited model with [`Frontend::convert`], which runs
//!    [shape inference](infer_shapes) and produces a flat list of operations.
//!
//! ```
//! use rten_edit::{EditOptions, Frontend, JsonFrontend, PortSelector};
//!
//! let json = r#"{
//!     "inputs": [{ "name": "x", "shape": ["batch", 8], "dtype": "f32" }],
//!     "nodes": [
//!         { "op_type": "Relu", "name": "relu", "inputs": ["x"], "outputs": ["y"] },
//!         { "op_type": "Abs", "name": "abs", "inputs": ["y"], "outputs": ["z"] }
//!     ],
//!     "outputs": ["z"]
//! }"#;
//!
//! let frontend = JsonFrontend::new();
//! let mut model = frontend.load(json.as_bytes(), EditOptions::default())?;
//!
//! // Keep only the `Relu` operation.
//! let y = model.place_by_tensor_name("y").unwrap().id();
//! model.override_all_outputs(&[y])?;
//!
//! let converted = frontend.convert(&model)?;
//! assert_eq!(converted.op_types(), ["Relu"]);
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! # Places and edits
//!
//! A [`Place`] borrows the model it came from, so it cannot be held across an
//! edit. Editing methods instead take [`PlaceId`]s, which can be stored
//! freely. Edits which change the topology of the graph invalidate all
//! existing place IDs, and using one afterwards fails with
//! [`EditErrorKind::InvalidPlace`].
//!
//! # Configuration
//!
//! Editing behavior is controlled by [`EditOptions`], which can also be read
//! from environment variables:
//!
//! - `RTEN_EDIT_PLACEHOLDER_NAMING` - `tensor` (default) or `consumer`. See
//!   [`PlaceholderNaming`].
//! - `RTEN_EDIT_VALIDATE` - If true, check all graph invariants after each
//!   edit.

mod env;
mod shape;

pub mod convert;
pub mod frontend;
pub mod graph;
pub mod infer_shapes;
mod model;
mod place;

#[cfg(test)]
mod test_util;

pub use convert::{ConvertError, ConvertedModel};
pub use frontend::{Frontend, FrontendRegistry, JsonFrontend, LoadError, LoadErrorKind};
pub use model::{EditError, EditErrorKind, EditOptions, InputModel, PlaceholderNaming};
pub use place::{Place, PlaceId, PlaceKind, PortSelector};
pub use shape::{Dimension, ElementType, PartialShape, UnknownElementType};
