use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::graph::GraphError;

/// Errors that occur when editing a model.
///
/// A failed edit leaves the model unchanged.
#[derive(Clone, Debug, PartialEq)]
pub struct EditError(EditErrorImpl);

impl EditError {
    /// Return the general category of error.
    pub fn kind(&self) -> EditErrorKind {
        self.0.kind()
    }

    pub(crate) fn stale_place() -> Self {
        EditErrorImpl::StalePlace.into()
    }

    pub(crate) fn invalid_place(msg: impl Into<String>) -> Self {
        EditErrorImpl::InvalidPlace(msg.into()).into()
    }

    pub(crate) fn invalid_boundary(msg: impl Into<String>) -> Self {
        EditErrorImpl::InvalidBoundary(msg.into()).into()
    }
}

impl Display for EditError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Error for EditError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.0 {
            EditErrorImpl::GraphError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EditErrorImpl> for EditError {
    fn from(inner: EditErrorImpl) -> Self {
        Self(inner)
    }
}

impl From<GraphError> for EditError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::DuplicateTensorName(name) => EditErrorImpl::NameConflict(name),
            err => EditErrorImpl::GraphError(err),
        }
        .into()
    }
}

/// The category of model editing error. See [`EditError::kind`].
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum EditErrorKind {
    /// A place does not refer to a suitable element of the current graph.
    InvalidPlace,

    /// A set of inputs and outputs does not describe a valid subgraph.
    InvalidBoundary,

    /// A name is already used by another tensor.
    NameConflict,
}

/// Internal implementation of [`EditError`].
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum EditErrorImpl {
    /// A place was obtained before the most recent topology edit.
    StalePlace,

    /// A place does not exist or is the wrong kind for an operation.
    InvalidPlace(String),

    /// Boundary places do not describe a valid subgraph.
    InvalidBoundary(String),

    /// A tensor name is already in use.
    NameConflict(String),

    /// A candidate graph violates a structural invariant.
    GraphError(GraphError),
}

impl EditErrorImpl {
    fn kind(&self) -> EditErrorKind {
        type Kind = EditErrorKind;

        match self {
            Self::StalePlace | Self::InvalidPlace(_) => Kind::InvalidPlace,
            Self::InvalidBoundary(_) | Self::GraphError(_) => Kind::InvalidBoundary,
            Self::NameConflict(_) => Kind::NameConflict,
        }
    }
}

impl Display for EditErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StalePlace => write!(f, "place was invalidated by an earlier edit"),
            Self::InvalidPlace(msg) => write!(f, "invalid place: {}", msg),
            Self::InvalidBoundary(msg) => write!(f, "invalid boundary: {}", msg),
            Self::NameConflict(name) => write!(f, "name \"{}\" is already in use", name),
            Self::GraphError(err) => write!(f, "graph error: {}", err),
        }
    }
}
