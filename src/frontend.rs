//! Frontends load model descriptions into editable [`InputModel`]s.
//!
//! A [`FrontendRegistry`] holds the available frontends by name. Callers
//! create and own the registry, so different parts of a program can use
//! different sets of frontends.

use std::path::Path;

use crate::convert::{ConvertError, ConvertedModel};
use crate::model::{EditOptions, InputModel};

mod json;
mod load_error;

pub use json::JsonFrontend;
pub use load_error::{LoadError, LoadErrorKind};
pub(crate) use load_error::{load_error, LoadErrorImpl};

/// A loader for one model description format.
pub trait Frontend {
    /// Name under which the frontend is registered.
    fn name(&self) -> &str;

    /// Load a model from a serialized description.
    fn load(&self, data: &[u8], options: EditOptions) -> Result<InputModel, LoadError>;

    /// Load a model from a file.
    fn load_file(&self, path: &Path, options: EditOptions) -> Result<InputModel, LoadError> {
        let data = std::fs::read(path).map_err(LoadErrorImpl::ReadFailed)?;
        self.load(&data, options)
    }

    /// Convert an edited model.
    fn convert(&self, model: &InputModel) -> Result<ConvertedModel, ConvertError>;
}

/// Set of frontends available to a program, keyed by name.
///
/// New registries have no frontends registered. Use
/// [`with_default_frontends`](FrontendRegistry::with_default_frontends) to get
/// a registry with the built-in frontends.
#[derive(Default)]
pub struct FrontendRegistry {
    frontends: Vec<Box<dyn Frontend>>,
}

impl FrontendRegistry {
    /// Create a new empty registry.
    pub fn new() -> FrontendRegistry {
        Self::default()
    }

    /// Create a registry with the built-in frontends.
    pub fn with_default_frontends() -> FrontendRegistry {
        let mut reg = FrontendRegistry::new();
        reg.register(JsonFrontend::new());
        reg
    }

    /// Register a frontend, replacing any existing frontend with the same
    /// name.
    pub fn register(&mut self, frontend: impl Frontend + 'static) {
        self.frontends.retain(|f| f.name() != frontend.name());
        self.frontends.push(Box::new(frontend));
    }

    /// Return the frontend registered under `name`.
    pub fn get(&self, name: &str) -> Option<&dyn Frontend> {
        self.frontends
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
    }

    /// Return the names of registered frontends, in registration order.
    pub fn available_frontends(&self) -> Vec<&str> {
        self.frontends.iter().map(|f| f.name()).collect()
    }

    /// Load a model file using the frontend registered under `name`.
    pub fn load_file(
        &self,
        name: &str,
        path: &Path,
        options: EditOptions,
    ) -> Result<InputModel, LoadError> {
        let frontend = self
            .get(name)
            .ok_or_else(|| LoadErrorImpl::UnknownFrontend(name.to_string()))?;
        frontend.load_file(path, options)
    }
}
