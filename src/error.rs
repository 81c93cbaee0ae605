//! Error types for module graph compilation and dependency resolution

use crate::Lifetime;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by user factories, constructors and lifecycle hooks.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors that can occur while scanning the module graph or resolving providers
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// No provider or controller is registered under the requested token
    #[error("Unknown element: {token} is not registered{}", in_module(.module))]
    UnknownElement {
        token: String,
        module: Option<String>,
    },

    /// A module was selected that is not part of the compiled graph
    #[error("Module {module} is not registered in the current or global scope")]
    UnknownModule { module: String },

    /// A scoped provider was requested through the synchronous accessor
    #[error("{token} is {scope}-scoped and has no single instance; use resolve() instead")]
    InvalidClassScope { token: String, scope: Lifetime },

    /// A constructor argument has no provider visible from the host module
    #[error(
        "Cannot resolve dependencies of {target} ({signature}). Make sure that the argument \
         {dependency} at index [{index}] of {count} is available in the {module} module"
    )]
    UnknownDependency {
        target: String,
        module: String,
        dependency: String,
        index: usize,
        count: usize,
        signature: String,
    },

    /// Provider-level cycle without a forward reference
    #[error("Circular dependency detected while resolving {token}: {path}. Consider a forward dependency")]
    CircularDependency { token: String, path: String },

    /// A user factory or constructor failed
    #[error("Failed to create {token}: {source}")]
    CreationFailed {
        token: String,
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },

    /// A lifecycle hook failed
    #[error("Lifecycle hook {hook} of {token} failed: {source}")]
    HookFailed {
        token: String,
        hook: &'static str,
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },

    /// An import is neither a module type nor a dynamic module
    #[error("Invalid module at index [{index}] of the {parent} imports (scope: {scope})")]
    InvalidModule {
        parent: String,
        index: usize,
        scope: String,
    },

    /// An export names neither a local provider nor an imported module
    #[error("Cannot export {token} from {module}: it is neither a provider nor an imported module")]
    UnknownExport { token: String, module: String },

    /// `multi` and non-`multi` providers share one token
    #[error("Cannot mix multi and non-multi providers registered under {token} in {module}")]
    MixedMultiProvider { token: String, module: String },

    /// The same non-multi token was registered twice in one module
    #[error("Provider {token} is already registered in {module}")]
    DuplicateProvider { token: String, module: String },

    /// A resolved instance is not of the requested type
    #[error("{token} does not resolve to a value of type {expected}")]
    TypeMismatch {
        token: String,
        expected: &'static str,
    },

    /// A constructor asked for an argument it did not declare
    #[error("Argument index [{index}] is out of range for {target} ({count} declared)")]
    ArgumentOutOfRange {
        target: String,
        index: usize,
        count: usize,
    },

    /// A singleton was looked up before it was instantiated
    #[error("{token} has not been instantiated yet")]
    NotReady { token: String },

    /// Container is locked and cannot be modified
    #[error("Container is locked - the module graph can no longer be modified")]
    Locked,

    /// Internal error
    #[error("Internal DI error: {0}")]
    Internal(String),
}

fn in_module(module: &Option<String>) -> String {
    match module {
        Some(module) => format!(" in {module}"),
        None => String::new(),
    }
}

impl DiError {
    /// Create an UnknownElement error
    #[inline]
    pub fn unknown_element(token: impl ToString, module: Option<&str>) -> Self {
        Self::UnknownElement {
            token: token.to_string(),
            module: module.map(str::to_owned),
        }
    }

    /// Create an UnknownModule error
    #[inline]
    pub fn unknown_module(module: impl Into<String>) -> Self {
        Self::UnknownModule {
            module: module.into(),
        }
    }

    /// Create an InvalidClassScope error
    #[inline]
    pub fn invalid_scope(token: impl ToString, scope: Lifetime) -> Self {
        Self::InvalidClassScope {
            token: token.to_string(),
            scope,
        }
    }

    /// Create a CreationFailed error from a user error
    #[inline]
    pub fn creation_failed(token: impl ToString, source: BoxError) -> Self {
        Self::CreationFailed {
            token: token.to_string(),
            source: Arc::from(source),
        }
    }

    /// Create a CircularDependency error
    #[inline]
    pub fn circular(token: impl ToString, path: impl Into<String>) -> Self {
        Self::CircularDependency {
            token: token.to_string(),
            path: path.into(),
        }
    }

    /// Create a TypeMismatch error for type T
    #[inline]
    pub fn type_mismatch<T: 'static>(token: impl ToString) -> Self {
        Self::TypeMismatch {
            token: token.to_string(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Structural problems detected before any instance exists.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidModule { .. }
                | Self::UnknownExport { .. }
                | Self::MixedMultiProvider { .. }
                | Self::DuplicateProvider { .. }
                | Self::InvalidClassScope { .. }
                | Self::Locked
        )
    }

    /// Failures surfaced while looking up or instantiating providers.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::UnknownElement { .. }
                | Self::UnknownModule { .. }
                | Self::UnknownDependency { .. }
                | Self::CircularDependency { .. }
                | Self::NotReady { .. }
        )
    }

    /// Render this error followed by every `source()` in its cause chain.
    pub fn chain(&self) -> String {
        let mut rendered = self.to_string();
        let mut current = StdError::source(self);
        while let Some(cause) = current {
            rendered.push_str("\n  caused by: ");
            rendered.push_str(&cause.to_string());
            current = cause.source();
        }
        rendered
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;
