//! # Modular DI - Module-Graph Dependency Injection for Rust
//!
//! An application is a graph of modules. Each module declares the providers
//! it owns, the modules it imports and the tokens it exports; the container
//! compiles the graph, resolves the provider dependency graph and
//! instantiates everything in dependency order.
//!
//! ## Features
//!
//! - 🧩 **Modules** - static modules, dynamic modules configured at
//!   registration time and forward references for circular imports
//! - 🔑 **Opaque keys** - equivalent dynamic modules collapse to one record
//!   (deep content hash or object identity)
//! - ⏱️ **Scopes** - singleton, request and transient lifetimes; request scope is
//!   contagious through the dependency graph
//! - 📚 **Multi providers** - one token bound to an ordered list of contributions
//! - ⚡ **Async** - factories are async; unrelated providers are built concurrently
//!   and in-flight constructions are shared
//! - 📊 **Observable** - optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use modular_di::{ApplicationContext, Args, BoxError, ContainerConfig, Dependency};
//! use modular_di::{Module, ModuleMetadata, ModuleRef, Provider, Service};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: Arc<&'static str>,
//! }
//!
//! impl Service for Database {
//!     fn dependencies() -> Vec<Dependency> {
//!         vec![Dependency::token("DB_URL")]
//!     }
//!
//!     fn create(args: Args) -> Result<Self, BoxError> {
//!         Ok(Database { url: args.get(0)? })
//!     }
//! }
//!
//! struct DatabaseModule;
//!
//! impl Module for DatabaseModule {
//!     fn metadata() -> ModuleMetadata {
//!         ModuleMetadata::new()
//!             .provider(Provider::value("DB_URL", "postgres://localhost"))
//!             .provider(Provider::class::<Database>())
//!             .export(modular_di::Export::of::<Database>())
//!     }
//! }
//!
//! struct AppModule;
//!
//! impl Module for AppModule {
//!     fn metadata() -> ModuleMetadata {
//!         ModuleMetadata::new().import(ModuleRef::of::<DatabaseModule>())
//!     }
//! }
//!
//! # async fn run() -> modular_di::Result<()> {
//! let app = ApplicationContext::create(ModuleRef::of::<AppModule>(), ContainerConfig::default()).await?;
//! let db = app.get_as::<Database>()?;
//! assert_eq!(*db.url, "postgres://localhost");
//! # Ok(())
//! # }
//! ```
//!
//! ## Request Scope
//!
//! ```rust
//! # use modular_di::ApplicationContext;
//! # async fn run(app: ApplicationContext) -> modular_di::Result<()> {
//! let scope = app.create_request_scope();
//! let first = app.resolve("REQUEST_ID", Some(&scope)).await?;
//! let second = app.resolve("REQUEST_ID", Some(&scope)).await?;
//! assert!(std::sync::Arc::ptr_eq(&first, &second));
//!
//! // Releasing the scope evicts every instance built for it
//! scope.release();
//! # Ok(())
//! # }
//! ```

mod compiler;
mod config;
mod container;
mod context;
mod error;
mod factory;
mod injector;
#[cfg(feature = "logging")]
pub mod logging;
mod module;
mod opaque_key;
mod provider;
mod record;
mod scanner;
mod scope;
mod storage;
pub mod testing;
mod topology;
mod wrapper;

pub use compiler::*;
pub use config::*;
pub use container::*;
pub use context::*;
pub use error::*;
pub use factory::*;
pub use injector::*;
pub use module::*;
pub use opaque_key::*;
pub use provider::*;
pub use record::*;
pub use scanner::*;
pub use scope::*;
pub use storage::*;
pub use topology::*;
pub use wrapper::{ControllerMetadata, EnhancerInfo, InstanceWrapper, WrapperKind};

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::testing::TestingModuleBuilder;
    pub use crate::{
        ApplicationContext, Args, BoxError, ContainerConfig, Controller, Dependency, DiError, DynamicModule, Export,
        ForwardRef, Lifetime, Module, ModuleMetadata, ModuleRef, Provider, RequestScope, Result, Service, Token,
    };
    pub use std::sync::Arc;
}
