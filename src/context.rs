//! Application context
//!
//! [`ApplicationContext`] is the entry point of the crate: it scans a root
//! module, instantiates every singleton, runs `on_module_init` hooks and then
//! serves lookups.
//!
//! # Examples
//!
//! ```rust
//! use modular_di::{ApplicationContext, ContainerConfig, Module, ModuleMetadata, ModuleRef, Provider};
//!
//! struct AppModule;
//!
//! impl Module for AppModule {
//!     fn metadata() -> ModuleMetadata {
//!         ModuleMetadata::new().provider(Provider::value("GREETING", "hello"))
//!     }
//! }
//!
//! # async fn run() -> modular_di::Result<()> {
//! let app = ApplicationContext::create(ModuleRef::of::<AppModule>(), ContainerConfig::default()).await?;
//! let greeting = app.get("GREETING")?.downcast::<&str>().unwrap();
//! assert_eq!(*greeting, "hello");
//! app.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::container::ModuleContainer;
use crate::factory::{MultiInstance, downcast};
use crate::injector::Injector;
use crate::record::ModuleRecord;
use crate::scanner::{DependenciesScanner, ModuleOverride};
use crate::wrapper::InstanceWrapper;
use crate::{ContainerConfig, ContextId, DiError, Instance, Lifetime, ModuleRef, Provider, RequestScope, Result, Token};
use futures::future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, info};

/// Diagnostic view of one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntrospectionResult {
    /// Effective lifetime, including scope inherited from dependencies
    pub scope: Lifetime,
}

#[derive(Debug, Clone, Copy)]
enum Hook {
    Init,
    Destroy,
}

impl Hook {
    fn name(self) -> &'static str {
        match self {
            Self::Init => "on_module_init",
            Self::Destroy => "on_module_destroy",
        }
    }
}

/// A compiled, instantiated module graph.
///
/// Cloning is cheap; clones share the container. [`select`](Self::select)
/// returns a clone whose lookups start from another module.
#[derive(Clone)]
pub struct ApplicationContext {
    container: Arc<ModuleContainer>,
    injector: Injector,
    module: Arc<ModuleRecord>,
    closed: Arc<AtomicBool>,
}

impl ApplicationContext {
    /// Scan `root`, instantiate every singleton and run init hooks.
    pub async fn create(root: impl Into<ModuleRef>, config: ContainerConfig) -> Result<Self> {
        Self::bootstrap(root.into(), config, Vec::new(), Vec::new()).await
    }

    pub(crate) async fn bootstrap(
        root: ModuleRef,
        config: ContainerConfig,
        module_overrides: Vec<ModuleOverride>,
        provider_overrides: Vec<Provider>,
    ) -> Result<Self> {
        let container = ModuleContainer::new(config);
        DependenciesScanner::new(Arc::clone(&container))
            .with_overrides(module_overrides)
            .with_provider_overrides(provider_overrides)
            .scan(&root)?;
        container.lock();

        let injector = Injector::new(Arc::clone(&container));
        injector.verify_graph()?;

        let module = container
            .root()
            .ok_or_else(|| DiError::Internal("the module graph has no root".to_owned()))?;
        let app = Self {
            container,
            injector,
            module,
            closed: Arc::new(AtomicBool::new(false)),
        };
        app.instantiate().await?;
        if app.container.config().lifecycle_hooks {
            app.call_hooks(Hook::Init).await?;
        }

        #[cfg(feature = "logging")]
        info!(
            target: "modular_di",
            root = app.module.name(),
            modules = app.container.len(),
            "Application context initialized"
        );

        Ok(app)
    }

    /// Build every singleton, module by module, providers of one module
    /// concurrently.
    async fn instantiate(&self) -> Result<()> {
        for module in self.container.modules() {
            let singletons: Vec<Arc<InstanceWrapper>> = module
                .all_wrappers()
                .into_iter()
                .filter(|wrapper| self.injector.effective_scope(wrapper) == Lifetime::Singleton)
                .collect();
            let count = singletons.len();
            let loads = singletons
                .into_iter()
                .map(|wrapper| self.injector.load(wrapper, Arc::clone(&module), ContextId::STATIC));
            future::try_join_all(loads).await?;

            #[cfg(feature = "logging")]
            debug!(
                target: "modular_di",
                module = module.name(),
                instances = count,
                "Instantiated module"
            );

            #[cfg(not(feature = "logging"))]
            let _ = count;
        }
        Ok(())
    }

    /// Modules ordered deepest first; global modules lead.
    fn ordered_modules(&self) -> Vec<Arc<ModuleRecord>> {
        let mut modules = self.container.modules();
        modules.sort_by(|a, b| b.distance().cmp(&a.distance()));
        modules
    }

    async fn call_hooks(&self, hook: Hook) -> Result<()> {
        for module in self.ordered_modules() {
            for wrapper in module.all_wrappers() {
                let targets = if wrapper.is_multi() {
                    wrapper.local_contributions()
                } else {
                    vec![wrapper]
                };
                for target in targets {
                    let hooks = target.hooks();
                    let callback = match hook {
                        Hook::Init => hooks.on_module_init,
                        Hook::Destroy => hooks.on_module_destroy,
                    };
                    let (Some(callback), Some(instance)) = (callback, target.instance(ContextId::STATIC)) else {
                        continue;
                    };

                    #[cfg(feature = "logging")]
                    debug!(
                        target: "modular_di",
                        module = module.name(),
                        token = %target.token(),
                        hook = hook.name(),
                        "Calling lifecycle hook"
                    );

                    callback(instance).await.map_err(|source| DiError::HookFailed {
                        token: target.token().to_string(),
                        hook: hook.name(),
                        source: Arc::from(source),
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Run `on_module_destroy` hooks. Only the first call has an effect.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if self.container.config().lifecycle_hooks {
            self.call_hooks(Hook::Destroy).await?;
        }

        #[cfg(feature = "logging")]
        info!(target: "modular_di", root = self.module.name(), "Application context closed");

        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    fn find(&self, token: &Token) -> Result<(Arc<InstanceWrapper>, Arc<ModuleRecord>)> {
        if let Some(wrapper) = self.module.wrapper(token) {
            return Ok((wrapper, Arc::clone(&self.module)));
        }
        self.container
            .instance_links(token)
            .pop()
            .map(|link| (link.wrapper, link.module))
            .ok_or_else(|| DiError::unknown_element(token, None))
    }

    fn singleton(&self, wrapper: &Arc<InstanceWrapper>) -> Result<Instance> {
        match self.injector.effective_scope(wrapper) {
            Lifetime::Singleton => wrapper.instance(ContextId::STATIC).ok_or_else(|| DiError::NotReady {
                token: wrapper.token().to_string(),
            }),
            scope => Err(DiError::invalid_scope(wrapper.token(), scope)),
        }
    }

    /// Singleton registered under `token`, searching the selected module
    /// first and then every module of the graph.
    pub fn get(&self, token: impl Into<Token>) -> Result<Instance> {
        let (wrapper, _) = self.find(&token.into())?;
        self.singleton(&wrapper)
    }

    /// Singleton registered in the selected module itself
    pub fn get_strict(&self, token: impl Into<Token>) -> Result<Instance> {
        let token = token.into();
        let wrapper = self
            .module
            .wrapper(&token)
            .ok_or_else(|| DiError::unknown_element(&token, Some(self.module.name())))?;
        self.singleton(&wrapper)
    }

    /// Singleton registered under the type token of `T`
    pub fn get_as<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let token = Token::of::<T>();
        downcast(self.get(token.clone())?, &token)
    }

    /// Every contribution of a multi-provider token
    pub fn get_multi<T: Send + Sync + 'static>(&self, token: impl Into<Token>) -> Result<Vec<Arc<T>>> {
        let token = token.into();
        let list = downcast::<MultiInstance>(self.get(token.clone())?, &token)?;
        list.downcast_all(&token)
    }

    /// Resolve `token` for a request scope, constructing it if needed.
    ///
    /// Without a scope a temporary one is opened and released afterwards, so
    /// request-scoped providers come out fresh. Singletons resolve to the
    /// shared instance either way.
    pub async fn resolve(&self, token: impl Into<Token>, scope: Option<&RequestScope>) -> Result<Instance> {
        let (wrapper, host) = self.find(&token.into())?;
        let temporary = match scope {
            Some(_) => None,
            None => Some(self.create_request_scope()),
        };
        let context = scope.or(temporary.as_ref()).map_or(ContextId::STATIC, RequestScope::id);
        self.injector.load(wrapper, host, context).await
    }

    /// Typed [`resolve`](Self::resolve) through the type token of `T`
    pub async fn resolve_as<T: Send + Sync + 'static>(&self, scope: Option<&RequestScope>) -> Result<Arc<T>> {
        let token = Token::of::<T>();
        downcast(self.resolve(token.clone(), scope).await?, &token)
    }

    /// Effective scope of the provider registered under `token`
    pub fn introspect(&self, token: impl Into<Token>) -> Result<IntrospectionResult> {
        let (wrapper, _) = self.find(&token.into())?;
        Ok(IntrospectionResult {
            scope: self.injector.effective_scope(&wrapper),
        })
    }

    /// Context whose lookups start from `module`
    pub fn select(&self, module: impl Into<ModuleRef>) -> Result<Self> {
        let module = module.into();
        let record = self
            .container
            .find_module(&module)
            .or_else(|| self.container.find_module_by_type(&module.module_type()))
            .ok_or_else(|| DiError::unknown_module(module.name()))?;
        Ok(Self {
            module: record,
            ..self.clone()
        })
    }

    /// Open a request context
    pub fn create_request_scope(&self) -> RequestScope {
        RequestScope::open(&self.container)
    }

    #[inline]
    pub fn container(&self) -> &Arc<ModuleContainer> {
        &self.container
    }

    #[inline]
    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    /// Module lookups start from
    #[inline]
    pub fn module(&self) -> &Arc<ModuleRecord> {
        &self.module
    }
}

impl std::fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("module", &self.module.name())
            .field("container", &self.container)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dependency, Export, Module, ModuleMetadata};
    use parking_lot::Mutex;

    static EVENTS: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

    struct LeafModule;
    impl Module for LeafModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
                .provider(
                    Provider::value("LEAF", "leaf")
                        .on_module_init::<&'static str, _, _>(|_| async {
                            EVENTS.lock().push("leaf:init");
                            Ok(())
                        })
                        .on_module_destroy::<&'static str, _, _>(|_| async {
                            EVENTS.lock().push("leaf:destroy");
                            Ok(())
                        }),
                )
                .export("LEAF")
        }
    }

    struct HookedModule;
    impl Module for HookedModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
                .import(ModuleRef::of::<LeafModule>())
                .provider(
                    Provider::factory_sync("ROOT", ["LEAF"], |args| Ok(args.get::<&str>(0)?.len()))
                        .on_module_init::<usize, _, _>(|_| async {
                            EVENTS.lock().push("root:init");
                            Ok(())
                        })
                        .on_module_destroy::<usize, _, _>(|_| async {
                            EVENTS.lock().push("root:destroy");
                            Ok(())
                        }),
                )
        }
    }

    #[tokio::test]
    async fn test_hooks_run_deepest_first() {
        let app = ApplicationContext::create(ModuleRef::of::<HookedModule>(), ContainerConfig::default())
            .await
            .unwrap();
        assert_eq!(*EVENTS.lock(), ["leaf:init", "root:init"]);

        app.close().await.unwrap();
        app.close().await.unwrap();
        assert_eq!(
            *EVENTS.lock(),
            ["leaf:init", "root:init", "leaf:destroy", "root:destroy"]
        );
    }

    struct AppModule;
    impl Module for AppModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
                .import(ModuleRef::of::<CatsModule>())
                .provider(Provider::value("APP", 1_u8))
        }
    }

    struct CatsModule;
    impl Module for CatsModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
                .provider(Provider::value("CATS", 2_u8))
                .provider(
                    Provider::factory_sync("REQ", Vec::<Dependency>::new(), |_| Ok(3_u8))
                        .with_scope(Lifetime::Request),
                )
                .export(Export::from("CATS"))
        }
    }

    struct MissingModule;
    impl Module for MissingModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
        }
    }

    async fn app() -> ApplicationContext {
        ApplicationContext::create(
            ModuleRef::of::<AppModule>(),
            ContainerConfig::default().without_lifecycle_hooks(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_select_scopes_strict_lookup() {
        let app = app().await;
        assert!(matches!(app.get_strict("CATS"), Err(DiError::UnknownElement { .. })));
        assert!(app.get("CATS").is_ok());

        let cats = app.select(ModuleRef::of::<CatsModule>()).unwrap();
        assert_eq!(*cats.get_strict("CATS").unwrap().downcast::<u8>().unwrap(), 2);
        assert!(matches!(
            app.select(ModuleRef::of::<MissingModule>()),
            Err(DiError::UnknownModule { .. })
        ));
    }

    #[tokio::test]
    async fn test_scoped_provider_needs_resolve() {
        let app = app().await;
        assert!(matches!(
            app.get("REQ"),
            Err(DiError::InvalidClassScope {
                scope: Lifetime::Request,
                ..
            })
        ));
        assert_eq!(app.introspect("REQ").unwrap().scope, Lifetime::Request);

        let value = app.resolve("REQ", None).await.unwrap();
        assert_eq!(*value.downcast::<u8>().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_container_is_locked_after_init() {
        let app = app().await;
        assert!(app.container().is_locked());
        assert!(matches!(
            app.container().replace(Provider::value("APP", 9_u8)),
            Err(DiError::Locked)
        ));
    }
}
