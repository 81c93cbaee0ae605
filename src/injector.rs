//! Scope-aware instantiation
//!
//! The [`Injector`] finds the wrapper a token refers to from a given module,
//! resolves its constructor dependencies and caches the result according to
//! the wrapper's effective lifetime:
//!
//! - **Singleton**: one instance in [`ContextId::STATIC`]
//! - **Request**: one instance per open [`RequestScope`](crate::RequestScope)
//! - **Transient**: a fresh instance on every resolution
//!
//! A second resolution of the same (wrapper, context) while the first is
//! still in flight awaits the same shared future instead of constructing
//! twice. Re-entering a wrapper that is already on the current resolution
//! path is a circular dependency.

use crate::container::ModuleContainer;
use crate::factory::{Arg, Args, Instance, MultiInstance, ProviderKind, downcast};
use crate::record::ModuleRecord;
use crate::wrapper::{Body, InstanceWrapper, Slot};
use crate::{ContextId, Dependency, DiError, Lifetime, Result, Token};
use dashmap::mapref::entry::Entry;
use futures::future::{self, BoxFuture, FutureExt, TryFutureExt};
use std::collections::HashSet;
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{error, trace};

/// Wrappers entered on the current resolution path, with their context
type ResolutionPath = Arc<Vec<(usize, ContextId, Token)>>;

fn render_path(path: &[(usize, ContextId, Token)], last: &Token) -> String {
    path.iter()
        .map(|(_, _, token)| token.name())
        .chain(std::iter::once(last.name()))
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Resolves providers against the module graph of a [`ModuleContainer`].
#[derive(Clone)]
pub struct Injector {
    container: Arc<ModuleContainer>,
}

impl Injector {
    pub fn new(container: Arc<ModuleContainer>) -> Self {
        Self { container }
    }

    #[inline]
    pub fn container(&self) -> &Arc<ModuleContainer> {
        &self.container
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Find the wrapper `token` refers to from inside `module`.
    ///
    /// The module's own providers come first, then the providers exported by
    /// its imports. Modules re-exported by an import are searched as well.
    /// Returns the wrapper with the module it is registered in.
    pub fn lookup(
        &self,
        module: &Arc<ModuleRecord>,
        token: &Token,
    ) -> Option<(Arc<InstanceWrapper>, Arc<ModuleRecord>)> {
        if let Some(wrapper) = module.provider(token) {
            return Some((wrapper, Arc::clone(module)));
        }
        let mut visited = HashSet::new();
        visited.insert(module.token().to_owned());
        Self::lookup_in_imports(module, token, &mut visited, false)
    }

    fn lookup_in_imports(
        module: &ModuleRecord,
        token: &Token,
        visited: &mut HashSet<String>,
        traversing: bool,
    ) -> Option<(Arc<InstanceWrapper>, Arc<ModuleRecord>)> {
        for related in module.imports() {
            if traversing && !module.exports_module(&related.metatype()) {
                continue;
            }
            if !visited.insert(related.token().to_owned()) {
                continue;
            }
            if related.exports(token) {
                if let Some(wrapper) = related.provider(token) {
                    return Some((wrapper, related));
                }
            }
            if let Some(found) = Self::lookup_in_imports(&related, token, visited, true) {
                return Some(found);
            }
        }
        None
    }

    // =========================================================================
    // Instantiation
    // =========================================================================

    /// Resolve `wrapper` (registered in `host`) for `context`.
    pub fn load(
        &self,
        wrapper: Arc<InstanceWrapper>,
        host: Arc<ModuleRecord>,
        context: ContextId,
    ) -> BoxFuture<'static, Result<Instance>> {
        self.load_in(wrapper, host, context, Arc::new(Vec::new()))
    }

    fn load_in(
        &self,
        wrapper: Arc<InstanceWrapper>,
        host: Arc<ModuleRecord>,
        context: ContextId,
        path: ResolutionPath,
    ) -> BoxFuture<'static, Result<Instance>> {
        let injector = self.clone();
        async move {
            let scope = injector.effective_scope(&wrapper);
            let context = match scope {
                Lifetime::Singleton => ContextId::STATIC,
                Lifetime::Request if context.is_static() => {
                    return Err(DiError::invalid_scope(wrapper.token(), Lifetime::Request));
                }
                _ => context,
            };

            let entered = path
                .iter()
                .any(|(addr, entered, _)| *addr == wrapper.addr() && *entered == context);
            if entered {
                return Err(DiError::circular(wrapper.token(), render_path(&path, wrapper.token())));
            }
            let mut next = Vec::with_capacity(path.len() + 1);
            next.extend(path.iter().cloned());
            next.push((wrapper.addr(), context, wrapper.token().clone()));
            let path = Arc::new(next);

            if scope == Lifetime::Transient {
                return injector.instantiate(wrapper, host, context, path).await;
            }

            let pending = match wrapper.slots().entry(context) {
                Entry::Occupied(entry) => match entry.get() {
                    Slot::Ready(instance) => return Ok(Arc::clone(instance)),
                    Slot::Pending(pending) => pending.clone(),
                },
                Entry::Vacant(entry) => {
                    let pending = injector
                        .clone()
                        .settle(Arc::clone(&wrapper), host, context, path)
                        .boxed()
                        .shared();
                    entry.insert(Slot::Pending(pending.clone()));
                    pending
                }
            };
            pending.await
        }
        .boxed()
    }

    /// Run the construction and publish the outcome in the wrapper's slot.
    async fn settle(
        self,
        wrapper: Arc<InstanceWrapper>,
        host: Arc<ModuleRecord>,
        context: ContextId,
        path: ResolutionPath,
    ) -> Result<Instance> {
        let created = self.instantiate(Arc::clone(&wrapper), host, context, path).await;
        let cached = match &created {
            Ok(instance) => {
                let cache = || {
                    wrapper.slots().insert(context, Slot::Ready(Arc::clone(instance)));
                };
                if context.is_static() {
                    cache();
                    true
                } else {
                    self.container.track(context, &wrapper, cache)
                }
            }
            Err(_) => false,
        };
        // Failed, or the request scope was released in the meantime.
        if !cached {
            wrapper.slots().remove(&context);
        }
        created
    }

    fn instantiate(
        &self,
        wrapper: Arc<InstanceWrapper>,
        host: Arc<ModuleRecord>,
        context: ContextId,
        path: ResolutionPath,
    ) -> BoxFuture<'static, Result<Instance>> {
        let injector = self.clone();
        async move {
            let recipe = match wrapper.body() {
                Body::Single(recipe) => recipe,
                Body::Multi { local, linked } => {
                    let loads = local.into_iter().chain(linked).map(|contribution| {
                        let owner = contribution.host().unwrap_or_else(|| Arc::clone(&host));
                        injector.load_in(contribution, owner, context, Arc::clone(&path))
                    });
                    let instances = future::try_join_all(loads).await?;
                    return Ok(Arc::new(MultiInstance(instances)) as Instance);
                }
            };

            #[cfg(feature = "logging")]
            trace!(
                target: "modular_di",
                token = %wrapper.token(),
                module = host.name(),
                kind = recipe.kind.label(),
                context = %context,
                "Instantiating provider"
            );

            match recipe.kind {
                ProviderKind::Value { instance, .. } => Ok(instance),
                ProviderKind::Existing(target) => {
                    let Some((aliased, owner)) = injector.lookup(&host, &target) else {
                        let inject = [Dependency::token(target)];
                        return Err(unknown_dependency(wrapper.token(), &inject, 0, &host));
                    };
                    injector.load_in(aliased, owner, context, path).await
                }
                ProviderKind::Factory { create, .. } | ProviderKind::Class { create, .. } => {
                    let args = injector
                        .resolve_args(wrapper.token().clone(), &recipe.inject, &host, context, &path)
                        .await?;
                    create(args).await.map_err(|source| {
                        let err = DiError::creation_failed(wrapper.token(), source);

                        #[cfg(feature = "logging")]
                        error!(
                            target: "modular_di",
                            token = %wrapper.token(),
                            module = host.name(),
                            chain = %err.chain(),
                            "Provider construction failed"
                        );

                        err
                    })
                }
            }
        }
        .boxed()
    }

    /// Resolve every declared dependency of `target` concurrently.
    async fn resolve_args(
        &self,
        target: Token,
        inject: &[Dependency],
        host: &Arc<ModuleRecord>,
        context: ContextId,
        path: &ResolutionPath,
    ) -> Result<Args> {
        let mut pending: Vec<BoxFuture<'static, Result<Arg>>> = Vec::with_capacity(inject.len());
        for (index, dependency) in inject.iter().enumerate() {
            let Some((wrapper, owner)) = self.lookup(host, &dependency.token) else {
                if dependency.optional {
                    pending.push(future::ok(Arg::Missing).boxed());
                    continue;
                }
                return Err(unknown_dependency(&target, inject, index, host));
            };
            if dependency.forward {
                let forward = ForwardRef::new(&self.container, &wrapper, &owner, context);
                pending.push(future::ok(Arg::Forward(forward)).boxed());
                continue;
            }
            pending.push(
                self.load_in(wrapper, owner, context, Arc::clone(path))
                    .map_ok(Arg::Instance)
                    .boxed(),
            );
        }
        let values = future::try_join_all(pending).await?;
        Ok(Args::new(target, values))
    }

    // =========================================================================
    // Scope analysis
    // =========================================================================

    /// Lifetime after taking the dependency tree into account.
    ///
    /// A provider that depends, directly or transitively, on a request-scoped
    /// provider is request-scoped itself. The result is memoized once the
    /// container is locked.
    pub fn effective_scope(&self, wrapper: &Arc<InstanceWrapper>) -> Lifetime {
        if let Some(scope) = wrapper.effective().get() {
            return *scope;
        }
        let scope = self.compute_scope(wrapper);
        if self.container.is_locked() {
            let _ = wrapper.effective().set(scope);
        }
        scope
    }

    fn compute_scope(&self, wrapper: &Arc<InstanceWrapper>) -> Lifetime {
        let transient = match wrapper.body() {
            Body::Single(recipe) => recipe.scope == Lifetime::Transient,
            Body::Multi { local, linked } => local
                .iter()
                .chain(linked.iter())
                .any(|contribution| contribution.declared_scope() == Lifetime::Transient),
        };
        if transient {
            return Lifetime::Transient;
        }
        let mut visited = HashSet::new();
        if self.is_request_tree(wrapper, &mut visited) {
            Lifetime::Request
        } else {
            Lifetime::Singleton
        }
    }

    fn is_request_tree(&self, wrapper: &Arc<InstanceWrapper>, visited: &mut HashSet<usize>) -> bool {
        if !visited.insert(wrapper.addr()) {
            return false;
        }
        match wrapper.body() {
            Body::Single(recipe) => {
                if recipe.scope == Lifetime::Request {
                    return true;
                }
                let Some(host) = wrapper.host() else {
                    return false;
                };
                recipe.edges().iter().filter(|dep| !dep.forward).any(|dep| {
                    self.lookup(&host, &dep.token)
                        .is_some_and(|(next, _)| self.is_request_tree(&next, visited))
                })
            }
            Body::Multi { local, linked } => local
                .iter()
                .chain(linked.iter())
                .any(|contribution| self.is_request_tree(contribution, visited)),
        }
    }

    /// Reject provider cycles that no forward dependency breaks.
    ///
    /// Missing dependencies are left to resolution, where the failing
    /// position can be reported.
    pub fn verify_graph(&self) -> Result<()> {
        let mut checked = HashSet::new();
        for module in self.container.modules() {
            for wrapper in module.all_wrappers() {
                let mut chain = Vec::new();
                self.check_recurse(&wrapper, &mut checked, &mut chain)?;
            }
        }
        Ok(())
    }

    fn check_recurse(
        &self,
        wrapper: &Arc<InstanceWrapper>,
        checked: &mut HashSet<usize>,
        chain: &mut Vec<(usize, Token)>,
    ) -> Result<()> {
        if chain.iter().any(|(addr, _)| *addr == wrapper.addr()) {
            let path = chain
                .iter()
                .map(|(_, token)| token.name())
                .chain(std::iter::once(wrapper.token().name()))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(DiError::circular(wrapper.token(), path));
        }
        if !checked.insert(wrapper.addr()) {
            return Ok(());
        }

        chain.push((wrapper.addr(), wrapper.token().clone()));
        let next: Vec<Arc<InstanceWrapper>> = match wrapper.body() {
            Body::Single(recipe) => match wrapper.host() {
                Some(host) => recipe
                    .edges()
                    .iter()
                    .filter(|dep| !dep.forward)
                    .filter_map(|dep| self.lookup(&host, &dep.token).map(|(next, _)| next))
                    .collect(),
                None => Vec::new(),
            },
            Body::Multi { local, linked } => local.into_iter().chain(linked).collect(),
        };
        for dependency in &next {
            self.check_recurse(dependency, checked, chain)?;
        }
        chain.pop();
        Ok(())
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("container", &self.container)
            .finish()
    }
}

fn unknown_dependency(target: &Token, inject: &[Dependency], index: usize, host: &ModuleRecord) -> DiError {
    let signature = inject
        .iter()
        .enumerate()
        .map(|(position, dep)| if position == index { "?" } else { dep.token.name() })
        .collect::<Vec<_>>()
        .join(", ");
    DiError::UnknownDependency {
        target: target.to_string(),
        module: host.name().to_owned(),
        dependency: inject
            .get(index)
            .map_or_else(|| "?".to_owned(), |dep| dep.token.to_string()),
        index,
        count: inject.len(),
        signature,
    }
}

/// Deferred handle to a dependency declared with [`Dependency::forward`].
///
/// The target may still be under construction when the handle is created;
/// [`get`](Self::get) succeeds once it is ready, [`resolve`](Self::resolve)
/// waits for it.
#[derive(Clone)]
pub struct ForwardRef {
    container: Weak<ModuleContainer>,
    wrapper: Weak<InstanceWrapper>,
    host: Weak<ModuleRecord>,
    token: Token,
    context: ContextId,
}

impl ForwardRef {
    pub(crate) fn new(
        container: &Arc<ModuleContainer>,
        wrapper: &Arc<InstanceWrapper>,
        host: &Arc<ModuleRecord>,
        context: ContextId,
    ) -> Self {
        Self {
            container: Arc::downgrade(container),
            wrapper: Arc::downgrade(wrapper),
            host: Arc::downgrade(host),
            token: wrapper.token().clone(),
            context,
        }
    }

    /// Token the handle refers to
    #[inline]
    pub fn token(&self) -> &Token {
        &self.token
    }

    fn parts(&self) -> Result<(Injector, Arc<InstanceWrapper>, Arc<ModuleRecord>)> {
        match (self.container.upgrade(), self.wrapper.upgrade(), self.host.upgrade()) {
            (Some(container), Some(wrapper), Some(host)) => Ok((Injector::new(container), wrapper, host)),
            _ => Err(DiError::unknown_element(&self.token, None)),
        }
    }

    /// Instance, if it has been constructed already
    pub fn get(&self) -> Result<Instance> {
        let (injector, wrapper, _) = self.parts()?;
        let context = match injector.effective_scope(&wrapper) {
            Lifetime::Singleton => ContextId::STATIC,
            _ => self.context,
        };
        wrapper.instance(context).ok_or_else(|| DiError::NotReady {
            token: self.token.to_string(),
        })
    }

    /// Typed [`get`](Self::get)
    pub fn get_as<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        downcast(self.get()?, &self.token)
    }

    /// Await the instance, constructing it if needed
    pub async fn resolve(&self) -> Result<Instance> {
        let (injector, wrapper, host) = self.parts()?;
        injector.load(wrapper, host, self.context).await
    }

    /// Typed [`resolve`](Self::resolve)
    pub async fn resolve_as<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        downcast(self.resolve().await?, &self.token)
    }
}

impl std::fmt::Debug for ForwardRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardRef")
            .field("token", &self.token)
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Export, ModuleType};
    use crate::{ContainerConfig, Module, ModuleMetadata, ModuleRef, Provider};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AppModule;
    impl Module for AppModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
        }
    }

    struct DbModule;
    impl Module for DbModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
        }
    }

    struct Fixture {
        injector: Injector,
        app: Arc<ModuleRecord>,
        db: Arc<ModuleRecord>,
    }

    fn fixture() -> Fixture {
        let container = ModuleContainer::new(ContainerConfig::default());
        let (app, _) = container.add_module(&ModuleRef::of::<AppModule>(), &[]).unwrap();
        let (db, _) = container
            .add_module(&ModuleRef::of::<DbModule>(), &[ModuleType::of::<AppModule>()])
            .unwrap();
        container.add_import(&app, &db).unwrap();
        Fixture {
            injector: Injector::new(container),
            app,
            db,
        }
    }

    impl Fixture {
        fn provide(&self, module: &Arc<ModuleRecord>, provider: Provider) {
            self.injector.container().add_provider(module, provider).unwrap();
        }

        async fn load(&self, token: &'static str, context: ContextId) -> Result<Instance> {
            let (wrapper, host) = self
                .injector
                .lookup(&self.app, &Token::named(token))
                .ok_or_else(|| DiError::unknown_element(token, None))?;
            self.injector.load(wrapper, host, context).await
        }
    }

    #[test]
    fn test_lookup_requires_export() {
        let fixture = fixture();
        fixture.provide(&fixture.db, Provider::value("URL", "postgres"));

        assert!(fixture.injector.lookup(&fixture.app, &Token::named("URL")).is_none());
        fixture.db.add_export(&Export::from("URL")).unwrap();
        let (_, host) = fixture.injector.lookup(&fixture.app, &Token::named("URL")).unwrap();
        assert!(Arc::ptr_eq(&host, &fixture.db));
    }

    #[tokio::test]
    async fn test_singleton_is_built_once() {
        let fixture = fixture();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        fixture.provide(
            &fixture.app,
            Provider::factory_sync("SVC", Vec::<Dependency>::new(), move |_| {
                Ok(counter.fetch_add(1, Ordering::SeqCst))
            }),
        );

        let (first, second) = futures::join!(
            fixture.load("SVC", ContextId::STATIC),
            fixture.load("SVC", ContextId::new())
        );

        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_request_scope_shares_in_flight_construction() {
        let fixture = fixture();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        fixture.provide(
            &fixture.app,
            Provider::factory("SLOW", Vec::<Dependency>::new(), move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    tokio::task::yield_now().await;
                    Ok::<_, crate::BoxError>(counter.fetch_add(1, Ordering::SeqCst))
                }
            })
            .with_scope(Lifetime::Request),
        );
        let context = ContextId::new();
        fixture.injector.container().register_context(context);

        let (first, second) = futures::join!(fixture.load("SLOW", context), fixture.load("SLOW", context));
        let first = first.unwrap();
        assert!(Arc::ptr_eq(&first, &second.unwrap()));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &fixture.load("SLOW", context).await.unwrap()));

        // Another context builds its own instance
        let other = fixture.load("SLOW", ContextId::new()).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_released_context_is_not_cached() {
        let fixture = fixture();
        fixture.provide(
            &fixture.app,
            Provider::factory_sync("REQ", Vec::<Dependency>::new(), |_| Ok(1_u8)).with_scope(Lifetime::Request),
        );
        let container = fixture.injector.container();
        let context = ContextId::new();
        container.register_context(context);

        fixture.load("REQ", context).await.unwrap();
        let (wrapper, _) = fixture.injector.lookup(&fixture.app, &Token::named("REQ")).unwrap();
        assert!(wrapper.is_resolved(context));

        assert_eq!(container.release_context(context), 1);
        assert!(!wrapper.is_resolved(context));
        fixture.load("REQ", context).await.unwrap();
        assert!(!wrapper.is_resolved(context));
    }

    #[tokio::test]
    async fn test_request_scope_is_contagious() {
        let fixture = fixture();
        fixture.provide(
            &fixture.app,
            Provider::factory_sync("REQ", Vec::<Dependency>::new(), |_| Ok(1_u8)).with_scope(Lifetime::Request),
        );
        fixture.provide(
            &fixture.app,
            Provider::factory_sync("SVC", ["REQ"], |args| Ok(*args.get::<u8>(0)? + 1)),
        );

        let (wrapper, _) = fixture.injector.lookup(&fixture.app, &Token::named("SVC")).unwrap();
        assert_eq!(fixture.injector.effective_scope(&wrapper), Lifetime::Request);
        assert!(matches!(
            fixture.load("SVC", ContextId::STATIC).await,
            Err(DiError::InvalidClassScope { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_dependency_reports_position() {
        let fixture = fixture();
        fixture.provide(&fixture.app, Provider::value("A", 1_u8));
        fixture.provide(
            &fixture.app,
            Provider::factory_sync("SVC", ["A", "MISSING"], |_| Ok(())),
        );

        match fixture.load("SVC", ContextId::STATIC).await {
            Err(DiError::UnknownDependency {
                index,
                count,
                signature,
                module,
                ..
            }) => {
                assert_eq!(index, 1);
                assert_eq!(count, 2);
                assert_eq!(signature, "A, ?");
                assert_eq!(module, "AppModule");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cycle_is_reported() {
        let fixture = fixture();
        fixture.provide(&fixture.app, Provider::factory_sync("A", ["B"], |_| Ok(())));
        fixture.provide(&fixture.app, Provider::factory_sync("B", ["A"], |_| Ok(())));

        let err = fixture.injector.verify_graph().unwrap_err();
        assert!(matches!(err, DiError::CircularDependency { .. }));

        match fixture.load("A", ContextId::STATIC).await {
            Err(DiError::CircularDependency { path, .. }) => assert_eq!(path, "A -> B -> A"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_forward_dependency_breaks_cycle() {
        let fixture = fixture();
        fixture.provide(
            &fixture.app,
            Provider::factory_sync("A", [Dependency::token("B").forward()], |args| Ok(args.forward(0)?)),
        );
        fixture.provide(&fixture.app, Provider::factory_sync("B", ["A"], |_| Ok("b")));

        fixture.injector.verify_graph().unwrap();
        let a = fixture.load("A", ContextId::STATIC).await.unwrap();
        let forward = a.downcast::<ForwardRef>().unwrap();
        assert!(matches!(forward.get(), Err(DiError::NotReady { .. })));

        fixture.load("B", ContextId::STATIC).await.unwrap();
        assert_eq!(*forward.get_as::<&str>().unwrap(), "b");
    }

    #[tokio::test]
    async fn test_failed_factory_is_retried() {
        let fixture = fixture();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        fixture.provide(
            &fixture.app,
            Provider::factory_sync("FLAKY", Vec::<Dependency>::new(), move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("first attempt".into())
                } else {
                    Ok(())
                }
            }),
        );

        assert!(matches!(
            fixture.load("FLAKY", ContextId::STATIC).await,
            Err(DiError::CreationFailed { .. })
        ));
        assert!(fixture.load("FLAKY", ContextId::STATIC).await.is_ok());
    }
}
