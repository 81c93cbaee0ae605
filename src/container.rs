//! Module container
//!
//! The `ModuleContainer` owns every [`ModuleRecord`] of an application,
//! keyed by opaque key, plus the cross-module indexes the injector needs:
//! global modules, the wrappers registered under each token, and the
//! request contexts currently open.
//!
//! The graph is only written while scanning. Once [`ModuleContainer::lock`]
//! has been called every structural write fails with [`DiError::Locked`].

use crate::compiler::ModuleCompiler;
use crate::module::{Controller, DynamicModule, Export, ModuleRef, ModuleType};
use crate::record::ModuleRecord;
use crate::topology::TopologyTree;
use crate::wrapper::InstanceWrapper;
use crate::{ContainerConfig, ContextId, DiError, Provider, Result, Token};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// A wrapper together with the module it is registered in
#[derive(Clone, Debug)]
pub struct InstanceLink {
    pub module: Arc<ModuleRecord>,
    pub wrapper: Arc<InstanceWrapper>,
}

#[derive(Default)]
struct ModuleMap {
    order: Vec<Arc<ModuleRecord>>,
    by_token: HashMap<String, Arc<ModuleRecord>, RandomState>,
}

/// Registry of the compiled module graph.
pub struct ModuleContainer {
    config: ContainerConfig,
    compiler: ModuleCompiler,
    modules: RwLock<ModuleMap>,
    globals: RwLock<Vec<Arc<ModuleRecord>>>,
    instance_links: DashMap<Token, Vec<InstanceLink>, RandomState>,
    contexts: DashMap<ContextId, Vec<Weak<InstanceWrapper>>, RandomState>,
    /// Lock state - uses AtomicBool for fast lock checking (no contention)
    locked: AtomicBool,
}

impl ModuleContainer {
    /// Create an empty container
    pub fn new(config: ContainerConfig) -> Arc<Self> {
        #[cfg(feature = "logging")]
        debug!(
            target: "modular_di",
            strategy = ?config.strategy,
            "Creating module container"
        );

        let compiler = ModuleCompiler::new(config.key_factory());
        Arc::new(Self {
            config,
            compiler,
            modules: RwLock::new(ModuleMap::default()),
            globals: RwLock::new(Vec::new()),
            instance_links: DashMap::with_hasher(RandomState::new()),
            contexts: DashMap::with_hasher(RandomState::new()),
            locked: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    #[inline]
    pub fn compiler(&self) -> &ModuleCompiler {
        &self.compiler
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Register a module reference, returning the record and whether it is new.
    pub fn add_module(
        &self,
        reference: &ModuleRef,
        scope: &[ModuleType],
    ) -> Result<(Arc<ModuleRecord>, bool)> {
        let compiled = self.compiler.compile(reference);
        if let Some(existing) = self.get_module(&compiled.token) {
            return Ok((existing, false));
        }
        let global = compiled.module_type.metadata().global
            || compiled.dynamic_metadata.as_ref().is_some_and(|dynamic| dynamic.global);
        self.insert_module(
            compiled.token,
            compiled.module_type,
            compiled.dynamic_metadata,
            scope,
            global,
        )
    }

    /// Register a record under an already computed opaque key.
    ///
    /// An existing record with the same key wins; this is how equivalent
    /// imports collapse to one module.
    pub(crate) fn insert_module(
        &self,
        token: String,
        metatype: ModuleType,
        dynamic: Option<Arc<DynamicModule>>,
        scope: &[ModuleType],
        global: bool,
    ) -> Result<(Arc<ModuleRecord>, bool)> {
        self.check_not_locked()?;
        let mut modules = self.modules.write();
        if let Some(existing) = modules.by_token.get(&token) {
            return Ok((Arc::clone(existing), false));
        }

        let mut path = scope.to_vec();
        path.push(metatype);
        let record = ModuleRecord::new(token.clone(), metatype, dynamic, path, global);
        modules.order.push(Arc::clone(&record));
        modules.by_token.insert(token, Arc::clone(&record));
        drop(modules);

        if global {
            self.globals.write().push(Arc::clone(&record));
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "modular_di",
            module = record.name(),
            token = record.token(),
            global,
            depth = scope.len(),
            "Registered module"
        );

        Ok((record, true))
    }

    /// Record for an opaque key
    pub fn get_module(&self, token: &str) -> Option<Arc<ModuleRecord>> {
        self.modules.read().by_token.get(token).cloned()
    }

    /// Record a reference compiles to
    pub fn find_module(&self, reference: &ModuleRef) -> Option<Arc<ModuleRecord>> {
        let compiled = self.compiler.compile(reference);
        self.get_module(&compiled.token)
    }

    /// First record of the given module type
    pub fn find_module_by_type(&self, module: &ModuleType) -> Option<Arc<ModuleRecord>> {
        self.modules
            .read()
            .order
            .iter()
            .find(|record| record.metatype() == *module)
            .cloned()
    }

    /// Every record in registration order, root first
    pub fn modules(&self) -> Vec<Arc<ModuleRecord>> {
        self.modules.read().order.clone()
    }

    /// Root module
    pub fn root(&self) -> Option<Arc<ModuleRecord>> {
        self.modules.read().order.first().cloned()
    }

    /// Global modules in registration order
    pub fn globals(&self) -> Vec<Arc<ModuleRecord>> {
        self.globals.read().clone()
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.modules.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().order.is_empty()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    pub(crate) fn add_import(&self, module: &ModuleRecord, related: &Arc<ModuleRecord>) -> Result<()> {
        self.check_not_locked()?;
        module.add_import(related);
        Ok(())
    }

    pub(crate) fn add_provider(&self, module: &Arc<ModuleRecord>, provider: Provider) -> Result<()> {
        self.check_not_locked()?;

        #[cfg(feature = "logging")]
        trace!(
            target: "modular_di",
            module = module.name(),
            token = %provider.token,
            kind = provider.kind.label(),
            scope = %provider.scope,
            multi = provider.multi,
            "Registering provider"
        );

        let wrapper = module.add_provider(provider)?;
        self.link(module, wrapper);
        Ok(())
    }

    pub(crate) fn add_controller(&self, module: &Arc<ModuleRecord>, controller: Controller) -> Result<()> {
        self.check_not_locked()?;
        for enhancer in &controller.enhancers {
            let wrapper = module.add_injectable(enhancer.provider.clone());
            self.link(module, wrapper);
        }
        let wrapper = module.add_controller(controller);
        self.link(module, wrapper);
        Ok(())
    }

    pub(crate) fn add_export(&self, module: &ModuleRecord, export: &Export) -> Result<()> {
        self.check_not_locked()?;
        module.add_export(export)
    }

    fn link(&self, module: &Arc<ModuleRecord>, wrapper: Arc<InstanceWrapper>) {
        let mut links = self.instance_links.entry(wrapper.token().clone()).or_default();
        if !links.iter().any(|link| Arc::ptr_eq(&link.wrapper, &wrapper)) {
            links.push(InstanceLink {
                module: Arc::clone(module),
                wrapper,
            });
        }
    }

    /// Every wrapper registered under `token`, in registration order
    pub fn instance_links(&self, token: &Token) -> Vec<InstanceLink> {
        self.instance_links
            .get(token)
            .map(|links| links.clone())
            .unwrap_or_default()
    }

    /// Make every global module an import of every other module
    pub(crate) fn bind_global_scope(&self) {
        let globals = self.globals();
        for module in self.modules() {
            for global in &globals {
                if !Arc::ptr_eq(&module, global) {
                    module.add_import(global);
                }
            }
        }
    }

    /// Append the multi-provider contributions exported by imported modules.
    ///
    /// Runs after every module registered its own providers, so modules
    /// importing each other see both sides regardless of scan order. Only
    /// local contributions are linked, which keeps each one listed once.
    pub(crate) fn link_multi_providers(&self) -> Result<()> {
        self.check_not_locked()?;
        let multi_tokens: Vec<Token> = self
            .instance_links
            .iter()
            .filter(|entry| entry.value().iter().any(|link| link.wrapper.is_multi()))
            .map(|entry| entry.key().clone())
            .collect();

        for module in self.modules() {
            for token in &multi_tokens {
                let imported = Self::exported_contributions(&module, token);
                if imported.is_empty() {
                    continue;
                }
                let wrapper = match module.provider(token) {
                    Some(wrapper) if wrapper.is_multi() => wrapper,
                    Some(_) => {
                        return Err(DiError::MixedMultiProvider {
                            token: token.to_string(),
                            module: module.name().to_owned(),
                        });
                    }
                    None => {
                        let wrapper = InstanceWrapper::multi(token.clone(), Arc::downgrade(&module), Vec::new());
                        module.insert_provider_wrapper(Arc::clone(&wrapper));
                        wrapper
                    }
                };
                for contribution in imported {
                    wrapper.push_linked(contribution)?;
                }

                #[cfg(feature = "logging")]
                trace!(
                    target: "modular_di",
                    module = module.name(),
                    token = %token,
                    contributions = wrapper.contributions().len(),
                    "Linked multi provider"
                );
            }
        }
        Ok(())
    }

    fn exported_contributions(module: &Arc<ModuleRecord>, token: &Token) -> Vec<Arc<InstanceWrapper>> {
        let mut visited = HashSet::new();
        visited.insert(module.token().to_owned());
        let mut found = Vec::new();
        Self::collect_contributions(module, token, &mut visited, false, &mut found);
        found
    }

    fn collect_contributions(
        module: &ModuleRecord,
        token: &Token,
        visited: &mut HashSet<String>,
        traversing: bool,
        found: &mut Vec<Arc<InstanceWrapper>>,
    ) {
        for related in module.imports() {
            if traversing && !module.exports_module(&related.metatype()) {
                continue;
            }
            if !visited.insert(related.token().to_owned()) {
                continue;
            }
            if related.exports(token) {
                if let Some(wrapper) = related.provider(token) {
                    found.extend(wrapper.local_contributions());
                }
            }
            Self::collect_contributions(&related, token, visited, true, found);
        }
    }

    /// Set module distances from the topology tree rooted at the root module
    pub(crate) fn calculate_distances(&self) {
        let Some(root) = self.root() else {
            return;
        };
        let tree = TopologyTree::new(root);
        tree.walk(|module, depth| {
            if !module.is_global() {
                module.set_distance(depth);
            }
        });
    }

    /// Swap the recipe of every wrapper registered under the provider's token.
    ///
    /// Returns how many wrappers were replaced.
    pub fn replace(&self, provider: Provider) -> Result<usize> {
        self.check_not_locked()?;
        let links = self.instance_links(&provider.token);
        for link in &links {
            link.wrapper.replace(provider.clone());
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "modular_di",
            token = %provider.token,
            replaced = links.len(),
            "Replaced provider"
        );

        Ok(links.len())
    }

    // =========================================================================
    // Request contexts
    // =========================================================================

    pub(crate) fn register_context(&self, context: ContextId) {
        self.contexts.insert(context, Vec::new());
    }

    /// Whether a request scope with this id is still open
    pub fn is_context_live(&self, context: ContextId) -> bool {
        self.contexts.contains_key(&context)
    }

    /// Run `cache` and remember that `wrapper` holds an instance for `context`.
    ///
    /// `cache` runs while the context entry is held, so a concurrent release
    /// either sees the cached slot or happens before it. Returns `false`
    /// without running `cache` when the context was already released.
    pub(crate) fn track(&self, context: ContextId, wrapper: &Arc<InstanceWrapper>, cache: impl FnOnce()) -> bool {
        match self.contexts.get_mut(&context) {
            Some(mut wrappers) => {
                cache();
                wrappers.push(Arc::downgrade(wrapper));
                true
            }
            None => false,
        }
    }

    /// Close a context and evict its instances; returns how many were dropped.
    pub(crate) fn release_context(&self, context: ContextId) -> usize {
        self.contexts
            .remove(&context)
            .map(|(_, wrappers)| {
                wrappers
                    .iter()
                    .filter_map(Weak::upgrade)
                    .filter(|wrapper| wrapper.evict(context))
                    .count()
            })
            .unwrap_or(0)
    }

    // =========================================================================
    // Lifecycle Methods
    // =========================================================================

    /// Lock the container to prevent further structural changes.
    #[inline]
    pub fn lock(&self) {
        self.locked.store(true, Ordering::Release);

        #[cfg(feature = "logging")]
        debug!(
            target: "modular_di",
            modules = self.len(),
            "Container locked - the module graph can no longer be modified"
        );
    }

    /// Check if the container is locked.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    #[inline]
    fn check_not_locked(&self) -> Result<()> {
        if self.is_locked() {
            return Err(DiError::Locked);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ModuleContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContainer")
            .field("modules", &self.len())
            .field("globals", &self.globals.read().len())
            .field("contexts", &self.contexts.len())
            .field("locked", &self.is_locked())
            .finish()
    }
}
