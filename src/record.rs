//! Module records
//!
//! A [`ModuleRecord`] is the node of the compiled module graph: one per
//! opaque key. Imports are non-owning links; the container owns every
//! record for as long as it lives.

use crate::module::{Controller, DynamicModule, Export, ModuleType};
use crate::storage::ProviderStorage;
use crate::topology::GraphNode;
use crate::wrapper::{InstanceWrapper, WrapperKind};
use crate::{DiError, Provider, Result, Token};
use ahash::RandomState;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// One registered module
pub struct ModuleRecord {
    token: String,
    metatype: ModuleType,
    dynamic: Option<Arc<DynamicModule>>,
    scope: Vec<ModuleType>,
    global: AtomicBool,
    distance: AtomicUsize,
    imports: RwLock<Vec<Weak<ModuleRecord>>>,
    providers: RwLock<ProviderStorage>,
    controllers: RwLock<ProviderStorage>,
    injectables: RwLock<ProviderStorage>,
    exports: RwLock<HashSet<Token, RandomState>>,
    exported_modules: RwLock<HashSet<TypeId, RandomState>>,
    this: Weak<ModuleRecord>,
}

impl ModuleRecord {
    pub(crate) fn new(
        token: String,
        metatype: ModuleType,
        dynamic: Option<Arc<DynamicModule>>,
        scope: Vec<ModuleType>,
        global: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            token,
            metatype,
            dynamic,
            scope,
            global: AtomicBool::new(global),
            distance: AtomicUsize::new(if global { usize::MAX } else { 0 }),
            imports: RwLock::new(Vec::new()),
            providers: RwLock::new(ProviderStorage::new()),
            controllers: RwLock::new(ProviderStorage::new()),
            injectables: RwLock::new(ProviderStorage::new()),
            exports: RwLock::new(HashSet::with_hasher(RandomState::new())),
            exported_modules: RwLock::new(HashSet::with_hasher(RandomState::new())),
            this: this.clone(),
        })
    }

    /// Opaque key
    #[inline]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Module type
    #[inline]
    pub fn metatype(&self) -> ModuleType {
        self.metatype
    }

    /// Short name of the module type
    #[inline]
    pub fn name(&self) -> &'static str {
        self.metatype.name()
    }

    /// Dynamic metadata this record was created from
    #[inline]
    pub fn dynamic_metadata(&self) -> Option<&Arc<DynamicModule>> {
        self.dynamic.as_ref()
    }

    /// Chain of enclosing modules, root first, ending with this one
    #[inline]
    pub fn scope(&self) -> &[ModuleType] {
        &self.scope
    }

    /// Whether the exports are visible from every module
    #[inline]
    pub fn is_global(&self) -> bool {
        self.global.load(Ordering::Acquire)
    }

    /// Depth in the topology tree; `usize::MAX` for global modules
    #[inline]
    pub fn distance(&self) -> usize {
        self.distance.load(Ordering::Acquire)
    }

    pub(crate) fn set_distance(&self, distance: usize) {
        self.distance.store(distance, Ordering::Release);
    }

    /// Imported modules still alive, in declaration order
    pub fn imports(&self) -> Vec<Arc<ModuleRecord>> {
        self.imports.read().iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn add_import(&self, related: &Arc<ModuleRecord>) {
        let mut imports = self.imports.write();
        let known = imports
            .iter()
            .any(|import| std::ptr::eq(import.as_ptr(), Arc::as_ptr(related)));
        if !known {
            imports.push(Arc::downgrade(related));
        }
    }

    /// Register a provider.
    ///
    /// `multi` providers sharing a token accumulate in declaration order;
    /// any other repeated token is rejected.
    pub(crate) fn add_provider(&self, provider: Provider) -> Result<Arc<InstanceWrapper>> {
        let mut providers = self.providers.write();
        let token = provider.token.clone();
        let existing = providers.get(&token).cloned();

        match (existing, provider.multi) {
            (None, false) => {
                let wrapper = InstanceWrapper::from_provider(provider, WrapperKind::Provider, self.this.clone());
                providers.insert(token, Arc::clone(&wrapper));
                Ok(wrapper)
            }
            (None, true) => {
                let contribution =
                    InstanceWrapper::from_provider(provider, WrapperKind::Provider, self.this.clone());
                let wrapper = InstanceWrapper::multi(token.clone(), self.this.clone(), vec![contribution]);
                providers.insert(token, Arc::clone(&wrapper));
                Ok(wrapper)
            }
            (Some(wrapper), true) if wrapper.is_multi() => {
                let contribution =
                    InstanceWrapper::from_provider(provider, WrapperKind::Provider, self.this.clone());
                wrapper.push_local(contribution)?;
                Ok(wrapper)
            }
            (Some(wrapper), multi) if multi || wrapper.is_multi() => Err(DiError::MixedMultiProvider {
                token: token.to_string(),
                module: self.name().to_owned(),
            }),
            (Some(_), _) => Err(DiError::DuplicateProvider {
                token: token.to_string(),
                module: self.name().to_owned(),
            }),
        }
    }

    pub(crate) fn add_controller(&self, controller: Controller) -> Arc<InstanceWrapper> {
        let token = controller.token().clone();
        let wrapper = InstanceWrapper::from_controller(controller, self.this.clone());
        self.controllers.write().insert(token, Arc::clone(&wrapper));
        wrapper
    }

    /// Register an enhancer; a token already known as an injectable is kept.
    pub(crate) fn add_injectable(&self, provider: Provider) -> Arc<InstanceWrapper> {
        let mut injectables = self.injectables.write();
        if let Some(existing) = injectables.get(&provider.token) {
            return Arc::clone(existing);
        }
        let token = provider.token.clone();
        let wrapper = InstanceWrapper::from_provider(provider, WrapperKind::Injectable, self.this.clone());
        injectables.insert(token, Arc::clone(&wrapper));
        wrapper
    }

    /// Register an export; it must name a local provider or an imported module.
    pub(crate) fn add_export(&self, export: &Export) -> Result<()> {
        match export {
            Export::Provider(token) => {
                if !self.providers.read().contains(token) {
                    return Err(DiError::UnknownExport {
                        token: token.to_string(),
                        module: self.name().to_owned(),
                    });
                }
                self.exports.write().insert(token.clone());
            }
            Export::Module(module) => {
                let module_type = module.module_type();
                let imported = self
                    .imports()
                    .iter()
                    .any(|import| import.metatype() == module_type);
                if !imported {
                    return Err(DiError::UnknownExport {
                        token: module_type.name().to_owned(),
                        module: self.name().to_owned(),
                    });
                }
                self.exported_modules.write().insert(module_type.type_id());
            }
        }
        Ok(())
    }

    /// Whether `token` is exported
    #[inline]
    pub fn exports(&self, token: &Token) -> bool {
        self.exports.read().contains(token)
    }

    /// Whether the module type is re-exported
    #[inline]
    pub fn exports_module(&self, module: &ModuleType) -> bool {
        self.exported_modules.read().contains(&module.type_id())
    }

    /// Whether `token` is registered as a provider
    #[inline]
    pub fn has_provider(&self, token: &Token) -> bool {
        self.providers.read().contains(token)
    }

    /// Provider wrapper for `token`
    pub fn provider(&self, token: &Token) -> Option<Arc<InstanceWrapper>> {
        self.providers.read().get(token).cloned()
    }

    /// Provider or controller wrapper for `token`
    pub fn wrapper(&self, token: &Token) -> Option<Arc<InstanceWrapper>> {
        self.provider(token)
            .or_else(|| self.controllers.read().get(token).cloned())
            .or_else(|| self.injectables.read().get(token).cloned())
    }

    /// Provider wrappers in registration order
    pub fn providers(&self) -> Vec<Arc<InstanceWrapper>> {
        self.providers.read().values()
    }

    /// Controller wrappers in registration order
    pub fn controllers(&self) -> Vec<Arc<InstanceWrapper>> {
        self.controllers.read().values()
    }

    /// Enhancer wrappers in registration order
    pub fn injectables(&self) -> Vec<Arc<InstanceWrapper>> {
        self.injectables.read().values()
    }

    /// Providers, controllers and enhancers
    pub(crate) fn all_wrappers(&self) -> Vec<Arc<InstanceWrapper>> {
        let mut wrappers = self.providers();
        wrappers.extend(self.controllers());
        wrappers.extend(self.injectables());
        wrappers
    }

    pub(crate) fn insert_provider_wrapper(&self, wrapper: Arc<InstanceWrapper>) {
        self.providers.write().insert(wrapper.token().clone(), wrapper);
    }
}

impl GraphNode for Arc<ModuleRecord> {
    type Id = String;

    fn node_id(&self) -> String {
        self.token.clone()
    }

    fn imports(&self) -> Vec<Self> {
        ModuleRecord::imports(self)
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("name", &self.name())
            .field("token", &self.token)
            .field("global", &self.is_global())
            .field("distance", &self.distance())
            .field("providers", &*self.providers.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Module, ModuleMetadata, ModuleRef};

    struct CatsModule;
    impl Module for CatsModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
        }
    }

    struct SharedModule;
    impl Module for SharedModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
        }
    }

    fn record<M: Module>(token: &str) -> Arc<ModuleRecord> {
        let metatype = ModuleType::of::<M>();
        ModuleRecord::new(token.to_owned(), metatype, None, vec![metatype], false)
    }

    #[test]
    fn test_multi_providers_accumulate() {
        let cats = record::<CatsModule>("cats");
        cats.add_provider(Provider::value("T", "a").multi()).unwrap();
        let wrapper = cats.add_provider(Provider::value("T", "b").multi()).unwrap();

        assert_eq!(wrapper.contributions().len(), 2);
        assert_eq!(cats.providers().len(), 1);
    }

    #[test]
    fn test_mixed_multi_is_rejected() {
        let cats = record::<CatsModule>("cats");
        cats.add_provider(Provider::value("T", "a").multi()).unwrap();
        assert!(matches!(
            cats.add_provider(Provider::value("T", "b")),
            Err(DiError::MixedMultiProvider { .. })
        ));

        let dogs = record::<CatsModule>("dogs");
        dogs.add_provider(Provider::value("T", "a")).unwrap();
        assert!(matches!(
            dogs.add_provider(Provider::value("T", "b").multi()),
            Err(DiError::MixedMultiProvider { .. })
        ));
    }

    #[test]
    fn test_duplicate_provider_is_rejected() {
        let cats = record::<CatsModule>("cats");
        cats.add_provider(Provider::value("T", "a")).unwrap();
        let err = cats.add_provider(Provider::value("T", "b")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_exports_are_validated() {
        let cats = record::<CatsModule>("cats");
        let shared = record::<SharedModule>("shared");
        cats.add_provider(Provider::value("CATS", 1_u8)).unwrap();
        cats.add_import(&shared);

        cats.add_export(&Export::from("CATS")).unwrap();
        cats.add_export(&Export::module::<SharedModule>()).unwrap();
        assert!(cats.exports(&Token::named("CATS")));
        assert!(cats.exports_module(&ModuleType::of::<SharedModule>()));

        let unknown = cats.add_export(&Export::from("DOGS"));
        assert!(matches!(unknown, Err(DiError::UnknownExport { .. })));
        let not_imported = cats.add_export(&Export::Module(ModuleRef::of::<CatsModule>()));
        assert!(matches!(not_imported, Err(DiError::UnknownExport { .. })));
    }

    #[test]
    fn test_imports_are_deduplicated() {
        let cats = record::<CatsModule>("cats");
        let shared = record::<SharedModule>("shared");
        cats.add_import(&shared);
        cats.add_import(&shared);

        assert_eq!(cats.imports().len(), 1);
        drop(shared);
        assert!(cats.imports().is_empty());
    }
}
