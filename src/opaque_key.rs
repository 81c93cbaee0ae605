//! Opaque keys for module records
//!
//! Every module reference is given a string key; two imports yielding the
//! same key share one module record. The same `(module, metadata)` pair
//! always yields the same key. What counts as "the same" depends on the
//! factory: object identity for [`ByReferenceModuleOpaqueKeyFactory`],
//! structural content for [`DeepHashedModuleOpaqueKeyFactory`].

use crate::module::{Controller, DynamicModule, EnhancerKind, EnhancerTarget, Export, ModuleRef, ModuleType};
use crate::{Dependency, Provider, ProviderKind};
use ahash::RandomState;
use dashmap::DashMap;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::any::TypeId;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "logging")]
use tracing::{trace, warn};

/// Computes opaque keys for static and dynamic module references.
pub trait ModuleOpaqueKeyFactory: Send + Sync {
    /// Key of a static module. `original` is the reference as written in the
    /// import list, after forward references were resolved.
    fn create_for_static(&self, module: &ModuleType, original: &ModuleRef) -> String;

    /// Key of a dynamic module
    fn create_for_dynamic(
        &self,
        module: &ModuleType,
        dynamic: &Arc<DynamicModule>,
        original: &ModuleRef,
    ) -> String;
}

fn random_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn hash_string(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

// =============================================================================
// By-reference strategy
// =============================================================================

/// How [`ByReferenceModuleOpaqueKeyFactory`] builds a new id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyGenerationStrategy {
    /// Random id only
    #[default]
    Random,
    /// Random id followed by `:` and a hash of the module name and its
    /// shallow metadata
    Shallow,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum RefIdentity {
    Class(TypeId),
    Object(usize),
}

struct CachedId {
    key: String,
    // Keeps the address behind `RefIdentity::Object` from being reused.
    _pinned: Option<Arc<DynamicModule>>,
}

/// Keys modules by the identity of the reference that imported them.
///
/// The id of a reference is generated on first use and kept in a side table;
/// subsequent calls with the same reference return it unchanged. Two dynamic
/// modules built separately get two keys even when their content is equal.
pub struct ByReferenceModuleOpaqueKeyFactory {
    strategy: KeyGenerationStrategy,
    ids: DashMap<RefIdentity, CachedId, RandomState>,
}

impl ByReferenceModuleOpaqueKeyFactory {
    /// Create a factory using `strategy` for new ids
    pub fn new(strategy: KeyGenerationStrategy) -> Self {
        Self {
            strategy,
            ids: DashMap::with_hasher(RandomState::new()),
        }
    }

    fn identity(original: &ModuleRef) -> (RefIdentity, Option<Arc<DynamicModule>>) {
        match original {
            ModuleRef::Static(module) => (RefIdentity::Class(module.type_id()), None),
            ModuleRef::Dynamic(dynamic) => (
                RefIdentity::Object(Arc::as_ptr(dynamic) as usize),
                Some(Arc::clone(dynamic)),
            ),
            ModuleRef::Forward(forward) => Self::identity(forward.resolve()),
        }
    }

    fn get_or_create(&self, original: &ModuleRef, generate: impl FnOnce() -> String) -> String {
        let (identity, pinned) = Self::identity(original);
        self.ids
            .entry(identity)
            .or_insert_with(|| CachedId {
                key: generate(),
                _pinned: pinned,
            })
            .key
            .clone()
    }

    /// Number of references seen so far
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no reference was keyed yet
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for ByReferenceModuleOpaqueKeyFactory {
    fn default() -> Self {
        Self::new(KeyGenerationStrategy::default())
    }
}

impl ModuleOpaqueKeyFactory for ByReferenceModuleOpaqueKeyFactory {
    fn create_for_static(&self, module: &ModuleType, original: &ModuleRef) -> String {
        self.get_or_create(original, || match self.strategy {
            KeyGenerationStrategy::Random => random_id(),
            KeyGenerationStrategy::Shallow => {
                format!("{}:{}", random_id(), hash_string(module.path()))
            }
        })
    }

    fn create_for_dynamic(
        &self,
        module: &ModuleType,
        dynamic: &Arc<DynamicModule>,
        original: &ModuleRef,
    ) -> String {
        self.get_or_create(original, || match self.strategy {
            KeyGenerationStrategy::Random => random_id(),
            KeyGenerationStrategy::Shallow => {
                let shallow = describe_dynamic(dynamic, Depth::Shallow);
                format!(
                    "{}:{}",
                    random_id(),
                    hash_string(&format!("{}{}", module.name(), shallow))
                )
            }
        })
    }
}

// =============================================================================
// Deep-hash strategy
// =============================================================================

/// Keys modules by a SHA-256 hash of their full metadata.
///
/// Structurally equal dynamic modules collapse to one key even when they are
/// distinct values. Hashing cost grows with the size of the metadata; a
/// warning is logged when it exceeds the configured threshold.
pub struct DeepHashedModuleOpaqueKeyFactory {
    module_ids: DashMap<TypeId, String, RandomState>,
    static_keys: DashMap<String, String, RandomState>,
    warn_threshold: Duration,
}

impl DeepHashedModuleOpaqueKeyFactory {
    /// Create a factory with the default 10ms warning threshold
    pub fn new() -> Self {
        Self {
            module_ids: DashMap::with_hasher(RandomState::new()),
            static_keys: DashMap::with_hasher(RandomState::new()),
            warn_threshold: Duration::from_millis(10),
        }
    }

    /// Set the slow-serialization warning threshold
    pub fn warn_threshold(mut self, threshold: Duration) -> Self {
        self.warn_threshold = threshold;
        self
    }

    fn module_id(&self, module: &ModuleType) -> String {
        self.module_ids
            .entry(module.type_id())
            .or_insert_with(random_id)
            .clone()
    }
}

impl Default for DeepHashedModuleOpaqueKeyFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleOpaqueKeyFactory for DeepHashedModuleOpaqueKeyFactory {
    fn create_for_static(&self, module: &ModuleType, _original: &ModuleRef) -> String {
        let key = format!("{}_{}", self.module_id(module), module.name());
        if let Some(hash) = self.static_keys.get(&key) {
            return hash.clone();
        }
        let hash = hash_string(&key);
        self.static_keys.insert(key, hash.clone());
        hash
    }

    fn create_for_dynamic(
        &self,
        module: &ModuleType,
        dynamic: &Arc<DynamicModule>,
        _original: &ModuleRef,
    ) -> String {
        let started = Instant::now();
        let token = json!({
            "id": self.module_id(module),
            "module": module.name(),
            "dynamic": describe_dynamic(dynamic, Depth::Deep),
        })
        .to_string();
        let elapsed = started.elapsed();

        #[cfg(feature = "logging")]
        {
            if elapsed > self.warn_threshold {
                warn!(
                    target: "modular_di",
                    module = module.name(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Serializing the metadata of dynamic module {} took longer than expected; \
                     consider the by-reference opaque key strategy",
                    module.name()
                );
            }
            trace!(
                target: "modular_di",
                module = module.name(),
                bytes = token.len(),
                "Hashed dynamic module metadata"
            );
        }

        #[cfg(not(feature = "logging"))]
        let _ = elapsed;

        hash_string(&token)
    }
}

// =============================================================================
// Canonical metadata rendering
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Depth {
    /// Nested dynamic imports are rendered by module name only
    Shallow,
    /// Nested dynamic imports are rendered recursively
    Deep,
}

fn describe_dynamic(dynamic: &DynamicModule, depth: Depth) -> Value {
    json!({
        "imports": dynamic.imports.iter().map(|import| describe_import(import, depth)).collect::<Vec<_>>(),
        "providers": dynamic.providers.iter().map(describe_provider).collect::<Vec<_>>(),
        "controllers": dynamic.controllers.iter().map(describe_controller).collect::<Vec<_>>(),
        "exports": dynamic.exports.iter().map(describe_export).collect::<Vec<_>>(),
        "global": dynamic.global,
    })
}

fn describe_import(import: &ModuleRef, depth: Depth) -> Value {
    match import {
        ModuleRef::Static(module) => Value::from(module.path()),
        ModuleRef::Dynamic(dynamic) => match depth {
            Depth::Shallow => json!({ "module": dynamic.module.path() }),
            Depth::Deep => json!({
                "module": dynamic.module.path(),
                "dynamic": describe_dynamic(dynamic, depth),
            }),
        },
        // Thunks are never evaluated here: the target may still be under construction.
        ModuleRef::Forward(forward) => json!({ "forwardRef": forward.label() }),
    }
}

fn describe_dependency(dependency: &Dependency) -> Value {
    if !dependency.optional && !dependency.forward {
        return Value::from(dependency.token.qualified());
    }
    json!({
        "token": dependency.token.qualified(),
        "optional": dependency.optional,
        "forward": dependency.forward,
    })
}

fn describe_provider(provider: &Provider) -> Value {
    let (strategy, target) = match &provider.kind {
        ProviderKind::Value { fingerprint, .. } => ("useValue", fingerprint.as_str()),
        ProviderKind::Factory { name, .. } => ("useFactory", *name),
        ProviderKind::Class { name, .. } => ("useClass", *name),
        ProviderKind::Existing(token) => ("useExisting", token.qualified()),
    };
    json!({
        "provide": provider.token.qualified(),
        strategy: target,
        "inject": provider.inject.iter().map(describe_dependency).collect::<Vec<_>>(),
        "scope": provider.scope.to_string(),
        "multi": provider.multi,
    })
}

fn describe_controller(controller: &Controller) -> Value {
    let enhancers: Vec<Value> = controller
        .enhancers
        .iter()
        .map(|enhancer| {
            let kind = match enhancer.kind {
                EnhancerKind::Guard => "guard",
                EnhancerKind::Interceptor => "interceptor",
            };
            let target = match &enhancer.target {
                EnhancerTarget::Class => Value::from("class"),
                EnhancerTarget::Method(method) => json!({ "method": method }),
            };
            json!({
                "kind": kind,
                "target": target,
                "provider": describe_provider(&enhancer.provider),
            })
        })
        .collect();
    json!({
        "controller": describe_provider(&controller.provider),
        "path": controller.path,
        "version": controller.version,
        "enhancers": enhancers,
    })
}

fn describe_export(export: &Export) -> Value {
    match export {
        Export::Provider(token) => Value::from(token.qualified()),
        Export::Module(module) => describe_import(module, Depth::Shallow),
    }
}
