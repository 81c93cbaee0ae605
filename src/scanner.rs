//! Module graph discovery
//!
//! [`DependenciesScanner::scan`] walks the imports of the root module,
//! registers every module it reaches, then reflects the providers,
//! controllers and exports of each one into the container. Structural
//! problems fail the scan instead of surfacing at first use.

use crate::container::ModuleContainer;
use crate::module::{Export, ModuleMetadata, ModuleRef, ModuleType};
use crate::record::ModuleRecord;
use crate::{DiError, Provider, Result};
use ahash::RandomState;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, info};

/// Replace every import of `target` with `replacement`
#[derive(Clone, Debug)]
pub struct ModuleOverride {
    pub target: ModuleRef,
    pub replacement: ModuleRef,
}

/// Populates a [`ModuleContainer`] from a root module.
pub struct DependenciesScanner {
    container: Arc<ModuleContainer>,
    overrides: Vec<ModuleOverride>,
    provider_overrides: Vec<Provider>,
    /// Merged metadata per opaque key, evaluated once per module
    metadata: HashMap<String, ModuleMetadata, RandomState>,
}

impl DependenciesScanner {
    pub fn new(container: Arc<ModuleContainer>) -> Self {
        Self {
            container,
            overrides: Vec::new(),
            provider_overrides: Vec::new(),
            metadata: HashMap::with_hasher(RandomState::new()),
        }
    }

    /// Apply module overrides while scanning
    pub fn with_overrides(mut self, overrides: Vec<ModuleOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Replace providers by token once every module is reflected, before
    /// multi providers are linked across modules
    pub fn with_provider_overrides(mut self, providers: Vec<Provider>) -> Self {
        self.provider_overrides = providers;
        self
    }

    /// Register the whole graph reachable from `root`.
    pub fn scan(&mut self, root: &ModuleRef) -> Result<()> {
        let root = match root {
            ModuleRef::Forward(forward) => forward.resolve().clone(),
            other => other.clone(),
        };
        if let ModuleRef::Forward(_) = root {
            return Err(DiError::InvalidModule {
                parent: "root".to_owned(),
                index: 0,
                scope: String::new(),
            });
        }
        let root = self.apply_override(root);

        self.scan_for_modules(&root, &[])?;
        self.scan_modules_for_dependencies()?;
        for provider in std::mem::take(&mut self.provider_overrides) {
            self.container.replace(provider)?;
        }
        self.container.bind_global_scope();
        self.container.link_multi_providers()?;
        self.container.calculate_distances();

        #[cfg(feature = "logging")]
        info!(
            target: "modular_di",
            root = root.name(),
            modules = self.container.len(),
            globals = self.container.globals().len(),
            "Scanned module graph"
        );

        Ok(())
    }

    fn apply_override(&self, reference: ModuleRef) -> ModuleRef {
        self.overrides
            .iter()
            .find(|entry| entry.target.same_ref(&reference))
            .map_or(reference, |entry| entry.replacement.clone())
    }

    /// Evaluate a forward reference and apply overrides.
    fn resolve_import(&self, reference: &ModuleRef, parent: &ModuleRecord, index: usize) -> Result<ModuleRef> {
        let resolved = match reference {
            ModuleRef::Forward(forward) => forward.resolve().clone(),
            other => other.clone(),
        };
        if let ModuleRef::Forward(_) = resolved {
            let scope = parent
                .scope()
                .iter()
                .map(ModuleType::name)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(DiError::InvalidModule {
                parent: parent.name().to_owned(),
                index,
                scope,
            });
        }
        Ok(self.apply_override(resolved))
    }

    fn scan_for_modules(&mut self, reference: &ModuleRef, scope: &[ModuleType]) -> Result<Arc<ModuleRecord>> {
        let compiled = self.container.compiler().compile(reference);
        let mut metadata = compiled.module_type.metadata();
        if let Some(dynamic) = &compiled.dynamic_metadata {
            metadata.imports.extend(dynamic.imports.iter().cloned());
            metadata.providers.extend(dynamic.providers.iter().cloned());
            metadata.controllers.extend(dynamic.controllers.iter().cloned());
            metadata.exports.extend(dynamic.exports.iter().cloned());
            metadata.global |= dynamic.global;
        }

        let (record, inserted) = self.container.insert_module(
            compiled.token.clone(),
            compiled.module_type,
            compiled.dynamic_metadata,
            scope,
            metadata.global,
        )?;
        if !inserted {
            return Ok(record);
        }

        let imports = metadata.imports.clone();
        self.metadata.insert(compiled.token, metadata);
        for (index, import) in imports.iter().enumerate() {
            let import = self.resolve_import(import, &record, index)?;
            self.scan_for_modules(&import, record.scope())?;
        }
        Ok(record)
    }

    fn scan_modules_for_dependencies(&mut self) -> Result<()> {
        for record in self.container.modules() {
            let Some(metadata) = self.metadata.remove(record.token()) else {
                continue;
            };
            self.reflect_imports(&record, &metadata.imports)?;
            for provider in metadata.providers {
                self.container.add_provider(&record, provider)?;
            }
            for controller in metadata.controllers {
                self.container.add_controller(&record, controller)?;
            }
            self.reflect_exports(&record, metadata.exports)?;

            #[cfg(feature = "logging")]
            debug!(
                target: "modular_di",
                module = record.name(),
                imports = record.imports().len(),
                providers = record.providers().len(),
                controllers = record.controllers().len(),
                "Reflected module"
            );
        }
        Ok(())
    }

    fn reflect_imports(&self, record: &Arc<ModuleRecord>, imports: &[ModuleRef]) -> Result<()> {
        for (index, import) in imports.iter().enumerate() {
            let import = self.resolve_import(import, record, index)?;
            let related = self.container.find_module(&import).ok_or_else(|| {
                DiError::Internal(format!("{} was imported but never registered", import.name()))
            })?;
            self.container.add_import(record, &related)?;
        }
        Ok(())
    }

    fn reflect_exports(&self, record: &ModuleRecord, exports: Vec<Export>) -> Result<()> {
        for export in exports {
            let export = match export {
                Export::Module(module) => Export::Module(self.apply_override(module)),
                provider => provider,
            };
            self.container.add_export(record, &export)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DependenciesScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependenciesScanner")
            .field("container", &self.container)
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContainerConfig, DynamicModule, Module, Provider, Token};

    struct SharedModule;
    impl Module for SharedModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
                .provider(Provider::value("SHARED", "shared"))
                .export("SHARED")
        }
    }

    struct UsersModule;
    impl Module for UsersModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
                .import(ModuleRef::of::<SharedModule>())
                .export(Export::module::<SharedModule>())
        }
    }

    struct AppModule;
    impl Module for AppModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
                .import(ModuleRef::of::<UsersModule>())
                .import(ModuleRef::of::<SharedModule>())
        }
    }

    struct StubModule;
    impl Module for StubModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new().provider(Provider::value("STUB", true))
        }
    }

    struct BrokenModule;
    impl Module for BrokenModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new().export("NOTHING")
        }
    }

    struct NestedForwardModule;
    impl Module for NestedForwardModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new().import(ModuleRef::forward(|| {
                ModuleRef::forward(|| ModuleRef::of::<SharedModule>())
            }))
        }
    }

    fn scan(root: ModuleRef, overrides: Vec<ModuleOverride>) -> Result<Arc<ModuleContainer>> {
        let container = ModuleContainer::new(ContainerConfig::default());
        DependenciesScanner::new(Arc::clone(&container))
            .with_overrides(overrides)
            .scan(&root)?;
        Ok(container)
    }

    #[test]
    fn test_scan_registers_each_module_once() {
        let container = scan(ModuleRef::of::<AppModule>(), Vec::new()).unwrap();

        assert_eq!(container.len(), 3);
        let root = container.root().unwrap();
        assert_eq!(root.name(), "AppModule");
        assert_eq!(root.imports().len(), 2);

        let users = container.find_module(&ModuleRef::of::<UsersModule>()).unwrap();
        assert!(users.exports_module(&ModuleType::of::<SharedModule>()));
        assert_eq!(users.distance(), 2);
        assert_eq!(
            users.scope(),
            &[ModuleType::of::<AppModule>(), ModuleType::of::<UsersModule>()]
        );
    }

    #[test]
    fn test_dynamic_metadata_is_merged() {
        let root = ModuleRef::dynamic(
            DynamicModule::new::<SharedModule>()
                .provider(Provider::value("EXTRA", 1_u8))
                .export("EXTRA"),
        );
        let container = scan(root, Vec::new()).unwrap();
        let record = container.root().unwrap();

        assert!(record.dynamic_metadata().is_some());
        assert!(record.exports(&Token::named("SHARED")));
        assert!(record.exports(&Token::named("EXTRA")));
    }

    #[test]
    fn test_overridden_module_is_replaced() {
        let overrides = vec![ModuleOverride {
            target: ModuleRef::of::<SharedModule>(),
            replacement: ModuleRef::of::<StubModule>(),
        }];
        let container = scan(ModuleRef::of::<AppModule>(), overrides).unwrap();

        assert_eq!(container.len(), 3);
        assert!(container.find_module_by_type(&ModuleType::of::<SharedModule>()).is_none());
        let stub = container.find_module(&ModuleRef::of::<StubModule>()).unwrap();
        assert!(stub.has_provider(&Token::named("STUB")));
        // Re-exports follow the override too.
        let users = container.find_module(&ModuleRef::of::<UsersModule>()).unwrap();
        assert!(users.exports_module(&ModuleType::of::<StubModule>()));
    }

    #[test]
    fn test_unknown_export_fails_scan() {
        let err = scan(ModuleRef::of::<BrokenModule>(), Vec::new()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_nested_forward_is_invalid() {
        match scan(ModuleRef::of::<NestedForwardModule>(), Vec::new()) {
            Err(DiError::InvalidModule { parent, index, scope }) => {
                assert_eq!(parent, "NestedForwardModule");
                assert_eq!(index, 0);
                assert_eq!(scope, "NestedForwardModule");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
