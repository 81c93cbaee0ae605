//! Normalization of module references into keyed records

use crate::module::{DynamicModule, ModuleRef, ModuleType};
use crate::opaque_key::ModuleOpaqueKeyFactory;
use std::sync::Arc;

/// A module reference reduced to its type, dynamic metadata and opaque key
#[derive(Debug, Clone)]
pub struct CompiledModule {
    pub module_type: ModuleType,
    pub dynamic_metadata: Option<Arc<DynamicModule>>,
    pub token: String,
}

/// Turns static, dynamic and forward references into [`CompiledModule`]s.
#[derive(Clone)]
pub struct ModuleCompiler {
    key_factory: Arc<dyn ModuleOpaqueKeyFactory>,
}

impl ModuleCompiler {
    pub fn new(key_factory: Arc<dyn ModuleOpaqueKeyFactory>) -> Self {
        Self { key_factory }
    }

    /// Compile a reference. Forward references are evaluated (once) first.
    pub fn compile(&self, reference: &ModuleRef) -> CompiledModule {
        let (module_type, dynamic_metadata) = Self::extract_metadata(reference);
        let token = match &dynamic_metadata {
            Some(dynamic) => self
                .key_factory
                .create_for_dynamic(&module_type, dynamic, reference),
            None => self.key_factory.create_for_static(&module_type, reference),
        };
        CompiledModule {
            module_type,
            dynamic_metadata,
            token,
        }
    }

    /// Split a reference into its type and dynamic metadata without keying it
    pub fn extract_metadata(reference: &ModuleRef) -> (ModuleType, Option<Arc<DynamicModule>>) {
        match reference {
            ModuleRef::Static(module) => (*module, None),
            ModuleRef::Dynamic(dynamic) => (dynamic.module, Some(Arc::clone(dynamic))),
            ModuleRef::Forward(forward) => Self::extract_metadata(forward.resolve()),
        }
    }

    #[inline]
    pub fn key_factory(&self) -> &Arc<dyn ModuleOpaqueKeyFactory> {
        &self.key_factory
    }
}

impl std::fmt::Debug for ModuleCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCompiler").finish_non_exhaustive()
    }
}
