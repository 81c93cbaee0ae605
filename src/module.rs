//! Module declarations
//!
//! Static modules are Rust types implementing [`Module`]; dynamic modules are
//! values computed at registration time ([`DynamicModule`]); forward
//! references defer the evaluation of an import until the scanner reaches it.

use crate::factory::Service;
use crate::provider::short_type_name;
use crate::{Provider, Token};
use once_cell::sync::OnceCell;
use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A statically declared module.
///
/// # Examples
///
/// ```rust
/// use modular_di::{Module, ModuleMetadata, ModuleRef, Provider};
///
/// struct ConfigModule;
///
/// impl Module for ConfigModule {
///     fn metadata() -> ModuleMetadata {
///         ModuleMetadata::new()
///             .provider(Provider::value("CONFIG", "debug"))
///             .export("CONFIG")
///     }
/// }
///
/// struct AppModule;
///
/// impl Module for AppModule {
///     fn metadata() -> ModuleMetadata {
///         ModuleMetadata::new().import(ModuleRef::of::<ConfigModule>())
///     }
/// }
/// ```
pub trait Module: 'static {
    /// Imports, providers, controllers and exports of the module
    fn metadata() -> ModuleMetadata;
}

/// Identity of a module type (the "class" of a module)
#[derive(Clone, Copy)]
pub struct ModuleType {
    id: TypeId,
    path: &'static str,
    metadata: fn() -> ModuleMetadata,
}

impl ModuleType {
    /// Module type of `M`
    #[inline]
    pub fn of<M: Module>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            path: std::any::type_name::<M>(),
            metadata: M::metadata,
        }
    }

    /// Short type name
    #[inline]
    pub fn name(&self) -> &'static str {
        short_type_name(self.path)
    }

    /// Fully qualified type path
    #[inline]
    pub fn path(&self) -> &'static str {
        self.path
    }

    /// `TypeId` of the module type
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Evaluate the static metadata
    #[inline]
    pub fn metadata(&self) -> ModuleMetadata {
        (self.metadata)()
    }
}

impl PartialEq for ModuleType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ModuleType {}

impl Hash for ModuleType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleType({})", self.path)
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a module exports
#[derive(Clone, Debug)]
pub enum Export {
    /// A provider token declared by the module
    Provider(Token),
    /// An imported module, re-exported as a whole
    Module(ModuleRef),
}

impl Export {
    /// Export the provider registered for type `T`
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Provider(Token::of::<T>())
    }

    /// Re-export module `M`
    #[inline]
    pub fn module<M: Module>() -> Self {
        Self::Module(ModuleRef::of::<M>())
    }
}

impl From<Token> for Export {
    fn from(token: Token) -> Self {
        Self::Provider(token)
    }
}

impl From<&'static str> for Export {
    fn from(name: &'static str) -> Self {
        Self::Provider(Token::named(name))
    }
}

impl From<ModuleRef> for Export {
    fn from(module: ModuleRef) -> Self {
        Self::Module(module)
    }
}

/// Pipeline stage an enhancer attaches to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnhancerKind {
    Guard,
    Interceptor,
}

/// Where an enhancer applies
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnhancerTarget {
    /// Every route of the controller
    Class,
    /// One handler method
    Method(&'static str),
}

/// Guard or interceptor declared on a controller
#[derive(Clone, Debug)]
pub struct Enhancer {
    pub kind: EnhancerKind,
    pub target: EnhancerTarget,
    pub provider: Provider,
}

/// A controller declaration.
///
/// The container only instantiates controllers and their enhancers; routing
/// is left to transport adapters, which read `path`, `version` and the
/// enhancer list back from the registered wrapper.
#[derive(Clone, Debug)]
pub struct Controller {
    pub(crate) provider: Provider,
    pub(crate) path: Option<String>,
    pub(crate) version: Option<String>,
    pub(crate) enhancers: Vec<Enhancer>,
}

impl Controller {
    /// Controller implemented by `S`
    pub fn new<S: Service>() -> Self {
        Self {
            provider: Provider::class::<S>(),
            path: None,
            version: None,
            enhancers: Vec::new(),
        }
    }

    /// Route prefix
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// API version
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Guard applied to every route
    pub fn guard(self, provider: Provider) -> Self {
        self.enhancer(EnhancerKind::Guard, EnhancerTarget::Class, provider)
    }

    /// Interceptor applied to every route
    pub fn interceptor(self, provider: Provider) -> Self {
        self.enhancer(EnhancerKind::Interceptor, EnhancerTarget::Class, provider)
    }

    /// Guard applied to one handler
    pub fn method_guard(self, method: &'static str, provider: Provider) -> Self {
        self.enhancer(EnhancerKind::Guard, EnhancerTarget::Method(method), provider)
    }

    /// Interceptor applied to one handler
    pub fn method_interceptor(self, method: &'static str, provider: Provider) -> Self {
        self.enhancer(EnhancerKind::Interceptor, EnhancerTarget::Method(method), provider)
    }

    fn enhancer(mut self, kind: EnhancerKind, target: EnhancerTarget, provider: Provider) -> Self {
        self.enhancers.push(Enhancer {
            kind,
            target,
            provider,
        });
        self
    }

    /// Token the controller is registered under
    #[inline]
    pub fn token(&self) -> &Token {
        &self.provider.token
    }
}

macro_rules! metadata_builders {
    () => {
        /// Add an import
        pub fn import(mut self, module: impl Into<ModuleRef>) -> Self {
            self.imports.push(module.into());
            self
        }

        /// Add a provider
        pub fn provider(mut self, provider: Provider) -> Self {
            self.providers.push(provider);
            self
        }

        /// Add a controller
        pub fn controller(mut self, controller: Controller) -> Self {
            self.controllers.push(controller);
            self
        }

        /// Add an export
        pub fn export(mut self, export: impl Into<Export>) -> Self {
            self.exports.push(export.into());
            self
        }

        /// Make the exports visible to every module without an import
        pub fn global(mut self) -> Self {
            self.global = true;
            self
        }
    };
}

/// Declarative description of a static module
#[derive(Clone, Debug, Default)]
pub struct ModuleMetadata {
    pub imports: Vec<ModuleRef>,
    pub providers: Vec<Provider>,
    pub controllers: Vec<Controller>,
    pub exports: Vec<Export>,
    pub global: bool,
}

impl ModuleMetadata {
    /// Empty metadata
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    metadata_builders!();
}

/// A module configured at registration time.
///
/// Its metadata is merged with the static metadata of `module`.
///
/// # Examples
///
/// ```rust
/// use modular_di::{DynamicModule, Module, ModuleMetadata, ModuleRef, Provider};
///
/// struct DatabaseModule;
///
/// impl Module for DatabaseModule {
///     fn metadata() -> ModuleMetadata {
///         ModuleMetadata::new()
///     }
/// }
///
/// impl DatabaseModule {
///     fn for_root(url: &'static str) -> ModuleRef {
///         DynamicModule::new::<DatabaseModule>()
///             .provider(Provider::value("DB_URL", url))
///             .export("DB_URL")
///             .into()
///     }
/// }
///
/// let module = DatabaseModule::for_root("postgres://localhost");
/// assert_eq!(module.name(), "DatabaseModule");
/// ```
#[derive(Clone, Debug)]
pub struct DynamicModule {
    pub module: ModuleType,
    pub imports: Vec<ModuleRef>,
    pub providers: Vec<Provider>,
    pub controllers: Vec<Controller>,
    pub exports: Vec<Export>,
    pub global: bool,
}

impl DynamicModule {
    /// Dynamic configuration of module `M`
    pub fn new<M: Module>() -> Self {
        Self::for_type(ModuleType::of::<M>())
    }

    /// Dynamic configuration of an already-known module type
    pub fn for_type(module: ModuleType) -> Self {
        Self {
            module,
            imports: Vec::new(),
            providers: Vec::new(),
            controllers: Vec::new(),
            exports: Vec::new(),
            global: false,
        }
    }

    metadata_builders!();
}

struct ForwardInner {
    thunk: Box<dyn Fn() -> ModuleRef + Send + Sync>,
    resolved: OnceCell<ModuleRef>,
    label: &'static str,
}

/// Lazily evaluated import, resolved once and memoized.
#[derive(Clone)]
pub struct ForwardModuleRef {
    inner: Arc<ForwardInner>,
}

impl ForwardModuleRef {
    /// Evaluate the thunk (first call only) and return its target
    pub fn resolve(&self) -> &ModuleRef {
        self.inner.resolved.get_or_init(|| (self.inner.thunk)())
    }

    /// Target if the thunk has already been evaluated
    #[inline]
    pub fn resolved(&self) -> Option<&ModuleRef> {
        self.inner.resolved.get()
    }

    /// Type path of the thunk closure
    #[inline]
    pub fn label(&self) -> &'static str {
        self.inner.label
    }

    #[inline]
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ForwardModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardModuleRef")
            .field("resolved", &self.resolved().map(ModuleRef::name))
            .finish()
    }
}

/// Reference to a module as written in an import list
#[derive(Clone, Debug)]
pub enum ModuleRef {
    Static(ModuleType),
    Dynamic(Arc<DynamicModule>),
    Forward(ForwardModuleRef),
}

impl ModuleRef {
    /// Static module `M`
    #[inline]
    pub fn of<M: Module>() -> Self {
        Self::Static(ModuleType::of::<M>())
    }

    /// Dynamic module
    #[inline]
    pub fn dynamic(module: DynamicModule) -> Self {
        Self::Dynamic(Arc::new(module))
    }

    /// Forward reference, used to break circular imports
    pub fn forward<F>(thunk: F) -> Self
    where
        F: Fn() -> ModuleRef + Send + Sync + 'static,
    {
        Self::Forward(ForwardModuleRef {
            inner: Arc::new(ForwardInner {
                thunk: Box::new(thunk),
                resolved: OnceCell::new(),
                label: std::any::type_name::<F>(),
            }),
        })
    }

    /// Module type, evaluating a forward reference if needed
    pub fn module_type(&self) -> ModuleType {
        match self {
            Self::Static(module) => *module,
            Self::Dynamic(dynamic) => dynamic.module,
            Self::Forward(forward) => forward.resolve().module_type(),
        }
    }

    /// Display name; forward references that were never evaluated show as such
    pub fn name(&self) -> &'static str {
        match self {
            Self::Static(module) => module.name(),
            Self::Dynamic(dynamic) => dynamic.module.name(),
            Self::Forward(forward) => forward.resolved().map_or("forwardRef(?)", ModuleRef::name),
        }
    }

    /// Whether `self` and `other` denote the same reference.
    ///
    /// Static modules match by type, dynamic modules by object identity and
    /// forward references by their resolved target.
    pub fn same_ref(&self, other: &ModuleRef) -> bool {
        match (self, other) {
            (Self::Forward(a), Self::Forward(b)) if a.ptr_eq(b) => true,
            (Self::Forward(forward), other) => forward.resolve().same_ref(other),
            (this, Self::Forward(forward)) => this.same_ref(forward.resolve()),
            (Self::Static(a), Self::Static(b)) => a == b,
            (Self::Dynamic(a), Self::Dynamic(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<DynamicModule> for ModuleRef {
    fn from(module: DynamicModule) -> Self {
        Self::dynamic(module)
    }
}

impl From<ModuleType> for ModuleRef {
    fn from(module: ModuleType) -> Self {
        Self::Static(module)
    }
}
