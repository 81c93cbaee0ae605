//! Provider descriptors
//!
//! A [`Provider`] binds a [`Token`] to a construction strategy
//! ([`ProviderKind`]), a [`Lifetime`] and the list of dependencies injected
//! into the strategy. Descriptors are plain values: modules list them in
//! their metadata and the scanner registers them into the container.

use crate::factory::{
    Args, FactoryFn, HookFn, Instance, LifecycleHooks, ProviderKind, Service, downcast,
};
use crate::BoxError;
use futures::FutureExt;
use serde::Deserialize;
use std::any::TypeId;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Strip the module path (and generic arguments) from a type name.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Identity of a provider inside a module.
///
/// Type tokens compare by `TypeId`; named tokens compare by string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    /// Token derived from a Rust type
    Type {
        /// Identity of the type
        id: TypeId,
        /// Full type path
        path: &'static str,
    },
    /// String token such as `"CONFIG_OPTIONS"`
    Named(Arc<str>),
}

impl Token {
    /// Token for type `T`
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            path: std::any::type_name::<T>(),
        }
    }

    /// String token
    #[inline]
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::Named(name.into())
    }

    /// Human-readable name (short type name for type tokens)
    pub fn name(&self) -> &str {
        match self {
            Self::Type { path, .. } => short_type_name(*path),
            Self::Named(name) => name.as_ref(),
        }
    }

    /// Fully qualified rendering, used when hashing module metadata
    pub fn qualified(&self) -> &str {
        match self {
            Self::Type { path, .. } => *path,
            Self::Named(name) => name.as_ref(),
        }
    }

    /// `TypeId` behind a type token
    #[inline]
    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            Self::Type { id, .. } => Some(*id),
            Self::Named(_) => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { path, .. } => write!(f, "Token({path})"),
            Self::Named(name) => write!(f, "Token({name:?})"),
        }
    }
}

impl From<&'static str> for Token {
    fn from(name: &'static str) -> Self {
        Self::named(name)
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

/// Service lifetime specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    /// Single instance shared for the lifetime of the container
    #[default]
    Singleton,

    /// One instance per request context
    Request,

    /// New instance on every resolution
    Transient,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Singleton => "default",
            Self::Request => "request",
            Self::Transient => "transient",
        })
    }
}

/// One constructor argument of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    /// Token to look up from the host module
    pub token: Token,
    /// Resolve to nothing instead of failing when the token is unknown
    pub optional: bool,
    /// Deliver a [`ForwardRef`](crate::ForwardRef) instead of the instance
    pub forward: bool,
}

impl Dependency {
    /// Dependency on the provider registered for type `T`
    #[inline]
    pub fn on<T: ?Sized + 'static>() -> Self {
        Self::token(Token::of::<T>())
    }

    /// Dependency on an arbitrary token
    #[inline]
    pub fn token(token: impl Into<Token>) -> Self {
        Self {
            token: token.into(),
            optional: false,
            forward: false,
        }
    }

    /// Mark the dependency as optional
    #[inline]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Defer the dependency until after construction (breaks provider cycles)
    #[inline]
    pub fn forward(mut self) -> Self {
        self.forward = true;
        self
    }
}

impl From<Token> for Dependency {
    fn from(token: Token) -> Self {
        Self::token(token)
    }
}

impl From<&'static str> for Dependency {
    fn from(name: &'static str) -> Self {
        Self::token(name)
    }
}

/// A provider declaration.
///
/// # Examples
///
/// ```rust
/// use modular_di::{Dependency, Lifetime, Provider};
///
/// #[derive(Debug)]
/// struct Config { url: &'static str }
///
/// let config = Provider::value("CONFIG", Config { url: "postgres://localhost" });
/// let pool = Provider::factory_sync("POOL", [Dependency::token("CONFIG")], |args| {
///     let config = args.get::<Config>(0)?;
///     Ok(config.url.len())
/// })
/// .with_scope(Lifetime::Request);
///
/// assert_eq!(pool.scope(), Lifetime::Request);
/// assert!(!config.is_multi());
/// ```
#[derive(Clone)]
pub struct Provider {
    pub(crate) token: Token,
    pub(crate) kind: ProviderKind,
    pub(crate) scope: Lifetime,
    pub(crate) multi: bool,
    pub(crate) inject: Vec<Dependency>,
    pub(crate) hooks: LifecycleHooks,
}

impl Provider {
    fn new(token: Token, kind: ProviderKind, inject: Vec<Dependency>) -> Self {
        Self {
            token,
            kind,
            scope: Lifetime::Singleton,
            multi: false,
            inject,
            hooks: LifecycleHooks::default(),
        }
    }

    /// Register `S` under its own type token.
    pub fn class<S: Service>() -> Self {
        Self::use_class::<S>(Token::of::<S>())
    }

    /// Register `S` under `token`.
    pub fn use_class<S: Service>(token: impl Into<Token>) -> Self {
        let mut provider = Self::new(token.into(), ProviderKind::class::<S>(), S::dependencies());
        provider.scope = S::scope();
        provider
    }

    /// Bind an existing value.
    ///
    /// The `Debug` rendering of the value takes part in the content hash of
    /// dynamic modules.
    pub fn value<T: fmt::Debug + Send + Sync + 'static>(token: impl Into<Token>, value: T) -> Self {
        let fingerprint = format!("{value:?}");
        let instance: Instance = Arc::new(value);
        Self::new(
            token.into(),
            ProviderKind::Value {
                instance,
                fingerprint,
            },
            Vec::new(),
        )
    }

    /// Bind an asynchronous factory.
    pub fn factory<T, F, Fut, I>(token: impl Into<Token>, inject: I, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Dependency>,
    {
        let create: FactoryFn = Arc::new(move |args| {
            factory(args)
                .map(|created| created.map(|value| Arc::new(value) as Instance))
                .boxed()
        });
        Self::new(
            token.into(),
            ProviderKind::Factory {
                create,
                name: std::any::type_name::<F>(),
            },
            inject.into_iter().map(Into::into).collect(),
        )
    }

    /// Bind a synchronous factory.
    pub fn factory_sync<T, F, I>(token: impl Into<Token>, inject: I, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Args) -> Result<T, BoxError> + Send + Sync + 'static,
        I: IntoIterator,
        I::Item: Into<Dependency>,
    {
        let create: FactoryFn = Arc::new(move |args| {
            let created = factory(args).map(|value| Arc::new(value) as Instance);
            futures::future::ready(created).boxed()
        });
        Self::new(
            token.into(),
            ProviderKind::Factory {
                create,
                name: std::any::type_name::<F>(),
            },
            inject.into_iter().map(Into::into).collect(),
        )
    }

    /// Alias `token` to the provider registered under `target`.
    pub fn existing(token: impl Into<Token>, target: impl Into<Token>) -> Self {
        Self::new(token.into(), ProviderKind::Existing(target.into()), Vec::new())
    }

    /// Override the lifetime
    #[inline]
    pub fn with_scope(mut self, scope: Lifetime) -> Self {
        self.scope = scope;
        self
    }

    /// Contribute to a multi-provider list instead of binding the token alone
    #[inline]
    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    /// Hook awaited once the whole graph is instantiated.
    pub fn on_module_init<T, F, Fut>(mut self, hook: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.hooks.on_module_init = Some(typed_hook(self.token.clone(), hook));
        self
    }

    /// Hook awaited when the application context is closed.
    pub fn on_module_destroy<T, F, Fut>(mut self, hook: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.hooks.on_module_destroy = Some(typed_hook(self.token.clone(), hook));
        self
    }

    /// Token this provider is registered under
    #[inline]
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Declared lifetime
    #[inline]
    pub fn scope(&self) -> Lifetime {
        self.scope
    }

    /// Whether this provider contributes to a multi-provider list
    #[inline]
    pub fn is_multi(&self) -> bool {
        self.multi
    }

    /// Construction strategy
    #[inline]
    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    /// Declared dependencies
    #[inline]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.inject
    }
}

fn typed_hook<T, F, Fut>(token: Token, hook: F) -> HookFn
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(move |instance: Instance| match downcast::<T>(instance, &token) {
        Ok(typed) => hook(typed).boxed(),
        Err(err) => futures::future::ready(Err(Box::new(err) as BoxError)).boxed(),
    })
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("token", &self.token)
            .field("kind", &self.kind)
            .field("scope", &self.scope)
            .field("multi", &self.multi)
            .field("inject", &self.inject)
            .finish()
    }
}
