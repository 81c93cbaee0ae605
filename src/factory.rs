//! Construction strategies for providers
//!
//! `ProviderKind` is a tagged union: the injector matches on the variant
//! instead of probing a descriptor for `useValue`/`useFactory`/`useClass`.
//! Factories and class constructors are type-erased into one async closure
//! shape so the instantiation path is identical for both.

use crate::{BoxError, DiError, Dependency, ForwardRef, Lifetime, Result, Token};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type-erased instance handed out by the container
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Type-erased factory function
pub type FactoryFn =
    Arc<dyn Fn(Args) -> BoxFuture<'static, std::result::Result<Instance, BoxError>> + Send + Sync>;

/// Type-erased lifecycle hook
pub type HookFn =
    Arc<dyn Fn(Instance) -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send + Sync>;

/// Downcast an instance resolved for `token` to `Arc<T>`.
pub(crate) fn downcast<T: Send + Sync + 'static>(instance: Instance, token: &Token) -> Result<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| DiError::type_mismatch::<T>(token))
}

/// A type the container can construct from its declared dependencies.
///
/// # Examples
///
/// ```rust
/// use modular_di::{Args, BoxError, Dependency, Service};
/// use std::sync::Arc;
///
/// struct Config { url: String }
///
/// impl Service for Config {
///     fn create(_: Args) -> Result<Self, BoxError> {
///         Ok(Config { url: "postgres://localhost".into() })
///     }
/// }
///
/// struct Repository { config: Arc<Config> }
///
/// impl Service for Repository {
///     fn dependencies() -> Vec<Dependency> {
///         vec![Dependency::on::<Config>()]
///     }
///
///     fn create(args: Args) -> Result<Self, BoxError> {
///         Ok(Repository { config: args.get(0)? })
///     }
/// }
/// ```
pub trait Service: Send + Sync + Sized + 'static {
    /// Constructor arguments, in positional order
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    /// Declared lifetime
    fn scope() -> Lifetime {
        Lifetime::Singleton
    }

    /// Build the instance from resolved arguments
    fn create(args: Args) -> std::result::Result<Self, BoxError>;
}

/// How a provider produces its value
#[derive(Clone)]
pub enum ProviderKind {
    /// Pre-built value
    Value {
        /// The shared value
        instance: Instance,
        /// `Debug` rendering used for content hashing
        fingerprint: String,
    },
    /// Closure invoked with the resolved dependencies
    Factory {
        /// Type-erased factory
        create: FactoryFn,
        /// Type path of the closure
        name: &'static str,
    },
    /// Type implementing [`Service`]
    Class {
        /// Type-erased constructor
        create: FactoryFn,
        /// Type path of the class
        name: &'static str,
    },
    /// Alias of another token
    Existing(Token),
}

impl ProviderKind {
    pub(crate) fn class<S: Service>() -> Self {
        let create: FactoryFn = Arc::new(|args| {
            let created = S::create(args).map(|service| Arc::new(service) as Instance);
            futures::future::ready(created).boxed()
        });
        Self::Class {
            create,
            name: std::any::type_name::<S>(),
        }
    }

    /// Short tag naming the strategy
    pub fn label(&self) -> &'static str {
        match self {
            Self::Value { .. } => "value",
            Self::Factory { .. } => "factory",
            Self::Class { .. } => "class",
            Self::Existing(_) => "existing",
        }
    }
}

impl fmt::Debug for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value { fingerprint, .. } => f.debug_tuple("Value").field(fingerprint).finish(),
            Self::Factory { name, .. } => f.debug_tuple("Factory").field(name).finish(),
            Self::Class { name, .. } => f.debug_tuple("Class").field(name).finish(),
            Self::Existing(token) => f.debug_tuple("Existing").field(token).finish(),
        }
    }
}

/// Optional lifecycle hooks attached to a provider
#[derive(Clone, Default)]
pub(crate) struct LifecycleHooks {
    pub(crate) on_module_init: Option<HookFn>,
    pub(crate) on_module_destroy: Option<HookFn>,
}

/// Value of a multi-provider token: every contribution, in order.
pub struct MultiInstance(pub(crate) Vec<Instance>);

impl MultiInstance {
    /// Number of contributions
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no module contributed
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Contributions as type-erased instances
    #[inline]
    pub fn instances(&self) -> &[Instance] {
        &self.0
    }

    /// Downcast every contribution to `T`
    pub fn downcast_all<T: Send + Sync + 'static>(&self, token: &Token) -> Result<Vec<Arc<T>>> {
        self.0
            .iter()
            .map(|instance| downcast::<T>(Arc::clone(instance), token))
            .collect()
    }
}

impl fmt::Debug for MultiInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiInstance")
            .field("len", &self.0.len())
            .finish()
    }
}

/// A resolved constructor argument
#[derive(Clone)]
pub(crate) enum Arg {
    Instance(Instance),
    Missing,
    Forward(ForwardRef),
}

/// Resolved dependencies passed to factories and [`Service::create`].
///
/// Accessors report the positional index on failure so a misconfigured
/// binding can be located without dumping the graph.
pub struct Args {
    target: Token,
    values: Vec<Arg>,
}

impl Args {
    pub(crate) fn new(target: Token, values: Vec<Arg>) -> Self {
        Self { target, values }
    }

    /// Token of the provider being constructed
    #[inline]
    pub fn target(&self) -> &Token {
        &self.target
    }

    /// Number of declared arguments
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no arguments were declared
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn arg(&self, index: usize) -> Result<&Arg> {
        self.values.get(index).ok_or_else(|| DiError::ArgumentOutOfRange {
            target: self.target.to_string(),
            index,
            count: self.values.len(),
        })
    }

    fn mismatch<T: 'static>(&self, index: usize) -> DiError {
        DiError::type_mismatch::<T>(format!("argument [{index}] of {}", self.target))
    }

    /// Type-erased argument
    pub fn instance(&self, index: usize) -> Result<Instance> {
        match self.arg(index)? {
            Arg::Instance(instance) => Ok(Arc::clone(instance)),
            Arg::Missing => Err(DiError::unknown_element(
                format!("optional argument [{index}] of {}", self.target),
                None,
            )),
            Arg::Forward(forward) => forward.get(),
        }
    }

    /// Argument downcast to `T`
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>> {
        self.instance(index)?
            .downcast::<T>()
            .map_err(|_| self.mismatch::<T>(index))
    }

    /// Optional argument; `None` when the dependency was not found
    pub fn optional<T: Send + Sync + 'static>(&self, index: usize) -> Result<Option<Arc<T>>> {
        match self.arg(index)? {
            Arg::Missing => Ok(None),
            _ => self.get(index).map(Some),
        }
    }

    /// Deferred argument declared with [`Dependency::forward`]
    pub fn forward(&self, index: usize) -> Result<ForwardRef> {
        match self.arg(index)? {
            Arg::Forward(forward) => Ok(forward.clone()),
            _ => Err(DiError::Internal(format!(
                "argument [{index}] of {} is not a forward dependency",
                self.target
            ))),
        }
    }

    /// Multi-provider argument, each contribution downcast to `T`
    pub fn multi<T: Send + Sync + 'static>(&self, index: usize) -> Result<Vec<Arc<T>>> {
        let list = self
            .instance(index)?
            .downcast::<MultiInstance>()
            .map_err(|_| self.mismatch::<MultiInstance>(index))?;
        list.0
            .iter()
            .map(|instance| {
                Arc::clone(instance)
                    .downcast::<T>()
                    .map_err(|_| self.mismatch::<T>(index))
            })
            .collect()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("target", &self.target)
            .field("len", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct TestService {
        id: u32,
    }

    fn args(values: Vec<Arg>) -> Args {
        Args::new(Token::named("Target"), values)
    }

    #[test]
    fn test_args_downcast() {
        let args = args(vec![Arg::Instance(Arc::new(TestService { id: 7 }))]);

        assert_eq!(args.get::<TestService>(0).unwrap().id, 7);
        assert!(matches!(
            args.get::<String>(0),
            Err(DiError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_args_out_of_range_reports_index() {
        let args = args(vec![Arg::Missing]);

        match args.get::<TestService>(3) {
            Err(DiError::ArgumentOutOfRange { index, count, .. }) => {
                assert_eq!(index, 3);
                assert_eq!(count, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_optional_missing_is_none() {
        let args = args(vec![Arg::Missing]);
        assert!(args.optional::<TestService>(0).unwrap().is_none());
        assert!(args.get::<TestService>(0).is_err());
    }

    #[test]
    fn test_multi_argument() {
        let list = MultiInstance(vec![Arc::new("a") as Instance, Arc::new("b") as Instance]);
        let args = args(vec![Arg::Instance(Arc::new(list))]);

        let values: Vec<&str> = args
            .multi::<&'static str>(0)
            .unwrap()
            .iter()
            .map(|value| **value)
            .collect();
        assert_eq!(values, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_class_kind_constructs() {
        struct Leaf;
        impl Service for Leaf {
            fn create(_: Args) -> std::result::Result<Self, BoxError> {
                Ok(Leaf)
            }
        }

        let kind = ProviderKind::class::<Leaf>();
        assert_eq!(kind.label(), "class");
        let ProviderKind::Class { create, .. } = kind else {
            panic!("expected class kind");
        };
        let instance = create(args(Vec::new())).await.unwrap();
        assert!(instance.downcast::<Leaf>().is_ok());
    }
}
