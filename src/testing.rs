//! Test harness
//!
//! [`TestingModuleBuilder`] compiles an [`ApplicationContext`] with modules
//! or providers swapped out before anything is instantiated.
//!
//! ```rust
//! use modular_di::testing::TestingModuleBuilder;
//! use modular_di::{ModuleMetadata, Provider};
//!
//! # async fn run() -> modular_di::Result<()> {
//! let app = TestingModuleBuilder::from_metadata(
//!     ModuleMetadata::new().provider(Provider::value("URL", "postgres://prod")),
//! )
//! .override_provider("URL")
//! .use_value("postgres://test")
//! .compile()
//! .await?;
//!
//! assert_eq!(*app.get("URL")?.downcast::<&str>().unwrap(), "postgres://test");
//! # Ok(())
//! # }
//! ```

use crate::scanner::ModuleOverride;
use crate::{
    ApplicationContext, Args, BoxError, ContainerConfig, Dependency, DynamicModule, Module, ModuleMetadata,
    ModuleRef, Provider, Result, Service, Token,
};
use std::fmt;
use std::future::Future;

/// Root used by [`TestingModuleBuilder::from_metadata`]
pub struct RootTestModule;

impl Module for RootTestModule {
    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
    }
}

/// Builder for an application context with overrides.
pub struct TestingModuleBuilder {
    root: ModuleRef,
    config: ContainerConfig,
    module_overrides: Vec<ModuleOverride>,
    provider_overrides: Vec<Provider>,
}

impl TestingModuleBuilder {
    /// Test an existing root module
    pub fn new(root: impl Into<ModuleRef>) -> Self {
        Self {
            root: root.into(),
            config: ContainerConfig::default(),
            module_overrides: Vec::new(),
            provider_overrides: Vec::new(),
        }
    }

    /// Test an ad-hoc module built from `metadata`
    pub fn from_metadata(metadata: ModuleMetadata) -> Self {
        let mut root = DynamicModule::new::<RootTestModule>();
        root.imports = metadata.imports;
        root.providers = metadata.providers;
        root.controllers = metadata.controllers;
        root.exports = metadata.exports;
        root.global = metadata.global;
        Self::new(root)
    }

    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace every import of `target`
    pub fn override_module(self, target: impl Into<ModuleRef>) -> OverrideModule {
        OverrideModule {
            builder: self,
            target: target.into(),
        }
    }

    /// Replace the provider registered under `token` in every module
    pub fn override_provider(self, token: impl Into<Token>) -> OverrideProvider {
        OverrideProvider {
            builder: self,
            token: token.into(),
        }
    }

    /// Scan, apply overrides, then instantiate.
    pub async fn compile(self) -> Result<ApplicationContext> {
        ApplicationContext::bootstrap(self.root, self.config, self.module_overrides, self.provider_overrides).await
    }
}

impl fmt::Debug for TestingModuleBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestingModuleBuilder")
            .field("root", &self.root.name())
            .field("module_overrides", &self.module_overrides)
            .field("provider_overrides", &self.provider_overrides)
            .finish()
    }
}

/// Pending module override, completed by [`use_module`](Self::use_module)
#[must_use]
pub struct OverrideModule {
    builder: TestingModuleBuilder,
    target: ModuleRef,
}

impl OverrideModule {
    pub fn use_module(mut self, replacement: impl Into<ModuleRef>) -> TestingModuleBuilder {
        self.builder.module_overrides.push(ModuleOverride {
            target: self.target,
            replacement: replacement.into(),
        });
        self.builder
    }
}

/// Pending provider override
#[must_use]
pub struct OverrideProvider {
    builder: TestingModuleBuilder,
    token: Token,
}

impl OverrideProvider {
    fn push(mut self, provider: Provider) -> TestingModuleBuilder {
        self.builder.provider_overrides.push(provider);
        self.builder
    }

    pub fn use_value<T: fmt::Debug + Send + Sync + 'static>(self, value: T) -> TestingModuleBuilder {
        let provider = Provider::value(self.token.clone(), value);
        self.push(provider)
    }

    pub fn use_factory<T, F, Fut, I>(self, inject: I, factory: F) -> TestingModuleBuilder
    where
        T: Send + Sync + 'static,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, BoxError>> + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Dependency>,
    {
        let provider = Provider::factory(self.token.clone(), inject, factory);
        self.push(provider)
    }

    pub fn use_factory_sync<T, F, I>(self, inject: I, factory: F) -> TestingModuleBuilder
    where
        T: Send + Sync + 'static,
        F: Fn(Args) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
        I: IntoIterator,
        I::Item: Into<Dependency>,
    {
        let provider = Provider::factory_sync(self.token.clone(), inject, factory);
        self.push(provider)
    }

    pub fn use_class<S: Service>(self) -> TestingModuleBuilder {
        let provider = Provider::use_class::<S>(self.token.clone());
        self.push(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DiError, Lifetime};

    struct Mailer {
        sent: &'static str,
    }

    impl Service for Mailer {
        fn create(_: Args) -> std::result::Result<Self, BoxError> {
            Ok(Mailer { sent: "smtp" })
        }
    }

    struct FakeMailer;

    impl Service for FakeMailer {
        fn scope() -> Lifetime {
            Lifetime::Transient
        }

        fn create(_: Args) -> std::result::Result<Self, BoxError> {
            Ok(FakeMailer)
        }
    }

    fn metadata() -> ModuleMetadata {
        ModuleMetadata::new()
            .provider(Provider::class::<Mailer>())
            .provider(Provider::value("RETRIES", 3_u32))
    }

    #[tokio::test]
    async fn test_without_overrides() {
        let app = TestingModuleBuilder::from_metadata(metadata()).compile().await.unwrap();
        assert_eq!(app.get_as::<Mailer>().unwrap().sent, "smtp");
        assert_eq!(app.module().name(), "RootTestModule");
    }

    #[tokio::test]
    async fn test_use_class_takes_the_replacement_scope() {
        let app = TestingModuleBuilder::from_metadata(metadata())
            .override_provider(Token::of::<Mailer>())
            .use_class::<FakeMailer>()
            .compile()
            .await
            .unwrap();

        assert_eq!(app.introspect(Token::of::<Mailer>()).unwrap().scope, Lifetime::Transient);
        let first = app.resolve(Token::of::<Mailer>(), None).await.unwrap();
        let second = app.resolve(Token::of::<Mailer>(), None).await.unwrap();
        assert!(first.downcast::<FakeMailer>().is_ok());
        assert!(!std::sync::Arc::ptr_eq(&second, &app.resolve(Token::of::<Mailer>(), None).await.unwrap()));
    }

    #[tokio::test]
    async fn test_use_factory() {
        let app = TestingModuleBuilder::from_metadata(metadata())
            .override_provider("RETRIES")
            .use_factory(Vec::<Dependency>::new(), |_| async { Ok::<_, BoxError>(0_u32) })
            .compile()
            .await
            .unwrap();

        assert_eq!(*app.get("RETRIES").unwrap().downcast::<u32>().unwrap(), 0);
        assert!(matches!(app.get("UNKNOWN"), Err(DiError::UnknownElement { .. })));
    }

    struct PluginsModule;

    impl crate::Module for PluginsModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new()
                .provider(Provider::value("PLUGINS", "a").multi())
                .provider(Provider::value("PLUGINS", "b").multi())
                .export("PLUGINS")
        }
    }

    struct HostModule;

    impl crate::Module for HostModule {
        fn metadata() -> ModuleMetadata {
            ModuleMetadata::new().import(ModuleRef::of::<PluginsModule>())
        }
    }

    #[tokio::test]
    async fn test_overridden_multi_provider_is_seen_from_importers() {
        let app = TestingModuleBuilder::new(ModuleRef::of::<HostModule>())
            .override_provider("PLUGINS")
            .use_value("z")
            .compile()
            .await
            .unwrap();

        let token = Token::named("PLUGINS");
        assert!(!app.module().has_provider(&token));
        let (wrapper, host) = app.injector().lookup(app.module(), &token).unwrap();
        assert_eq!(host.name(), "PluginsModule");
        assert!(!wrapper.is_multi());

        let plugins = app.resolve("PLUGINS", None).await.unwrap();
        assert_eq!(*plugins.downcast::<&str>().unwrap(), "z");
        let selected = app.select(ModuleRef::of::<PluginsModule>()).unwrap();
        assert_eq!(*selected.get_strict("PLUGINS").unwrap().downcast::<&str>().unwrap(), "z");
    }
}
