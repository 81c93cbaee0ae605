//! Instance wrappers
//!
//! One [`InstanceWrapper`] exists per (module, token). It owns the
//! construction recipe and the instances built from it, keyed by context id.
//! Singletons live under [`ContextId::STATIC`], request-scoped instances
//! under the id of their [`RequestScope`](crate::RequestScope), and transient
//! instances are never stored.

use crate::factory::{Instance, LifecycleHooks, ProviderKind};
use crate::module::{Controller, EnhancerKind, EnhancerTarget};
use crate::record::ModuleRecord;
use crate::{ContextId, Dependency, DiError, Lifetime, Provider, Result, Token};
use ahash::RandomState;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

/// What a wrapper was registered as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperKind {
    Provider,
    Controller,
    /// Guard or interceptor attached to a controller
    Injectable,
}

/// Enhancer registered for a controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancerInfo {
    pub kind: EnhancerKind,
    pub target: EnhancerTarget,
    pub token: Token,
}

/// Routing metadata recorded for a controller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerMetadata {
    pub path: Option<String>,
    pub version: Option<String>,
    pub enhancers: Vec<EnhancerInfo>,
}

#[derive(Clone)]
pub(crate) struct Recipe {
    pub(crate) kind: ProviderKind,
    pub(crate) inject: Vec<Dependency>,
    pub(crate) scope: Lifetime,
    pub(crate) hooks: LifecycleHooks,
}

impl Recipe {
    fn from_provider(provider: Provider) -> Self {
        // Values exist before any context does.
        let scope = match provider.kind {
            ProviderKind::Value { .. } => Lifetime::Singleton,
            _ => provider.scope,
        };
        Self {
            kind: provider.kind,
            inject: provider.inject,
            scope,
            hooks: provider.hooks,
        }
    }

    /// Tokens the recipe needs before it can run, paired with their flags
    pub(crate) fn edges(&self) -> Vec<Dependency> {
        match &self.kind {
            ProviderKind::Existing(target) => vec![Dependency::token(target.clone())],
            _ => self.inject.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) enum Body {
    Single(Recipe),
    Multi {
        /// Contributions declared by the host module
        local: Vec<Arc<InstanceWrapper>>,
        /// Contributions exported by imported modules
        linked: Vec<Arc<InstanceWrapper>>,
    },
}

pub(crate) type PendingInstance = Shared<BoxFuture<'static, Result<Instance>>>;

pub(crate) enum Slot {
    Pending(PendingInstance),
    Ready(Instance),
}

/// The unit of ownership for one resolvable token.
pub struct InstanceWrapper {
    token: Token,
    kind: WrapperKind,
    host: Weak<ModuleRecord>,
    controller: Option<ControllerMetadata>,
    body: RwLock<Body>,
    slots: DashMap<ContextId, Slot, RandomState>,
    effective: OnceCell<Lifetime>,
}

impl InstanceWrapper {
    fn with_body(
        token: Token,
        kind: WrapperKind,
        host: Weak<ModuleRecord>,
        controller: Option<ControllerMetadata>,
        body: Body,
    ) -> Self {
        Self {
            token,
            kind,
            host,
            controller,
            body: RwLock::new(body),
            slots: DashMap::with_hasher(RandomState::new()),
            effective: OnceCell::new(),
        }
    }

    pub(crate) fn from_provider(
        provider: Provider,
        kind: WrapperKind,
        host: Weak<ModuleRecord>,
    ) -> Arc<Self> {
        let token = provider.token.clone();
        let wrapper = Self::with_body(token, kind, host, None, Body::Single(Recipe::from_provider(provider)));
        wrapper.prefill();
        Arc::new(wrapper)
    }

    pub(crate) fn from_controller(controller: Controller, host: Weak<ModuleRecord>) -> Arc<Self> {
        let metadata = ControllerMetadata {
            path: controller.path,
            version: controller.version,
            enhancers: controller
                .enhancers
                .iter()
                .map(|enhancer| EnhancerInfo {
                    kind: enhancer.kind,
                    target: enhancer.target.clone(),
                    token: enhancer.provider.token.clone(),
                })
                .collect(),
        };
        let token = controller.provider.token.clone();
        let recipe = Recipe::from_provider(controller.provider);
        Arc::new(Self::with_body(
            token,
            WrapperKind::Controller,
            host,
            Some(metadata),
            Body::Single(recipe),
        ))
    }

    pub(crate) fn multi(token: Token, host: Weak<ModuleRecord>, local: Vec<Arc<InstanceWrapper>>) -> Arc<Self> {
        Arc::new(Self::with_body(
            token,
            WrapperKind::Provider,
            host,
            None,
            Body::Multi {
                local,
                linked: Vec::new(),
            },
        ))
    }

    fn prefill(&self) {
        let instance = match &*self.body.read() {
            Body::Single(Recipe {
                kind: ProviderKind::Value { instance, .. },
                ..
            }) => Arc::clone(instance),
            _ => return,
        };
        self.slots.insert(ContextId::STATIC, Slot::Ready(instance));
    }

    /// Token this wrapper resolves
    #[inline]
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Provider, controller or enhancer
    #[inline]
    pub fn kind(&self) -> WrapperKind {
        self.kind
    }

    /// Module the wrapper belongs to
    #[inline]
    pub fn host(&self) -> Option<Arc<ModuleRecord>> {
        self.host.upgrade()
    }

    /// Routing metadata, for controllers
    #[inline]
    pub fn controller_metadata(&self) -> Option<&ControllerMetadata> {
        self.controller.as_ref()
    }

    /// Whether the token is bound to a list of contributions
    pub fn is_multi(&self) -> bool {
        matches!(&*self.body.read(), Body::Multi { .. })
    }

    /// Lifetime as declared, before dependencies are taken into account
    pub fn declared_scope(&self) -> Lifetime {
        match &*self.body.read() {
            Body::Single(recipe) => recipe.scope,
            Body::Multi { .. } => Lifetime::Singleton,
        }
    }

    /// Instance built for `context`, if it is ready
    pub fn instance(&self, context: ContextId) -> Option<Instance> {
        match self.slots.get(&context).as_deref() {
            Some(Slot::Ready(instance)) => Some(Arc::clone(instance)),
            _ => None,
        }
    }

    /// Whether an instance for `context` is ready
    #[inline]
    pub fn is_resolved(&self, context: ContextId) -> bool {
        self.instance(context).is_some()
    }

    /// Contributions for a multi-provider token, locals first
    pub fn contributions(&self) -> Vec<Arc<InstanceWrapper>> {
        match &*self.body.read() {
            Body::Single(_) => Vec::new(),
            Body::Multi { local, linked } => local.iter().chain(linked.iter()).cloned().collect(),
        }
    }

    pub(crate) fn local_contributions(&self) -> Vec<Arc<InstanceWrapper>> {
        match &*self.body.read() {
            Body::Single(_) => Vec::new(),
            Body::Multi { local, .. } => local.clone(),
        }
    }

    pub(crate) fn body(&self) -> Body {
        self.body.read().clone()
    }

    pub(crate) fn hooks(&self) -> LifecycleHooks {
        match &*self.body.read() {
            Body::Single(recipe) => recipe.hooks.clone(),
            Body::Multi { .. } => LifecycleHooks::default(),
        }
    }

    pub(crate) fn push_local(&self, contribution: Arc<InstanceWrapper>) -> Result<()> {
        match &mut *self.body.write() {
            Body::Multi { local, .. } => {
                local.push(contribution);
                Ok(())
            }
            Body::Single(_) => Err(self.mixed()),
        }
    }

    pub(crate) fn push_linked(&self, contribution: Arc<InstanceWrapper>) -> Result<()> {
        match &mut *self.body.write() {
            Body::Multi { linked, .. } => {
                if !linked.iter().any(|known| Arc::ptr_eq(known, &contribution)) {
                    linked.push(contribution);
                }
                Ok(())
            }
            Body::Single(_) => Err(self.mixed()),
        }
    }

    fn mixed(&self) -> DiError {
        DiError::MixedMultiProvider {
            token: self.token.to_string(),
            module: self
                .host()
                .map_or_else(|| "?".to_owned(), |host| host.name().to_owned()),
        }
    }

    /// Swap the recipe, dropping every instance built from the old one.
    ///
    /// A multi replacement becomes the only local contribution.
    pub(crate) fn replace(&self, provider: Provider) {
        let body = if provider.multi {
            let contribution = Self::from_provider(provider, self.kind, self.host.clone());
            Body::Multi {
                local: vec![contribution],
                linked: Vec::new(),
            }
        } else {
            Body::Single(Recipe::from_provider(provider))
        };
        *self.body.write() = body;
        self.slots.clear();
        self.prefill();
    }

    pub(crate) fn slots(&self) -> &DashMap<ContextId, Slot, RandomState> {
        &self.slots
    }

    /// Drop whatever was cached for `context`
    pub(crate) fn evict(&self, context: ContextId) -> bool {
        self.slots.remove(&context).is_some()
    }

    pub(crate) fn effective(&self) -> &OnceCell<Lifetime> {
        &self.effective
    }

    #[inline]
    pub(crate) fn addr(&self) -> usize {
        self as *const Self as usize
    }
}

impl fmt::Debug for InstanceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceWrapper")
            .field("token", &self.token)
            .field("kind", &self.kind)
            .field("scope", &self.declared_scope())
            .field("multi", &self.is_multi())
            .field("instances", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_is_ready_in_static_context() {
        let wrapper = InstanceWrapper::from_provider(
            Provider::value("PORT", 8080_u16).with_scope(Lifetime::Request),
            WrapperKind::Provider,
            Weak::new(),
        );

        assert_eq!(wrapper.declared_scope(), Lifetime::Singleton);
        let port = wrapper.instance(ContextId::STATIC).unwrap();
        assert_eq!(*port.downcast::<u16>().unwrap(), 8080);
        assert!(!wrapper.is_resolved(ContextId::new()));
    }

    #[test]
    fn test_replace_drops_old_instances() {
        let wrapper = InstanceWrapper::from_provider(
            Provider::value("PORT", 1_u16),
            WrapperKind::Provider,
            Weak::new(),
        );
        wrapper.replace(Provider::value("PORT", 2_u16));

        let port = wrapper.instance(ContextId::STATIC).unwrap();
        assert_eq!(*port.downcast::<u16>().unwrap(), 2);
    }

    #[test]
    fn test_multi_replace_resets_contributions() {
        let contribution = |value: &'static str| {
            InstanceWrapper::from_provider(Provider::value("T", value).multi(), WrapperKind::Provider, Weak::new())
        };
        let multi = InstanceWrapper::multi(Token::named("T"), Weak::new(), vec![contribution("a")]);
        multi.push_linked(contribution("b")).unwrap();

        multi.replace(Provider::value("T", "z").multi());
        assert_eq!(multi.contributions().len(), 1);
        assert_eq!(multi.local_contributions().len(), 1);

        multi.replace(Provider::value("T", "y"));
        assert!(!multi.is_multi());
        let value = multi.instance(ContextId::STATIC).unwrap();
        assert_eq!(*value.downcast::<&str>().unwrap(), "y");
    }

    #[test]
    fn test_multi_contributions_keep_order() {
        let contribution = |value: &'static str| {
            InstanceWrapper::from_provider(Provider::value("T", value).multi(), WrapperKind::Provider, Weak::new())
        };
        let first = contribution("a");
        let multi = InstanceWrapper::multi(Token::named("T"), Weak::new(), vec![Arc::clone(&first)]);
        let imported = contribution("c");

        multi.push_local(contribution("b")).unwrap();
        multi.push_linked(Arc::clone(&imported)).unwrap();
        multi.push_linked(imported).unwrap();

        assert!(multi.is_multi());
        assert_eq!(multi.contributions().len(), 3);
        assert!(Arc::ptr_eq(&multi.contributions()[0], &first));
        assert_eq!(multi.local_contributions().len(), 2);
    }

    #[test]
    fn test_single_rejects_contributions() {
        let single = InstanceWrapper::from_provider(Provider::value("T", "x"), WrapperKind::Provider, Weak::new());
        let extra =
            InstanceWrapper::from_provider(Provider::value("T", "y").multi(), WrapperKind::Provider, Weak::new());

        assert!(matches!(single.push_local(extra), Err(DiError::MixedMultiProvider { .. })));
    }

    #[test]
    fn test_controller_metadata_is_recorded() {
        struct CatsController;
        impl crate::Service for CatsController {
            fn create(_: crate::Args) -> std::result::Result<Self, crate::BoxError> {
                Ok(CatsController)
            }
        }

        let controller = Controller::new::<CatsController>()
            .path("cats")
            .guard(Provider::value("ROLES_GUARD", "roles"));
        let wrapper = InstanceWrapper::from_controller(controller, Weak::new());

        let metadata = wrapper.controller_metadata().unwrap();
        assert_eq!(wrapper.kind(), WrapperKind::Controller);
        assert_eq!(metadata.path.as_deref(), Some("cats"));
        assert_eq!(metadata.enhancers[0].token, Token::named("ROLES_GUARD"));
        assert_eq!(metadata.enhancers[0].target, EnhancerTarget::Class);
    }
}
