//! Ordered per-module storage of instance wrappers
//!
//! Lookups go through an `ahash` map; iteration follows registration order,
//! which is the order providers are instantiated and hooks are run in.

use crate::wrapper::InstanceWrapper;
use crate::Token;
use ahash::RandomState;
use std::collections::HashMap;
use std::sync::Arc;

/// Token → wrapper map preserving insertion order
#[derive(Default)]
pub struct ProviderStorage {
    order: Vec<Token>,
    wrappers: HashMap<Token, Arc<InstanceWrapper>, RandomState>,
}

impl ProviderStorage {
    /// Create new empty storage
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a wrapper. Replacing keeps the original position.
    pub fn insert(&mut self, token: Token, wrapper: Arc<InstanceWrapper>) -> Option<Arc<InstanceWrapper>> {
        let previous = self.wrappers.insert(token.clone(), wrapper);
        if previous.is_none() {
            self.order.push(token);
        }
        previous
    }

    /// Check if token exists
    #[inline]
    pub fn contains(&self, token: &Token) -> bool {
        self.wrappers.contains_key(token)
    }

    /// Wrapper registered under `token`
    #[inline]
    pub fn get(&self, token: &Token) -> Option<&Arc<InstanceWrapper>> {
        self.wrappers.get(token)
    }

    /// Wrappers in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&Token, &Arc<InstanceWrapper>)> {
        self.order
            .iter()
            .filter_map(|token| self.wrappers.get_key_value(token))
    }

    /// Wrappers in registration order
    pub fn values(&self) -> Vec<Arc<InstanceWrapper>> {
        self.iter().map(|(_, wrapper)| Arc::clone(wrapper)).collect()
    }

    /// Registered tokens in order
    #[inline]
    pub fn tokens(&self) -> &[Token] {
        &self.order
    }

    /// Get number of registered wrappers
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Debug for ProviderStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.order.iter()).finish()
    }
}
