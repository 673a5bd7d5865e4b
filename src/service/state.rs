//! Service state management.

use std::sync::Arc;

use crate::membership::MembershipService;
use crate::store::MembershipStore;

use super::config::ServiceConfig;

/// Shared service state.
///
/// Contains the membership service and the configuration handlers read
/// their query deadline from.
pub struct ServiceState<S: MembershipStore + 'static> {
    /// Membership operations over the configured store.
    pub membership: MembershipService<S>,
    /// Service configuration.
    pub config: Arc<ServiceConfig>,
    /// Backend label reported by health checks.
    backend: &'static str,
}

impl<S: MembershipStore + 'static> ServiceState<S> {
    /// Create new service state over a store.
    ///
    /// # Arguments
    /// * `store` - The membership store backend
    /// * `config` - Service configuration
    /// * `backend` - Short backend name for health output ("memory", "postgres")
    pub fn new(store: S, config: ServiceConfig, backend: &'static str) -> Self {
        Self {
            membership: MembershipService::new(Arc::new(store)),
            config: Arc::new(config),
            backend,
        }
    }

    /// Backend label.
    pub fn backend(&self) -> &'static str {
        self.backend
    }
}

impl<S: MembershipStore + 'static> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self {
            membership: self.membership.clone(),
            config: Arc::clone(&self.config),
            backend: self.backend,
        }
    }
}
