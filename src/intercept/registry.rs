//! Process-wide interceptor registry.
//!
//! A concurrent map from operation identity to the one live interceptor
//! instance for that identity. Lookups on the steady-state path take a
//! read lock only; the rare construction path is serialized behind a
//! single coarse mutex with a double-checked re-read, because construction
//! happens at most once per identity over the process lifetime.
//!
//! Resolution is table-driven: identities are bound to factory functions
//! at startup. There is no dynamic late-binding by name.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, trace, warn};

use crate::error::{FilamentError, Result};

use super::interceptor::{ConstructInterceptor, Handler, Interceptor};

type MethodFactory = Arc<dyn Fn() -> anyhow::Result<Box<dyn Interceptor>> + Send + Sync>;
type ConstructFactory =
    Arc<dyn Fn() -> anyhow::Result<Box<dyn ConstructInterceptor>> + Send + Sync>;

#[derive(Clone)]
enum Factory {
    Method(MethodFactory),
    Construct(ConstructFactory),
}

/// Registry of interceptor factories and live instances.
///
/// This is an explicit service object rather than a process-level static:
/// construct one at startup, share it via `Arc`, and tests get isolated
/// instances for free.
#[derive(Default)]
pub struct InterceptorRegistry {
    factories: RwLock<HashMap<String, Factory>>,
    live: RwLock<HashMap<String, Handler>>,
    /// Identities whose `init()` failed. Lookups return `None` for these
    /// without retrying, so a broken interceptor cannot turn the hot path
    /// into an exception storm.
    poisoned: RwLock<HashSet<String>>,
    construction: Mutex<()>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a method interceptor factory to an operation identity.
    pub fn register_method<F>(&self, identity: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn() -> anyhow::Result<Box<dyn Interceptor>> + Send + Sync + 'static,
    {
        self.register(identity.into(), Factory::Method(Arc::new(factory)))
    }

    /// Bind a construct interceptor factory to an operation identity.
    pub fn register_construct<F>(&self, identity: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn() -> anyhow::Result<Box<dyn ConstructInterceptor>> + Send + Sync + 'static,
    {
        self.register(identity.into(), Factory::Construct(Arc::new(factory)))
    }

    fn register(&self, identity: String, factory: Factory) -> Result<()> {
        let mut factories = write_lock(&self.factories);
        if factories.contains_key(&identity) {
            return Err(FilamentError::DuplicateRegistration { identity });
        }
        trace!(identity = %identity, "registered interceptor factory");
        factories.insert(identity, factory);
        Ok(())
    }

    /// Number of identities with a registered factory.
    pub fn registered_count(&self) -> usize {
        read_lock(&self.factories).len()
    }

    /// Number of live, initialized interceptor instances.
    pub fn live_count(&self) -> usize {
        read_lock(&self.live).len()
    }

    /// Look up the live interceptor for `identity`, constructing it on
    /// first use.
    ///
    /// Returns `None` when the identity has no factory, when its `init()`
    /// previously failed, or when construction fails right now (in which
    /// case a later call may retry). No failure escapes to the caller.
    pub fn get_or_create(&self, identity: &str) -> Option<Handler> {
        // Fast path: steady-state read, no construction lock involved.
        if let Some(handler) = read_lock(&self.live).get(identity) {
            return Some(handler.clone());
        }

        if read_lock(&self.poisoned).contains(identity) {
            return None;
        }

        // Resolve the factory outside the construction lock so a factory
        // that itself triggers registrations cannot deadlock us.
        let factory = match read_lock(&self.factories).get(identity) {
            Some(factory) => factory.clone(),
            None => {
                trace!(identity = %identity, "no interceptor registered");
                return None;
            }
        };

        let _guard = self
            .construction
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Double-checked: another unit may have won the race (or poisoned
        // the identity) while we were waiting on the lock.
        if let Some(handler) = read_lock(&self.live).get(identity) {
            return Some(handler.clone());
        }
        if read_lock(&self.poisoned).contains(identity) {
            return None;
        }

        let handler = match self.build(identity, &factory) {
            Ok(handler) => handler,
            Err(err) => {
                match &err {
                    FilamentError::InterceptorInit { .. } => {
                        warn!(identity = %identity, error = %err, "interceptor initialization failed; identity poisoned");
                        write_lock(&self.poisoned).insert(identity.to_string());
                    }
                    _ => {
                        warn!(identity = %identity, error = %err, "interceptor construction failed; will retry on next lookup");
                    }
                }
                return None;
            }
        };

        debug!(identity = %identity, "interceptor instantiated");
        write_lock(&self.live).insert(identity.to_string(), handler.clone());
        Some(handler)
    }

    fn build(&self, identity: &str, factory: &Factory) -> Result<Handler> {
        match factory {
            Factory::Method(make) => {
                let mut interceptor =
                    make().map_err(|source| FilamentError::InterceptorConstruct {
                        identity: identity.to_string(),
                        source,
                    })?;
                interceptor
                    .init()
                    .map_err(|source| FilamentError::InterceptorInit {
                        identity: identity.to_string(),
                        source,
                    })?;
                Ok(Handler::Method(Arc::from(interceptor)))
            }
            Factory::Construct(make) => {
                let mut interceptor =
                    make().map_err(|source| FilamentError::InterceptorConstruct {
                        identity: identity.to_string(),
                        source,
                    })?;
                interceptor
                    .init()
                    .map_err(|source| FilamentError::InterceptorInit {
                        identity: identity.to_string(),
                        source,
                    })?;
                Ok(Handler::Construct(Arc::from(interceptor)))
            }
        }
    }
}

impl std::fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("registered", &self.registered_count())
            .field("live", &self.live_count())
            .finish()
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
