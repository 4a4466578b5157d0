//! Host registration of named devices.
//!
//! The host hands out a numeric [`DeviceId`] for a name and takes it back on
//! teardown. [`LocalRegistry`] does this in-process, allocating identifiers
//! dynamically the way a character device major number is chosen.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Numeric identifier bound to a registered device name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Name/identifier binding service provided by the host.
pub trait Registry: Send + Sync {
    /// Binds `name` to a fresh identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registration`] if the name cannot be bound.
    fn register(&self, name: &str) -> Result<DeviceId>;

    /// Releases an identifier obtained from [`register`](Self::register).
    fn unregister(&self, id: DeviceId);
}

/// First identifier handed out by a [`LocalRegistry`].
pub const FIRST_DYNAMIC_ID: u32 = 240;

/// In-process [`Registry`] with dynamically assigned identifiers.
#[derive(Debug)]
pub struct LocalRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    next_id: u32,
    names: HashMap<DeviceId, String>,
}

impl Default for LocalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next_id: FIRST_DYNAMIC_ID,
                names: HashMap::new(),
            }),
        }
    }

    /// Returns the name bound to `id`, if any.
    #[must_use]
    pub fn lookup(&self, id: DeviceId) -> Option<String> {
        self.inner.lock().names.get(&id).cloned()
    }

    /// Number of live registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().names.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Registry for LocalRegistry {
    fn register(&self, name: &str) -> Result<DeviceId> {
        if name.is_empty() {
            return Err(Error::registration(name, "name must not be empty"));
        }

        let mut inner = self.inner.lock();
        if inner.names.values().any(|n| n == name) {
            return Err(Error::registration(name, "name already registered"));
        }

        let id = DeviceId(inner.next_id);
        inner.next_id = inner
            .next_id
            .checked_add(1)
            .ok_or_else(|| Error::registration(name, "identifier space exhausted"))?;
        inner.names.insert(id, name.to_owned());

        debug!(device = name, %id, "device registered");
        Ok(id)
    }

    fn unregister(&self, id: DeviceId) {
        if self.inner.lock().names.remove(&id).is_none() {
            warn!(%id, "unregister of unknown device id");
        }
    }
}
