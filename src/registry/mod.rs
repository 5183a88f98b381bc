//! Instance registry.
//!
//! Maps names and instance ids to registered objects. A lookup for an
//! identity nobody has registered yet can wait: [`InstanceRegistry::get_or_wait`]
//! leaves a pending slot behind, and the registration that later claims
//! the name or id settles that same slot, waking every waiter.
//!
//! Both maps live under one lock and are updated together, so a name and
//! its id always point at the same slot.

pub mod container;

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use container::{Backing, Entry, LazyInstance};

use crate::protocol::InstanceId;
use crate::{AppError, Result};
use container::Container;

/// Name prefix of anonymous exports.
pub const ANONYMOUS_PREFIX: &str = "anonymous-";

/// Name given to an anonymous export with `id`.
#[must_use]
pub fn anonymous_name(id: InstanceId) -> String {
    format!("{ANONYMOUS_PREFIX}{id}")
}

/// Registry lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstanceKey {
    /// Export name.
    Name(String),
    /// Instance id.
    Id(InstanceId),
}

impl Display for InstanceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(name) => write!(f, "name '{name}'"),
            Self::Id(id) => write!(f, "id {id}"),
        }
    }
}

impl From<&str> for InstanceKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for InstanceKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<InstanceId> for InstanceKey {
    fn from(id: InstanceId) -> Self {
        Self::Id(id)
    }
}

#[derive(Debug, Default)]
struct Maps {
    by_name: HashMap<String, Arc<Container>>,
    by_id: HashMap<InstanceId, Arc<Container>>,
}

impl Maps {
    fn lookup(&self, key: &InstanceKey) -> Option<&Arc<Container>> {
        match key {
            InstanceKey::Name(name) => self.by_name.get(name),
            InstanceKey::Id(id) => self.by_id.get(id),
        }
    }

    fn slot_or_placeholder(&mut self, key: &InstanceKey) -> Arc<Container> {
        let map_slot = match key {
            InstanceKey::Name(name) => self.by_name.entry(name.clone()).or_default(),
            InstanceKey::Id(id) => self.by_id.entry(*id).or_default(),
        };
        Arc::clone(map_slot)
    }
}

/// Registry of instances known to one runner.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    maps: Mutex<Maps>,
    shutdown: CancellationToken,
}

impl InstanceRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn maps(&self) -> MutexGuard<'_, Maps> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Entry for `key`, waiting until it is registered.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Interrupted`] if the registry shuts down before
    /// the entry is registered.
    pub async fn get_or_wait(&self, key: &InstanceKey) -> Result<Arc<Entry>> {
        let mut rx = {
            let mut maps = self.maps();
            if self.shutdown.is_cancelled() {
                return Err(AppError::Interrupted(format!(
                    "registry shut down before {key} was registered"
                )));
            }
            let container = maps.slot_or_placeholder(key);
            if let Some(entry) = container.entry() {
                return Ok(entry);
            }
            container.subscribe()
        };

        debug!(%key, "waiting for registration");
        tokio::select! {
            biased;

            () = self.shutdown.cancelled() => Err(AppError::Interrupted(format!(
                "registry shut down while waiting for {key}"
            ))),

            settled = rx.wait_for(Option::is_some) => {
                let entry = settled.ok().and_then(|slot| (*slot).clone());
                entry.ok_or_else(|| {
                    AppError::Interrupted(format!("slot for {key} dropped before registration"))
                })
            }
        }
    }

    /// Entry for `key` if it is registered; never waits.
    #[must_use]
    pub fn try_get(&self, key: &InstanceKey) -> Option<Arc<Entry>> {
        self.maps().lookup(key).and_then(|c| c.entry())
    }

    /// Register an instance, settling any pending slots for its name or id.
    ///
    /// Without a name the instance is registered as `anonymous-<id>`.
    /// Registering a name that is already bound replaces the old binding.
    #[must_use]
    pub fn register(
        &self,
        name: Option<String>,
        id: InstanceId,
        capabilities: Vec<String>,
        backing: Backing,
    ) -> Arc<Entry> {
        let name = name.unwrap_or_else(|| anonymous_name(id));
        let entry = Arc::new(Entry {
            name: name.clone(),
            id,
            capabilities,
            backing,
        });

        let mut maps = self.maps();
        let by_name = maps.by_name.get(&name).cloned();
        let by_id = maps.by_id.get(&id).cloned();

        if let Some(prev) = by_name.as_ref().and_then(|c| c.entry()) {
            if prev.id != id {
                warn!(%name, old_id = %prev.id, new_id = %id, "name re-registered, replacing");
                maps.by_id.remove(&prev.id);
            }
        }
        if let Some(prev) = by_id.as_ref().and_then(|c| c.entry()) {
            if prev.name != name {
                maps.by_name.remove(&prev.name);
            }
        }

        let container = match (by_name, by_id) {
            (Some(named), Some(other)) => {
                if !Arc::ptr_eq(&named, &other) {
                    other.settle(Arc::clone(&entry));
                }
                named
            }
            (Some(existing), None) | (None, Some(existing)) => existing,
            (None, None) => Arc::new(Container::settled(Arc::clone(&entry))),
        };
        container.settle(Arc::clone(&entry));
        maps.by_name.insert(name, Arc::clone(&container));
        maps.by_id.insert(id, container);

        debug!(name = %entry.name, instance_id = %id, "instance registered");
        entry
    }

    /// Remove the settled entry with `id` from both maps.
    ///
    /// Pending slots are left alone. Returns the removed entry, if any.
    pub fn remove(&self, id: InstanceId) -> Option<Arc<Entry>> {
        let mut maps = self.maps();
        let entry = maps.by_id.get(&id).and_then(|c| c.entry())?;
        maps.by_id.remove(&id);

        let same_name = maps
            .by_name
            .get(&entry.name)
            .and_then(|c| c.entry())
            .is_some_and(|e| e.id == id);
        if same_name {
            maps.by_name.remove(&entry.name);
        }

        debug!(name = %entry.name, instance_id = %id, "instance removed");
        Some(entry)
    }

    /// Whether a settled entry exists for `id`.
    #[must_use]
    pub fn contains(&self, id: InstanceId) -> bool {
        self.try_get(&InstanceKey::Id(id)).is_some()
    }

    /// Number of settled entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps()
            .by_id
            .values()
            .filter(|c| c.entry().is_some())
            .count()
    }

    /// Whether no entry is settled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interrupt every current and future [`get_or_wait`](Self::get_or_wait).
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
