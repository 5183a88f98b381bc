//! Registry slots and their backing objects.

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::watch;

use crate::object::{Object, ObjectRef};
use crate::protocol::InstanceId;

/// Settled registry entry.
#[derive(Debug)]
pub struct Entry {
    /// Export name; `anonymous-<id>` for anonymous exports.
    pub name: String,
    /// Instance id.
    pub id: InstanceId,
    /// Capability names the instance implements.
    pub capabilities: Vec<String>,
    /// Object behind the entry.
    pub backing: Backing,
}

impl Entry {
    /// The instance, building a lazy stand-in on first access.
    ///
    /// Returns `None` once a lazy stand-in has been released.
    #[must_use]
    pub fn instance(&self) -> Option<ObjectRef> {
        match &self.backing {
            Backing::Object(obj) => Some(Arc::clone(obj)),
            Backing::Lazy(lazy) => lazy.get(),
        }
    }

    /// Whether the entry is backed by a lazily built stand-in.
    #[must_use]
    pub fn is_lazy(&self) -> bool {
        matches!(self.backing, Backing::Lazy(_))
    }
}

/// What an entry resolves to.
pub enum Backing {
    /// Object held for the lifetime of the entry.
    Object(ObjectRef),
    /// Stand-in built on demand and held weakly.
    Lazy(Arc<LazyInstance>),
}

impl Debug for Backing {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Object(obj) => write!(f, "Object({:p})", Arc::as_ptr(obj)),
            Self::Lazy(lazy) => f.debug_tuple("Lazy").field(lazy).finish(),
        }
    }
}

type Builder = Box<dyn Fn() -> ObjectRef + Send + Sync>;

enum LazyState {
    Unbuilt,
    Built(Weak<dyn Object>),
}

/// Deferred constructor with a weak cache.
///
/// The first [`get`](Self::get) builds the object. Later calls return the
/// same object while some caller still holds it. Once every handle is
/// dropped the instance counts as released and is never rebuilt.
pub struct LazyInstance {
    build: Builder,
    state: Mutex<LazyState>,
}

impl LazyInstance {
    /// Wrap `build`; nothing is constructed yet.
    #[must_use]
    pub fn new(build: impl Fn() -> ObjectRef + Send + Sync + 'static) -> Self {
        Self {
            build: Box::new(build),
            state: Mutex::new(LazyState::Unbuilt),
        }
    }

    /// The cached instance, building it on first call.
    #[must_use]
    pub fn get(&self) -> Option<ObjectRef> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            LazyState::Built(weak) => weak.upgrade(),
            LazyState::Unbuilt => {
                let obj = (self.build)();
                *state = LazyState::Built(Arc::downgrade(&obj));
                Some(obj)
            }
        }
    }

    /// Whether the instance was built and has since been dropped.
    #[must_use]
    pub fn is_released(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            LazyState::Built(weak) => weak.strong_count() == 0,
            LazyState::Unbuilt => false,
        }
    }
}

impl Debug for LazyInstance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let label = match &*state {
            LazyState::Unbuilt => "unbuilt",
            LazyState::Built(weak) if weak.strong_count() == 0 => "released",
            LazyState::Built(_) => "live",
        };
        f.debug_struct("LazyInstance").field("state", &label).finish()
    }
}

/// One registry slot: pending (`None`) until an entry settles it.
///
/// Waiters subscribe to the slot; settling replaces the value in place and
/// wakes every subscriber at once.
#[derive(Debug)]
pub(crate) struct Container {
    slot: watch::Sender<Option<Arc<Entry>>>,
}

impl Container {
    pub(crate) fn pending() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    pub(crate) fn settled(entry: Arc<Entry>) -> Self {
        let (slot, _) = watch::channel(Some(entry));
        Self { slot }
    }

    pub(crate) fn entry(&self) -> Option<Arc<Entry>> {
        self.slot.borrow().clone()
    }

    pub(crate) fn settle(&self, entry: Arc<Entry>) {
        self.slot.send_replace(Some(entry));
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<Arc<Entry>>> {
        self.slot.subscribe()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::pending()
    }
}
