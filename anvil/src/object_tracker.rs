//! Process-wide registry of live objects.
//!
//! Command pools, command buffers, page trackers and callback multiplexers register themselves
//! here when they are created and unregister when they are dropped. The registry only stores
//! ids, so it can be queried at any time to find objects that were leaked.

use foldhash::{HashMap, HashSet};
use parking_lot::Mutex;
use std::{num::NonZeroU64, sync::LazyLock};

/// The kinds of object that are tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectType {
    CommandPool,
    CommandBuffer,
    PageTracker,
    CallbackMultiplexer,
}

static REGISTRY: LazyLock<Mutex<HashMap<ObjectType, HashSet<NonZeroU64>>>> =
    LazyLock::new(|| Mutex::new(HashMap::default()));

/// Registers a live object. Returns `false` if the object was already registered.
pub fn register(ty: ObjectType, id: NonZeroU64) -> bool {
    let inserted = REGISTRY.lock().entry(ty).or_default().insert(id);

    if inserted {
        tracing::trace!(?ty, id = id.get(), "registered object");
    } else {
        tracing::debug!(?ty, id = id.get(), "object registered twice");
    }

    inserted
}

/// Unregisters an object. Returns `false` if the object was not registered.
pub fn unregister(ty: ObjectType, id: NonZeroU64) -> bool {
    let removed = REGISTRY
        .lock()
        .get_mut(&ty)
        .is_some_and(|ids| ids.remove(&id));

    if removed {
        tracing::trace!(?ty, id = id.get(), "unregistered object");
    } else {
        tracing::debug!(?ty, id = id.get(), "unregistered an unknown object");
    }

    removed
}

/// Returns whether the object is currently registered.
pub fn is_registered(ty: ObjectType, id: NonZeroU64) -> bool {
    REGISTRY
        .lock()
        .get(&ty)
        .is_some_and(|ids| ids.contains(&id))
}

/// Returns the number of live objects of the given type.
pub fn live_count(ty: ObjectType) -> usize {
    REGISTRY.lock().get(&ty).map_or(0, |ids| ids.len())
}
