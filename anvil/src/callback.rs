//! Delivery of events to a dynamic set of subscribers.
//!
//! A [`CallbackMultiplexer`] owns a fixed number of slots, declared when it is created. Each slot
//! holds an ordered list of subscriptions, and every subscription is a pair of a [`Callback`] and
//! an [`OwnerTag`]. The same callback can be subscribed several times with different tags.
//!
//! There are two ways to deliver an event:
//!
//! - [`deliver`](CallbackMultiplexer::deliver) invokes the subscribers in registration order.
//!   The slot is locked while the callbacks run: subscribing to or unsubscribing from it from
//!   inside a callback returns an error.
//! - [`deliver_reentrant`](CallbackMultiplexer::deliver_reentrant) allows callbacks to change the
//!   subscriptions of the slot they are called from. Every subscription present when the call
//!   starts is invoked exactly once. Subscriptions added during the call are invoked at most once.
//!
//! All operations are serialized by a reentrant lock, so callbacks can call back into the
//! multiplexer from the delivering thread while other threads wait.
//!
//! ```
//! use anvil::callback::{Callback, CallbackMultiplexer, OwnerTag};
//! use std::sync::{
//!     atomic::{AtomicU32, Ordering},
//!     Arc,
//! };
//!
//! let multiplexer = CallbackMultiplexer::<u32>::new(1);
//! let total = Arc::new(AtomicU32::new(0));
//!
//! let callback = Callback::new({
//!     let total = total.clone();
//!     move |value: &u32| {
//!         total.fetch_add(*value, Ordering::Relaxed);
//!     }
//! });
//!
//! multiplexer.subscribe(0, callback.clone(), OwnerTag::new(1)).unwrap();
//! multiplexer.deliver(0, &5).unwrap();
//! assert_eq!(total.load(Ordering::Relaxed), 5);
//! ```

use crate::{
    object_tracker::{self, ObjectType},
    ValidationError,
};
use foldhash::HashSet;
use parking_lot::ReentrantMutex;
use smallvec::SmallVec;
use std::{
    cell::RefCell,
    fmt::{Debug, Error as FmtError, Formatter},
    num::NonZeroU64,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

fn next_id() -> NonZeroU64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);

    NonZeroU64::new(COUNTER.fetch_add(1, Ordering::Relaxed)).unwrap_or_else(|| {
        eprintln!("an ID counter has overflown ...somehow");
        std::process::abort();
    })
}

/// A function that can be subscribed to a slot of a [`CallbackMultiplexer`].
///
/// Every call to [`Callback::new`] creates a new identity. Clones share the identity of the
/// callback they were cloned from, which is what subscription equality is based on.
pub struct Callback<A> {
    id: NonZeroU64,
    func: Arc<dyn Fn(&A) + Send + Sync>,
}

impl<A> Callback<A> {
    /// Wraps `func` in a callback with a fresh identity.
    #[inline]
    pub fn new(func: impl Fn(&A) + Send + Sync + 'static) -> Self {
        Callback {
            id: next_id(),
            func: Arc::new(func),
        }
    }

    /// Returns the identity of the callback.
    #[inline]
    pub fn id(&self) -> NonZeroU64 {
        self.id
    }

    #[inline]
    fn call(&self, argument: &A) {
        (self.func)(argument)
    }
}

impl<A> Clone for Callback<A> {
    #[inline]
    fn clone(&self) -> Self {
        Callback {
            id: self.id,
            func: self.func.clone(),
        }
    }
}

impl<A> PartialEq for Callback<A> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<A> Eq for Callback<A> {}

impl<A> Debug for Callback<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("Callback")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// An opaque value that tells apart several subscriptions of the same callback.
///
/// The tag is only compared for equality. It carries no ownership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OwnerTag(u64);

impl OwnerTag {
    #[inline]
    pub const fn new(value: u64) -> Self {
        OwnerTag(value)
    }

    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }
}

struct Subscription<A> {
    callback: Callback<A>,
    owner_tag: OwnerTag,
}

impl<A> Subscription<A> {
    fn matches(&self, callback: &Callback<A>, owner_tag: OwnerTag) -> bool {
        self.callback == *callback && self.owner_tag == owner_tag
    }
}

impl<A> Clone for Subscription<A> {
    fn clone(&self) -> Self {
        Subscription {
            callback: self.callback.clone(),
            owner_tag: self.owner_tag,
        }
    }
}

struct Slot<A> {
    subscriptions: Vec<Subscription<A>>,
    // Number of `deliver` calls in progress on this slot.
    lock_depth: u32,
}

type Snapshot<A> = SmallVec<[Subscription<A>; 4]>;

/// Publishes events of type `A` to the subscribers of a fixed set of slots.
pub struct CallbackMultiplexer<A> {
    id: NonZeroU64,
    slots: ReentrantMutex<RefCell<Vec<Slot<A>>>>,
}

impl<A> CallbackMultiplexer<A> {
    /// Creates a multiplexer with `slot_count` empty slots, numbered from `0`.
    pub fn new(slot_count: u32) -> Self {
        let slots = (0..slot_count)
            .map(|_| Slot {
                subscriptions: Vec::new(),
                lock_depth: 0,
            })
            .collect();

        let multiplexer = CallbackMultiplexer {
            id: next_id(),
            slots: ReentrantMutex::new(RefCell::new(slots)),
        };
        object_tracker::register(ObjectType::CallbackMultiplexer, multiplexer.id);

        multiplexer
    }

    /// Returns the process-unique id of the multiplexer.
    #[inline]
    pub fn id(&self) -> NonZeroU64 {
        self.id
    }

    /// Returns the number of slots.
    pub fn slot_count(&self) -> u32 {
        self.slots.lock().borrow().len() as u32
    }

    /// Adds a subscription to the end of `slot`.
    ///
    /// Fails if `slot` is out of range, if a [`deliver`](Self::deliver) call is in progress on
    /// `slot`, or if the same pair of `callback` and `owner_tag` is already subscribed.
    pub fn subscribe(
        &self,
        slot: u32,
        callback: Callback<A>,
        owner_tag: OwnerTag,
    ) -> Result<(), Box<ValidationError>> {
        let guard = self.slots.lock();
        let mut slots = guard.borrow_mut();
        let slot_state = writable_slot(&mut slots, slot)?;

        if slot_state
            .subscriptions
            .iter()
            .any(|s| s.matches(&callback, owner_tag))
        {
            return Err(Box::new(ValidationError {
                context: "callback".into(),
                problem: "is already subscribed to the slot with the same owner tag".into(),
                ..Default::default()
            }));
        }

        tracing::trace!(
            multiplexer = self.id.get(),
            slot,
            callback = callback.id.get(),
            owner_tag = owner_tag.0,
            "subscribed"
        );

        slot_state.subscriptions.push(Subscription {
            callback,
            owner_tag,
        });

        Ok(())
    }

    /// Removes the first subscription of `slot` that matches `callback` and `owner_tag`.
    ///
    /// Fails if `slot` is out of range, if a [`deliver`](Self::deliver) call is in progress on
    /// `slot`, or if there is no such subscription.
    pub fn unsubscribe(
        &self,
        slot: u32,
        callback: &Callback<A>,
        owner_tag: OwnerTag,
    ) -> Result<(), Box<ValidationError>> {
        let guard = self.slots.lock();
        let mut slots = guard.borrow_mut();
        let slot_state = writable_slot(&mut slots, slot)?;

        let index = slot_state
            .subscriptions
            .iter()
            .position(|s| s.matches(callback, owner_tag))
            .ok_or_else(|| {
                Box::new(ValidationError {
                    context: "callback".into(),
                    problem: "is not subscribed to the slot with the given owner tag".into(),
                    ..Default::default()
                })
            })?;
        slot_state.subscriptions.remove(index);

        tracing::trace!(
            multiplexer = self.id.get(),
            slot,
            callback = callback.id.get(),
            owner_tag = owner_tag.0,
            "unsubscribed"
        );

        Ok(())
    }

    /// Returns whether `callback` is subscribed to `slot` with `owner_tag`.
    ///
    /// This can be called from inside a callback. An out-of-range `slot` has no subscriptions.
    pub fn is_subscribed(&self, slot: u32, callback: &Callback<A>, owner_tag: OwnerTag) -> bool {
        let guard = self.slots.lock();
        let slots = guard.borrow();

        slots.get(slot as usize).is_some_and(|slot_state| {
            slot_state
                .subscriptions
                .iter()
                .any(|s| s.matches(callback, owner_tag))
        })
    }

    /// Returns the number of subscriptions of `slot`.
    pub fn subscriber_count(&self, slot: u32) -> usize {
        let guard = self.slots.lock();
        let slots = guard.borrow();

        slots
            .get(slot as usize)
            .map_or(0, |slot_state| slot_state.subscriptions.len())
    }

    /// Returns whether `slot` has any subscriptions. Publishers use this to skip building
    /// arguments nobody would receive.
    #[inline]
    pub fn has_subscribers(&self, slot: u32) -> bool {
        self.subscriber_count(slot) != 0
    }

    /// Invokes every subscription of `slot` in registration order, with `argument`.
    ///
    /// The slot is locked until the last callback returns. Callbacks that try to subscribe to
    /// or unsubscribe from it get an error.
    pub fn deliver(&self, slot: u32, argument: &A) -> Result<(), Box<ValidationError>> {
        let guard = self.slots.lock();

        let snapshot: Snapshot<A> = {
            let mut slots = guard.borrow_mut();
            let slot_state = slot_mut(&mut slots, slot)?;
            slot_state.lock_depth += 1;
            slot_state.subscriptions.iter().cloned().collect()
        };

        let _unlock = SlotLock {
            slots: &*guard,
            slot: slot as usize,
        };

        for subscription in &snapshot {
            subscription.callback.call(argument);
        }

        Ok(())
    }

    /// Invokes every subscription of `slot` with `argument`, allowing callbacks to change the
    /// subscriptions of the slot.
    ///
    /// Each subscription present when the call starts is invoked exactly once, even if it is
    /// unsubscribed before its turn. Subscriptions added by callbacks are invoked at most once.
    pub fn deliver_reentrant(&self, slot: u32, argument: &A) -> Result<(), Box<ValidationError>> {
        let guard = self.slots.lock();
        let mut invoked: HashSet<(NonZeroU64, OwnerTag)> = HashSet::default();
        let mut passes = 0u32;

        loop {
            let snapshot: Snapshot<A> = {
                let mut slots = guard.borrow_mut();
                let slot_state = slot_mut(&mut slots, slot)?;
                slot_state.subscriptions.iter().cloned().collect()
            };

            let mut progressed = false;

            for subscription in &snapshot {
                if invoked.insert((subscription.callback.id, subscription.owner_tag)) {
                    subscription.callback.call(argument);
                    progressed = true;
                }
            }

            passes += 1;

            if !progressed {
                break;
            }
        }

        tracing::trace!(
            multiplexer = self.id.get(),
            slot,
            invoked = invoked.len(),
            passes,
            "delivered reentrant event"
        );

        Ok(())
    }
}

impl<A> Drop for CallbackMultiplexer<A> {
    fn drop(&mut self) {
        object_tracker::unregister(ObjectType::CallbackMultiplexer, self.id);
    }
}

impl<A> Debug for CallbackMultiplexer<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        let guard = self.slots.lock();
        let slots = guard.borrow();

        f.debug_struct("CallbackMultiplexer")
            .field("id", &self.id)
            .field(
                "subscriber_counts",
                &slots
                    .iter()
                    .map(|slot_state| slot_state.subscriptions.len())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

// Releases the lock taken by `deliver`, also when a callback panics.
struct SlotLock<'a, A> {
    slots: &'a RefCell<Vec<Slot<A>>>,
    slot: usize,
}

impl<A> Drop for SlotLock<'_, A> {
    fn drop(&mut self) {
        if let Some(slot_state) = self.slots.borrow_mut().get_mut(self.slot) {
            slot_state.lock_depth -= 1;
        }
    }
}

fn slot_mut<A>(slots: &mut [Slot<A>], slot: u32) -> Result<&mut Slot<A>, Box<ValidationError>> {
    let slot_count = slots.len();

    slots.get_mut(slot as usize).ok_or_else(|| {
        Box::new(ValidationError {
            context: "slot".into(),
            problem: format!("is not less than the slot count ({})", slot_count).into(),
            ..Default::default()
        })
    })
}

fn writable_slot<A>(
    slots: &mut [Slot<A>],
    slot: u32,
) -> Result<&mut Slot<A>, Box<ValidationError>> {
    let slot_state = slot_mut(slots, slot)?;

    if slot_state.lock_depth != 0 {
        return Err(Box::new(ValidationError {
            context: "slot".into(),
            problem: "is locked because an event is being delivered to it".into(),
            ..Default::default()
        }));
    }

    Ok(slot_state)
}

#[cfg(test)]
mod tests {
    use super::{Callback, CallbackMultiplexer, OwnerTag};
    use crate::object_tracker::{self, ObjectType};
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<(&'static str, u32)>>>;

    fn logging_callback(log: &Log, name: &'static str) -> Callback<u32> {
        let log = log.clone();
        Callback::new(move |&value: &u32| log.lock().push((name, value)))
    }

    #[test]
    fn delivery_follows_slots_and_order() {
        let multiplexer = CallbackMultiplexer::new(2);
        let log = Log::default();

        let a = logging_callback(&log, "A");
        let b = logging_callback(&log, "B");
        let c = logging_callback(&log, "C");

        multiplexer.subscribe(0, a, OwnerTag::new(0x1)).unwrap();
        multiplexer.subscribe(0, b, OwnerTag::new(0x2)).unwrap();
        multiplexer.subscribe(1, c, OwnerTag::new(0x3)).unwrap();

        multiplexer.deliver(0, &10).unwrap();
        assert_eq!(*log.lock(), [("A", 10), ("B", 10)]);

        log.lock().clear();
        multiplexer.deliver(1, &20).unwrap();
        assert_eq!(*log.lock(), [("C", 20)]);
    }

    #[test]
    fn reentrant_delivery_with_mutation() {
        let multiplexer = Arc::new(CallbackMultiplexer::new(1));
        let log = Log::default();

        let b = logging_callback(&log, "B");
        let d = logging_callback(&log, "D");

        let a_cell: Arc<Mutex<Option<Callback<u32>>>> = Arc::default();
        let a = Callback::new({
            let multiplexer = Arc::downgrade(&multiplexer);
            let log = log.clone();
            let a_cell = a_cell.clone();
            let d = d.clone();

            move |&value: &u32| {
                log.lock().push(("A", value));

                let multiplexer = multiplexer.upgrade().unwrap();
                let this = a_cell.lock().clone().unwrap();
                multiplexer.unsubscribe(0, &this, OwnerTag::new(0x1)).unwrap();
                multiplexer.subscribe(0, d.clone(), OwnerTag::new(0x4)).unwrap();
            }
        });
        *a_cell.lock() = Some(a.clone());

        multiplexer.subscribe(0, a.clone(), OwnerTag::new(0x1)).unwrap();
        multiplexer.subscribe(0, b.clone(), OwnerTag::new(0x2)).unwrap();

        multiplexer.deliver_reentrant(0, &7).unwrap();

        let log = log.lock();
        assert_eq!(log[0], ("A", 7));
        assert_eq!(log[1], ("B", 7));
        assert_eq!(log.iter().filter(|&&(name, _)| name == "A").count(), 1);
        assert_eq!(log.iter().filter(|&&(name, _)| name == "B").count(), 1);
        assert!(log.iter().filter(|&&(name, _)| name == "D").count() <= 1);

        assert!(!multiplexer.is_subscribed(0, &a, OwnerTag::new(0x1)));
        assert!(multiplexer.is_subscribed(0, &b, OwnerTag::new(0x2)));
        assert!(multiplexer.is_subscribed(0, &d, OwnerTag::new(0x4)));
        assert_eq!(multiplexer.subscriber_count(0), 2);
    }

    #[test]
    fn subscribe_then_query() {
        let multiplexer = CallbackMultiplexer::<u32>::new(3);
        let callback = Callback::new(|_: &u32| {});

        for slot in 0..3 {
            for tag in [0, 1, u64::MAX] {
                multiplexer
                    .subscribe(slot, callback.clone(), OwnerTag::new(tag))
                    .unwrap();
                assert!(multiplexer.is_subscribed(slot, &callback, OwnerTag::new(tag)));
            }
        }

        assert_eq!(multiplexer.subscriber_count(1), 3);
    }

    #[test]
    fn unsubscribe_then_query() {
        let multiplexer = CallbackMultiplexer::<u32>::new(1);
        let callback = Callback::new(|_: &u32| {});
        let tag = OwnerTag::new(42);

        multiplexer.subscribe(0, callback.clone(), tag).unwrap();
        multiplexer.unsubscribe(0, &callback, tag).unwrap();
        assert!(!multiplexer.is_subscribed(0, &callback, tag));
        assert!(!multiplexer.has_subscribers(0));
    }

    #[test]
    fn reentrant_delivery_invokes_each_once() {
        // Every callback unsubscribes every subscription, including the ones not invoked yet,
        // and subscribes them again.
        let multiplexer = Arc::new(CallbackMultiplexer::<u32>::new(1));
        let log = Log::default();
        let callbacks: Arc<Mutex<Vec<(Callback<u32>, OwnerTag)>>> = Arc::default();

        for (index, name) in ["A", "B", "C", "D"].into_iter().enumerate() {
            let callback = Callback::new({
                let multiplexer = Arc::downgrade(&multiplexer);
                let log = log.clone();
                let callbacks = callbacks.clone();

                move |&value: &u32| {
                    log.lock().push((name, value));

                    let multiplexer = multiplexer.upgrade().unwrap();
                    let callbacks = callbacks.lock().clone();

                    for (callback, tag) in &callbacks {
                        multiplexer.unsubscribe(0, callback, *tag).unwrap();
                    }

                    for (callback, tag) in callbacks.into_iter().rev() {
                        multiplexer.subscribe(0, callback, tag).unwrap();
                    }
                }
            });
            let tag = OwnerTag::new(index as u64);

            callbacks.lock().push((callback.clone(), tag));
            multiplexer.subscribe(0, callback, tag).unwrap();
        }

        multiplexer.deliver_reentrant(0, &3).unwrap();

        let mut names: Vec<_> = log.lock().iter().map(|&(name, _)| name).collect();
        names.sort_unstable();
        assert_eq!(names, ["A", "B", "C", "D"]);
        assert!(log.lock().iter().all(|&(_, value)| value == 3));
    }

    #[test]
    fn mutation_during_fast_delivery() {
        let multiplexer = Arc::new(CallbackMultiplexer::<u32>::new(2));
        let results: Arc<Mutex<Vec<bool>>> = Arc::default();

        let other = Callback::new(|_: &u32| {});
        let callback = Callback::new({
            let multiplexer = Arc::downgrade(&multiplexer);
            let results = results.clone();
            let other = other.clone();

            move |_: &u32| {
                let multiplexer = multiplexer.upgrade().unwrap();
                let mut results = results.lock();
                // Same slot is locked, the other slot is not.
                results.push(
                    multiplexer
                        .subscribe(0, other.clone(), OwnerTag::new(9))
                        .is_ok(),
                );
                results.push(
                    multiplexer
                        .subscribe(1, other.clone(), OwnerTag::new(9))
                        .is_ok(),
                );
                results.push(multiplexer.is_subscribed(1, &other, OwnerTag::new(9)));
            }
        });

        multiplexer
            .subscribe(0, callback.clone(), OwnerTag::new(1))
            .unwrap();
        multiplexer.deliver(0, &0).unwrap();
        assert_eq!(*results.lock(), [false, true, true]);

        // The lock is released once delivery returns.
        multiplexer
            .unsubscribe(0, &callback, OwnerTag::new(1))
            .unwrap();
    }

    #[test]
    fn invalid_arguments() {
        let multiplexer = CallbackMultiplexer::<u32>::new(1);
        let callback = Callback::new(|_: &u32| {});
        let tag = OwnerTag::new(1);

        assert!(multiplexer.subscribe(1, callback.clone(), tag).is_err());
        assert!(multiplexer.unsubscribe(1, &callback, tag).is_err());
        assert!(multiplexer.deliver(1, &0).is_err());
        assert!(multiplexer.deliver_reentrant(5, &0).is_err());
        assert!(!multiplexer.is_subscribed(1, &callback, tag));
        assert_eq!(multiplexer.subscriber_count(1), 0);

        multiplexer.subscribe(0, callback.clone(), tag).unwrap();
        assert!(multiplexer.subscribe(0, callback.clone(), tag).is_err());
        assert!(multiplexer
            .unsubscribe(0, &callback, OwnerTag::new(2))
            .is_err());

        // A different callback with the same behavior is a different subscription.
        let lookalike = Callback::new(|_: &u32| {});
        assert!(multiplexer.subscribe(0, lookalike, tag).is_ok());
    }

    #[test]
    fn cross_thread_delivery() {
        let multiplexer = Arc::new(CallbackMultiplexer::<u32>::new(1));
        let log = Log::default();
        multiplexer
            .subscribe(0, logging_callback(&log, "A"), OwnerTag::new(0))
            .unwrap();

        let threads: Vec<_> = (0..4)
            .map(|i| {
                let multiplexer = multiplexer.clone();
                std::thread::spawn(move || multiplexer.deliver(0, &i).unwrap())
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }

        let mut values: Vec<_> = log.lock().iter().map(|&(_, value)| value).collect();
        values.sort_unstable();
        assert_eq!(values, [0, 1, 2, 3]);
    }

    #[test]
    fn tracked_while_alive() {
        let multiplexer = CallbackMultiplexer::<()>::new(1);
        let id = multiplexer.id();
        assert!(object_tracker::is_registered(
            ObjectType::CallbackMultiplexer,
            id
        ));

        drop(multiplexer);
        assert!(!object_tracker::is_registered(
            ObjectType::CallbackMultiplexer,
            id
        ));
    }
}
