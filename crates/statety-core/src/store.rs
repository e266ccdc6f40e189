use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use slotmap::{SecondaryMap, SlotMap};
use smallvec::SmallVec;

use crate::cleanup::{Cleanup, CleanupList};
use crate::subscription::{Callback, Subscriber, SubscriberList, SubscriptionId, Unsubscribe};
use crate::value::{Draft, StateValue, has_changed};
use crate::{Key, KeyId, KeyKind, Result, StoreConfig, StoreError};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) type SubscriberSnapshot = SmallVec<[(SubscriptionId, Rc<dyn Any>); 4]>;

pub(crate) struct CellMeta {
    pub(crate) name: Rc<str>,
    pub(crate) kind: KeyKind,
    /// Declared sources, kept after the sources are deleted.
    pub(crate) sources: SmallVec<[KeyId; 2]>,
}

/// The tables behind a [`Store`]. A live cell has an entry in every table.
pub(crate) struct StoreInner {
    id: u64,
    pub(crate) config: StoreConfig,
    pub(crate) cells: SlotMap<KeyId, CellMeta>,
    /// `None` is the absent value.
    pub(crate) values: SecondaryMap<KeyId, Option<Rc<dyn Any>>>,
    pub(crate) subscribers: SecondaryMap<KeyId, SubscriberList>,
    pub(crate) cleanups: SecondaryMap<KeyId, CleanupList>,
    next_subscription: u64,
    depth: usize,
    fault: Option<StoreError>,
}

impl StoreInner {
    fn new(config: StoreConfig) -> Self {
        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            config,
            cells: SlotMap::with_key(),
            values: SecondaryMap::new(),
            subscribers: SecondaryMap::new(),
            cleanups: SecondaryMap::new(),
            next_subscription: 0,
            depth: 0,
            fault: None,
        }
    }

    /// The live id behind `key`, if it was minted here and not deleted.
    pub(crate) fn resolve<T>(&self, key: &Key<T>) -> Option<KeyId> {
        (key.store() == self.id && self.cells.contains_key(key.id())).then_some(key.id())
    }

    pub(crate) fn insert_cell<T: StateValue>(
        &mut self,
        name: &str,
        kind: KeyKind,
        sources: SmallVec<[KeyId; 2]>,
        value: Option<Rc<T>>,
    ) -> Key<T> {
        let name: Rc<str> = name.into();
        let id = self.cells.insert(CellMeta {
            name: name.clone(),
            kind,
            sources,
        });
        self.values.insert(id, value.map(|v| v as Rc<dyn Any>));
        self.subscribers.insert(id, SubscriberList::new());
        self.cleanups.insert(id, CleanupList::new());
        Key::new(self.id, id, kind, name)
    }

    pub(crate) fn remove_cell(&mut self, id: KeyId) {
        self.subscribers.remove(id);
        self.cleanups.remove(id);
        self.values.remove(id);
        self.cells.remove(id);
    }

    pub(crate) fn value_of<T: StateValue>(&self, id: KeyId) -> Option<Rc<T>> {
        self.values.get(id)?.clone()?.downcast::<T>().ok()
    }

    /// Appends `callback` to the subscriber set of `id` and records the
    /// matching cleanup entry.
    pub(crate) fn add_subscriber(
        &mut self,
        id: KeyId,
        callback: Rc<dyn Any>,
        dependent: Option<KeyId>,
    ) -> SubscriptionId {
        let subscription = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;

        if let Some(list) = self.subscribers.get_mut(id) {
            list.push(Subscriber {
                id: subscription,
                callback,
            });
        }
        if let Some(list) = self.cleanups.get_mut(id) {
            list.push(Cleanup::Subscription {
                id: subscription,
                dependent,
            });
        }
        subscription
    }

    pub(crate) fn remove_subscriber(&mut self, id: KeyId, subscription: SubscriptionId) {
        if let Some(list) = self.subscribers.get_mut(id) {
            list.retain(|s| s.id != subscription);
        }
        if let Some(list) = self.cleanups.get_mut(id) {
            list.retain(|c| !c.is_subscription(subscription));
        }
    }

    fn is_subscribed(&self, id: KeyId, subscription: SubscriptionId) -> bool {
        self.subscribers
            .get(id)
            .is_some_and(|list| list.iter().any(|s| s.id == subscription))
    }

    fn subscriber_snapshot(&self, id: KeyId) -> SubscriberSnapshot {
        self.subscribers
            .get(id)
            .map(|list| list.iter().map(|s| (s.id, s.callback.clone())).collect())
            .unwrap_or_default()
    }

    fn run_cleanup(&mut self, entry: Cleanup) {
        match entry {
            Cleanup::Subscription {
                id,
                dependent: Some(dependent),
            } => {
                // the dependent keeps its value but loses the dangling link
                if let Some(list) = self.cleanups.get_mut(dependent) {
                    list.retain(|c| !c.is_link(id));
                }
            }
            Cleanup::Subscription {
                dependent: None, ..
            } => {}
            Cleanup::Link {
                source,
                subscription,
            } => self.remove_subscriber(source, subscription),
        }
    }

    /// Whether walking declared sources from `from` reaches `target`.
    pub(crate) fn reaches(&self, from: &[KeyId], target: KeyId) -> bool {
        let mut stack: Vec<KeyId> = from.to_vec();
        let mut visited = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(cell) = self.cells.get(id) {
                stack.extend(cell.sources.iter().copied());
            }
        }
        false
    }

    fn cell_info(&self, id: KeyId) -> Option<CellInfo> {
        let cell = self.cells.get(id)?;
        Some(CellInfo {
            id,
            name: cell.name.to_string(),
            kind: cell.kind,
            has_value: self.values.get(id).is_some_and(Option::is_some),
            subscribers: self.subscribers.get(id).map_or(0, |l| l.len()),
            cleanups: self.cleanups.get(id).map_or(0, |l| l.len()),
            sources: cell.sources.to_vec(),
        })
    }
}

/// Table-level view of one cell, for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellInfo {
    pub id: KeyId,
    pub name: String,
    pub kind: KeyKind,
    pub has_value: bool,
    pub subscribers: usize,
    pub cleanups: usize,
    /// Declared sources; may name cells that have since been deleted.
    pub sources: Vec<KeyId>,
}

/// Handle to a reactive keyed-value store.
///
/// Cloning the handle shares the same tables. The store is single-threaded:
/// every operation runs to completion on the calling thread, including the
/// whole recompute cascade a `set` triggers.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Rc<RefCell<StoreInner>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Store")
            .field("cells", &inner.cells.len())
            .field("config", &inner.config)
            .finish()
    }
}

/// Decrements the propagation depth when a nested step finishes.
pub(crate) struct DepthGuard<'a> {
    inner: &'a RefCell<StoreInner>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.depth = inner.depth.saturating_sub(1);
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreInner::new(config))),
        }
    }

    pub fn config(&self) -> StoreConfig {
        self.inner.borrow().config.clone()
    }

    pub(crate) fn from_weak(weak: &Weak<RefCell<StoreInner>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Registers a base cell holding `default` (or absent).
    pub fn create<T: StateValue>(&self, name: &str, default: impl Into<Option<T>>) -> Key<T> {
        let value = default.into().map(Rc::new);
        let key = self
            .inner
            .borrow_mut()
            .insert_cell(name, KeyKind::Base, SmallVec::new(), value);
        log::debug!("created {key}");
        key
    }

    /// The live stored value. Unchanged values keep their `Rc` identity.
    pub fn get<T: StateValue>(&self, key: &Key<T>) -> Option<Rc<T>> {
        let inner = self.inner.borrow();
        let id = inner.resolve(key)?;
        inner.value_of(id)
    }

    /// A private copy of the current value.
    pub fn read<T: StateValue>(&self, key: &Key<T>) -> Option<T> {
        self.get(key).map(|v| T::clone(&v))
    }

    pub fn contains<T>(&self, key: &Key<T>) -> bool {
        self.inner.borrow().resolve(key).is_some()
    }

    /// Whether `key` was minted by this store, whether or not it was deleted
    /// since.
    pub fn owns<T>(&self, key: &Key<T>) -> bool {
        key.store() == self.inner.borrow().id
    }

    /// Replaces the value of a base key; `None` clears it.
    ///
    /// Unknown or deleted keys are ignored.
    pub fn set<T: StateValue>(&self, key: &Key<T>, value: impl Into<Option<T>>) -> Result<()> {
        let value = value.into().map(Rc::new);
        self.mutate(key, move |_| value)
    }

    /// Runs `updater` on a copy-on-write draft of the current value and
    /// commits the result.
    ///
    /// ```rust
    /// use statety_core::Store;
    ///
    /// let store = Store::new();
    /// let count = store.create("count", 1);
    /// store.update(&count, |d| d.map(|n| n + 1)).unwrap();
    /// assert_eq!(store.read(&count), Some(2));
    /// ```
    pub fn update<T: StateValue>(
        &self,
        key: &Key<T>,
        updater: impl FnOnce(&mut Draft<T>),
    ) -> Result<()> {
        self.mutate(key, move |current| {
            let mut draft = Draft::new(current);
            updater(&mut draft);
            draft.into_inner()
        })
    }

    fn mutate<T: StateValue>(
        &self,
        key: &Key<T>,
        produce: impl FnOnce(Option<Rc<T>>) -> Option<Rc<T>>,
    ) -> Result<()> {
        let (id, current) = {
            let inner = self.inner.borrow();
            let Some(id) = inner.resolve(key) else {
                log::trace!("ignoring write to unknown {key}");
                return Ok(());
            };
            match key.kind() {
                KeyKind::Base => {}
                kind @ (KeyKind::Derived | KeyKind::Computed) => {
                    if inner.config.warn_on_invalid_kind {
                        log::warn!("rejected write to {key}; only base keys can be set");
                    }
                    return Err(StoreError::InvalidKeyKind {
                        name: key.name().to_string(),
                        kind,
                    });
                }
            }
            (id, inner.value_of::<T>(id))
        };

        let Some(guard) = self.descend(id) else {
            return self.settle();
        };
        // the updater may read the store, so no borrow is held here
        let next = produce(current);
        self.commit(id, next);
        drop(guard);
        self.settle()
    }

    /// Registers `callback` for every change of `key`.
    ///
    /// Unknown keys get a no-op handle and the callback is never called.
    pub fn subscribe<T: StateValue>(
        &self,
        key: &Key<T>,
        callback: impl Fn(Option<&T>) + 'static,
    ) -> Unsubscribe {
        let (id, subscription) = {
            let mut inner = self.inner.borrow_mut();
            let Some(id) = inner.resolve(key) else {
                log::trace!("subscribe on unknown {key}");
                return Unsubscribe::noop();
            };
            (id, inner.add_subscriber(id, Callback::<T>::new(callback), None))
        };

        let weak = Rc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().remove_subscriber(id, subscription);
            }
        })
    }

    /// Clears `key`, notifies its subscribers of the transition, retires every
    /// subscription and recompute link it holds, then forgets it.
    ///
    /// Cells derived from `key` are kept; they stop updating. Deleting twice
    /// is a no-op.
    pub fn delete<T: StateValue>(&self, key: &Key<T>) {
        let Some(id) = self.inner.borrow().resolve(key) else {
            return;
        };
        log::debug!("deleting {key}");

        if let Some(_guard) = self.descend(id) {
            self.commit::<T>(id, None);
        }

        {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.remove(id);
            let cleanups = inner.cleanups.remove(id).unwrap_or_default();
            for entry in cleanups {
                inner.run_cleanup(entry);
            }
            inner.values.remove(id);
            inner.cells.remove(id);
        }

        if let Err(err) = self.settle() {
            log::warn!("{err} (while deleting {key})");
        }
    }

    pub fn subscriber_count<T>(&self, key: &Key<T>) -> usize {
        let inner = self.inner.borrow();
        inner
            .resolve(key)
            .and_then(|id| inner.subscribers.get(id))
            .map_or(0, |l| l.len())
    }

    pub fn cleanup_count<T>(&self, key: &Key<T>) -> usize {
        let inner = self.inner.borrow();
        inner
            .resolve(key)
            .and_then(|id| inner.cleanups.get(id))
            .map_or(0, |l| l.len())
    }

    pub fn cell_info<T>(&self, key: &Key<T>) -> Option<CellInfo> {
        let inner = self.inner.borrow();
        inner.resolve(key).and_then(|id| inner.cell_info(id))
    }

    /// Every live cell.
    pub fn cells(&self) -> Vec<CellInfo> {
        let inner = self.inner.borrow();
        inner
            .cells
            .keys()
            .filter_map(|id| inner.cell_info(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `next` through the change gate and notifies on change.
    pub(crate) fn commit<T: StateValue>(&self, id: KeyId, next: Option<Rc<T>>) -> bool {
        let subscribers = {
            let mut inner = self.inner.borrow_mut();
            let Some(slot) = inner.values.get_mut(id) else {
                return false;
            };
            let old = slot.clone().and_then(|v| v.downcast::<T>().ok());
            if !has_changed(old.as_ref(), next.as_ref()) {
                return false;
            }
            *slot = next.clone().map(|v| v as Rc<dyn Any>);
            inner.subscriber_snapshot(id)
        };

        log::trace!("{id:?} changed; notifying {} subscriber(s)", subscribers.len());
        self.notify(id, next.as_deref(), subscribers);
        true
    }

    /// Calls each subscriber that is still registered when its turn comes.
    fn notify<T: StateValue>(&self, id: KeyId, value: Option<&T>, subscribers: SubscriberSnapshot) {
        for (subscription, callback) in subscribers {
            if !self.inner.borrow().is_subscribed(id, subscription) {
                continue;
            }
            if let Ok(callback) = callback.downcast::<Callback<T>>() {
                (callback.0)(value);
            }
        }
    }

    /// Re-runs `produce` for the cell `target` and commits the result.
    pub(crate) fn recompute<T: StateValue>(
        &self,
        target: KeyId,
        produce: &dyn Fn(&Store) -> Option<T>,
    ) {
        if !self.inner.borrow().cells.contains_key(target) {
            return;
        }
        let Some(_guard) = self.descend(target) else {
            return;
        };
        let next = produce(self).map(Rc::new);
        self.commit(target, next);
    }

    /// Enters one propagation level, or records a depth fault.
    pub(crate) fn descend(&self, id: KeyId) -> Option<DepthGuard<'_>> {
        let mut inner = self.inner.borrow_mut();
        if inner.depth >= inner.config.max_depth {
            let limit = inner.config.max_depth;
            let name = inner
                .cells
                .get(id)
                .map_or_else(String::new, |c| c.name.to_string());
            log::warn!("propagation depth limit {limit} reached at `{name}`");
            if inner.fault.is_none() {
                inner.fault = Some(StoreError::PropagationDepth { name, limit });
            }
            return None;
        }
        inner.depth += 1;
        Some(DepthGuard { inner: &self.inner })
    }

    /// Surfaces a depth fault once the outermost operation has unwound.
    pub(crate) fn settle(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.depth == 0
            && let Some(err) = inner.fault.take()
        {
            return Err(err);
        }
        Ok(())
    }
}
