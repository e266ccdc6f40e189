//! Derived and computed cells.
//!
//! A dependent cell owns one recompute link per source. A link is an ordinary
//! subscription on the source whose callback re-runs the dependent's producer
//! and commits the result through the same change gate as `set`. Propagation
//! is therefore depth-first and synchronous: a single `set` returns only after
//! every reachable dependent has recomputed.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::cleanup::Cleanup;
use crate::subscription::Callback;
use crate::value::StateValue;
use crate::{Key, KeyId, KeyKind, Result, Store, StoreError};

type Producer<T> = Rc<dyn Fn(&Store) -> Option<T>>;

impl Store {
    /// Creates a read-only cell recomputed from `source` with `f`.
    ///
    /// `f` runs once before this returns, and again after every change of
    /// `source`. It borrows the source value and cannot mutate it.
    ///
    /// ```rust
    /// use statety_core::Store;
    ///
    /// let store = Store::new();
    /// let celsius = store.create("celsius", 20.0);
    /// let fahrenheit = store
    ///     .derive("fahrenheit", &celsius, |c| c.map(|c| c * 9.0 / 5.0 + 32.0))
    ///     .unwrap();
    /// assert_eq!(store.read(&fahrenheit), Some(68.0));
    /// ```
    pub fn derive<S, T>(
        &self,
        name: &str,
        source: &Key<S>,
        f: impl Fn(Option<&S>) -> Option<T> + 'static,
    ) -> Result<Key<T>>
    where
        S: StateValue,
        T: StateValue,
    {
        let input = source.clone();
        let produce: Producer<T> = Rc::new(move |store: &Store| {
            let value = store.get(&input);
            f(value.as_deref())
        });
        self.link(name, KeyKind::Derived, std::slice::from_ref(source), produce)
    }

    /// Creates a read-only cell recomputed from every key in `sources`.
    ///
    /// Whenever any source changes, `f` receives the current values of all
    /// sources, in the order given.
    ///
    /// ```rust
    /// use statety_core::Store;
    ///
    /// let store = Store::new();
    /// let a = store.create("a", 1);
    /// let b = store.create("b", 1);
    /// let sum = store
    ///     .compute("sum", &[a.clone(), b.clone()], |v| {
    ///         Some(v.iter().flatten().copied().sum::<i32>())
    ///     })
    ///     .unwrap();
    ///
    /// store.set(&a, 2).unwrap();
    /// assert_eq!(store.read(&sum), Some(3));
    /// store.set(&b, 3).unwrap();
    /// assert_eq!(store.read(&sum), Some(5));
    /// ```
    pub fn compute<S, T>(
        &self,
        name: &str,
        sources: &[Key<S>],
        f: impl Fn(&[Option<&S>]) -> Option<T> + 'static,
    ) -> Result<Key<T>>
    where
        S: StateValue,
        T: StateValue,
    {
        let inputs = sources.to_vec();
        let produce: Producer<T> = Rc::new(move |store: &Store| {
            let values: SmallVec<[Option<Rc<S>>; 4]> =
                inputs.iter().map(|key| store.get(key)).collect();
            let refs: SmallVec<[Option<&S>; 4]> = values.iter().map(|v| v.as_deref()).collect();
            f(&refs)
        });
        self.link(name, KeyKind::Computed, sources, produce)
    }

    /// Inserts the dependent cell, wires one link per live source and runs
    /// the first recompute.
    fn link<S, T>(
        &self,
        name: &str,
        kind: KeyKind,
        sources: &[Key<S>],
        produce: Producer<T>,
    ) -> Result<Key<T>>
    where
        S: StateValue,
        T: StateValue,
    {
        let key = {
            let mut inner = self.inner.borrow_mut();
            let live: SmallVec<[KeyId; 2]> =
                sources.iter().filter_map(|s| inner.resolve(s)).collect();
            if live.len() < sources.len() {
                log::debug!(
                    "{name}: {} of {} source(s) no longer exist and will never update it",
                    sources.len() - live.len(),
                    sources.len()
                );
            }

            let key = inner.insert_cell::<T>(name, kind, live.clone(), None);
            let target = key.id();
            if inner.reaches(&live, target) {
                inner.remove_cell(target);
                log::warn!("refusing to create {kind} key `{name}`: dependency cycle");
                return Err(StoreError::Cycle {
                    name: name.to_string(),
                });
            }

            for &source in &live {
                let weak = Rc::downgrade(&self.inner);
                let produce = produce.clone();
                let callback = Callback::<S>::new(move |_: Option<&S>| {
                    if let Some(store) = Store::from_weak(&weak) {
                        store.recompute(target, &*produce);
                    }
                });
                let subscription = inner.add_subscriber(source, callback, Some(target));
                if let Some(list) = inner.cleanups.get_mut(target) {
                    list.push(Cleanup::Link {
                        source,
                        subscription,
                    });
                }
            }
            key
        };

        log::debug!("created {key} over {} source(s)", sources.len());
        self.recompute(key.id(), &*produce);
        self.settle()?;
        Ok(key)
    }
}
