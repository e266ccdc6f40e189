//! Inspection helpers for a [`Store`]: table snapshots, a printable report and
//! per-key change counters.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use web_time::Instant;

use statety_core::{CellInfo, Key, KeyId, StateValue, Store, Unsubscribe};

/// Change statistics for one watched key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WatchStats {
    pub changes: u64,
    pub last_change: Option<Instant>,
    /// How many of `changes` were transitions to the absent value.
    pub cleared: u64,
}

pub struct Inspector {
    store: Store,
    stats: Rc<RefCell<HashMap<KeyId, WatchStats>>>,
    handles: Vec<Unsubscribe>,
}

impl Inspector {
    pub fn new(store: &Store) -> Self {
        Self {
            store: store.clone(),
            stats: Rc::new(RefCell::new(HashMap::new())),
            handles: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> Vec<CellInfo> {
        self.store.cells()
    }

    pub fn report(&self) -> Report {
        Report {
            cells: self.snapshot(),
            stats: self.stats.borrow().clone(),
        }
    }

    pub fn log_report(&self) {
        log::debug!("{}", self.report());
    }

    /// Starts counting changes of `key`. Returns `false` for unknown keys.
    pub fn watch<T: StateValue>(&mut self, key: &Key<T>) -> bool {
        if !self.store.contains(key) {
            return false;
        }
        let id = key.id();
        self.stats.borrow_mut().entry(id).or_default();

        let stats = self.stats.clone();
        let handle = self.store.subscribe(key, move |value: Option<&T>| {
            let mut stats = stats.borrow_mut();
            let entry = stats.entry(id).or_default();
            entry.changes += 1;
            entry.last_change = Some(Instant::now());
            if value.is_none() {
                entry.cleared += 1;
            }
        });
        self.handles.push(handle);
        log::trace!("watching {key}");
        true
    }

    /// Statistics of a watched key. Kept after the key is deleted; `None` for
    /// keys of another store.
    pub fn stats<T>(&self, key: &Key<T>) -> Option<WatchStats> {
        if !self.store.owns(key) {
            return None;
        }
        self.stats.borrow().get(&key.id()).cloned()
    }

    /// Stops every watch. Collected statistics are kept.
    pub fn unwatch_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.run();
        }
    }

    pub fn watching(&self) -> usize {
        self.handles.iter().filter(|h| h.is_active()).count()
    }
}

impl fmt::Debug for Inspector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inspector")
            .field("store", &self.store)
            .field("watching", &self.watching())
            .finish()
    }
}

/// Point-in-time view of a store, printable as a table.
#[derive(Clone, Debug)]
pub struct Report {
    pub cells: Vec<CellInfo>,
    pub stats: HashMap<KeyId, WatchStats>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "store: {} cell(s)", self.cells.len())?;
        for cell in &self.cells {
            write!(
                f,
                "  {:<8} {:<16} value={:<3} subs={} cleanups={} sources={}",
                cell.kind.to_string(),
                cell.name,
                if cell.has_value { "yes" } else { "no" },
                cell.subscribers,
                cell.cleanups,
                cell.sources.len(),
            )?;
            if let Some(s) = self.stats.get(&cell.id) {
                write!(f, " changes={} cleared={}", s.changes, s.cleared)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_snapshot_lists_cells() {
        let store = Store::new();
        let a = store.create("a", 1);
        let _b = store.derive("b", &a, |v| v.copied()).unwrap();

        let inspector = Inspector::new(&store);
        let names: Vec<_> = inspector.snapshot().into_iter().map(|c| c.name).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"a".to_string()));
        assert!(names.contains(&"b".to_string()));
    }

    #[test]
    fn test_watch_counts_changes() {
        init_logger();
        let store = Store::new();
        let a = store.create("a", 0);
        let mut inspector = Inspector::new(&store);
        assert!(inspector.watch(&a));
        assert_eq!(inspector.stats(&a), Some(WatchStats::default()));

        store.set(&a, 1).unwrap();
        store.set(&a, 1).unwrap();
        store.set(&a, 2).unwrap();

        let stats = inspector.stats(&a).unwrap();
        assert_eq!(stats.changes, 2);
        assert_eq!(stats.cleared, 0);
        assert!(stats.last_change.is_some());
    }

    #[test]
    fn test_watch_records_delete() {
        let store = Store::new();
        let a = store.create("a", 0);
        let mut inspector = Inspector::new(&store);
        inspector.watch(&a);

        store.delete(&a);
        let stats = inspector.stats(&a).unwrap();
        assert_eq!((stats.changes, stats.cleared), (1, 1));
        assert!(!inspector.watch(&a));
    }

    #[test]
    fn test_stats_ignore_keys_of_other_stores() {
        let store = Store::new();
        let other = Store::new();
        let watched = store.create("watched", 0);
        let foreign = other.create("foreign", 0);
        assert_eq!(watched.id(), foreign.id());

        let mut inspector = Inspector::new(&store);
        inspector.watch(&watched);
        store.set(&watched, 1).unwrap();

        assert_eq!(inspector.stats(&foreign), None);
        assert!(!inspector.watch(&foreign));
        assert_eq!(inspector.stats(&watched).map(|s| s.changes), Some(1));
    }

    #[test]
    fn test_unwatch_all() {
        let store = Store::new();
        let a = store.create("a", 0);
        let mut inspector = Inspector::new(&store);
        inspector.watch(&a);
        assert_eq!(store.subscriber_count(&a), 1);
        assert_eq!(inspector.watching(), 1);

        inspector.unwatch_all();
        store.set(&a, 1).unwrap();
        assert_eq!(store.subscriber_count(&a), 0);
        assert_eq!(inspector.watching(), 0);
        assert_eq!(inspector.stats(&a).map(|s| s.changes), Some(0));
    }

    #[test]
    fn test_report_renders_every_cell() {
        let store = Store::new();
        let a = store.create("alpha", 1);
        let _total = store
            .compute("total", &[a.clone()], |v| v[0].copied())
            .unwrap();
        let mut inspector = Inspector::new(&store);
        inspector.watch(&a);
        store.set(&a, 2).unwrap();

        let text = inspector.report().to_string();
        assert!(text.starts_with("store: 2 cell(s)"));
        assert!(text.contains("alpha"));
        assert!(text.contains("computed"));
        assert!(text.contains("changes=1"));
        inspector.log_report();
    }
}
