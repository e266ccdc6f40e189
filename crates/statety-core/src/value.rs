//! Values held by cells and the change gate applied on every write.
//!
//! A stored value lives behind an `Rc`. The gate treats two writes as "the
//! same" when they share the allocation. Primitive types additionally compare
//! by value, so writing `5` over `5` is silent. Everything else (records,
//! vectors, maps) only compares by allocation: a freshly built value is always
//! a change, even if it is equal field by field. An update of such a value
//! always commits a fresh allocation, so it always notifies.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::rc::Rc;

/// A type that can be stored in a cell.
///
/// Implement it with an empty body for your own records:
///
/// ```rust
/// use statety_core::StateValue;
///
/// #[derive(Clone)]
/// struct Profile {
///     name: String,
///     age: u32,
/// }
///
/// impl StateValue for Profile {}
/// ```
pub trait StateValue: Clone + 'static {
    /// Whether the type compares by value. Updates of non-primitive values
    /// are always committed as a change.
    fn is_primitive() -> bool {
        false
    }

    /// Whether `new` may replace `old` without notifying subscribers.
    ///
    /// Only called for distinct allocations. The default says "never".
    fn same_value(old: &Self, new: &Self) -> bool {
        let _ = (old, new);
        false
    }
}

macro_rules! primitive_state_values {
    ($($t:ty),* $(,)?) => {
        $(
            impl StateValue for $t {
                fn is_primitive() -> bool {
                    true
                }

                fn same_value(old: &Self, new: &Self) -> bool {
                    old == new
                }
            }
        )*
    };
}

primitive_state_values!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char, (),
    String, &'static str,
);

impl<T: StateValue> StateValue for Option<T> {
    fn is_primitive() -> bool {
        T::is_primitive()
    }

    fn same_value(old: &Self, new: &Self) -> bool {
        match (old, new) {
            (None, None) => true,
            (Some(a), Some(b)) => T::same_value(a, b),
            _ => false,
        }
    }
}

impl<T: Clone + 'static> StateValue for Vec<T> {}
impl<T: Clone + 'static> StateValue for VecDeque<T> {}
impl<K: Clone + 'static, V: Clone + 'static, S: Clone + 'static> StateValue for HashMap<K, V, S> {}
impl<T: Clone + 'static, S: Clone + 'static> StateValue for HashSet<T, S> {}
impl<K: Clone + 'static, V: Clone + 'static> StateValue for BTreeMap<K, V> {}
impl<T: Clone + 'static> StateValue for BTreeSet<T> {}

/// Change gate: `true` when `new` must be committed and announced.
pub(crate) fn has_changed<T: StateValue>(old: Option<&Rc<T>>, new: Option<&Rc<T>>) -> bool {
    match (old, new) {
        (None, None) => false,
        (Some(a), Some(b)) => !(Rc::ptr_eq(a, b) || T::same_value(a, b)),
        _ => true,
    }
}

/// Copy-on-write working copy handed to [`Store::update`](crate::Store::update).
///
/// Reading through [`get`](Draft::get) never copies. The first
/// [`get_mut`](Draft::get_mut) clones the stored value, so references handed
/// out earlier by [`Store::get`](crate::Store::get) keep seeing the old value.
///
/// A structured value is committed as a fresh copy even when the updater only
/// read it, so every update of a record notifies. A primitive left alone
/// keeps its allocation and stays silent.
pub struct Draft<T> {
    value: Option<Rc<T>>,
    stored: Option<Rc<T>>,
}

impl<T: StateValue> Draft<T> {
    pub(crate) fn new(value: Option<Rc<T>>) -> Self {
        Self {
            stored: value.clone(),
            value,
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_deref()
    }

    /// Mutable access to the draft, cloning the stored value on first use.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut().map(Rc::make_mut)
    }

    /// Replaces the whole value; `None` clears the cell.
    pub fn replace(&mut self, value: impl Into<Option<T>>) {
        self.value = value.into().map(Rc::new);
    }

    /// Replaces a present value with `f(current)`. Absent stays absent.
    pub fn map(&mut self, f: impl FnOnce(&T) -> T) {
        if let Some(current) = self.value.as_deref() {
            let next = f(current);
            self.value = Some(Rc::new(next));
        }
    }

    pub fn clear(&mut self) {
        self.value = None;
    }

    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }

    /// The value to commit.
    pub(crate) fn into_inner(self) -> Option<Rc<T>> {
        match self.value {
            Some(value)
                if !T::is_primitive()
                    && self.stored.as_ref().is_some_and(|s| Rc::ptr_eq(s, &value)) =>
            {
                Some(Rc::new(T::clone(&value)))
            }
            value => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Profile {
        age: u32,
    }

    impl StateValue for Profile {}

    #[test]
    fn primitives_compare_by_value() {
        let a = Rc::new(5);
        let b = Rc::new(5);
        assert!(!has_changed(Some(&a), Some(&b)));
        assert!(has_changed(Some(&a), Some(&Rc::new(6))));
    }

    #[test]
    fn records_compare_by_allocation() {
        let a = Rc::new(Profile { age: 20 });
        let b = Rc::new(Profile { age: 20 });
        assert!(has_changed(Some(&a), Some(&b)));
        assert!(!has_changed(Some(&a), Some(&a.clone())));
    }

    #[test]
    fn absence_transitions_are_changes() {
        let a = Rc::new(1);
        assert!(has_changed(None, Some(&a)));
        assert!(has_changed(Some(&a), None));
        assert!(!has_changed::<i32>(None, None));
    }

    #[test]
    fn options_delegate_to_inner_type() {
        assert!(Option::<i32>::same_value(&Some(1), &Some(1)));
        assert!(!Option::<i32>::same_value(&Some(1), &None));
        assert!(!Option::<Profile>::same_value(
            &Some(Profile { age: 1 }),
            &Some(Profile { age: 1 })
        ));
    }

    #[test]
    fn untouched_primitive_draft_keeps_allocation() {
        let stored = Rc::new(7);
        let draft = Draft::new(Some(stored.clone()));
        assert_eq!(draft.get(), Some(&7));
        let out = draft.into_inner().unwrap();
        assert!(Rc::ptr_eq(&stored, &out));
    }

    #[test]
    fn untouched_record_draft_is_recommitted() {
        let stored = Rc::new(Profile { age: 20 });
        let draft = Draft::new(Some(stored.clone()));
        assert_eq!(draft.get().map(|p| p.age), Some(20));
        let out = draft.into_inner().unwrap();
        assert!(!Rc::ptr_eq(&stored, &out));
        assert_eq!(*out, Profile { age: 20 });
        assert!(has_changed(Some(&stored), Some(&out)));
    }

    #[test]
    fn primitive_hook() {
        assert!(i32::is_primitive());
        assert!(Option::<String>::is_primitive());
        assert!(!Profile::is_primitive());
        assert!(!Vec::<u8>::is_primitive());
    }

    #[test]
    fn writing_a_draft_copies_first() {
        let stored = Rc::new(Profile { age: 20 });
        let mut draft = Draft::new(Some(stored.clone()));
        draft.get_mut().unwrap().age += 1;
        draft.get_mut().unwrap().age += 1;

        let out = draft.into_inner().unwrap();
        assert_eq!(stored.age, 20);
        assert_eq!(out.age, 22);
        assert!(!Rc::ptr_eq(&stored, &out));
    }

    #[test]
    fn map_and_clear() {
        let mut draft = Draft::new(Some(Rc::new(2)));
        draft.map(|n| n * 10);
        assert_eq!(draft.get(), Some(&20));

        draft.clear();
        assert!(draft.is_absent());
        draft.map(|n| n + 1);
        assert!(draft.is_absent());
    }
}
