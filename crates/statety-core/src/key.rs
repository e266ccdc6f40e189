use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

slotmap::new_key_type! {
    /// Untyped identity of a cell inside one [`Store`](crate::Store).
    ///
    /// Ids are minted by the store's slot map. A slot freed by `delete` is
    /// reused with a bumped version, so an id held past deletion never
    /// matches the cell that later occupies the slot.
    pub struct KeyId;
}

/// What a key may be used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyKind {
    /// Independently settable.
    Base,
    /// Recomputed from exactly one source.
    Derived,
    /// Recomputed from an ordered list of sources.
    Computed,
}

impl KeyKind {
    /// Only base keys accept `set`/`update`.
    pub fn is_settable(self) -> bool {
        match self {
            KeyKind::Base => true,
            KeyKind::Derived | KeyKind::Computed => false,
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyKind::Base => "base",
            KeyKind::Derived => "derived",
            KeyKind::Computed => "computed",
        })
    }
}

/// Typed handle to a cell.
///
/// Equality and hashing use the identity only: two keys created with the same
/// name are different keys. The name is carried for diagnostics.
pub struct Key<T> {
    store: u64,
    id: KeyId,
    kind: KeyKind,
    name: Rc<str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub(crate) fn new(store: u64, id: KeyId, kind: KeyKind, name: Rc<str>) -> Self {
        Self {
            store,
            id,
            kind,
            name,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> KeyId {
        self.id
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn store(&self) -> u64 {
        self.store
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            id: self.id,
            kind: self.kind,
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.store == other.store && self.id == other.id
    }
}

impl<T> Eq for Key<T> {}

impl<T> Hash for Key<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.store.hash(state);
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

impl<T> fmt::Display for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} key `{}`", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn equality_ignores_name() {
        let mut ids: SlotMap<KeyId, ()> = SlotMap::with_key();
        let a = ids.insert(());
        let b = ids.insert(());

        let k1: Key<i32> = Key::new(1, a, KeyKind::Base, "same".into());
        let k2: Key<i32> = Key::new(1, b, KeyKind::Base, "same".into());
        assert_ne!(k1, k2);
        assert_eq!(k1, k1.clone());
    }

    #[test]
    fn keys_from_different_stores_differ() {
        let mut ids: SlotMap<KeyId, ()> = SlotMap::with_key();
        let a = ids.insert(());

        let k1: Key<i32> = Key::new(1, a, KeyKind::Base, "x".into());
        let k2: Key<i32> = Key::new(2, a, KeyKind::Base, "x".into());
        assert_ne!(k1, k2);
    }

    #[test]
    fn only_base_is_settable() {
        assert!(KeyKind::Base.is_settable());
        assert!(!KeyKind::Derived.is_settable());
        assert!(!KeyKind::Computed.is_settable());
    }

    #[test]
    fn display_names_kind_and_name() {
        let mut ids: SlotMap<KeyId, ()> = SlotMap::with_key();
        let k: Key<u8> = Key::new(1, ids.insert(()), KeyKind::Derived, "total".into());
        assert_eq!(k.to_string(), "derived key `total`");
    }
}
