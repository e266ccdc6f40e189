//! # Cells, derivations and subscriptions
//!
//! Statety is a small reactive keyed-value store. State lives in cells owned
//! by a [`Store`]; you address a cell through a typed [`Key`]. There are three
//! kinds of cells:
//!
//! - **base** cells, created with [`Store::create`] and written with
//!   [`Store::set`] / [`Store::update`];
//! - **derived** cells, recomputed from one source with [`Store::derive`];
//! - **computed** cells, recomputed from an ordered list of sources with
//!   [`Store::compute`].
//!
//! ```rust
//! use statety_core::*;
//!
//! let store = Store::new();
//! let count = store.create("count", 0);
//! let doubled = store.derive("doubled", &count, |n| n.map(|n| n * 2)).unwrap();
//!
//! store.set(&count, 21).unwrap();
//! assert_eq!(store.read(&doubled), Some(42));
//! ```
//!
//! ## Reading
//!
//! [`Store::get`] returns the live `Rc` the store holds. An unchanged cell
//! keeps handing out the same allocation, which is what snapshot-based
//! bindings compare. [`Store::read`] returns a private clone that is safe to
//! mutate.
//!
//! ## Writing
//!
//! Every write goes through one change gate: primitive values (numbers,
//! `bool`, `char`, strings) are compared by value, everything else by
//! allocation. Writing a freshly built record is always a change, and so is
//! any [`update`](Store::update) of a record, even one that leaves its
//! [`Draft`] alone. Updating a number to the value it already holds is silent.
//!
//! ```rust
//! use statety_core::*;
//!
//! #[derive(Clone)]
//! struct Profile {
//!     name: String,
//!     age: u32,
//! }
//! impl StateValue for Profile {}
//!
//! let store = Store::new();
//! let profile = store.create(
//!     "profile",
//!     Profile { name: "John".into(), age: 20 },
//! );
//! let before = store.get(&profile).unwrap();
//!
//! store
//!     .update(&profile, |draft| {
//!         if let Some(p) = draft.get_mut() {
//!             p.age += 1;
//!         }
//!     })
//!     .unwrap();
//!
//! assert_eq!(before.age, 20);
//! assert_eq!(store.read(&profile).unwrap().age, 21);
//! ```
//!
//! Derived and computed keys are read-only: `set` on them returns
//! [`StoreError::InvalidKeyKind`].
//!
//! ## Subscriptions and cleanup
//!
//! [`Store::subscribe`] returns an [`Unsubscribe`] handle that must be run to
//! stop delivery. [`Store::delete`] announces the transition to the absent
//! value, retires every subscription held against the cell and detaches it
//! from its sources. Cells derived from a deleted cell are kept and simply
//! stop updating.
//!
//! Operations on unknown or deleted keys never fail: writes are ignored,
//! reads return `None` and subscriptions are no-ops.

mod cleanup;
pub mod config;
pub mod error;
pub mod key;
pub mod prelude;
pub mod reactive;
pub mod store;
pub mod subscription;
pub mod value;

pub use config::*;
pub use error::*;
pub use key::*;
pub use prelude::*;
pub use store::*;
pub use subscription::*;
pub use value::*;
