use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

/// Store-wide, monotonically increasing subscription number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

/// Typed change callback. Held type-erased in the subscriber table and
/// recovered with `Rc::downcast` by the notifier.
pub(crate) struct Callback<T>(pub(crate) Box<dyn Fn(Option<&T>)>);

impl<T: 'static> Callback<T> {
    pub(crate) fn new(f: impl Fn(Option<&T>) + 'static) -> Rc<Self> {
        Rc::new(Self(Box::new(f)))
    }
}

pub(crate) struct Subscriber {
    pub(crate) id: SubscriptionId,
    pub(crate) callback: Rc<dyn Any>,
}

/// Subscribers of one cell, in registration order.
pub(crate) type SubscriberList = SmallVec<[Subscriber; 4]>;

/// Handle returned by [`Store::subscribe`](crate::Store::subscribe).
///
/// Dropping it does not unsubscribe; call [`run`](Unsubscribe::run).
#[derive(Clone)]
pub struct Unsubscribe(Rc<RefCell<Option<Box<dyn FnOnce()>>>>);

impl Unsubscribe {
    pub(crate) fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(RefCell::new(Some(Box::new(f)))))
    }

    /// Handle for a subscription that was never registered.
    pub fn noop() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }

    /// Runs at most once (safe to call multiple times).
    pub fn run(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f()
        }
    }

    /// `false` once run, and for no-op handles.
    pub fn is_active(&self) -> bool {
        self.0.borrow().is_some()
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.is_active())
            .finish()
    }
}
