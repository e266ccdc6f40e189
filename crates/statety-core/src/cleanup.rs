use smallvec::SmallVec;

use crate::KeyId;
use crate::subscription::SubscriptionId;

/// Teardown owed by a cell when it is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Cleanup {
    /// A subscription registered against this cell. `dependent` is the cell
    /// whose recompute link it is, `None` for external subscribers.
    Subscription {
        id: SubscriptionId,
        dependent: Option<KeyId>,
    },
    /// This cell's recompute link registered on `source`.
    Link {
        source: KeyId,
        subscription: SubscriptionId,
    },
}

impl Cleanup {
    pub(crate) fn is_subscription(&self, subscription: SubscriptionId) -> bool {
        matches!(self, Cleanup::Subscription { id, .. } if *id == subscription)
    }

    pub(crate) fn is_link(&self, subscription: SubscriptionId) -> bool {
        matches!(self, Cleanup::Link { subscription: s, .. } if *s == subscription)
    }
}

pub(crate) type CleanupList = SmallVec<[Cleanup; 4]>;
