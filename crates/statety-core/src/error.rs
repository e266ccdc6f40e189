use crate::KeyKind;

/// Rejected store operations.
///
/// Unknown or deleted keys are not errors: operations on them quietly do
/// nothing and reads return the absent value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("cannot write to `{name}`: {kind} keys are recomputed by the store")]
    InvalidKeyKind { name: String, kind: KeyKind },

    #[error("linking `{name}` to its sources would form a dependency cycle")]
    Cycle { name: String },

    #[error("recomputing `{name}` would exceed the propagation depth limit of {limit}")]
    PropagationDepth { name: String, limit: usize },
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
