/// Nesting limit for a single propagation pass.
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Tunables for a [`Store`](crate::Store).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct StoreConfig {
    /// How deep a `set` may cascade through derived and computed cells
    /// before the store stops and reports
    /// [`StoreError::PropagationDepth`](crate::StoreError::PropagationDepth).
    pub max_depth: usize,
    /// Log a warning when `set`/`update` is called on a derived or computed key.
    pub warn_on_invalid_kind: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            warn_on_invalid_kind: true,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn with_invalid_kind_warnings(mut self, enabled: bool) -> Self {
        self.warn_on_invalid_kind = enabled;
        self
    }
}
