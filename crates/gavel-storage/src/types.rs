//! Option and outcome types for store writes.

use std::time::Duration;

use bytes::Bytes;

/// Existence condition attached to a write (`NX` / `XX`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCondition {
    /// Write unconditionally.
    #[default]
    Always,
    /// Skip the write if the key already exists (`NX`).
    IfNotExists,
    /// Skip the write unless the key already exists (`XX`).
    IfExists,
}

/// Options for [`KvStore::set_buffer`](crate::KvStore::set_buffer).
///
/// When `ttl` is `None` and `keep_ttl` is false the adapter applies its own
/// default TTL, so every plain write refreshes expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub condition: SetCondition,
    pub keep_ttl: bool,
    pub return_old: bool,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn maybe_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Skip the write if the key exists.
    #[must_use]
    pub fn skip_if_exists(mut self) -> Self {
        self.condition = SetCondition::IfNotExists;
        self
    }

    /// Skip the write if the key does not exist.
    #[must_use]
    pub fn skip_if_not_exists(mut self) -> Self {
        self.condition = SetCondition::IfExists;
        self
    }

    #[must_use]
    pub fn keep_ttl(mut self) -> Self {
        self.keep_ttl = true;
        self
    }

    #[must_use]
    pub fn return_old(mut self) -> Self {
        self.return_old = true;
        self
    }
}

/// Result of a (possibly conditional) write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOutcome {
    /// Whether the value was written.
    pub applied: bool,
    /// Previous value, only populated when `return_old` was requested.
    pub previous: Option<Bytes>,
}

impl SetOutcome {
    pub fn applied() -> Self {
        Self {
            applied: true,
            previous: None,
        }
    }

    pub fn skipped() -> Self {
        Self::default()
    }
}

/// Extracts the numeric `#<index>` suffix of a buffer sub-key.
///
/// Sub-keys look like `<dataKey>#<index>`; anything else yields `None`.
pub fn buffer_index(sub_key: &str) -> Option<usize> {
    sub_key
        .rsplit_once('#')
        .and_then(|(_, index)| index.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_options_builder() {
        let opts = SetOptions::new()
            .ttl(Duration::from_millis(500))
            .skip_if_exists()
            .return_old();
        assert_eq!(opts.ttl, Some(Duration::from_millis(500)));
        assert_eq!(opts.condition, SetCondition::IfNotExists);
        assert!(opts.return_old);
        assert!(!opts.keep_ttl);

        let opts = SetOptions::new().skip_if_not_exists().keep_ttl();
        assert_eq!(opts.condition, SetCondition::IfExists);
        assert!(opts.keep_ttl);
        assert_eq!(opts.ttl, None);
    }

    #[test]
    fn test_buffer_index() {
        assert_eq!(buffer_index("cache:inbound:h:GET:/files/one#3"), Some(3));
        assert_eq!(buffer_index("cache:inbound:h:GET:/files/one#12"), Some(12));
        assert_eq!(buffer_index("no-index"), None);
        assert_eq!(buffer_index("bad#index"), None);
    }
}
