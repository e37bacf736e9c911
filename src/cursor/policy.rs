//! Prefetch-trigger policies.
//!
//! A policy is consulted each time the cursor advances within a batch and
//! no fetch is outstanding. Returning `true` starts the next `getMore` in the
//! background.

use serde::{Deserialize, Serialize};

/// Snapshot of the cursor handed to a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorProgress {
    /// Length of the batch being consumed
    pub batch_len: usize,

    /// Position of the current item within that batch
    pub batch_index: usize,

    /// Number of batches installed so far
    pub batch_number: u64,

    /// Documents yielded over the cursor's lifetime
    pub documents_yielded: u64,

    /// Server cursor id
    pub cursor_id: i64,
}

impl CursorProgress {
    /// Items left in the batch after the current one.
    pub fn remaining_in_batch(&self) -> usize {
        self.batch_len.saturating_sub(self.batch_index + 1)
    }
}

/// Decides whether starting a background fetch is worthwhile.
pub trait PrefetchPolicy: Send + Sync {
    fn should_prefetch(&self, progress: &CursorProgress) -> bool;
}

impl<F> PrefetchPolicy for F
where
    F: Fn(&CursorProgress) -> bool + Send + Sync,
{
    fn should_prefetch(&self, progress: &CursorProgress) -> bool {
        self(progress)
    }
}

/// Prefetch as soon as a batch starts being consumed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPrefetch;

impl PrefetchPolicy for AlwaysPrefetch {
    fn should_prefetch(&self, _progress: &CursorProgress) -> bool {
        true
    }
}

/// Never prefetch; every batch is fetched when the previous one runs out.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverPrefetch;

impl PrefetchPolicy for NeverPrefetch {
    fn should_prefetch(&self, _progress: &CursorProgress) -> bool {
        false
    }
}

/// Prefetch once at most `n` unread items remain in the batch.
#[derive(Debug, Clone, Copy)]
pub struct RemainingBelow(pub usize);

impl PrefetchPolicy for RemainingBelow {
    fn should_prefetch(&self, progress: &CursorProgress) -> bool {
        progress.remaining_in_batch() <= self.0
    }
}

/// Policy selection as it appears in configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PrefetchMode {
    Always,
    Never,
    RemainingBelow,
}

impl PrefetchMode {
    /// Build the policy for this mode.
    ///
    /// # Arguments
    /// * `threshold` - Only used by `RemainingBelow`
    pub fn to_policy(self, threshold: usize) -> Box<dyn PrefetchPolicy> {
        match self {
            PrefetchMode::Always => Box::new(AlwaysPrefetch),
            PrefetchMode::Never => Box::new(NeverPrefetch),
            PrefetchMode::RemainingBelow => Box::new(RemainingBelow(threshold)),
        }
    }
}

impl std::str::FromStr for PrefetchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(PrefetchMode::Always),
            "never" => Ok(PrefetchMode::Never),
            "remaining-below" | "remaining_below" => Ok(PrefetchMode::RemainingBelow),
            other => Err(format!("unknown prefetch mode '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(batch_len: usize, batch_index: usize) -> CursorProgress {
        CursorProgress {
            batch_len,
            batch_index,
            batch_number: 1,
            documents_yielded: batch_index as u64 + 1,
            cursor_id: 7,
        }
    }

    #[test]
    fn test_remaining_below() {
        let policy = RemainingBelow(2);
        assert!(!policy.should_prefetch(&at(10, 0)));
        assert!(!policy.should_prefetch(&at(10, 6)));
        assert!(policy.should_prefetch(&at(10, 7)));
        assert!(policy.should_prefetch(&at(10, 9)));
    }

    #[test]
    fn test_closure_policy() {
        let policy = |p: &CursorProgress| p.batch_number > 3;
        assert!(!policy.should_prefetch(&at(5, 0)));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Always".parse::<PrefetchMode>().unwrap(), PrefetchMode::Always);
        assert_eq!(
            "remaining_below".parse::<PrefetchMode>().unwrap(),
            PrefetchMode::RemainingBelow
        );
        assert!("sometimes".parse::<PrefetchMode>().is_err());
        assert!(PrefetchMode::Never.to_policy(0).should_prefetch(&at(1, 0)) == false);
    }
}
