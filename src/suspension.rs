//! Suspension Registry: holds jobs parked awaiting an out-of-band
//! subtitle file, per user, FIFO. Resumption re-inserts at the head of the
//! queue by design, not appended to the tail.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::ids::{CacheId, UserId};
use crate::job::Job;
use crate::notifier::MessageHandle;
use crate::sync_ext::MutexExt;

/// A job parked awaiting a subtitle upload.
pub struct PendingSubtitleEntry {
    pub job: Job,
    pub downloaded_file: PathBuf,
    pub status_message: Option<MessageHandle>,
    pub cache_id: CacheId,
}

/// Per-user FIFO of parked jobs. `pop_oldest` always returns entry 0 for
/// that user, matching invariant 8 ("attaches to the head of U's
/// pending-subtitle list").
#[derive(Default)]
pub struct SuspensionRegistry {
    by_user: Mutex<HashMap<UserId, VecDeque<PendingSubtitleEntry>>>,
}

impl SuspensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suspend(&self, entry: PendingSubtitleEntry) {
        let owner = entry.job.owner;
        self.by_user
        .lock_unpoisoned()
        .entry(owner)
        .or_default()
        .push_back(entry);
    }

    /// Pops the oldest pending entry for `user`, if any.
    pub fn pop_oldest(&self, user: UserId) -> Option<PendingSubtitleEntry> {
        let mut by_user = self.by_user.lock_unpoisoned();
        let queue = by_user.get_mut(&user)?;
        let entry = queue.pop_front();
        if queue.is_empty() {
            by_user.remove(&user);
        }
        entry
    }

    pub fn pending_count(&self, user: UserId) -> usize {
        self.by_user
        .lock_unpoisoned()
        .get(&user)
        .map(VecDeque::len)
        .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobKind, JobSource};

    fn entry(user: UserId, name: &str) -> PendingSubtitleEntry {
        PendingSubtitleEntry {
            job: Job::new(user, JobKind::Encode, JobSource::Url("u".into()), name.into()),
            downloaded_file: PathBuf::from("/tmp/x.mkv"),
            status_message: None,
            cache_id: CacheId(1),
        }
    }

    #[test]
    fn pop_oldest_returns_entries_in_fifo_order() {
        let registry = SuspensionRegistry::new();
        registry.suspend(entry(UserId(1), "first"));
        registry.suspend(entry(UserId(1), "second"));

        let first = registry.pop_oldest(UserId(1)).unwrap();
        assert_eq!(first.job.display_name, "first");
        let second = registry.pop_oldest(UserId(1)).unwrap();
        assert_eq!(second.job.display_name, "second");
        assert!(registry.pop_oldest(UserId(1)).is_none());
    }

    #[test]
    fn pending_entries_are_scoped_per_user() {
        let registry = SuspensionRegistry::new();
        registry.suspend(entry(UserId(1), "mine"));
        assert_eq!(registry.pending_count(UserId(1)), 1);
        assert_eq!(registry.pending_count(UserId(2)), 0);
    }
}
