use std::collections::HashMap;
use std::sync::Mutex;

use crate::ids::UserId;
use crate::sync_ext::MutexExt;

use super::group::ProcessGroup;

/// Per-user set of currently-running process groups. `cancel` iterates a user's set and
/// kills every group in it; invariant 7 in depends on this being kept in
/// sync with actual subprocess lifetime.
#[derive(Default)]
pub struct ActiveProcessRegistry {
    by_user: Mutex<HashMap<UserId, Vec<ProcessGroup>>>,
}

impl ActiveProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user: UserId, group: ProcessGroup) {
        self.by_user
        .lock_unpoisoned()
        .entry(user)
        .or_default()
        .push(group);
    }

    pub fn unregister(&self, user: UserId, group: ProcessGroup) {
        if let Some(groups) = self.by_user.lock_unpoisoned().get_mut(&user) {
            groups.retain(|g| g.pid() != group.pid());
        }
    }

    /// Kill every process group registered for `user`. Used by `cancel`
    /// to tear down whatever is currently running for that user.
    pub fn kill_all(&self, user: UserId) {
        let groups = self
        .by_user
        .lock_unpoisoned()
        .get(&user)
        .cloned()
        .unwrap_or_default();
        for group in groups {
            group.kill();
        }
    }

    pub fn count(&self, user: UserId) -> usize {
        self.by_user
        .lock_unpoisoned()
        .get(&user)
        .map(Vec::len)
        .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister_tracks_count() {
        let registry = ActiveProcessRegistry::new();
        let user = UserId(1);
        let group = ProcessGroup::of(42);
        registry.register(user, group);
        assert_eq!(registry.count(user), 1);
        registry.unregister(user, group);
        assert_eq!(registry.count(user), 0);
    }
}
