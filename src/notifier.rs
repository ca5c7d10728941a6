//! Chat transport seam: the engine only ever talks to a
//! `Notifier`/`Authorizer` pair, never to a concrete bot library. Grounded
//! in the standard interface-only treatment of everything it considers an
//! external collaborator (e.g. `network_proxy`'s trait boundary around the
//! actual HTTP stack).

use crate::ids::UserId;

/// Opaque handle to a previously-sent chat message, returned by
/// `Notifier::send` and consumed by `edit`/`delete`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub String);

/// The chat transport's message primitives. An implementation plugs in Telegram, Discord,
/// Slack, or anything else; the engine only calls these three operations.
pub trait Notifier: Send + Sync {
    fn send(&self, user: UserId, text: &str) -> anyhow::Result<MessageHandle>;
    fn edit(&self, handle: &MessageHandle, text: &str) -> anyhow::Result<()>;
    fn delete(&self, handle: &MessageHandle) -> anyhow::Result<()>;
}

/// Authorisation is a set-membership check against the owner id plus an
/// auth list; the list itself is out of scope.
pub trait Authorizer: Send + Sync {
    fn is_authorized(&self, user: UserId) -> bool;
}

/// Default `Authorizer` backed by an in-memory/JSON-file set, matching
/// 's "Auth list: array of integer ids" file format.
pub struct StaticAuthList {
    owner: UserId,
    extra: std::collections::HashSet<UserId>,
}

impl StaticAuthList {
    pub fn new(owner: UserId, extra: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            owner,
            extra: extra.into_iter().collect(),
        }
    }

    pub fn load(path: &std::path::Path, owner: UserId) -> anyhow::Result<Self> {
        let ids: Vec<i64> = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(_) => Vec::new(),
        };
        Ok(Self::new(owner, ids.into_iter().map(UserId)))
    }

    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let ids: Vec<i64> = self.extra.iter().map(|u| u.0).collect();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&ids)?)?;
        Ok(())
    }

    pub fn add(&mut self, user: UserId) {
        self.extra.insert(user);
    }

    pub fn remove(&mut self, user: UserId) {
        self.extra.remove(&user);
    }
}

impl Authorizer for StaticAuthList {
    fn is_authorized(&self, user: UserId) -> bool {
        user == self.owner || self.extra.contains(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_is_always_authorized() {
        let list = StaticAuthList::new(UserId(1), []);
        assert!(list.is_authorized(UserId(1)));
        assert!(!list.is_authorized(UserId(2)));
    }

    #[test]
    fn auth_list_save_then_load_round_trips_membership() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        let mut list = StaticAuthList::new(UserId(1), []);
        list.add(UserId(42));
        list.save(&path).unwrap();

        let reloaded = StaticAuthList::load(&path, UserId(1)).unwrap();
        assert!(reloaded.is_authorized(UserId(42)));
        assert!(!reloaded.is_authorized(UserId(99)));
    }
}
