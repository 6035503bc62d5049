//! Authorization state: owner, admin set, ban set.
//!
//! One component owns the sets and exposes atomic check/add/remove;
//! handlers never touch shared ambient state. Reads are read-after-write
//! consistent within the process, which is what gates authorization.

use std::{
    collections::HashSet,
    sync::RwLock,
};

use crate::domain::UserId;

#[derive(Debug, Default)]
struct Directory {
    admins: HashSet<i64>,
    banned: HashSet<i64>,
}

#[derive(Debug)]
pub struct UserDirectory {
    owner: i64,
    inner: RwLock<Directory>,
}

impl UserDirectory {
    pub fn new(owner_id: i64, admin_id: i64) -> Self {
        let mut admins = HashSet::new();
        admins.insert(owner_id);
        admins.insert(admin_id);
        Self {
            owner: owner_id,
            inner: RwLock::new(Directory {
                admins,
                banned: HashSet::new(),
            }),
        }
    }

    pub fn is_owner(&self, user: UserId) -> bool {
        user.0 == self.owner
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.inner.read().expect("authz lock").admins.contains(&user.0)
    }

    pub fn is_banned(&self, user: UserId) -> bool {
        self.inner.read().expect("authz lock").banned.contains(&user.0)
    }

    /// Owner-gated; returns false when the caller is not the owner.
    pub fn add_admin(&self, user: UserId, added_by: UserId) -> bool {
        if !self.is_owner(added_by) {
            return false;
        }
        self.inner.write().expect("authz lock").admins.insert(user.0);
        true
    }

    /// Owner-gated; the owner cannot be removed.
    pub fn remove_admin(&self, user: UserId, removed_by: UserId) -> bool {
        if !self.is_owner(removed_by) || user.0 == self.owner {
            return false;
        }
        self.inner.write().expect("authz lock").admins.remove(&user.0);
        true
    }

    /// Admin-gated local record; the chat-level ban goes through the
    /// transport separately.
    pub fn record_ban(&self, user: UserId, by: UserId) -> bool {
        if !self.is_admin(by) {
            return false;
        }
        self.inner.write().expect("authz lock").banned.insert(user.0);
        true
    }

    pub fn record_unban(&self, user: UserId, by: UserId) -> bool {
        if !self.is_admin(by) {
            return false;
        }
        self.inner.write().expect("authz lock").banned.remove(&user.0);
        true
    }

    pub fn admin_count(&self) -> usize {
        self.inner.read().expect("authz lock").admins.len()
    }

    pub fn banned_count(&self) -> usize {
        self.inner.read().expect("authz lock").banned.len()
    }
}
