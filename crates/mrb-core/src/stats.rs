//! Process-wide usage counters. Monitoring-only: eventual consistency
//! across handlers is fine, these never gate decisions.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use crate::domain::UserId;

#[derive(Debug, Default)]
pub struct UsageStats {
    messages: AtomicU64,
    files: AtomicU64,
    urls_scanned: AtomicU64,
    blocked: AtomicU64,
    active_users: Mutex<HashSet<i64>>,
}

#[derive(Clone, Copy, Debug)]
pub struct StatsSnapshot {
    pub messages: u64,
    pub files: u64,
    pub urls_scanned: u64,
    pub blocked: u64,
    pub active_users: usize,
}

impl UsageStats {
    pub fn record_message(&self, user: UserId) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.active_users.lock().expect("stats lock").insert(user.0);
    }

    pub fn record_file(&self) {
        self.files.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_url_scan(&self) {
        self.urls_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            files: self.files.load(Ordering::Relaxed),
            urls_scanned: self.urls_scanned.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            active_users: self.active_users.lock().expect("stats lock").len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_users_dedup() {
        let stats = UsageStats::default();
        stats.record_message(UserId(1));
        stats.record_message(UserId(1));
        stats.record_message(UserId(2));
        stats.record_file();
        stats.record_url_scan();
        stats.record_blocked();

        let s = stats.snapshot();
        assert_eq!(s.messages, 3);
        assert_eq!(s.files, 1);
        assert_eq!(s.urls_scanned, 1);
        assert_eq!(s.blocked, 1);
        assert_eq!(s.active_users, 2);
    }
}
