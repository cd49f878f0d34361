//! Collision list: append-only record of foreign addresses from which an
//! SSRC collision was observed (spec.md §4.6).

use std::net::SocketAddr;
use std::time::Duration;

use crate::table::Table;

#[derive(Default)]
pub struct CollisionList {
    entries: Table<SocketAddr, Duration>,
}

impl CollisionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `addr` as colliding at `now`. Returns `true` if this is a
    /// newly created entry, `false` if it updates an existing one.
    pub fn update_address(&mut self, addr: SocketAddr, now: Duration) -> bool {
        self.entries.insert(addr, now).is_none()
    }

    pub fn has_address(&self, addr: &SocketAddr) -> bool {
        self.entries.contains_key(addr)
    }

    /// Removes entries last touched before `now - delay`.
    pub fn timeout(&mut self, now: Duration, delay: Duration) {
        let cutoff = now.checked_sub(delay).unwrap_or_default();
        self.entries.retain(|_, last| *last >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_reports_newly_created() {
        let mut list = CollisionList::new();
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert!(list.update_address(addr, Duration::from_secs(1)));
        assert!(!list.update_address(addr, Duration::from_secs(2)));
    }

    #[test]
    fn timeout_removes_stale_entries() {
        let mut list = CollisionList::new();
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        list.update_address(addr, Duration::from_secs(1));
        list.timeout(Duration::from_secs(20), Duration::from_secs(10));
        assert!(!list.has_address(&addr));
    }
}
