//! The in-memory mirror of which IPs the monitor currently believes are
//! blocked, consulted on the hot analysis path so `maybe_block` never needs
//! a store round-trip just to check membership.

use std::collections::HashSet;
use std::sync::Mutex;

pub struct BlockedSet {
    ips: Mutex<HashSet<String>>,
}

impl BlockedSet {
    pub fn new() -> Self {
        Self { ips: Mutex::new(HashSet::new()) }
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.ips.lock().unwrap().contains(ip)
    }

    pub fn insert(&self, ip: &str) {
        self.ips.lock().unwrap().insert(ip.to_string());
    }

    pub fn remove(&self, ip: &str) {
        self.ips.lock().unwrap().remove(ip);
    }

    pub fn len(&self) -> usize {
        self.ips.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BlockedSet {
    fn default() -> Self {
        Self::new()
    }
}
