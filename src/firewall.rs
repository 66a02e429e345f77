//! The firewall boundary the monitor calls into. No specific OS firewall
//! mechanism is implemented here — only the trait contract and a logging
//! adapter that satisfies it for hosts (and tests) with no privileged
//! firewall access configured.

use std::collections::HashSet;
use std::sync::Mutex;

/// `ensure_block` must be idempotent: calling it twice for the same `ip`
/// leaves the host in the same blocked state as calling it once.
pub trait FirewallAdapter: Send + Sync {
    fn ensure_block(&self, ip: &str, reason: &str) -> (bool, Option<String>);
}

/// Records block requests without touching any OS firewall. Used when no
/// privileged adapter is configured, and in tests that exercise
/// `Monitor::maybe_block` without root.
pub struct LoggingFirewall {
    seen: Mutex<HashSet<String>>,
}

impl LoggingFirewall {
    pub fn new() -> Self {
        Self { seen: Mutex::new(HashSet::new()) }
    }

    pub fn blocked_ips(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().cloned().collect()
    }
}

impl Default for LoggingFirewall {
    fn default() -> Self {
        Self::new()
    }
}

impl FirewallAdapter for LoggingFirewall {
    fn ensure_block(&self, ip: &str, reason: &str) -> (bool, Option<String>) {
        let mut seen = self.seen.lock().unwrap();
        if seen.insert(ip.to_string()) {
            tracing::info!("firewall: blocking {ip} ({reason})");
        } else {
            tracing::debug!("firewall: {ip} already blocked, ensure_block is a no-op");
        }
        (true, None)
    }
}

/// Always reports failure; used in tests exercising the "adapter failed"
/// branch of `maybe_block`.
pub struct FailingFirewall;

impl FirewallAdapter for FailingFirewall {
    fn ensure_block(&self, _ip: &str, _reason: &str) -> (bool, Option<String>) {
        (false, Some("firewall adapter unavailable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_block_is_idempotent() {
        let fw = LoggingFirewall::new();
        let first = fw.ensure_block("1.2.3.4", "auto-high");
        let second = fw.ensure_block("1.2.3.4", "auto-high");
        assert_eq!(first.0, true);
        assert_eq!(second.0, true);
        assert_eq!(fw.blocked_ips(), vec!["1.2.3.4".to_string()]);
    }

    #[test]
    fn failing_firewall_reports_failure() {
        let fw = FailingFirewall;
        let (ok, err) = fw.ensure_block("1.2.3.4", "auto-high");
        assert!(!ok);
        assert!(err.is_some());
    }
}
