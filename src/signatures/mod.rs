//! Declarative, pure-function rules evaluated over the latest record and the
//! trailing window.

use crate::model::PacketRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SigResult {
    pub name: String,
    pub severity: Severity,
    pub description: String,
}

/// Everything a rule needs beyond the raw window: the already-computed
/// `unique_dports_15s` feature for `latest` (so rules never re-derive a
/// time-windowed quantity the pipeline already tracks) and the host's own
/// addresses (so rules can tell inbound traffic from the host's own
/// outbound connections).
pub struct RuleContext<'a> {
    pub latest: &'a PacketRecord,
    pub window: &'a [PacketRecord],
    pub unique_dports_15s: f64,
    pub local_ips: &'a [[u8; 4]],
}

impl<'a> RuleContext<'a> {
    fn is_local_source(&self) -> bool {
        self.local_ips.contains(&self.latest.src_ip)
    }
}

type RuleFn = fn(&RuleContext, &SignatureThresholds) -> Option<SigResult>;

#[derive(Debug, Clone)]
pub struct SignatureThresholds {
    pub port_scan_distinct_ports: usize,
    pub syn_flood_count: usize,
    pub known_bad_ports: Vec<u16>,
}

impl Default for SignatureThresholds {
    fn default() -> Self {
        Self {
            port_scan_distinct_ports: 8,
            syn_flood_count: 50,
            known_bad_ports: vec![23, 445, 3389],
        }
    }
}

/// Fires on the same `unique_dports_15s` the pipeline feeds the detector,
/// not a fresh scan over the ring window, since the window is a
/// fixed-capacity packet count and not a 15-second buffer.
fn rule_port_scan(ctx: &RuleContext, thresholds: &SignatureThresholds) -> Option<SigResult> {
    if ctx.unique_dports_15s > thresholds.port_scan_distinct_ports as f64 {
        return Some(SigResult {
            name: "port-scan".to_string(),
            severity: Severity::Medium,
            description: format!(
                "{} touched {} distinct destination ports in the last 15s",
                ctx.latest.src_ip_string(),
                ctx.unique_dports_15s
            ),
        });
    }
    None
}

fn rule_syn_flood(ctx: &RuleContext, thresholds: &SignatureThresholds) -> Option<SigResult> {
    let tcp_from_source = ctx
        .window
        .iter()
        .filter(|r| r.src_ip == ctx.latest.src_ip && r.protocol == 6)
        .count();
    if tcp_from_source > thresholds.syn_flood_count {
        return Some(SigResult {
            name: "syn-flood".to_string(),
            severity: Severity::High,
            description: format!(
                "{} sent {} TCP packets within the current window",
                ctx.latest.src_ip_string(),
                tcp_from_source
            ),
        });
    }
    None
}

/// Only fires on inbound connections to a known-bad port; a host reaching
/// out to its own telnet/SMB/RDP port from itself is not the scenario this
/// rule watches for.
fn rule_known_bad_port(ctx: &RuleContext, thresholds: &SignatureThresholds) -> Option<SigResult> {
    if ctx.is_local_source() {
        return None;
    }
    if thresholds.known_bad_ports.contains(&ctx.latest.dport) {
        return Some(SigResult {
            name: "known-bad-port".to_string(),
            severity: Severity::Low,
            description: format!(
                "connection to historically-abused port {} from {}",
                ctx.latest.dport,
                ctx.latest.src_ip_string()
            ),
        });
    }
    None
}

const RULES: &[RuleFn] = &[rule_port_scan, rule_syn_flood, rule_known_bad_port];

/// Evaluates every built-in rule against the latest record and the window
/// snapshot. Returns the empty list when `enabled` is false.
pub struct SignatureEngine {
    enabled: bool,
    thresholds: SignatureThresholds,
}

impl SignatureEngine {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            thresholds: SignatureThresholds::default(),
        }
    }

    pub fn with_thresholds(enabled: bool, thresholds: SignatureThresholds) -> Self {
        Self { enabled, thresholds }
    }

    pub fn evaluate(
        &self,
        latest: &PacketRecord,
        unique_dports_15s: f64,
        window: &[PacketRecord],
        local_ips: &[[u8; 4]],
    ) -> Vec<SigResult> {
        if !self.enabled {
            return Vec::new();
        }
        let ctx = RuleContext { latest, window, unique_dports_15s, local_ips };
        RULES.iter().filter_map(|rule| rule(&ctx, &self.thresholds)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(src: [u8; 4], dport: u16, protocol: u8) -> PacketRecord {
        PacketRecord {
            timestamp: 0.0,
            src_ip: src,
            dest_ip: [10, 0, 0, 1],
            protocol,
            packet_size: 64,
            sport: 1234,
            dport,
        }
    }

    #[test]
    fn disabled_engine_returns_no_hits() {
        let engine = SignatureEngine::new(false);
        let latest = record([1, 2, 3, 4], 23, 6);
        let hits = engine.evaluate(&latest, 1.0, &[latest], &[]);
        assert!(hits.is_empty());
    }

    #[test]
    fn port_scan_fires_above_threshold() {
        let src = [1, 2, 3, 4];
        let window: Vec<_> = (0u16..10).map(|p| record(src, p, 6)).collect();
        let engine = SignatureEngine::new(true);
        let hits = engine.evaluate(window.last().unwrap(), 10.0, &window, &[]);
        assert!(hits.iter().any(|h| h.name == "port-scan" && h.severity == Severity::Medium));
    }

    #[test]
    fn port_scan_does_not_fire_below_threshold() {
        let src = [1, 2, 3, 4];
        let window: Vec<_> = (0u16..3).map(|p| record(src, p, 6)).collect();
        let engine = SignatureEngine::new(true);
        let hits = engine.evaluate(window.last().unwrap(), 3.0, &window, &[]);
        assert!(!hits.iter().any(|h| h.name == "port-scan"));
    }

    #[test]
    fn syn_flood_fires_above_threshold() {
        let src = [9, 9, 9, 9];
        let window: Vec<_> = (0..60).map(|_| record(src, 80, 6)).collect();
        let engine = SignatureEngine::new(true);
        let hits = engine.evaluate(window.last().unwrap(), 1.0, &window, &[]);
        assert!(hits.iter().any(|h| h.name == "syn-flood" && h.severity == Severity::High));
    }

    #[test]
    fn known_bad_port_fires_for_telnet() {
        let latest = record([2, 2, 2, 2], 23, 6);
        let engine = SignatureEngine::new(true);
        let hits = engine.evaluate(&latest, 1.0, &[latest], &[]);
        assert!(hits.iter().any(|h| h.name == "known-bad-port" && h.severity == Severity::Low));
    }

    #[test]
    fn known_bad_port_does_not_fire_for_ordinary_port() {
        let latest = record([2, 2, 2, 2], 8080, 6);
        let engine = SignatureEngine::new(true);
        let hits = engine.evaluate(&latest, 1.0, &[latest], &[]);
        assert!(!hits.iter().any(|h| h.name == "known-bad-port"));
    }

    #[test]
    fn known_bad_port_does_not_fire_for_outbound_local_source() {
        let latest = record([10, 0, 0, 1], 23, 6);
        let engine = SignatureEngine::new(true);
        let hits = engine.evaluate(&latest, 1.0, &[latest], &[[10, 0, 0, 1]]);
        assert!(!hits.iter().any(|h| h.name == "known-bad-port"));
    }

    #[test]
    fn multiple_rules_can_fire_simultaneously() {
        let src = [3, 3, 3, 3];
        let mut window: Vec<_> = (0u16..10).map(|p| record(src, p, 6)).collect();
        window.push(record(src, 23, 6));
        let engine = SignatureEngine::new(true);
        let hits = engine.evaluate(window.last().unwrap(), 10.0, &window, &[]);
        assert!(hits.len() >= 2);
    }
}
