//! Converts raw frames into `PacketRecord`s, maintains the trailing window,
//! and turns that window into the feature table the detector scores.

use std::collections::HashMap;

use crate::model::{parse_ipv4, PacketRecord, RingWindow};

use super::frame::parse_ip_frame;

/// The feature columns the detector is trained and scored on, in the fixed
/// order `protocol, packet_size_log, time_diff, dport, is_ephemeral_sport,
/// unique_dports_15s, direction`. The order must never change without a
/// model-format version bump since trained bundles key on it.
pub const FEATURE_NAMES: [&str; 7] = [
    "protocol",
    "packet_size_log",
    "time_diff",
    "dport",
    "is_ephemeral_sport",
    "unique_dports_15s",
    "direction",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub protocol: f64,
    pub packet_size_log: f64,
    pub time_diff: f64,
    pub dport: f64,
    pub is_ephemeral_sport: f64,
    pub unique_dports_15s: f64,
    pub direction: f64,
}

impl FeatureVector {
    pub fn to_array(self) -> [f64; 7] {
        [
            self.protocol,
            self.packet_size_log,
            self.time_diff,
            self.dport,
            self.is_ephemeral_sport,
            self.unique_dports_15s,
            self.direction,
        ]
    }

    /// Replaces any non-finite column with 0.0, matching the batch sanitation
    /// step `engineer_features` performs before returning its table.
    pub fn sanitized(self) -> Self {
        let f = |v: f64| if v.is_finite() { v } else { 0.0 };
        Self {
            protocol: f(self.protocol),
            packet_size_log: f(self.packet_size_log),
            time_diff: f(self.time_diff),
            dport: f(self.dport),
            is_ephemeral_sport: f(self.is_ephemeral_sport),
            unique_dports_15s: f(self.unique_dports_15s),
            direction: f(self.direction),
        }
    }
}

const EPHEMERAL_PORT_FLOOR: u16 = 49_152;
const DPORT_WINDOW_SECS: f64 = 15.0;

pub fn packet_size_log(size: i64) -> f64 {
    (1.0 + size.max(0) as f64).ln()
}

pub fn is_ephemeral_sport(sport: u16) -> f64 {
    if sport >= EPHEMERAL_PORT_FLOOR {
        1.0
    } else {
        0.0
    }
}

/// A heterogeneously-keyed field value, as `extract_features` accepts from
/// callers that don't share a single canonical schema.
#[derive(Debug, Clone)]
pub enum Field {
    Str(String),
    Num(f64),
}

impl Field {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Field::Num(n) => Some(*n),
            Field::Str(s) => s.parse::<f64>().ok(),
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Field::Str(s) => Some(s.as_str()),
            Field::Num(_) => None,
        }
    }
}

fn lookup<'a>(map: &'a HashMap<String, Field>, keys: &[&str]) -> Option<&'a Field> {
    keys.iter().find_map(|k| map.get(*k))
}

fn coerce_protocol(field: &Field) -> u8 {
    if let Some(s) = field.as_str() {
        return match s.to_ascii_lowercase().as_str() {
            "tcp" => 6,
            "udp" => 17,
            "icmp" => 1,
            other => other.parse::<u8>().unwrap_or(0),
        };
    }
    field.as_f64().unwrap_or(0.0) as u8
}

fn coerce_ip(field: Option<&Field>) -> [u8; 4] {
    field
        .and_then(|f| f.as_str())
        .and_then(parse_ipv4)
        .unwrap_or([0, 0, 0, 0])
}

/// Extracts fields from a loosely-typed packet-like map, accepting several
/// synonymous key spellings per field. Used at boundaries (e.g. a
/// simulated-traffic generator) that don't produce a raw frame directly.
pub fn coerce_record(fields: &HashMap<String, Field>) -> PacketRecord {
    let timestamp = lookup(fields, &["timestamp", "ts"])
        .and_then(Field::as_f64)
        .unwrap_or(0.0);
    let src_ip = coerce_ip(lookup(fields, &["src_ip", "source", "ip"]));
    let dest_ip = coerce_ip(lookup(fields, &["dest_ip", "dst_ip", "destination"]));
    let protocol = lookup(fields, &["protocol", "proto"])
        .map(coerce_protocol)
        .unwrap_or(0);
    let packet_size = lookup(fields, &["packet_size", "length", "size"])
        .and_then(Field::as_f64)
        .map(|v| v.max(0.0) as u32)
        .unwrap_or(0);
    let sport = lookup(fields, &["sport", "src_port", "source_port"])
        .and_then(Field::as_f64)
        .map(|v| v as u16)
        .unwrap_or(0);
    let dport = lookup(fields, &["dport", "dst_port", "destination_port"])
        .and_then(Field::as_f64)
        .map(|v| v as u16)
        .unwrap_or(0);

    PacketRecord {
        timestamp,
        src_ip,
        dest_ip,
        protocol,
        packet_size,
        sport,
        dport,
    }
}

/// Best-effort discovery of this host's IPv4 addresses, gathered once at
/// construction. There is no portable address-enumeration crate in play
/// here, so this opens a UDP socket toward a public address and reads back
/// the local address the kernel would route through — it never actually
/// sends a packet.
pub fn local_host_ips() -> Vec<[u8; 4]> {
    use std::net::UdpSocket;
    let mut ips = vec![[127, 0, 0, 1]];
    if let Ok(sock) = UdpSocket::bind("0.0.0.0:0") {
        if sock.connect("8.8.8.8:80").is_ok() {
            if let Ok(addr) = sock.local_addr() {
                if let std::net::IpAddr::V4(v4) = addr.ip() {
                    ips.push(v4.octets());
                }
            }
        }
    }
    ips
}

/// Tracks, per source IP, the most recent timestamp at which each
/// destination port was observed, for the `unique_dports_15s` feature.
#[derive(Debug, Default)]
struct PortRecency {
    by_src: HashMap<[u8; 4], HashMap<u16, f64>>,
}

impl PortRecency {
    fn update(&mut self, src_ip: [u8; 4], dport: u16, ts: f64) -> usize {
        let entry = self.by_src.entry(src_ip).or_default();
        entry.insert(dport, ts);
        entry.retain(|_, seen_at| *seen_at >= ts - DPORT_WINDOW_SECS);
        let count = entry.len();
        if entry.is_empty() {
            self.by_src.remove(&src_ip);
        }
        count
    }
}

pub struct PacketProcessor {
    window: RingWindow<PacketRecord>,
    local_ips: Vec<[u8; 4]>,
    last_timestamp: Option<f64>,
    port_recency: PortRecency,
    skipped_frames: u64,
}

impl PacketProcessor {
    pub fn new(window_capacity: usize) -> Self {
        Self::with_local_ips(window_capacity, local_host_ips())
    }

    pub fn with_local_ips(window_capacity: usize, local_ips: Vec<[u8; 4]>) -> Self {
        Self {
            window: RingWindow::with_capacity(window_capacity),
            local_ips,
            last_timestamp: None,
            port_recency: PortRecency::default(),
            skipped_frames: 0,
        }
    }

    pub fn skipped_frames(&self) -> u64 {
        self.skipped_frames
    }

    pub fn set_window_size(&mut self, new_capacity: usize) {
        self.window.resize(new_capacity);
    }

    /// Parses a raw frame, stamping it with `timestamp`, and appends it to
    /// the window. Any parse failure is swallowed; the skipped-frame counter
    /// is incremented instead of propagating an error.
    pub fn process_frame(&mut self, data: &[u8], timestamp: f64) {
        match parse_ip_frame(data) {
            Some(frame) => {
                self.window.push(PacketRecord {
                    timestamp,
                    src_ip: frame.src_ip,
                    dest_ip: frame.dest_ip,
                    protocol: frame.protocol,
                    packet_size: frame.packet_size,
                    sport: frame.sport,
                    dport: frame.dport,
                });
            }
            None => {
                self.skipped_frames += 1;
                tracing::trace!("dropped unparseable frame ({} bytes)", data.len());
            }
        }
    }

    pub fn get_window_view(&self) -> Vec<PacketRecord> {
        self.window.snapshot()
    }

    fn is_local(&self, ip: [u8; 4]) -> bool {
        self.local_ips.contains(&ip)
    }

    pub fn local_ips(&self) -> &[[u8; 4]] {
        &self.local_ips
    }

    /// Incremental path: accepts a heterogeneously-keyed map, appends the
    /// coerced record to the window, and returns its feature vector.
    pub fn extract_features(&mut self, fields: &HashMap<String, Field>) -> FeatureVector {
        let record = coerce_record(fields);
        self.window.push(record);

        let time_diff = match self.last_timestamp {
            Some(prev) => (record.timestamp - prev).max(0.0),
            None => 0.0,
        };
        self.last_timestamp = Some(record.timestamp);

        let unique_dports = self
            .port_recency
            .update(record.src_ip, record.dport, record.timestamp) as f64;

        FeatureVector {
            protocol: record.protocol as f64,
            packet_size_log: packet_size_log(record.packet_size as i64),
            time_diff,
            dport: record.dport as f64,
            is_ephemeral_sport: is_ephemeral_sport(record.sport),
            unique_dports_15s: unique_dports,
            direction: if self.is_local(record.src_ip) { 1.0 } else { 0.0 },
        }
        .sanitized()
    }

    /// Batch path over an explicit snapshot: stable-sorts by timestamp if
    /// not already monotonic, computes every column fresh from the given
    /// records (independent of the processor's incremental recency state),
    /// and sanitizes NaN/Inf to 0.0. Returns the feature table alongside the
    /// (possibly reordered) records it was computed from.
    pub fn engineer_features(
        &self,
        records: &[PacketRecord],
    ) -> (Vec<FeatureVector>, Vec<PacketRecord>) {
        let mut processed = records.to_vec();
        let is_monotonic = processed.windows(2).all(|w| w[0].timestamp <= w[1].timestamp);
        if !is_monotonic {
            processed.sort_by(|a, b| {
                a.timestamp
                    .partial_cmp(&b.timestamp)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let mut recency = PortRecency::default();
        let mut last_ts: Option<f64> = None;
        let mut features = Vec::with_capacity(processed.len());

        for rec in &processed {
            let time_diff = match last_ts {
                Some(prev) => (rec.timestamp - prev).max(0.0),
                None => 0.0,
            };
            last_ts = Some(rec.timestamp);

            let unique_dports = recency.update(rec.src_ip, rec.dport, rec.timestamp) as f64;

            features.push(
                FeatureVector {
                    protocol: rec.protocol as f64,
                    packet_size_log: packet_size_log(rec.packet_size as i64),
                    time_diff,
                    dport: rec.dport as f64,
                    is_ephemeral_sport: is_ephemeral_sport(rec.sport),
                    unique_dports_15s: unique_dports,
                    direction: if self.is_local(rec.src_ip) { 1.0 } else { 0.0 },
                }
                .sanitized(),
            );
        }

        (features, processed)
    }
}
