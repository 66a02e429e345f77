//! Row-shaped entities persisted by the store.

use crate::signatures::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Anomaly,
    Signature,
    Other,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Anomaly => "ANOMALY",
            AlertKind::Signature => "SIGNATURE",
            AlertKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "ANOMALY" => AlertKind::Anomaly,
            "SIGNATURE" => AlertKind::Signature,
            _ => AlertKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: String,
    pub ts: String,
    pub src_ip: String,
    pub label: String,
    pub severity: String,
    pub kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockActionKind {
    Block,
    Unblock,
    Allow,
}

impl BlockActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockActionKind::Block => "block",
            BlockActionKind::Unblock => "unblock",
            BlockActionKind::Allow => "allow",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockAction {
    pub id: String,
    pub ts: String,
    pub ip: String,
    pub action: String,
    pub reason: String,
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub ip: String,
    pub name: Option<String>,
    pub open_ports: String,
    pub risk: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrustedEntry {
    pub ip: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub id: String,
    pub ts: String,
    pub level: String,
    pub source: String,
    pub message: String,
}

pub fn severity_label(severity: Option<Severity>) -> &'static str {
    match severity {
        Some(Severity::High) => "high",
        Some(Severity::Medium) => "medium",
        Some(Severity::Low) => "low",
        None => "unknown",
    }
}
