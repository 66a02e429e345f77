//! Capture → feature extraction → windowed feature engineering.

mod frame;
mod processor;

pub use frame::{parse_ip_frame, ParsedFrame};
pub use processor::{
    coerce_record, is_ephemeral_sport, local_host_ips, packet_size_log, Field, FeatureVector,
    PacketProcessor, FEATURE_NAMES,
};
