//! Unified error type for the detection pipeline, store, and configuration layer.
//!
//! `IdsError` is the single error type returned across module boundaries so call
//! sites can propagate with `?` instead of matching on library-specific errors.
//! It serializes as `{ "kind": "...", "message": "..." }` for any boundary that
//! needs a structured representation (logging fields, external collaborators).

use serde::ser::SerializeStruct;

/// Crate-wide error type. Each variant maps to one of the error kinds in the
/// detector/monitor/store design: parse failures are swallowed by the caller
/// and never become an `IdsError`, but everything else that can propagate does
/// so through this enum.
#[derive(Debug, thiserror::Error)]
pub enum IdsError {
    /// Scoring requested before the detector has been fit or loaded.
    #[error("model not ready: {0}")]
    ModelNotReady(String),

    /// A bundle referenced a banned constructor, or a path escaped `MODEL_DIR`.
    /// Never recovered, never retried.
    #[error("security violation: {0}")]
    Security(String),

    /// A bundle file exists but failed to parse into a valid `ModelBundle`.
    #[error("failed to load model bundle: {0}")]
    Load(String),

    /// Durable-storage failure (disk full, I/O, corrupted database).
    #[error("storage error: {0}")]
    Storage(String),

    /// The firewall adapter reported failure. Callers log this; it never
    /// propagates out of `Monitor::maybe_block`.
    #[error("firewall error: {0}")]
    Firewall(String),

    /// Configuration file missing, unreadable, or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic I/O failure not otherwise classified above.
    #[error("{0}")]
    Io(String),
}

impl IdsError {
    /// Returns the error kind as a string matching the variant name, for
    /// structured logging fields and external boundary contracts.
    pub fn kind(&self) -> &'static str {
        match self {
            IdsError::ModelNotReady(_) => "ModelNotReady",
            IdsError::Security(_) => "SecurityError",
            IdsError::Load(_) => "LoadError",
            IdsError::Storage(_) => "StorageError",
            IdsError::Firewall(_) => "FirewallError",
            IdsError::Config(_) => "ConfigError",
            IdsError::Io(_) => "Io",
        }
    }
}

impl serde::Serialize for IdsError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("IdsError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

impl From<std::io::Error> for IdsError {
    fn from(err: std::io::Error) -> Self {
        IdsError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for IdsError {
    fn from(err: rusqlite::Error) -> Self {
        IdsError::Storage(err.to_string())
    }
}

impl From<config::ConfigError> for IdsError {
    fn from(err: config::ConfigError) -> Self {
        IdsError::Config(err.to_string())
    }
}

impl From<bincode::Error> for IdsError {
    fn from(err: bincode::Error) -> Self {
        IdsError::Load(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IdsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_returns_correct_variant_name() {
        assert_eq!(IdsError::Storage("disk full".into()).kind(), "StorageError");
        assert_eq!(IdsError::Security("banned global".into()).kind(), "SecurityError");
        assert_eq!(IdsError::ModelNotReady("no fit".into()).kind(), "ModelNotReady");
        assert_eq!(IdsError::Load("bad bundle".into()).kind(), "LoadError");
        assert_eq!(IdsError::Firewall("timeout".into()).kind(), "FirewallError");
        assert_eq!(IdsError::Config("missing key".into()).kind(), "ConfigError");
    }

    #[test]
    fn display_shows_message() {
        let err = IdsError::Storage("connection lost".into());
        assert!(err.to_string().contains("connection lost"));
    }

    #[test]
    fn serializes_as_kind_and_message() {
        let err = IdsError::Security("os.system".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "SecurityError");
        assert_eq!(json["message"], "security violation: os.system");
    }

    #[test]
    fn from_io_error_produces_io_variant() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let ids_err: IdsError = io_err.into();
        assert_eq!(ids_err.kind(), "Io");
        assert!(ids_err.to_string().contains("file missing"));
    }

    #[test]
    fn from_rusqlite_error_produces_storage_variant() {
        let sqlite_err = rusqlite::Error::InvalidQuery;
        let ids_err: IdsError = sqlite_err.into();
        assert_eq!(ids_err.kind(), "StorageError");
    }

    #[test]
    fn all_variants_serialize_with_two_fields() {
        let variants: Vec<IdsError> = vec![
            IdsError::ModelNotReady("a".into()),
            IdsError::Security("b".into()),
            IdsError::Load("c".into()),
            IdsError::Storage("d".into()),
            IdsError::Firewall("e".into()),
            IdsError::Config("f".into()),
            IdsError::Io("g".into()),
        ];
        for err in variants {
            let json = serde_json::to_value(&err).unwrap();
            let obj = json.as_object().unwrap();
            assert_eq!(obj.len(), 2, "expected exactly 2 fields for {err:?}");
            assert!(obj.contains_key("kind"));
            assert!(obj.contains_key("message"));
        }
    }
}
