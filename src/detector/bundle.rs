//! Persisted model bundle: atomic save/load plus a hardened reader that
//! refuses to materialize anything outside a small, enumerated set of known
//! structural shapes.
//!
//! The on-disk format is a small tagged envelope (`MAGIC` + one tag byte)
//! followed by a `bincode`-encoded payload. The tag stands in for the
//! "banned globals" deny-list of a general-purpose deserializer: only a tag
//! naming a known, versioned bundle shape is ever materialized. Every other
//! tag — including ones reserved here to name the kind of unsafe external
//! the original deny-list blocked — is rejected before a single byte of the
//! payload is decoded.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{IdsError, Result};

use super::forest::IsolationForest;
use super::scaler::StandardScaler;

const MAGIC: &[u8; 8] = b"VGNTBND1";
const TAG_MODEL_BUNDLE_V1: u8 = 0x01;

/// Tags that are never valid payloads, reserved to document the kinds of
/// externally-resolved constructs a hardened reader must never reach —
/// shell/process spawn, dynamic code evaluation, module import. A bundle
/// carrying one of these raises `SecurityError`; any other unrecognized tag
/// raises a plain load error instead, since it's merely unsupported rather
/// than actively dangerous.
const BANNED_TAGS: &[(u8, &str)] = &[
    (0xE1, "shell_exec"),
    (0xE2, "dynamic_eval"),
    (0xE3, "module_import"),
    (0xE4, "process_spawn"),
];

pub const BUNDLE_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelBundleMeta {
    pub version: String,
    pub trained_at: String,
    pub contamination: f64,
    pub n_estimators: usize,
    pub random_state: u64,
    pub feature_checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelBundle {
    pub model: IsolationForest,
    pub scaler: StandardScaler,
    pub feature_names: Vec<String>,
    pub meta: ModelBundleMeta,
}

pub fn feature_checksum(feature_names: &[String]) -> String {
    let joined = feature_names.join(",");
    let digest = Sha256::digest(joined.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl ModelBundle {
    /// Invariant check run on every load: model, scaler and feature_names
    /// are non-empty and the checksum still matches the feature list.
    pub fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            return Err(IdsError::Load("bundle has empty feature_names".into()));
        }
        if self.scaler.mean.len() != self.feature_names.len() {
            return Err(IdsError::Load("scaler/feature_names length mismatch".into()));
        }
        let expected = feature_checksum(&self.feature_names);
        if expected != self.meta.feature_checksum {
            return Err(IdsError::Load(format!(
                "feature_checksum mismatch: expected {expected}, found {}",
                self.meta.feature_checksum
            )));
        }
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.push(TAG_MODEL_BUNDLE_V1);
        let payload = bincode::serialize(self)?;
        out.extend_from_slice(&payload);
        Ok(out)
    }

    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < MAGIC.len() + 1 || &data[..MAGIC.len()] != MAGIC {
            return Err(IdsError::Load("bundle missing magic header".into()));
        }
        let tag = data[MAGIC.len()];

        if let Some((_, name)) = BANNED_TAGS.iter().find(|(t, _)| *t == tag) {
            return Err(IdsError::Security(format!(
                "bundle references a banned construct: {name}"
            )));
        }
        if tag != TAG_MODEL_BUNDLE_V1 {
            return Err(IdsError::Load(format!("unsupported bundle tag: 0x{tag:02x}")));
        }

        let payload = &data[MAGIC.len() + 1..];
        let bundle: ModelBundle = bincode::deserialize(payload)?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Atomically writes the bundle to `path`: serialize into a temp file in
    /// the same directory, fsync, then rename over the target. On any
    /// failure the temp file is removed and the previous bundle (if any) is
    /// untouched.
    pub fn save_atomic(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let tmp_name = format!(
            ".{}.tmp-{}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("bundle"),
            std::process::id()
        );
        let tmp_path = dir.join(tmp_name);

        let result = (|| -> Result<()> {
            let bytes = self.encode()?;
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            drop(file);
            std::fs::rename(&tmp_path, path)?;
            Ok(())
        })();

        if result.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        result
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| IdsError::Load(e.to_string()))?;
        Self::decode(&data)
    }
}

/// Resolves a user-supplied model path against `model_dir`, rejecting any
/// path — absolute or relative — that escapes it. Relative paths are joined
/// onto `model_dir`; absolute paths are accepted only when they are already
/// lexically inside `model_dir`.
pub fn resolve_model_path(requested: &str, model_dir: &Path) -> Result<PathBuf> {
    let requested_path = Path::new(requested);
    let candidate = if requested_path.is_absolute() {
        requested_path.to_path_buf()
    } else {
        model_dir.join(requested_path)
    };

    let normalized = normalize_lexically(&candidate);
    let normalized_model_dir = normalize_lexically(model_dir);

    if !normalized.starts_with(&normalized_model_dir) {
        return Err(IdsError::Security(format!(
            "model path escapes MODEL_DIR: {requested}"
        )));
    }

    if let Some(parent) = normalized.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(normalized)
}

/// Resolves `.` and `..` components without touching the filesystem (the
/// target file may not exist yet at save time, so `fs::canonicalize` isn't
/// usable here).
fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bundle() -> ModelBundle {
        let rows = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.5, 0.5]];
        let scaler = StandardScaler::fit(&rows);
        let model = IsolationForest::fit(&rows, 5, 0.2, 1);
        let feature_names = vec!["a".to_string(), "b".to_string()];
        ModelBundle {
            model,
            scaler,
            meta: ModelBundleMeta {
                version: BUNDLE_VERSION.to_string(),
                trained_at: "2024-01-01T00:00:00Z".to_string(),
                contamination: 0.2,
                n_estimators: 5,
                random_state: 1,
                feature_checksum: feature_checksum(&feature_names),
            },
            feature_names,
        }
    }

    #[test]
    fn round_trip_save_load_preserves_bundle() {
        let dir = std::env::temp_dir().join(format!("vigilnet-bundle-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.bin");

        let bundle = sample_bundle();
        bundle.save_atomic(&path).unwrap();
        let loaded = ModelBundle::load_from_path(&path).unwrap();
        assert_eq!(bundle, loaded);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn save_leaves_no_tmp_residue() {
        let dir = std::env::temp_dir().join(format!("vigilnet-bundle-tmp-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.bin");

        sample_bundle().save_atomic(&path).unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn decode_rejects_banned_tag_as_security_error() {
        let mut data = MAGIC.to_vec();
        data.push(0xE1);
        let err = ModelBundle::decode(&data).unwrap_err();
        assert_eq!(err.kind(), "SecurityError");
    }

    #[test]
    fn decode_rejects_unknown_tag_as_load_error_not_security_error() {
        let mut data = MAGIC.to_vec();
        data.push(0x77);
        let err = ModelBundle::decode(&data).unwrap_err();
        assert_eq!(err.kind(), "LoadError");
    }

    #[test]
    fn decode_rejects_missing_magic() {
        let err = ModelBundle::decode(b"not-a-bundle").unwrap_err();
        assert_eq!(err.kind(), "LoadError");
    }

    #[test]
    fn validate_rejects_checksum_mismatch() {
        let mut bundle = sample_bundle();
        bundle.meta.feature_checksum = "deadbeef".to_string();
        assert!(bundle.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_feature_names() {
        let mut bundle = sample_bundle();
        bundle.feature_names.clear();
        assert!(bundle.validate().is_err());
    }

    #[test]
    fn resolve_model_path_accepts_relative_path_inside_model_dir() {
        let model_dir = Path::new("/tmp/models");
        let resolved = resolve_model_path("current.bin", model_dir).unwrap();
        assert!(resolved.starts_with(model_dir));
    }

    #[test]
    fn resolve_model_path_rejects_traversal_outside_model_dir() {
        let model_dir = Path::new("/tmp/models");
        let err = resolve_model_path("../../etc/passwd", model_dir).unwrap_err();
        assert_eq!(err.kind(), "SecurityError");
    }

    #[test]
    fn resolve_model_path_rejects_absolute_path_outside_model_dir() {
        let model_dir = Path::new("/tmp/models");
        let err = resolve_model_path("/etc/passwd", model_dir).unwrap_err();
        assert_eq!(err.kind(), "SecurityError");
    }

    #[test]
    fn feature_checksum_is_stable_under_resave() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(feature_checksum(&names), feature_checksum(&names));
    }

    #[test]
    fn failed_save_does_not_corrupt_existing_bundle() {
        let dir = std::env::temp_dir().join(format!("vigilnet-bundle-fail-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.bin");

        let first = sample_bundle();
        first.save_atomic(&path).unwrap();
        let before = std::fs::read(&path).unwrap();

        // Simulate a failed save by writing directly to a path whose parent
        // does not exist and cannot be created (a file standing in for a
        // directory), forcing save_atomic's internal write to fail.
        let blocked_dir = dir.join("blocked");
        std::fs::write(&blocked_dir, b"not a directory").unwrap();
        let bad_path = blocked_dir.join("model.bin");
        assert!(first.save_atomic(&bad_path).is_err());

        // The original bundle must be untouched and no temp file left in `dir`.
        let after = std::fs::read(&path).unwrap();
        assert_eq!(before, after);
        let leftovers: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }
}
