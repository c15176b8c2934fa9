//! Persisting the issued key.
//!
//! The key file is the only durable output of a bootstrap run. It is written
//! to a temporary file next to the target, given its final mode and
//! ownership, then renamed into place, so readers never observe a partial
//! or empty file.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use hopsflow_models::{ApiKey, FileMode};
use nix::unistd::{chown, Gid, Group, Uid, User};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SdkError;

/// Where and how the key is written.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KeyFileSpec {
    /// Target path.
    pub path: PathBuf,
    /// Permission bits.
    #[serde(default)]
    pub mode: FileMode,
    /// Owning user name; unchanged if `None`.
    #[serde(default)]
    pub owner: Option<String>,
    /// Owning group name; unchanged if `None`.
    #[serde(default)]
    pub group: Option<String>,
}

impl KeyFileSpec {
    /// Owner-only file at `path` with the current user's ownership.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: FileMode::default(),
            owner: None,
            group: None,
        }
    }
}

/// Write `key` to `spec.path`, replacing any previous file atomically.
///
/// The file contains exactly the key bytes with no trailing newline.
pub fn write_key_file(spec: &KeyFileSpec, key: &ApiKey) -> Result<(), SdkError> {
    let (uid, gid) = resolve_ownership(spec)?;

    let dir = match spec.path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !dir.is_dir() {
        return Err(SdkError::Config(format!(
            "key file directory {} does not exist",
            dir.display()
        )));
    }

    let mut tmp = tempfile::Builder::new()
        .prefix(".api-key")
        .tempfile_in(dir)?;

    fs::set_permissions(tmp.path(), fs::Permissions::from_mode(spec.mode.bits()))?;
    if uid.is_some() || gid.is_some() {
        chown(tmp.path(), uid, gid).map_err(std::io::Error::from)?;
    }

    tmp.write_all(key.expose().as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(&spec.path).map_err(|e| e.error)?;

    info!(path = %spec.path.display(), mode = %spec.mode, "API key written");
    Ok(())
}

/// Read a key file written by [`write_key_file`].
///
/// Surrounding whitespace is trimmed so hand-edited files still work.
pub fn read_key_file(path: &Path) -> Result<ApiKey, SdkError> {
    let content = fs::read_to_string(path).map_err(|e| {
        SdkError::Config(format!("cannot read API key file {}: {e}", path.display()))
    })?;
    let key = content.trim();
    if key.is_empty() {
        return Err(SdkError::Config(format!(
            "API key file {} is empty",
            path.display()
        )));
    }
    Ok(ApiKey::new(key))
}

fn resolve_ownership(spec: &KeyFileSpec) -> Result<(Option<Uid>, Option<Gid>), SdkError> {
    let uid = match &spec.owner {
        Some(name) => Some(
            User::from_name(name)
                .map_err(std::io::Error::from)?
                .ok_or_else(|| SdkError::Config(format!("unknown user {name:?}")))?
                .uid,
        ),
        None => None,
    };
    let gid = match &spec.group {
        Some(name) => Some(
            Group::from_name(name)
                .map_err(std::io::Error::from)?
                .ok_or_else(|| SdkError::Config(format!("unknown group {name:?}")))?
                .gid,
        ),
        None => None,
    };
    Ok((uid, gid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_key_verbatim_with_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_key");
        let spec = KeyFileSpec {
            mode: "0640".parse().unwrap(),
            ..KeyFileSpec::new(&path)
        };

        write_key_file(&spec, &ApiKey::new("AbC.123")).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"AbC.123");
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_key");
        fs::write(&path, "old-key-that-is-longer").unwrap();

        write_key_file(&KeyFileSpec::new(&path), &ApiKey::new("new")).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        // no stray temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_directory_is_config_error() {
        let spec = KeyFileSpec::new("/nonexistent/dir/api_key");
        assert!(matches!(
            write_key_file(&spec, &ApiKey::new("k")),
            Err(SdkError::Config(_))
        ));
    }

    #[test]
    fn unknown_owner_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_key");
        let spec = KeyFileSpec {
            owner: Some("no-such-user-hopsflow".into()),
            ..KeyFileSpec::new(&path)
        };
        assert!(matches!(
            write_key_file(&spec, &ApiKey::new("k")),
            Err(SdkError::Config(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn read_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_key");
        fs::write(&path, "  key.value\n").unwrap();
        assert_eq!(read_key_file(&path).unwrap().expose(), "key.value");
    }

    #[test]
    fn read_empty_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_key");
        fs::write(&path, "\n").unwrap();
        assert!(read_key_file(&path).is_err());
    }

    #[test]
    fn spec_deserializes_with_defaults() {
        let spec: KeyFileSpec =
            serde_json::from_str(r#"{"path":"/srv/hops/airflow/secrets/api_key"}"#).unwrap();
        assert_eq!(spec.mode, FileMode::OWNER_RW);
        assert!(spec.owner.is_none());
    }
}
