//! Current firmware persistence
//!
//! Keeps the result of the last successful firmware check on disk so it survives
//! restarts. A missing file means no check has succeeded yet; a corrupt file is
//! logged and treated the same way.

use crate::error::StoreResult;
use arcprobe_core::FirmwareInfo;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Span;

/// Persisted "current firmware" record
#[derive(Debug)]
pub struct FirmwareInfoStore {
    path: PathBuf,
    current: RwLock<Option<FirmwareInfo>>,
    span: Span,
}

impl FirmwareInfoStore {
    /// Open the store at `path`, loading any persisted result
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let span = tracing::info_span!("firmware_store", path = %path.display());
        Self::open_in(path, span)
    }

    /// Open the store at `path`, logging under `span`
    pub fn open_in(path: impl Into<PathBuf>, span: Span) -> Self {
        let path = path.into();
        let current = {
            let _enter = span.enter();
            load(&path)
        };
        Self {
            path,
            current: RwLock::new(current),
            span,
        }
    }

    /// The last persisted result
    pub fn current(&self) -> Option<FirmwareInfo> {
        self.current.read().clone()
    }

    /// Replace the current record with `info` and write it to disk
    ///
    /// The in-memory record is replaced even when the write fails.
    pub fn save(&self, info: &FirmwareInfo) -> StoreResult<()> {
        let _enter = self.span.enter();
        let mut current = self.current.write();
        *current = Some(info.clone());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tracing::info!("Creating current firmware folder at: {}", parent.display());
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(info)?;
        fs::write(&self.path, content)?;
        tracing::info!("Current firmware info saved to: {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn load(path: &Path) -> Option<FirmwareInfo> {
    if !path.is_file() {
        tracing::info!("No current firmware info exists at: {}", path.display());
        return None;
    }
    tracing::info!("Loading current firmware info from: {}", path.display());
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()));
    match parsed {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::error!(
                "Error loading the current firmware info from '{}': {}",
                path.display(),
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcprobe_core::ParsedResponse;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn marlin_info() -> FirmwareInfo {
        let mut parsed = ParsedResponse::new();
        parsed
            .fields
            .insert("FIRMWARE_NAME".to_string(), "Marlin 2.0.7.2".to_string());
        parsed.capabilities.insert("ARCS".to_string(), "1".to_string());
        FirmwareInfo {
            success: true,
            firmware_type: Some("Marlin".to_string()),
            type_name: Some("Marlin".to_string()),
            version: Some("2.0.7.2".to_string()),
            version_range: Some(">=2.0.6,<=2.0.7.2".to_string()),
            version_guid: Some("9fa65fea-2adc-4e35-94af-36dc555985f2".to_string()),
            supported: Some(true),
            recommended: Some(true),
            is_future: Some(false),
            m115_response: vec![
                "FIRMWARE_NAME:Marlin 2.0.7.2".to_string(),
                "Cap:ARCS:1".to_string(),
            ],
            m115_parsed_response: Some(parsed),
            g2_g3_supported: Some(true),
            arcs_enabled: Some(true),
            last_check_datetime: Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap()),
            ..FirmwareInfo::default()
        }
    }

    #[test]
    fn test_missing_file_means_no_result() {
        let dir = TempDir::new().unwrap();
        let store = FirmwareInfoStore::open(dir.path().join("firmware").join("current.json"));
        assert!(store.current().is_none());
    }

    #[test]
    fn test_save_then_reopen_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("firmware").join("current.json");
        let info = marlin_info();

        let store = FirmwareInfoStore::open(&path);
        store.save(&info).unwrap();
        assert_eq!(store.current(), Some(info.clone()));

        let reopened = FirmwareInfoStore::open(&path);
        assert_eq!(reopened.current(), Some(info));
    }

    #[test]
    fn test_corrupt_file_is_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("current.json");
        fs::write(&path, "{ not json").unwrap();

        let store = FirmwareInfoStore::open(&path);
        assert!(store.current().is_none());

        store.save(&marlin_info()).unwrap();
        assert!(FirmwareInfoStore::open(&path).current().is_some());
    }

    #[test]
    fn test_failed_write_still_replaces_current() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("firmware");
        fs::write(&blocker, "not a folder").unwrap();

        let store = FirmwareInfoStore::open(blocker.join("current.json"));
        let info = marlin_info();
        assert!(store.save(&info).is_err());
        assert_eq!(store.current(), Some(info));
    }
}
