//! Timestamped backups of a slot, taken before it is overwritten.
//!
//! File name: `{prefix}_{slot}_{YYYYMMDDTHHMMSSmmmZ}{extension}`, all in
//! the backup directory. Only names whose middle part parses as a
//! timestamp count as backups of `slot`, so slots that share a prefix
//! ("a" and "a_b") never see each other's files.

use crate::{config::StoreConfig, storage::FileStore, types::SlotName};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Serialize;
use std::{io, path::PathBuf};

const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub slot:     SlotName,
    pub path:     PathBuf,
    pub taken_at: DateTime<Utc>,
}

pub(crate) fn file_name(config: &StoreConfig, slot: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}{}",
        config.backup_prefix,
        slot,
        at.format(STAMP_FORMAT),
        config.extension
    )
}

fn parse_file_name(config: &StoreConfig, slot: &str, name: &str) -> Option<DateTime<Utc>> {
    let stamp = name
        .strip_prefix(config.backup_prefix.as_str())?
        .strip_prefix('_')?
        .strip_prefix(slot)?
        .strip_prefix('_')?
        .strip_suffix(config.extension.as_str())?;
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}

/// Backups of `slot`, newest first.
pub(crate) fn list<F: FileStore>(fs: &F, config: &StoreConfig, slot: &str) -> io::Result<Vec<BackupInfo>> {
    let mut backups: Vec<BackupInfo> = fs
        .list_dir(&config.backup_dir)?
        .into_iter()
        .filter_map(|name| {
            let taken_at = parse_file_name(config, slot, &name)?;
            Some(BackupInfo {
                slot: slot.to_string(),
                path: config.backup_dir.join(name),
                taken_at,
            })
        })
        .collect();
    backups.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));
    Ok(backups)
}

/// Copy the slot's current file into the backup directory. Two backups in
/// the same millisecond get consecutive stamps instead of colliding.
pub(crate) fn create<F: FileStore>(
    fs: &F,
    config: &StoreConfig,
    slot: &str,
    source: &std::path::Path,
    now: DateTime<Utc>,
) -> io::Result<PathBuf> {
    let mut at = now;
    let mut target = config.backup_dir.join(file_name(config, slot, at));
    while fs.exists(&target) {
        at += Duration::milliseconds(1);
        target = config.backup_dir.join(file_name(config, slot, at));
    }
    fs.copy(source, &target)?;
    log::info!("Backed up slot '{slot}' to {}", target.display());
    Ok(target)
}

/// Remove the oldest backups beyond the retention count. Returns what was
/// removed.
pub(crate) fn prune<F: FileStore>(fs: &F, config: &StoreConfig, slot: &str) -> io::Result<Vec<PathBuf>> {
    let backups = list(fs, config, slot)?;
    let mut removed = Vec::new();
    for stale in backups.into_iter().skip(config.backup_retention) {
        fs.remove(&stale.path)?;
        log::debug!("Pruned backup {}", stale.path.display());
        removed.push(stale.path);
    }
    Ok(removed)
}
