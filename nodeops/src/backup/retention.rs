//! Archive listing and retention

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::fs;
use tracing::info;

use crate::backup::archive::ARCHIVE_EXTENSION;
use crate::errors::OpsError;
use crate::filesys::dir::Dir;

/// A backup archive on disk
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub size: u64,
    #[serde(serialize_with = "serialize_time")]
    pub modified: SystemTime,
}

fn serialize_time<S: serde::Serializer>(time: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&DateTime::<Local>::from(*time).to_rfc3339())
}

impl ArchiveEntry {
    pub fn modified_local(&self) -> DateTime<Local> {
        DateTime::from(self.modified)
    }
}

/// Archives in `dir` carrying `prefix`, newest first by modification time
pub async fn list_archives(dir: &Dir, prefix: &str) -> Result<Vec<ArchiveEntry>, OpsError> {
    if !dir.exists().await {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for path in dir.list_files().await? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(prefix) || !name.ends_with(ARCHIVE_EXTENSION) {
            continue;
        }
        let metadata = fs::metadata(&path).await?;
        entries.push(ArchiveEntry {
            size: metadata.len(),
            modified: metadata.modified()?,
            path,
        });
    }

    sort_newest_first(&mut entries);
    Ok(entries)
}

fn sort_newest_first(entries: &mut [ArchiveEntry]) {
    entries.sort_by(|a, b| b.modified.cmp(&a.modified));
}

/// Archives beyond the newest `keep`. A `keep` of 0 disables retention.
pub fn expired(entries: &[ArchiveEntry], keep: usize) -> Vec<PathBuf> {
    if keep == 0 {
        return Vec::new();
    }
    let mut sorted = entries.to_vec();
    sort_newest_first(&mut sorted);
    sorted.into_iter().skip(keep).map(|e| e.path).collect()
}

/// Delete archives beyond the newest `keep`, returning what was removed
pub async fn apply_retention(dir: &Dir, prefix: &str, keep: usize) -> Result<Vec<PathBuf>, OpsError> {
    let entries = list_archives(dir, prefix).await?;
    let doomed = expired(&entries, keep);
    for path in &doomed {
        info!("Retention: removing {:?}", path);
        fs::remove_file(path).await?;
    }
    Ok(doomed)
}
