//! Backup archive format: a gzip-compressed tar with one top-level directory

use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::OpsError;
use crate::utils::sha256_hash;

pub const ARCHIVE_EXTENSION: &str = ".tar.gz";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const CONFIG_DIR: &str = "config";
pub const SYSTEM_INFO_FILE: &str = "system-info.json";
pub const WALLET_DIR: &str = "wallets";
pub const CHAINSTATE_DIR: &str = "chainstate";

const FORMAT_VERSION: u32 = 1;

/// Describes what an archive holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub config_file: String,
    pub config_sha256: String,
    pub includes_wallet: bool,
    pub includes_chainstate: bool,
    #[serde(default)]
    pub node_version: Option<String>,
    pub nodeops_version: String,
}

impl Manifest {
    pub fn new(name: &str, config_file: &str, config: &[u8]) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            name: name.to_string(),
            created_at: Utc::now(),
            config_file: config_file.to_string(),
            config_sha256: sha256_hash(config),
            includes_wallet: false,
            includes_chainstate: false,
            node_version: None,
            nodeops_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `<prefix>YYYYMMDD_HHMMSS`
pub fn archive_stem(prefix: &str, at: DateTime<Local>) -> String {
    format!("{}{}", prefix, at.format("%Y%m%d_%H%M%S"))
}

/// First free archive path for `stem` in `dir`; a `_N` suffix avoids
/// overwriting an archive taken within the same second
pub fn unique_archive_path(dir: &Path, stem: &str) -> (String, PathBuf) {
    let mut name = stem.to_string();
    let mut suffix = 1;
    loop {
        let path = dir.join(format!("{}{}", name, ARCHIVE_EXTENSION));
        if !path.exists() {
            return (name, path);
        }
        name = format!("{}_{}", stem, suffix);
        suffix += 1;
    }
}

/// Compress `source` into `target` with every entry under `root_name/`.
///
/// The archive is written next to `target` and renamed into place, so a
/// failure never leaves a truncated file under the final name.
pub fn pack(source: &Path, root_name: &str, target: &Path) -> Result<u64, OpsError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let partial = target.with_extension("partial");

    let result = (|| -> Result<(), OpsError> {
        let file = fs::File::create(&partial)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);
        builder.append_dir_all(root_name, source)?;
        let encoder = builder.into_inner()?;
        let file = encoder.finish()?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    fs::rename(&partial, target)?;
    let size = fs::metadata(target)?.len();
    debug!("Wrote {:?} ({} bytes)", target, size);
    Ok(size)
}

/// Extract `archive` into `dest` and return its single top-level directory
pub fn unpack(archive: &Path, dest: &Path) -> Result<PathBuf, OpsError> {
    let file = fs::File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.unpack(dest)
        .map_err(|e| OpsError::InvalidArchive(format!("{}: {}", archive.display(), e)))?;

    let mut roots = Vec::new();
    for entry in fs::read_dir(dest)? {
        roots.push(entry?.path());
    }
    match roots.as_slice() {
        [root] if root.is_dir() => Ok(root.clone()),
        _ => Err(OpsError::InvalidArchive(format!(
            "{}: expected one top-level directory, found {} entries",
            archive.display(),
            roots.len()
        ))),
    }
}

/// Check an extracted archive before anything is copied out of it
pub fn validate(root: &Path) -> Result<Manifest, OpsError> {
    let manifest_path = root.join(MANIFEST_FILE);
    let manifest_text = fs::read_to_string(&manifest_path)
        .map_err(|_| OpsError::InvalidArchive(format!("missing {}", MANIFEST_FILE)))?;
    let manifest: Manifest = serde_json::from_str(&manifest_text)
        .map_err(|e| OpsError::InvalidArchive(format!("unreadable manifest: {}", e)))?;

    if manifest.format_version > FORMAT_VERSION {
        return Err(OpsError::InvalidArchive(format!(
            "archive format {} is newer than supported ({})",
            manifest.format_version, FORMAT_VERSION
        )));
    }

    let config_path = contained_config_path(root, &manifest)?;
    let config = fs::read(&config_path).map_err(|_| {
        OpsError::InvalidArchive(format!("missing {}/{}", CONFIG_DIR, manifest.config_file))
    })?;
    let checksum = sha256_hash(&config);
    if checksum != manifest.config_sha256 {
        return Err(OpsError::InvalidArchive(format!(
            "config checksum mismatch (expected {}, found {})",
            manifest.config_sha256, checksum
        )));
    }

    if manifest.includes_wallet && !root.join(WALLET_DIR).is_dir() {
        return Err(OpsError::InvalidArchive(format!(
            "manifest lists a wallet but {}/ is missing",
            WALLET_DIR
        )));
    }

    Ok(manifest)
}

/// Resolve the configuration snapshot, refusing anything that leaves the archive.
///
/// The manifest must name a plain file, and the resolved path (after following
/// links) must still sit under the archive's config directory.
fn contained_config_path(root: &Path, manifest: &Manifest) -> Result<PathBuf, OpsError> {
    let mut components = Path::new(&manifest.config_file).components();
    let plain_name = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !plain_name {
        return Err(OpsError::InvalidArchive(format!(
            "config entry {:?} is not a plain file name",
            manifest.config_file
        )));
    }

    let path = config_path(root, manifest);
    let missing = || {
        OpsError::InvalidArchive(format!("missing {}/{}", CONFIG_DIR, manifest.config_file))
    };
    let resolved = path.canonicalize().map_err(|_| missing())?;
    let root = root.canonicalize()?;
    let config_dir = root.join(CONFIG_DIR).canonicalize().map_err(|_| missing())?;
    if !config_dir.starts_with(&root) || !resolved.starts_with(&config_dir) || !resolved.is_file() {
        return Err(OpsError::InvalidArchive(format!(
            "config entry {:?} points outside the archive",
            manifest.config_file
        )));
    }
    Ok(path)
}

/// Location of the configuration snapshot inside an extracted archive
pub fn config_path(root: &Path, manifest: &Manifest) -> PathBuf {
    root.join(CONFIG_DIR).join(&manifest.config_file)
}
