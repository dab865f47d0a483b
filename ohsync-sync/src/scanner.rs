//! Local inventory scanning.
//!
//! A target directory is either a single subject (regular files only) or a
//! set of member partitions (one `^[0-9]{8}$` subdirectory per member).

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};

use ohsync_core::{types::is_member_id, LocalFileRecord, Manifest, ManifestEntry, MemberId};

use crate::error::{io_err, SyncError};

const CHUNK_SIZE: usize = 64 * 1024;

/// Result of scanning one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalInventory {
    /// Files within the size limit, keyed by filename.
    pub files: BTreeMap<String, LocalFileRecord>,
    /// Files over the size limit: filename → size. Not hashed.
    pub oversized: BTreeMap<String, u64>,
}

impl LocalInventory {
    /// Every regular file name seen, oversized ones included.
    pub fn names(&self) -> BTreeSet<String> {
        self.files
            .keys()
            .chain(self.oversized.keys())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.oversized.is_empty()
    }
}

/// Shape of a target directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// No subdirectories: all files belong to one subject.
    Single,
    /// One subdirectory per member, sorted by id.
    Multi(Vec<MemberId>),
}

/// Scan `directory` (not recursive). Files larger than `max_bytes` are
/// listed in [`LocalInventory::oversized`] and never hashed.
pub fn scan(directory: &Path, max_bytes: u64) -> Result<LocalInventory, SyncError> {
    tracing::info!("characterizing files in {}", directory.display());
    let mut inventory = LocalInventory::default();
    let entries = std::fs::read_dir(directory).map_err(|e| io_err(directory, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(directory, e))?;
        let path = entry.path();
        let metadata = std::fs::metadata(&path).map_err(|e| io_err(&path, e))?;
        if !metadata.is_file() {
            tracing::warn!("ignoring non-regular entry {}", path.display());
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let size = metadata.len();
        if size > max_bytes {
            tracing::info!(
                "skipping {}: {size} bytes exceeds {max_bytes}",
                path.display()
            );
            inventory.oversized.insert(name, size);
            continue;
        }

        let created_at: DateTime<Utc> = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map_err(|e| io_err(&path, e))?
            .into();
        let checksum = md5_file(&path)?;
        let inferred_tags = guess_tags(&name);
        tracing::debug!("{name}: {size} bytes, md5 {checksum}");
        inventory.files.insert(
            name.clone(),
            LocalFileRecord {
                name,
                size,
                checksum,
                created_at,
                inferred_tags,
            },
        );
    }
    Ok(inventory)
}

/// Names of the regular files directly under `directory`, without hashing.
pub fn list_files(directory: &Path) -> Result<BTreeSet<String>, SyncError> {
    let mut names = BTreeSet::new();
    for entry in std::fs::read_dir(directory).map_err(|e| io_err(directory, e))? {
        let entry = entry.map_err(|e| io_err(directory, e))?;
        if entry.path().is_file() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Streamed lowercase hex MD5 of a file.
pub fn md5_file(path: &Path) -> Result<String, SyncError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|e| io_err(path, e))?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }
    Ok(hex::encode(context.compute().0))
}

/// Drop one trailing `.gz` or `.bz2`.
pub fn strip_compression_suffix(filename: &str) -> &str {
    filename
        .strip_suffix(".gz")
        .or_else(|| filename.strip_suffix(".bz2"))
        .unwrap_or(filename)
}

/// Candidate tags from the file's base extension (`a.json.gz` → `json`).
pub fn guess_tags(filename: &str) -> BTreeSet<String> {
    let stripped = strip_compression_suffix(filename);
    let mut tags = BTreeSet::new();
    if let Some((stem, ext)) = stripped.rsplit_once('.') {
        if !stem.is_empty() && !ext.is_empty() {
            tags.insert(ext.to_ascii_lowercase());
        }
    }
    tags
}

/// Classify `directory` as a single subject or a set of member partitions.
///
/// Any subdirectory that is not an eight-digit member id is an error, so a
/// stray folder aborts the run before any network call. Loose files next to
/// member folders are never uploaded; they are logged as warnings here and
/// listed by review mode.
pub fn detect_layout(directory: &Path) -> Result<Layout, SyncError> {
    if !directory.is_dir() {
        return Err(SyncError::Layout(format!(
            "{} is not a directory",
            directory.display()
        )));
    }
    let mut members = Vec::new();
    let mut malformed = Vec::new();
    let mut loose = Vec::new();
    for entry in std::fs::read_dir(directory).map_err(|e| io_err(directory, e))? {
        let entry = entry.map_err(|e| io_err(directory, e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !path.is_dir() {
            loose.push(name);
            continue;
        }
        if is_member_id(&name) {
            members.push(MemberId::from(name));
        } else {
            malformed.push(name);
        }
    }
    if !malformed.is_empty() {
        malformed.sort();
        return Err(SyncError::Layout(format!(
            "subdirectories must be eight-digit member ids; found: {}",
            malformed.join(", ")
        )));
    }
    if members.is_empty() {
        return Ok(Layout::Single);
    }
    members.sort();
    loose.sort();
    for name in &loose {
        tracing::warn!(
            "ignoring {name} in {}: files beside member folders are not uploaded",
            directory.display()
        );
    }
    Ok(Layout::Multi(members))
}

/// Draft a manifest from directory contents (create-csv mode).
///
/// Entries get inferred tags, an empty description for the user to fill in,
/// the file's MD5 and its creation time.
pub fn draft_manifest(directory: &Path, max_bytes: u64) -> Result<Manifest, SyncError> {
    match detect_layout(directory)? {
        Layout::Single => Ok(Manifest::Single(draft_subject(directory, max_bytes)?)),
        Layout::Multi(members) => {
            let mut out = BTreeMap::new();
            for member in members {
                let subject = draft_subject(&directory.join(member.as_str()), max_bytes)?;
                out.insert(member, subject);
            }
            Ok(Manifest::Multi(out))
        }
    }
}

fn draft_subject(
    directory: &Path,
    max_bytes: u64,
) -> Result<BTreeMap<String, ManifestEntry>, SyncError> {
    let inventory = scan(directory, max_bytes)?;
    Ok(inventory
        .files
        .into_values()
        .map(|record| {
            let entry = ManifestEntry {
                filename: record.name.clone(),
                description: Some(String::new()),
                tags: record.inferred_tags.into_iter().collect(),
                checksum: Some(record.checksum),
                creation_date: Some(record.created_at.to_rfc3339()),
                ..ManifestEntry::default()
            };
            (record.name, entry)
        })
        .collect())
}
