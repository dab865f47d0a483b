//! Manifest CSV codec.
//!
//! Two shapes, chosen by the header:
//!
//! ```text
//! filename,tags,description,md5,creation_date[,start_date,end_date,...]
//! project_member_id,filename,tags,description,md5,creation_date[,...]
//! ```
//!
//! Rows are numbered from 1 with the header as row 1, so the first data row
//! is row 2. A row whose filename is `None` and whose remaining cells are all
//! `NA` is the "no files" sentinel: skipped on load, emitted by [`write`] for
//! members with no entries.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use ohsync_core::{Manifest, ManifestEntry, ManifestShape, MemberId, SubjectManifest};

use crate::error::{io_err, RowError, SyncError};

pub const MEMBER_COLUMN: &str = "project_member_id";
pub const FILENAME_COLUMN: &str = "filename";
pub const TAGS_COLUMN: &str = "tags";
pub const DESCRIPTION_COLUMN: &str = "description";
pub const MD5_COLUMN: &str = "md5";
pub const CREATION_DATE_COLUMN: &str = "creation_date";
pub const START_DATE_COLUMN: &str = "start_date";
pub const END_DATE_COLUMN: &str = "end_date";

pub const SENTINEL_FILENAME: &str = "None";
pub const SENTINEL_VALUE: &str = "NA";

/// Columns written when a manifest has no entries, so sentinel rows keep the
/// familiar `(id, "None", "NA", "NA", "NA", "NA")` width.
const DEFAULT_OPTIONAL_COLUMNS: [&str; 3] = [DESCRIPTION_COLUMN, MD5_COLUMN, CREATION_DATE_COLUMN];

const KNOWN_OPTIONAL_COLUMNS: [&str; 5] = [
    DESCRIPTION_COLUMN,
    MD5_COLUMN,
    CREATION_DATE_COLUMN,
    START_DATE_COLUMN,
    END_DATE_COLUMN,
];

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load a manifest from `path`. The first row-level problem is fatal.
pub fn load(path: &Path) -> Result<Manifest, SyncError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    read(file)
}

/// Parse a manifest from any reader. The first row-level problem is fatal.
pub fn read<R: Read>(reader: R) -> Result<Manifest, SyncError> {
    let (manifest, _) = parse(reader, true)?;
    Ok(manifest)
}

/// Parse a manifest, collecting every row-level problem instead of stopping
/// at the first. Schema problems are still returned as `Err`.
pub fn load_collecting(path: &Path) -> Result<(Manifest, Vec<RowError>), SyncError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    parse(file, false)
}

struct Header {
    columns: Vec<String>,
    shape: ManifestShape,
    tags_idx: usize,
}

impl Header {
    fn parse(columns: Vec<String>) -> Result<Self, SyncError> {
        let Some(tags_idx) = columns.iter().position(|c| c == TAGS_COLUMN) else {
            return Err(SyncError::Schema(
                "\"tags\" is a compulsory column in the metadata file".to_string(),
            ));
        };
        let shape = match columns.first().map(String::as_str) {
            Some(FILENAME_COLUMN) => ManifestShape::Single,
            Some(MEMBER_COLUMN) => {
                if columns.get(1).map(String::as_str) != Some(FILENAME_COLUMN) {
                    return Err(SyncError::Schema(
                        "the second column must be \"filename\"".to_string(),
                    ));
                }
                ManifestShape::Multi
            }
            _ => {
                return Err(SyncError::Schema(
                    "the first column must be \"filename\" for a single-member manifest, \
                     or \"project_member_id\" followed by \"filename\" for a multi-member one"
                        .to_string(),
                ))
            }
        };
        Ok(Self {
            columns,
            shape,
            tags_idx,
        })
    }

    fn filename_idx(&self) -> usize {
        match self.shape {
            ManifestShape::Single => 0,
            ManifestShape::Multi => 1,
        }
    }
}

fn parse<R: Read>(reader: R, fail_fast: bool) -> Result<(Manifest, Vec<RowError>), SyncError> {
    let mut csv_in = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = csv_in.records();

    let header = match records.next() {
        Some(record) => record.map_err(|e| SyncError::Schema(format!("unreadable header: {e}")))?,
        None => return Err(SyncError::Schema("the metadata file is empty".to_string())),
    };
    let header = Header::parse(header.iter().map(|c| c.trim().to_string()).collect())?;

    let mut errors = Vec::new();
    let mut single = SubjectManifest::new();
    let mut multi: BTreeMap<MemberId, SubjectManifest> = BTreeMap::new();

    for (index, record) in records.enumerate() {
        let row = index + 2;
        let outcome = record
            .map_err(|e| RowError {
                row,
                message: e.to_string(),
            })
            .and_then(|record| {
                let cells: Vec<&str> = record.iter().collect();
                parse_row(&header, row, &cells, &mut single, &mut multi)
            });
        if let Err(err) = outcome {
            if fail_fast {
                return Err(SyncError::Row(err));
            }
            errors.push(err);
        }
    }

    let manifest = match header.shape {
        ManifestShape::Single => Manifest::Single(single),
        ManifestShape::Multi => Manifest::Multi(multi),
    };
    Ok((manifest, errors))
}

fn parse_row(
    header: &Header,
    row: usize,
    cells: &[&str],
    single: &mut SubjectManifest,
    multi: &mut BTreeMap<MemberId, SubjectManifest>,
) -> Result<(), RowError> {
    let row_err = |message: String| RowError { row, message };
    let filename_idx = header.filename_idx();

    let member = if header.shape == ManifestShape::Multi {
        let id = cells.first().copied().unwrap_or("");
        if id.is_empty() {
            return Err(row_err("\"project_member_id\" must not be empty".to_string()));
        }
        Some(MemberId::from(id))
    } else {
        None
    };

    let filename = cells.get(filename_idx).copied().unwrap_or("");
    if filename.is_empty() {
        return Err(row_err("\"filename\" must not be empty".to_string()));
    }

    if cells.len() != header.columns.len() {
        return Err(row_err(format!(
            "number of columns ({}) doesn't match number of headings ({})",
            cells.len(),
            header.columns.len()
        )));
    }

    // A member appears in the manifest even when its only row is the sentinel.
    let target = match &member {
        Some(id) => multi.entry(id.clone()).or_default(),
        None => single,
    };
    if is_sentinel(filename, &cells[filename_idx + 1..]) {
        return Ok(());
    }

    if target.contains_key(filename) {
        return Err(row_err(format!("duplicate filename '{filename}'")));
    }

    let mut entry = ManifestEntry::new(filename);
    for (idx, column) in header.columns.iter().enumerate().skip(filename_idx + 1) {
        let value = cells[idx];
        if idx == header.tags_idx {
            entry.tags = split_tags(value);
            continue;
        }
        match column.as_str() {
            DESCRIPTION_COLUMN => entry.description = Some(value.to_string()),
            MD5_COLUMN => entry.checksum = non_empty(value),
            CREATION_DATE_COLUMN => entry.creation_date = non_empty(value),
            START_DATE_COLUMN => entry.start_date = non_empty(value),
            END_DATE_COLUMN => entry.end_date = non_empty(value),
            other => {
                entry.extra.insert(other.to_string(), value.to_string());
            }
        }
    }
    target.insert(filename.to_string(), entry);
    Ok(())
}

fn is_sentinel(filename: &str, rest: &[&str]) -> bool {
    filename == SENTINEL_FILENAME && rest.iter().all(|cell| *cell == SENTINEL_VALUE)
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Split a comma-joined tag cell into trimmed, non-empty tokens.
pub fn split_tags(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Write
// ---------------------------------------------------------------------------

/// Write `manifest` as CSV. `read(write(m)) == m` for manifests produced by
/// [`read`] or [`crate::scanner::draft_manifest`].
pub fn write<W: Write>(manifest: &Manifest, writer: W) -> Result<(), SyncError> {
    let columns = optional_columns(manifest);
    let mut csv_out = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = Vec::new();
    if manifest.shape() == ManifestShape::Multi {
        header.push(MEMBER_COLUMN);
    }
    header.push(FILENAME_COLUMN);
    header.push(TAGS_COLUMN);
    header.extend(columns.iter().map(String::as_str));
    csv_out.write_record(&header)?;

    match manifest {
        Manifest::Single(entries) => {
            for entry in entries.values() {
                csv_out.write_record(entry_row(None, entry, &columns))?;
            }
        }
        Manifest::Multi(members) => {
            for (member, entries) in members {
                if entries.is_empty() {
                    let mut row = vec![member.to_string(), SENTINEL_FILENAME.to_string()];
                    row.extend(std::iter::repeat(SENTINEL_VALUE.to_string()).take(columns.len() + 1));
                    csv_out.write_record(&row)?;
                    continue;
                }
                for entry in entries.values() {
                    csv_out.write_record(entry_row(Some(member), entry, &columns))?;
                }
            }
        }
    }
    csv_out.flush().map_err(|e| io_err("<manifest writer>", e))?;
    Ok(())
}

/// Write `manifest` to `path`, replacing any existing file.
pub fn write_to_path(manifest: &Manifest, path: &Path) -> Result<(), SyncError> {
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    write(manifest, file)
}

fn optional_columns(manifest: &Manifest) -> Vec<String> {
    let entries: Vec<&ManifestEntry> = match manifest {
        Manifest::Single(entries) => entries.values().collect(),
        Manifest::Multi(members) => members.values().flat_map(|m| m.values()).collect(),
    };
    if entries.is_empty() {
        return DEFAULT_OPTIONAL_COLUMNS.iter().map(|c| c.to_string()).collect();
    }

    let mut columns: Vec<String> = KNOWN_OPTIONAL_COLUMNS
        .iter()
        .filter(|column| entries.iter().any(|e| known_value(e, column).is_some()))
        .map(|c| c.to_string())
        .collect();
    let extra: BTreeSet<&String> = entries.iter().flat_map(|e| e.extra.keys()).collect();
    columns.extend(extra.into_iter().cloned());
    columns
}

fn known_value<'a>(entry: &'a ManifestEntry, column: &str) -> Option<&'a str> {
    match column {
        DESCRIPTION_COLUMN => entry.description.as_deref(),
        MD5_COLUMN => entry.checksum.as_deref(),
        CREATION_DATE_COLUMN => entry.creation_date.as_deref(),
        START_DATE_COLUMN => entry.start_date.as_deref(),
        END_DATE_COLUMN => entry.end_date.as_deref(),
        _ => None,
    }
}

fn entry_row(member: Option<&MemberId>, entry: &ManifestEntry, columns: &[String]) -> Vec<String> {
    let mut row = Vec::with_capacity(columns.len() + 3);
    if let Some(member) = member {
        row.push(member.to_string());
    }
    row.push(entry.filename.clone());
    row.push(entry.tags.join(", "));
    for column in columns {
        let value = if KNOWN_OPTIONAL_COLUMNS.contains(&column.as_str()) {
            known_value(entry, column)
        } else {
            entry.extra.get(column).map(String::as_str)
        };
        row.push(value.unwrap_or_default().to_string());
    }
    row
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn load_str(text: &str) -> Result<Manifest, SyncError> {
        read(text.as_bytes())
    }

    fn roundtrip(manifest: &Manifest) -> Manifest {
        let mut buf = Vec::new();
        write(manifest, &mut buf).expect("write");
        read(buf.as_slice()).expect("read back")
    }

    #[test]
    fn single_subject_basic() {
        let manifest = load_str(
            "filename,tags,description,md5,creation_date\n\
             a.json,\"json, raw ,\",Some data,d41d8cd98f00b204e9800998ecf8427e,2016-01-01\n",
        )
        .unwrap();
        let Manifest::Single(entries) = manifest else {
            panic!("expected single-subject");
        };
        let entry = &entries["a.json"];
        assert_eq!(entry.tags, vec!["json".to_string(), "raw".to_string()]);
        assert_eq!(entry.description.as_deref(), Some("Some data"));
        assert_eq!(entry.creation_date.as_deref(), Some("2016-01-01"));
    }

    #[test]
    fn tags_column_is_mandatory() {
        let err = load_str("filename,description\na.json,x\n").unwrap_err();
        assert!(matches!(err, SyncError::Schema(msg) if msg.contains("tags")));
    }

    #[test]
    fn multi_subject_second_column_must_be_filename() {
        let err = load_str("project_member_id,tags,filename\n").unwrap_err();
        assert!(matches!(err, SyncError::Schema(msg) if msg.contains("second column")));
    }

    #[test]
    fn unknown_first_column_is_schema_error() {
        assert!(matches!(
            load_str("name,tags\n").unwrap_err(),
            SyncError::Schema(_)
        ));
    }

    #[test]
    fn column_count_error_is_row_numbered() {
        let err = load_str("filename,tags,description\na.json,json,ok\nb.json,json\n").unwrap_err();
        match err {
            SyncError::Row(RowError { row, message }) => {
                assert_eq!(row, 3);
                assert!(message.contains("number of columns (2)"));
            }
            other => panic!("expected row error, got {other:?}"),
        }
    }

    #[test]
    fn empty_filename_is_rejected_on_first_data_row() {
        let err = load_str("filename,tags\n,json\n").unwrap_err();
        assert!(matches!(err, SyncError::Row(RowError { row: 2, .. })));
    }

    #[test]
    fn empty_member_id_is_rejected() {
        let err = load_str("project_member_id,filename,tags\n,a.json,json\n").unwrap_err();
        match err {
            SyncError::Row(e) => assert!(e.message.contains("project_member_id")),
            other => panic!("expected row error, got {other:?}"),
        }
    }

    #[test]
    fn sentinel_registers_empty_member() {
        let manifest = load_str(
            "project_member_id,filename,tags,description,md5,creation_date\n\
             00000001,None,NA,NA,NA,NA\n\
             00000002,a.json,json,desc,,\n",
        )
        .unwrap();
        let Manifest::Multi(members) = manifest else {
            panic!("expected multi-subject");
        };
        assert!(members[&MemberId::from("00000001")].is_empty());
        let entry = &members[&MemberId::from("00000002")]["a.json"];
        assert_eq!(entry.checksum, None);
        assert_eq!(entry.creation_date, None);
    }

    #[test]
    fn short_sentinel_row_is_a_shape_error() {
        let err = load_str(
            "project_member_id,filename,tags,description,md5,creation_date\n\
             00000001,None\n",
        )
        .unwrap_err();
        match err {
            SyncError::Row(RowError { row, message }) => {
                assert_eq!(row, 2);
                assert!(message.contains("number of columns (2)"));
            }
            other => panic!("expected row error, got {other:?}"),
        }
    }

    #[test]
    fn single_subject_sentinel_is_skipped() {
        let manifest = load_str("filename,tags,description\nNone,NA,NA\n").unwrap();
        assert_eq!(manifest, Manifest::Single(SubjectManifest::new()));
    }

    #[test]
    fn duplicate_filename_is_row_error() {
        let err = load_str("filename,tags\na.json,x\na.json,y\n").unwrap_err();
        assert!(matches!(err, SyncError::Row(RowError { row: 3, .. })));
    }

    #[test]
    fn extra_columns_are_kept() {
        let manifest = load_str("filename,tags,description,lab\na.vcf,vcf,d,wetlab\n").unwrap();
        let Manifest::Single(entries) = manifest else {
            panic!("expected single-subject");
        };
        assert_eq!(entries["a.vcf"].extra.get("lab").map(String::as_str), Some("wetlab"));
    }

    #[test]
    fn collecting_parse_reports_every_row() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("m.csv");
        std::fs::write(&path, "filename,tags,description\n,x,y\nb.json\nc.json,x,ok\n").unwrap();
        let (manifest, errors) = load_collecting(&path).unwrap();
        assert_eq!(
            errors.iter().map(|e| e.row).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(manifest.file_count(), 1);
    }

    #[test]
    fn writer_emits_sentinel_for_empty_member() {
        let mut members = BTreeMap::new();
        members.insert(MemberId::from("00000001"), SubjectManifest::new());
        let mut buf = Vec::new();
        write(&Manifest::Multi(members), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "project_member_id,filename,tags,description,md5,creation_date\n\
             00000001,None,NA,NA,NA,NA\n"
        );
    }

    #[test]
    fn roundtrip_single_with_quotes_and_extra() {
        let mut entry = ManifestEntry::new("a, b.json");
        entry.description = Some("says \"hi\", twice".to_string());
        entry.tags = vec!["json".to_string(), "x y".to_string()];
        entry.checksum = Some("d41d8cd98f00b204e9800998ecf8427e".to_string());
        entry.start_date = Some("2020-01-01".to_string());
        entry.extra.insert("lab".to_string(), "wet".to_string());
        let mut entries = SubjectManifest::new();
        entries.insert(entry.filename.clone(), entry);
        let mut other = ManifestEntry::new("b.vcf");
        other.description = Some("plain".to_string());
        other.start_date = Some("2020-02-02".to_string());
        other.extra.insert("lab".to_string(), String::new());
        entries.insert(other.filename.clone(), other);

        let manifest = Manifest::Single(entries);
        assert_eq!(roundtrip(&manifest), manifest);
    }

    #[test]
    fn roundtrip_multi_with_sentinel() {
        let mut members = BTreeMap::new();
        members.insert(MemberId::from("00000001"), SubjectManifest::new());
        let mut entry = ManifestEntry::new("a.json");
        entry.description = Some("d".to_string());
        entry.tags = vec!["json".to_string()];
        entry.checksum = Some("d41d8cd98f00b204e9800998ecf8427e".to_string());
        entry.creation_date = Some("2016-01-01T00:00:00+00:00".to_string());
        let mut subject = SubjectManifest::new();
        subject.insert("a.json".to_string(), entry);
        members.insert(MemberId::from("00000002"), subject);

        let manifest = Manifest::Multi(members);
        assert_eq!(roundtrip(&manifest), manifest);
    }
}
