//! Review an existing manifest against a directory, reporting every problem
//! rather than stopping at the first.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use ohsync_core::{types::is_member_id, Manifest, MemberId, SubjectManifest};

use crate::error::{describe_entry, SyncError};
use crate::manifest;
use crate::scanner::list_files;
use crate::validate::validate_entry;

/// One problem found during review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<MemberId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub message: String,
}

impl Diagnostic {
    fn general(message: impl Into<String>) -> Self {
        Self {
            row: None,
            member: None,
            filename: None,
            message: message.into(),
        }
    }

    fn for_member(member: &MemberId, message: impl Into<String>) -> Self {
        Self {
            member: Some(member.clone()),
            ..Self::general(message)
        }
    }

    fn for_file(member: Option<&MemberId>, filename: &str, message: impl Into<String>) -> Self {
        Self {
            row: None,
            member: member.cloned(),
            filename: Some(filename.to_string()),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(row) = self.row {
            write!(f, "row {row}: ")?;
        }
        match (&self.member, &self.filename) {
            (member, Some(filename)) => {
                write!(f, "{}: ", describe_entry(member.as_ref(), filename))?
            }
            (Some(member), None) => write!(f, "member {member}: ")?,
            (None, None) => {}
        }
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl ReviewReport {
    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Review `manifest_path` against the contents of `directory`.
///
/// Only an unreadable manifest file is an `Err`; everything else, including
/// a broken header, is reported as a diagnostic.
pub fn review(directory: &Path, manifest_path: &Path) -> Result<ReviewReport, SyncError> {
    let mut report = ReviewReport::default();
    let (parsed, row_errors) = match manifest::load_collecting(manifest_path) {
        Ok(parsed) => parsed,
        Err(SyncError::Schema(message)) => {
            report.diagnostics.push(Diagnostic::general(message));
            return Ok(report);
        }
        Err(other) => return Err(other),
    };
    report
        .diagnostics
        .extend(row_errors.into_iter().map(|e| Diagnostic {
            row: Some(e.row),
            ..Diagnostic::general(e.message)
        }));

    if !directory.is_dir() {
        report.diagnostics.push(Diagnostic::general(format!(
            "{} is not a directory",
            directory.display()
        )));
        return Ok(report);
    }

    match &parsed {
        Manifest::Single(entries) => review_single(directory, entries, &mut report)?,
        Manifest::Multi(members) => {
            let subdirs = member_subdirs(directory, &mut report)?;
            let listed: BTreeSet<MemberId> = members.keys().cloned().collect();
            for member in subdirs.difference(&listed) {
                report.diagnostics.push(Diagnostic::for_member(
                    member,
                    "member folder is not listed in the manifest",
                ));
            }
            for member in listed.difference(&subdirs) {
                report.diagnostics.push(Diagnostic::for_member(
                    member,
                    "member is listed in the manifest but has no folder",
                ));
            }
            for member in subdirs.intersection(&listed) {
                let local = list_files(&directory.join(member.as_str()))?;
                compare_names(Some(member), &local, &members[member], &mut report);
            }
        }
    }

    for (member, entries) in subjects(&parsed) {
        for entry in entries.values() {
            for problem in validate_entry(member, entry) {
                report
                    .diagnostics
                    .push(Diagnostic::for_file(member, &entry.filename, problem));
            }
        }
    }

    Ok(report)
}

fn review_single(
    directory: &Path,
    entries: &SubjectManifest,
    report: &mut ReviewReport,
) -> Result<(), SyncError> {
    let has_subdirs = std::fs::read_dir(directory)
        .map_err(|e| crate::error::io_err(directory, e))?
        .filter_map(Result::ok)
        .any(|entry| entry.path().is_dir());
    if has_subdirs {
        report.diagnostics.push(Diagnostic::general(
            "directory has subfolders but the manifest has no project_member_id column",
        ));
    }
    let local = list_files(directory)?;
    compare_names(None, &local, entries, report);
    Ok(())
}

fn member_subdirs(
    directory: &Path,
    report: &mut ReviewReport,
) -> Result<BTreeSet<MemberId>, SyncError> {
    let mut members = BTreeSet::new();
    let mut entries: Vec<_> = std::fs::read_dir(directory)
        .map_err(|e| crate::error::io_err(directory, e))?
        .filter_map(Result::ok)
        .collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.path().is_dir() {
            if is_member_id(&name) {
                members.insert(MemberId::from(name));
            } else {
                report.diagnostics.push(Diagnostic::general(format!(
                    "subfolder '{name}' is not an eight-digit member id"
                )));
            }
        } else {
            report.diagnostics.push(Diagnostic::general(format!(
                "'{name}' sits beside member folders; files must be inside a member folder"
            )));
        }
    }
    Ok(members)
}

fn compare_names(
    member: Option<&MemberId>,
    local: &BTreeSet<String>,
    entries: &SubjectManifest,
    report: &mut ReviewReport,
) {
    let listed: BTreeSet<String> = entries.keys().cloned().collect();
    for name in local.difference(&listed) {
        report.diagnostics.push(Diagnostic::for_file(
            member,
            name,
            "present in the folder but not in the manifest",
        ));
    }
    for name in listed.difference(local) {
        report.diagnostics.push(Diagnostic::for_file(
            member,
            name,
            "listed in the manifest but not in the folder",
        ));
    }
}

fn subjects(manifest: &Manifest) -> Vec<(Option<&MemberId>, &SubjectManifest)> {
    match manifest {
        Manifest::Single(entries) => vec![(None, entries)],
        Manifest::Multi(members) => members.iter().map(|(m, e)| (Some(m), e)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup(manifest: &str) -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("data")).unwrap();
        fs::write(tmp.path().join("m.csv"), manifest).unwrap();
        tmp
    }

    #[test]
    fn clean_single_subject_is_valid() {
        let tmp = setup("filename,tags,description\na.json,json,ok\n");
        fs::write(tmp.path().join("data/a.json"), "{}").unwrap();
        let report = review(&tmp.path().join("data"), &tmp.path().join("m.csv")).unwrap();
        assert!(report.is_valid(), "{:?}", report.diagnostics);
    }

    #[test]
    fn reports_every_problem_at_once() {
        let tmp = setup(
            "filename,tags,description,md5\n\
             a.json,json,,xyz\n\
             b.json,json\n\
             c.json,json,ok,\n",
        );
        fs::write(tmp.path().join("data/a.json"), "{}").unwrap();
        fs::write(tmp.path().join("data/extra.txt"), "x").unwrap();
        let report = review(&tmp.path().join("data"), &tmp.path().join("m.csv")).unwrap();
        let rendered: Vec<String> = report.diagnostics.iter().map(|d| d.to_string()).collect();

        assert!(rendered.iter().any(|d| d.starts_with("row 3:")), "{rendered:?}");
        assert!(rendered.iter().any(|d| d.contains("'extra.txt'")));
        assert!(rendered.iter().any(|d| d.contains("'c.json'") && d.contains("not in the folder")));
        assert!(rendered.iter().any(|d| d.contains("\"description\" must not be empty")));
        assert!(rendered.iter().any(|d| d.contains("MD5")));
    }

    #[test]
    fn schema_error_is_single_diagnostic() {
        let tmp = setup("filename,description\n");
        let report = review(&tmp.path().join("data"), &tmp.path().join("m.csv")).unwrap();
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.diagnostics[0].message.contains("tags"));
    }

    #[test]
    fn multi_subject_folder_mismatches() {
        let tmp = setup(
            "project_member_id,filename,tags,description,md5,creation_date\n\
             00000001,None,NA,NA,NA,NA\n\
             00000003,None,NA,NA,NA,NA\n",
        );
        let data = tmp.path().join("data");
        fs::create_dir(data.join("00000001")).unwrap();
        fs::create_dir(data.join("00000002")).unwrap();
        fs::create_dir(data.join("notes")).unwrap();
        let report = review(&data, &tmp.path().join("m.csv")).unwrap();
        let rendered: Vec<String> = report.diagnostics.iter().map(|d| d.to_string()).collect();

        assert_eq!(report.diagnostics.len(), 3, "{rendered:?}");
        assert!(rendered.iter().any(|d| d.contains("notes")));
        assert!(rendered.iter().any(|d| d.contains("00000002") && d.contains("not listed")));
        assert!(rendered.iter().any(|d| d.contains("00000003") && d.contains("no folder")));
    }

    #[test]
    fn unreadable_manifest_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(review(tmp.path(), &tmp.path().join("absent.csv")).is_err());
    }
}
