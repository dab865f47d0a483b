//! Manifest entry validation.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use ohsync_core::{Manifest, ManifestEntry, MemberId, SubjectManifest};

use crate::error::SyncError;

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// True for the ISO 8601 forms we accept: full RFC 3339, a naive datetime
/// (`T` or space separated, optional fractional seconds), or a bare date.
pub fn is_iso8601(value: &str) -> bool {
    if DateTime::parse_from_rfc3339(value).is_ok() {
        return true;
    }
    if DATETIME_FORMATS
        .iter()
        .any(|fmt| NaiveDateTime::parse_from_str(value, fmt).is_ok())
    {
        return true;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// 32 hex digits, either case.
pub fn is_md5(value: &str) -> bool {
    value.len() == 32 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Every problem with one entry. Empty when the entry is valid.
pub fn validate_entry(member: Option<&MemberId>, entry: &ManifestEntry) -> Vec<String> {
    let mut problems = Vec::new();

    if let Some(member) = member {
        if !member.is_well_formed() {
            problems.push(format!(
                "project member id must be eight digits, found '{member}'"
            ));
        }
    }

    match entry.description.as_deref() {
        None => problems.push("\"description\" is a required field".to_string()),
        Some(d) if d.trim().is_empty() => {
            problems.push("\"description\" must not be empty".to_string())
        }
        Some(_) => {}
    }

    if let Some(md5) = entry.checksum.as_deref() {
        if !is_md5(md5) {
            problems.push(format!("\"md5\" is not a valid MD5 checksum: '{md5}'"));
        }
    }

    for (column, value) in [
        ("creation_date", entry.creation_date.as_deref()),
        ("start_date", entry.start_date.as_deref()),
        ("end_date", entry.end_date.as_deref()),
    ] {
        if let Some(value) = value {
            if !is_iso8601(value) {
                problems.push(format!(
                    "\"{column}\" must be an ISO 8601 date, found '{value}'"
                ));
            }
        }
    }

    problems
}

/// Validate a subject's entries in filename order; the first problem is fatal.
pub fn validate_subject(
    member: Option<&MemberId>,
    entries: &SubjectManifest,
) -> Result<(), SyncError> {
    for entry in entries.values() {
        if let Some(problem) = validate_entry(member, entry).into_iter().next() {
            return Err(SyncError::RowValidation {
                member: member.cloned(),
                filename: entry.filename.clone(),
                problem,
            });
        }
    }
    Ok(())
}

/// Validate every entry of a manifest; the first problem is fatal.
pub fn validate_manifest(manifest: &Manifest) -> Result<(), SyncError> {
    match manifest {
        Manifest::Single(entries) => validate_subject(None, entries),
        Manifest::Multi(members) => members
            .iter()
            .try_for_each(|(member, entries)| validate_subject(Some(member), entries)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(description: Option<&str>) -> ManifestEntry {
        ManifestEntry {
            description: description.map(str::to_string),
            ..ManifestEntry::new("a.json")
        }
    }

    #[test]
    fn accepts_common_date_forms() {
        for value in [
            "2016-01-01",
            "2016-01-01T12:30",
            "2016-01-01T12:30:45",
            "2016-01-01 12:30:45.123",
            "2016-01-01T12:30:45+02:00",
            "2016-01-01T12:30:45.5Z",
        ] {
            assert!(is_iso8601(value), "{value} should parse");
        }
        for value in ["01/02/2016", "2016-13-01", "yesterday", ""] {
            assert!(!is_iso8601(value), "{value} should not parse");
        }
    }

    #[test]
    fn md5_is_case_insensitive_hex() {
        assert!(is_md5("D41D8CD98F00B204E9800998ECF8427E"));
        assert!(is_md5("d41d8cd98f00b204e9800998ecf8427e"));
        assert!(!is_md5("xyz"));
        assert!(!is_md5("g41d8cd98f00b204e9800998ecf8427e"));
    }

    #[test]
    fn missing_and_blank_description_rejected() {
        assert_eq!(validate_entry(None, &entry(None)).len(), 1);
        assert_eq!(validate_entry(None, &entry(Some("  "))).len(), 1);
        assert!(validate_entry(None, &entry(Some("ok"))).is_empty());
    }

    #[test]
    fn collects_every_problem() {
        let mut bad = entry(None);
        bad.checksum = Some("xyz".to_string());
        bad.end_date = Some("soon".to_string());
        let problems = validate_entry(Some(&MemberId::from("123")), &bad);
        assert_eq!(problems.len(), 4, "{problems:?}");
    }

    #[test]
    fn validate_manifest_reports_first_problem() {
        let mut entries = SubjectManifest::new();
        entries.insert("a.json".to_string(), entry(Some("fine")));
        let mut broken = entry(Some("fine"));
        broken.filename = "b.json".to_string();
        broken.checksum = Some("xyz".to_string());
        entries.insert("b.json".to_string(), broken);

        match validate_manifest(&Manifest::Single(entries)).unwrap_err() {
            SyncError::RowValidation { filename, problem, .. } => {
                assert_eq!(filename, "b.json");
                assert!(problem.contains("MD5"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
