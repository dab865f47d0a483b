//! Member allow/deny list files: one eight-digit member id per line.

use std::path::Path;

use crate::error::IdListError;
use crate::types::{is_member_id, MemberId};

/// Read an id list. Any line that is not exactly eight digits (after
/// trailing whitespace is stripped) is fatal, blank lines included.
pub fn read_id_list(path: &Path) -> Result<Vec<MemberId>, IdListError> {
    let contents = std::fs::read_to_string(path).map_err(|e| IdListError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_id_list(path, &contents)
}

fn parse_id_list(path: &Path, contents: &str) -> Result<Vec<MemberId>, IdListError> {
    let mut ids = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let value = line.trim_end();
        if !is_member_id(value) {
            return Err(IdListError::Malformed {
                path: path.to_path_buf(),
                line: idx + 1,
                value: value.to_string(),
            });
        }
        ids.push(MemberId::from(value));
    }
    Ok(ids)
}
