//! Binary behaviour that never reaches the network: every case fails or
//! finishes before the first remote call.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

const UNREACHABLE: &str = "http://127.0.0.1:9";

fn ohsync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ohsync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("RUST_LOG")
        .args(["--base-url", UNREACHABLE]);
    cmd
}

#[test]
fn create_csv_drafts_every_file() {
    let home = TempDir::new().expect("home");
    let data = assert_fs::TempDir::new().expect("data");
    data.child("steps.json").write_str("{}").expect("write");
    data.child("genome.txt.gz").write_binary(b"\x1f\x8b").expect("write");
    let out = home.path().join("draft.csv");

    ohsync_cmd(home.path())
        .arg("metadata")
        .arg(data.path())
        .arg("--create-csv")
        .arg(&out)
        .assert()
        .success()
        .stdout(contains("Wrote 2 entries"));

    let csv = fs::read_to_string(&out).expect("read draft");
    let header = csv.lines().next().expect("header");
    assert!(header.starts_with("filename,tags"), "header was {header}");
    assert!(csv.contains("steps.json,json"));
    assert!(csv.contains("genome.txt.gz,txt"));
}

#[test]
fn review_of_a_draft_flags_missing_descriptions() {
    let home = TempDir::new().expect("home");
    let data = assert_fs::TempDir::new().expect("data");
    data.child("a.txt").write_str("hello").expect("write");
    let out = home.path().join("draft.csv");

    ohsync_cmd(home.path())
        .arg("metadata")
        .arg(data.path())
        .arg("--create-csv")
        .arg(&out)
        .assert()
        .success();

    ohsync_cmd(home.path())
        .arg("metadata")
        .arg(data.path())
        .arg("--review")
        .arg(&out)
        .assert()
        .failure()
        .stdout(contains("a.txt"))
        .stdout(contains("description"));
}

#[test]
fn review_accepts_a_complete_manifest() {
    let home = TempDir::new().expect("home");
    let data = assert_fs::TempDir::new().expect("data");
    data.child("a.txt").write_str("hello").expect("write");
    let csv = home.path().join("meta.csv");
    fs::write(
        &csv,
        "filename,tags,description,md5,creation_date\n\
         a.txt,\"txt, notes\",Some notes,,2024-01-02\n",
    )
    .expect("write csv");

    ohsync_cmd(home.path())
        .arg("metadata")
        .arg(data.path())
        .arg("--review")
        .arg(&csv)
        .assert()
        .success()
        .stdout(contains("is valid"));
}

#[test]
fn review_lists_files_missing_from_the_manifest() {
    let home = TempDir::new().expect("home");
    let data = assert_fs::TempDir::new().expect("data");
    for name in ["a", "b", "c"] {
        data.child(name).write_str(name).expect("write");
    }
    let csv = home.path().join("meta.csv");
    fs::write(&csv, "filename,tags,description\na,,first\nb,,second\n").expect("write csv");

    ohsync_cmd(home.path())
        .arg("metadata")
        .arg(data.path())
        .arg("--review")
        .arg(&csv)
        .assert()
        .failure()
        .stdout(contains("file 'c': present in the folder but not in the manifest"));
}

#[test]
fn metadata_needs_an_action() {
    let home = TempDir::new().expect("home");
    ohsync_cmd(home.path())
        .args(["metadata", "."])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn safe_and_sync_conflict_before_scanning() {
    let home = TempDir::new().expect("home");
    ohsync_cmd(home.path())
        .args([
            "upload",
            "-d",
            "does-not-exist",
            "--metadata-csv",
            "missing.csv",
            "-T",
            "token",
            "--safe",
            "--sync",
        ])
        .assert()
        .failure()
        .stderr(contains("mutually incompatible"));
}

#[test]
fn upload_rejects_non_member_subfolders_offline() {
    let home = TempDir::new().expect("home");
    let data = assert_fs::TempDir::new().expect("data");
    data.child("notes/a.txt").write_str("a").expect("write");
    let csv = home.path().join("meta.csv");
    fs::write(&csv, "filename,tags,description\na.txt,,first\n").expect("write csv");

    ohsync_cmd(home.path())
        .arg("upload")
        .arg("-d")
        .arg(data.path())
        .arg("--metadata-csv")
        .arg(&csv)
        .args(["-T", "token"])
        .assert()
        .failure()
        .stderr(contains("eight-digit member ids"))
        .stderr(contains("notes"));
}

#[test]
fn upload_reports_mismatched_files_offline() {
    let home = TempDir::new().expect("home");
    let data = assert_fs::TempDir::new().expect("data");
    for name in ["a", "b", "c"] {
        data.child(name).write_str(name).expect("write");
    }
    let csv = home.path().join("meta.csv");
    fs::write(&csv, "filename,tags,description\na,,first\nb,,second\n").expect("write csv");

    ohsync_cmd(home.path())
        .arg("upload")
        .arg("-d")
        .arg(data.path())
        .arg("--metadata-csv")
        .arg(&csv)
        .args(["-t", "token", "--dry-run"])
        .assert()
        .failure()
        .stderr(contains("local only: [c]; manifest only: []"));
}

#[test]
fn a_token_is_required() {
    let home = TempDir::new().expect("home");
    ohsync_cmd(home.path())
        .args(["delete", "-m", "01234567", "--all"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn memberlist_conflicts_with_a_member_token() {
    let home = TempDir::new().expect("home");
    ohsync_cmd(home.path())
        .args([
            "download",
            "-d",
            "out",
            "-t",
            "token",
            "--memberlist",
            "members.txt",
        ])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn unreachable_server_is_a_fatal_error() {
    let home = TempDir::new().expect("home");
    let data = assert_fs::TempDir::new().expect("data");
    data.child("a.txt").write_str("a").expect("write");
    let csv = home.path().join("meta.csv");
    fs::write(&csv, "filename,tags,description\na.txt,txt,first\n").expect("write csv");

    ohsync_cmd(home.path())
        .arg("upload")
        .arg("-d")
        .arg(data.path())
        .arg("--metadata-csv")
        .arg(&csv)
        .args(["-T", "token"])
        .assert()
        .failure()
        .stderr(contains("unreachable"));
}
