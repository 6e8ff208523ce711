//! Integration tests for VERSION propagation into the binary.

use std::fs;

use clap::Parser;
use clap::error::ErrorKind;
use pepper_app::{APP_VERSION, Args, app_version};

#[test]
fn version_display_tests_matches_root_version_file() {
    let root_version_path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../VERSION");
    let root_version = fs::read_to_string(root_version_path).expect("VERSION should be readable");
    assert_eq!(app_version(), root_version.trim());
}

#[test]
fn version_display_tests_cli_reports_build_version() {
    let error = Args::try_parse_from(["pepper", "--version"]).expect_err("--version should exit early");

    assert_eq!(error.kind(), ErrorKind::DisplayVersion);
    assert!(error.to_string().contains(&format!("pepper {APP_VERSION}")));
}
