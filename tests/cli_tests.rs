//! CLI integration tests
//!
//! These tests run the built binary against schemas and documents written
//! to a temporary directory.

#![cfg(feature = "cli")]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;
use xsdcheck::validators::{
    BuiltinType, ComplexTypeDef, ContentType, ElementDecl, ModelGroup, Particle, SchemaBuilder,
};

fn xsdcheck(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_xsdcheck"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// `list` of `entry` ints, written as `schema.json`
fn write_schema(dir: &Path) -> PathBuf {
    let mut b = SchemaBuilder::new(None);
    let entry = b.add_element(ElementDecl::new(b.qname("entry"), BuiltinType::Int.into()));
    let group = b.add_model_group(ModelGroup::sequence(vec![Particle::element(entry).with_occurs(1, None)]));
    b.add_complex_type(
        ComplexTypeDef::new(ContentType::element_only(Particle::group(group))).named(b.qname("listType")),
    );
    let list_type = b.add_complex_type(ComplexTypeDef::new(ContentType::element_only(Particle::group(group))));
    b.add_global_element(ElementDecl::new(b.qname("list"), list_type));
    let path = dir.join("schema.json");
    fs::write(&path, b.build().unwrap().to_json().unwrap()).unwrap();
    path
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// Validate Command Tests
// ============================================================================

#[test]
fn test_cli_validate_valid() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(dir.path());
    let file = write_file(dir.path(), "ok.xml", "<list><entry>1</entry><entry>2</entry></list>");

    let output = xsdcheck(&["validate", "-s", schema.to_str().unwrap(), file.to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "validate should succeed: {}", stdout);
    assert!(stdout.contains("is valid"));
}

#[test]
fn test_cli_validate_invalid() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(dir.path());
    let file = write_file(dir.path(), "bad.xml", "<list><entry>one</entry></list>");

    let output = xsdcheck(&["validate", "-s", schema.to_str().unwrap(), file.to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout.contains("is invalid"));
    assert!(stdout.contains("Content of element entry does not match its type definition"));
}

#[test]
fn test_cli_validate_json_output() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(dir.path());
    let file = write_file(dir.path(), "empty.xml", "<list/>");

    let output = xsdcheck(&["validate", "--json", "-s", schema.to_str().unwrap(), file.to_str().unwrap()]);
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["valid"], false);
    assert_eq!(json["errors"][0]["kind"], "content model");
    assert_eq!(json["errors"][0]["path"], "/list");
}

#[test]
fn test_cli_validate_with_location_hint() {
    let dir = TempDir::new().unwrap();
    write_schema(dir.path());
    let file = write_file(
        dir.path(),
        "hinted.xml",
        r#"<list xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:noNamespaceSchemaLocation="schema.json"><entry>3</entry></list>"#,
    );

    let output = xsdcheck(&["validate", file.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stdout));

    let output = xsdcheck(&["validate", "--no-hints", file.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_cli_missing_file() {
    let output = xsdcheck(&["validate", "/nonexistent/file.xml"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error"));
}

// ============================================================================
// Other Commands
// ============================================================================

#[test]
fn test_cli_check_value() {
    let output = xsdcheck(&["check-value", "-t", "xs:positiveInteger", " 42 "]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("'42' is valid"));

    let output = xsdcheck(&["check-value", "-t", "xs:positiveInteger", "0"]);
    assert_eq!(output.status.code(), Some(1));

    let output = xsdcheck(&["check-value", "-t", "xs:unknownType", "0"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_cli_dot() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(dir.path());
    let output = xsdcheck(&["dot", "-s", schema.to_str().unwrap(), "-t", "listType"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.starts_with("digraph"));
}
