//! End-to-end cashier flow through the `citedesk` binary.
//!
//! stdout is a pipe under assert_cmd, so every command answers in JSON.

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Office {
    _dir: TempDir,
    db: PathBuf,
    config: PathBuf,
}

impl Office {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("data").join("citedesk.db");
        let config = dir.path().join("config.json");
        Self { _dir: dir, db, config }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("citedesk").unwrap();
        cmd.env_remove("CITEDESK_DB")
            .env_remove("RUST_LOG")
            .arg("--db")
            .arg(&self.db)
            .arg("--config")
            .arg(&self.config)
            .args(["--actor", "maria"]);
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().args(args).assert().success().get_output().stdout.clone();
        serde_json::from_slice(&output).unwrap()
    }

    fn seeded() -> Self {
        let office = Self::new();
        let init = office.json(&["init", "--seed"]);
        assert!(init["seeded_violation_types"].as_u64().unwrap() > 0);
        office
    }
}

fn cite(office: &Office, ticket: &str, date: &str) -> Value {
    office.json(&[
        "citation",
        "create",
        ticket,
        "--last",
        "Dela Cruz",
        "--first",
        "Juan",
        "--license",
        "N01-12-345678",
        "--date",
        date,
        "--violations",
        "NH,NL",
        "--officer",
        "PO1 Santos",
    ])
}

#[test]
fn test_commands_before_init_fail_with_exit_2() {
    let office = Office::new();
    office
        .cmd()
        .args(["citation", "list"])
        .assert()
        .code(2)
        .stderr(contains("NOT_INITIALIZED"));
}

#[test]
fn test_init_twice_needs_force() {
    let office = Office::seeded();
    office.cmd().arg("init").assert().code(2);
    office.cmd().args(["init", "--force"]).assert().success();
}

#[test]
fn test_citation_payment_receipt_flow() {
    let office = Office::seeded();

    let citation = cite(&office, "T-0001", "2024-03-01 08:30");
    assert_eq!(citation["status"], "pending");
    assert_eq!(citation["total_fine"], 450_000);
    assert_eq!(citation["violations"].as_array().unwrap().len(), 2);

    let payment = office.json(&["payment", "record", "T-0001", "--or", "0000101", "--tendered", "5000"]);
    assert_eq!(payment["status"], "pending_print");
    assert_eq!(payment["amount"], 450_000);
    assert_eq!(payment["change_due"], 50_000);

    let pending = office.json(&["payment", "pending"]);
    assert_eq!(pending["count"], 1);

    let printed = office.json(&["receipt", "print", "0000101"]);
    assert_eq!(printed["reprint"], false);
    assert_eq!(printed["payment"]["status"], "completed");
    assert!(printed["text"].as_str().unwrap().contains("0000101"));

    let reprint = office.json(&["receipt", "print", "0000101"]);
    assert_eq!(reprint["reprint"], true);
    assert_eq!(reprint["receipt"]["print_count"], 2);

    let shown = office.json(&["citation", "show", "T-0001"]);
    assert_eq!(shown["status"], "paid");
    assert_eq!(shown["balance_due"], 0);

    let check = office.json(&["payment", "check-or", "0000101"]);
    assert_eq!(check["available"], false);

    let audit = office.json(&["audit", "list", "--entity", "payment"]);
    assert!(audit["count"].as_u64().unwrap() >= 2);
}

#[test]
fn test_repeat_offense_raises_fine() {
    let office = Office::seeded();
    cite(&office, "T-0001", "2024-03-01");
    let second = office.json(&[
        "citation",
        "create",
        "T-0002",
        "--driver",
        cite_driver(&office, "T-0001").as_str(),
        "--date",
        "2024-04-01",
        "--violations",
        "NH",
    ]);
    assert_eq!(second["violations"][0]["offense_count"], 2);
    assert_eq!(second["total_fine"], 300_000);
}

fn cite_driver(office: &Office, ticket: &str) -> String {
    office.json(&["citation", "show", ticket])["driver_id"]
        .as_str()
        .unwrap()
        .to_string()
}

#[test]
fn test_or_number_is_never_reused() {
    let office = Office::seeded();
    cite(&office, "T-0001", "2024-03-01");
    cite_other(&office, "T-0002");

    office.json(&["payment", "record", "T-0001", "--or", "0000200"]);
    office
        .cmd()
        .args(["payment", "void", "0000200", "--reason", "wrong amount keyed"])
        .assert()
        .success();

    office
        .cmd()
        .args(["payment", "record", "T-0002", "--or", "0000200"])
        .assert()
        .code(5)
        .stderr(contains("DUPLICATE_OR_NUMBER"));
}

fn cite_other(office: &Office, ticket: &str) {
    office.json(&[
        "citation",
        "create",
        ticket,
        "--last",
        "Reyes",
        "--first",
        "Ana",
        "--date",
        "2024-03-02",
        "--violations",
        "IP",
    ]);
}

#[test]
fn test_unknown_citation_exit_3() {
    let office = Office::seeded();
    office
        .cmd()
        .args(["citation", "show", "NOPE-1"])
        .assert()
        .code(3)
        .stderr(contains("CITATION_NOT_FOUND"));
}

#[test]
fn test_backup_create_and_verify() {
    let office = Office::seeded();
    let dir = office.db.parent().map(Path::to_path_buf).unwrap().join("backups");
    let backup = office.json(&["backup", "create", "--dir", dir.to_str().unwrap()]);
    let id = backup["id"].as_i64().unwrap().to_string();

    let report = office.json(&["backup", "verify", &id]);
    assert_eq!(report["ok"], true);
}

#[test]
fn test_csv_output() {
    let office = Office::seeded();
    office
        .cmd()
        .args(["--format", "csv", "violation-type", "list"])
        .assert()
        .success()
        .stdout(contains("code,name,category"))
        .stdout(contains("NH,No Helmet"));
}
