//! CLI integration tests for specscan
//!
//! Tests the specscan CLI commands end-to-end using assert_cmd. Every test
//! gets its own config directory and database file.

use assert_cmd::Command;
use predicates::prelude::*;
use specscan_core::Store;
use specscan_core::config::Config;
use specscan_core::domain::{ComponentCategory, ComponentSpecs, SourceType, SpecSource, SpecValue};
use specscan_core::storage::{Database, DatabaseConfig};
use std::path::PathBuf;
use tempfile::TempDir;

struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn db_path(&self) -> PathBuf {
        self.dir.path().join("data").join("specscan.db")
    }

    /// Command with an isolated config dir and database
    #[allow(deprecated)]
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("specscan").unwrap();
        cmd.env("SPECSCAN_CONFIG_DIR", self.dir.path().join("config"));
        cmd.env_remove("RUST_LOG");
        cmd.arg("--database").arg(self.db_path());
        cmd
    }

    fn store(&self) -> Store {
        Store::new(
            Database::new(DatabaseConfig::with_path(self.db_path())),
            &Config::default(),
        )
    }

    fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

const COMPONENTS_JSON: &str = r#"[
    {
        "part_number": "LM2596",
        "manufacturer": "TI",
        "category": "dc_dc_converter",
        "specs": {
            "max_output_current": {"value": 3.0, "unit": "A"},
            "input_voltage": {"min": 4.5, "max": 40.0, "unit": "V"}
        },
        "source": {
            "source_type": "datasheet",
            "url": "https://www.ti.com/lit/ds/lm2596.pdf",
            "confidence": 0.95,
            "retrieved_at": "2026-01-15T10:00:00Z"
        }
    },
    {
        "part_number": "LM2596S-ADJ",
        "manufacturer": "ON Semi",
        "category": "dc_dc_converter",
        "source": {
            "source_type": "distributor",
            "confidence": 0.8,
            "retrieved_at": "2026-01-15T10:00:00Z"
        }
    }
]"#;

#[test]
fn test_help() {
    let env = TestEnv::new();
    env.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("components"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("saved"));
}

#[test]
fn test_doctor_on_fresh_database() {
    let env = TestEnv::new();
    env.cmd()
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] Database"))
        .stdout(predicate::str::contains("[OK] Schema"));

    assert!(env.db_path().exists(), "database file should be created");
}

#[test]
fn test_stats_json() {
    let env = TestEnv::new();
    let output = env
        .cmd()
        .args(["--format", "json", "stats"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stats: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(stats["components"]["total_count"], 0);
    assert_eq!(stats["history"]["total_scans"], 0);
    assert_eq!(stats["saved_count"], 0);
}

#[test]
fn test_import_search_and_show() {
    let env = TestEnv::new();
    let file = env.write_file("components.json", COMPONENTS_JSON);

    env.cmd()
        .args(["components", "import"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2 component(s)"));

    env.cmd()
        .args(["components", "search", "lm2596"])
        .assert()
        .success()
        .stdout(predicate::str::contains("LM2596 (TI)"))
        .stdout(predicate::str::contains("LM2596S-ADJ (ON Semi)"));

    env.cmd()
        .args(["components", "show", "LM2596", "--manufacturer", "TI"])
        .assert()
        .success()
        .stdout(predicate::str::contains("input_voltage: 4.5..40 V"));

    env.cmd()
        .args(["components", "show", "NE555"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not cached"));
}

#[test]
fn test_import_is_all_or_nothing() {
    let env = TestEnv::new();
    let file = env.write_file(
        "bad.json",
        r#"[
            {"part_number": "AMS1117", "manufacturer": "AMS", "category": "voltage_regulator",
             "source": {"source_type": "manual", "confidence": 1.0, "retrieved_at": "2026-01-15T10:00:00Z"}},
            {"part_number": "   ", "manufacturer": "Nobody", "category": "other",
             "source": {"source_type": "manual", "confidence": 1.0, "retrieved_at": "2026-01-15T10:00:00Z"}}
        ]"#,
    );

    env.cmd()
        .args(["components", "import"])
        .arg(&file)
        .assert()
        .failure();

    env.cmd()
        .args(["components", "search", "AMS1117"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No cached components"));
}

#[test]
fn test_saved_workflow() {
    let env = TestEnv::new();

    env.cmd()
        .args([
            "saved",
            "add",
            "TP4056",
            "Top Power",
            "--category",
            "charger ic",
            "--notes",
            "lipo charging board",
            "--tag",
            "lipo",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("as #1"));

    env.cmd()
        .args(["saved", "tag", "1", "solar"])
        .assert()
        .success();

    env.cmd()
        .args(["saved", "tags"])
        .assert()
        .success()
        .stdout(predicate::str::diff("lipo\nsolar\n"));

    env.cmd()
        .args(["saved", "list", "--tag", "solar"])
        .assert()
        .success()
        .stdout(predicate::str::contains("TP4056 (Top Power) - charger_ic [lipo, solar]"))
        .stdout(predicate::str::contains("lipo charging board"));

    env.cmd()
        .args(["saved", "untag", "1", "never-added"])
        .assert()
        .success();

    env.cmd()
        .args(["saved", "tag", "99", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    env.cmd()
        .args(["saved", "remove", "1"])
        .assert()
        .success();

    env.cmd()
        .args(["saved", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved components"));
}

#[tokio::test]
async fn test_saved_add_keeps_stored_specs() {
    let env = TestEnv::new();
    let store = env.store();
    let part = ComponentSpecs::new(
        "LM2596",
        "TI",
        ComponentCategory::DcDcConverter,
        SpecSource::new(SourceType::Datasheet, 0.95),
    )
    .with_spec("max_output_current", SpecValue::nominal(3.0, "A"));
    let id = store.saved().save(&part, None, None).await.unwrap();
    store.database().close().await;

    env.cmd()
        .args([
            "saved",
            "add",
            "LM2596",
            "TI",
            "--category",
            "dc_dc_converter",
            "--notes",
            "bench",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("as #{}", id)));

    let saved = store.saved().get_by_id(id).await.unwrap().unwrap();
    assert_eq!(saved.notes.as_deref(), Some("bench"));
    assert_eq!(saved.specs.len(), 1);
    assert_eq!(saved.specs["max_output_current"].value, Some(3.0));
}

#[test]
fn test_saved_add_rejects_unknown_category() {
    let env = TestEnv::new();
    env.cmd()
        .args(["saved", "add", "X1", "Acme", "--category", "flux capacitor"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown category"));
}

#[test]
fn test_history_empty_and_missing() {
    let env = TestEnv::new();

    env.cmd()
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No scans recorded"));

    env.cmd()
        .args(["history", "show", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Scan 1 not found"));

    env.cmd()
        .args(["history", "clear"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));

    env.cmd()
        .args(["history", "clear", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 scan(s)"));
}

#[test]
fn test_clean_and_reset() {
    let env = TestEnv::new();
    let file = env.write_file("components.json", COMPONENTS_JSON);
    env.cmd()
        .args(["components", "import"])
        .arg(&file)
        .assert()
        .success();

    env.cmd()
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 expired component(s)"));

    env.cmd().arg("reset").assert().failure();

    env.cmd()
        .args(["reset", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Database reset"));

    env.cmd()
        .args(["components", "search", "LM2596"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No cached components"));
}

#[test]
fn test_config_set_and_get() {
    let env = TestEnv::new();

    env.cmd()
        .args(["config", "set", "history.retention_limit", "25"])
        .assert()
        .success();

    env.cmd()
        .args(["config", "get", "history.retention_limit"])
        .assert()
        .success()
        .stdout(predicate::str::diff("25\n"));

    env.cmd()
        .args(["config", "set", "history.retention_limit", "0"])
        .assert()
        .failure();

    env.cmd()
        .args(["config", "get", "no.such.key"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));

    env.cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cache.component_ttl_hours = 168"));
}
