// End-to-end tests for the netinv binary.
//
// Each test works in its own tempdir and points NETINV_SETTINGS at a file
// that does not exist, so user settings never leak in.
//
// Run with: cargo test -p netinv-cli --test cli_tests -- --nocapture

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const HEADER: &str = "Link ID,Site A,Parent Equipment A,Equipment A,Equipment Type A,Port A,\
Site B,Parent Equipment B,Equipment B,Equipment Type B,Port B,weight,speed";

struct Env {
    dir: TempDir,
}

impl Env {
    fn new() -> Self {
        Self { dir: tempfile::tempdir().unwrap() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn db(&self) -> String {
        self.path("inventory.db").to_string_lossy().into_owned()
    }

    fn netinv(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_netinv"))
            .args(args)
            .env("NETINV_SETTINGS", self.path("no-settings.json"))
            .env_remove("RUST_LOG")
            .env_remove("NETINV_LOG")
            .output()
            .expect("run netinv")
    }

    fn write(&self, name: &str, content: &str) -> String {
        let path = self.path(name);
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    /// Inventory with one location level and two link properties.
    fn seeded(&self) -> String {
        let db = self.db();
        assert_ok(&self.netinv(&["init", &db]));
        assert_ok(&self.netinv(&["location-type", "add", &db, "Site"]));
        assert_ok(&self.netinv(&["property", "add", &db, "--name", "weight", "--kind", "integer"]));
        assert_ok(&self.netinv(&[
            "property", "add", &db, "--name", "speed", "--kind", "enumerated",
            "--values", "1G,10G", "--default", "1G",
        ]));
        db
    }
}

fn assert_ok(output: &Output) {
    assert!(
        output.status.success(),
        "exit code: {:?}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn code(output: &Output) -> i32 {
    output.status.code().expect("exit code")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

// ===========================================================================
// Schema commands
// ===========================================================================

#[test]
fn init_is_idempotent() {
    let env = Env::new();
    let db = env.db();
    assert_ok(&env.netinv(&["init", &db]));
    assert_ok(&env.netinv(&["init", &db]));
    assert!(stderr(&env.netinv(&["init", &db])).contains("already initialized"));
}

#[test]
fn commands_require_an_initialized_inventory() {
    let env = Env::new();
    let out = env.netinv(&["export", &env.db()]);
    assert_eq!(code(&out), 3);
    assert!(stderr(&out).contains("netinv init"));
}

#[test]
fn property_list_shows_definitions_in_order() {
    let env = Env::new();
    let db = env.seeded();

    let out = env.netinv(&["property", "list", &db]);
    assert_ok(&out);
    let text = stdout(&out);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, vec!["link\tweight\tinteger\t\t", "link\tspeed\tenumerated\t1G,10G\t1G"]);

    let out = env.netinv(&["property", "list", &db, "--json"]);
    assert_ok(&out);
    let json: serde_json::Value = serde_json::from_str(stdout(&out).trim()).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 2);
    assert_eq!(json[1]["name"], "speed");
}

#[test]
fn property_default_must_match_kind() {
    let env = Env::new();
    let db = env.seeded();
    let out = env.netinv(&[
        "property", "add", &db, "--name", "mtu", "--kind", "integer", "--default", "big",
    ]);
    assert_eq!(code(&out), 2);
}

#[test]
fn location_types_list_outermost_first() {
    let env = Env::new();
    let db = env.seeded();
    assert_ok(&env.netinv(&["location-type", "add", &db, "Room"]));
    let out = env.netinv(&["location-type", "list", &db]);
    assert_ok(&out);
    assert_eq!(stdout(&out), "0\tSite\n1\tRoom\n");
}

#[test]
fn equipment_type_rejects_malformed_port() {
    let env = Env::new();
    let db = env.seeded();
    assert_ok(&env.netinv(&["equipment-type", "add", &db, "Switch", "--port", "ge-0:sfp"]));
    let out = env.netinv(&["equipment-type", "add", &db, "Router", "--port", "eth0"]);
    assert_eq!(code(&out), 2);
}

// ===========================================================================
// Import / export
// ===========================================================================

#[test]
fn import_then_export_roundtrip() {
    let env = Env::new();
    let db = env.seeded();
    let csv = env.write(
        "links.csv",
        &format!(
            "{HEADER}\n\
             ,DC1,,sw1,Switch,p1,DC1,,sw2,Switch,p1,10,10G\n\
             ,DC1,,sw1,Switch,p2,DC2,,rt1,Router,eth0,,\n"
        ),
    );

    let out = env.netinv(&["import", &db, &csv, "--json"]);
    assert_ok(&out);
    let report: serde_json::Value = serde_json::from_str(stdout(&out).trim()).unwrap();
    assert_eq!(report["summary"]["created"], 2);
    assert_eq!(report["summary"]["failed"], 0);
    assert_eq!(report["meta"]["input_sha256"].as_str().unwrap().len(), 64);

    let exported = env.path("export.csv");
    assert_ok(&env.netinv(&["export", &db, "-o", exported.to_str().unwrap()]));
    let text = read(&exported);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], HEADER);
    assert!(lines[1].ends_with(",10,10G"));
    // empty cells store nothing, even where a default exists
    assert!(lines[2].ends_with(",,"));

    let out = env.netinv(&["import", &db, exported.to_str().unwrap(), "--json"]);
    assert_ok(&out);
    let report: serde_json::Value = serde_json::from_str(stdout(&out).trim()).unwrap();
    assert_eq!(report["summary"]["unchanged"], 2);
    assert_eq!(report["summary"]["created"], 0);
    assert_eq!(report["summary"]["updated"], 0);
}

#[test]
fn defaults_fill_omitted_columns() {
    let env = Env::new();
    let db = env.seeded();
    let header = HEADER.trim_end_matches(",speed");
    let csv = env.write(
        "links.csv",
        &format!("{header}\n,DC1,,sw1,Switch,p1,DC1,,sw2,Switch,p1,7\n"),
    );
    assert_ok(&env.netinv(&["import", &db, &csv]));

    let out = env.netinv(&["export", &db]);
    assert_ok(&out);
    let text = stdout(&out);
    assert!(text.lines().nth(1).unwrap().ends_with(",7,1G"), "{text}");
}

#[test]
fn atomic_import_aborts_on_bad_row() {
    let env = Env::new();
    let db = env.seeded();
    let csv = env.write(
        "links.csv",
        &format!(
            "{HEADER}\n\
             ,DC1,,sw1,Switch,p1,DC1,,sw2,Switch,p1,10,\n\
             ,DC1,,sw1,Switch,p2,DC1,,sw2,Switch,p2,ten,\n"
        ),
    );

    let out = env.netinv(&["import", &db, &csv, "--mode", "atomic", "--json"]);
    assert_eq!(code(&out), 60);
    let body: serde_json::Value = serde_json::from_str(stdout(&out).trim()).unwrap();
    assert_eq!(body["status"], "aborted");
    assert_eq!(body["failures"][0]["code"], "invalid_format");

    let out = env.netinv(&["export", &db]);
    assert_ok(&out);
    assert_eq!(stdout(&out).lines().count(), 1, "only the header should remain");
}

#[test]
fn per_row_import_reports_partial_failure() {
    let env = Env::new();
    let db = env.seeded();
    let csv = env.write(
        "links.csv",
        &format!(
            "{HEADER}\n\
             ,DC1,,sw1,Switch,p1,DC1,,sw2,Switch,p1,10,\n\
             ,DC1,,sw1,Switch,p2,DC1,,sw2,Switch,p2,,40G\n"
        ),
    );
    let report_path = env.path("report.json");

    let out = env.netinv(&[
        "import", &db, &csv, "--mode", "per-row", "--output", report_path.to_str().unwrap(),
    ]);
    assert_eq!(code(&out), 61);
    assert!(stderr(&out).contains("invalid_enum_value"));

    let report: serde_json::Value = serde_json::from_str(&read(&report_path)).unwrap();
    assert_eq!(report["meta"]["transaction_mode"], "per_row");
    assert_eq!(report["summary"]["created"], 1);
    assert_eq!(report["summary"]["failed"], 1);
}

#[test]
fn header_mismatch_has_its_own_exit_code() {
    let env = Env::new();
    let db = env.seeded();
    let csv = env.write("links.csv", "Link ID,Building A\n,DC1\n");
    let out = env.netinv(&["import", &db, &csv]);
    assert_eq!(code(&out), 63);
}

#[test]
fn semicolon_files_are_sniffed() {
    let env = Env::new();
    let db = env.seeded();
    let csv = env.write(
        "links.csv",
        &format!("{}\n;DC1;;sw1;Switch;p1;DC1;;sw2;Switch;p1;5;\n", HEADER.replace(',', ";")),
    );
    let out = env.netinv(&["import", &db, &csv, "--json"]);
    assert_ok(&out);
    let report: serde_json::Value = serde_json::from_str(stdout(&out).trim()).unwrap();
    assert_eq!(report["summary"]["created"], 1);
}

#[test]
fn missing_input_file_is_io_error() {
    let env = Env::new();
    let db = env.seeded();
    let out = env.netinv(&["import", &db, env.path("absent.csv").to_str().unwrap()]);
    assert_eq!(code(&out), 3);
}

// ===========================================================================
// config validate
// ===========================================================================

#[test]
fn config_validate_accepts_good_config() {
    let env = Env::new();
    let cfg = env.write(
        "import.toml",
        "name = \"nightly\"\n[transaction]\nmode = \"per_row\"\n[csv]\ndelimiter = \";\"\n",
    );
    let out = env.netinv(&["config", "validate", &cfg]);
    assert_ok(&out);
    assert!(stderr(&out).contains("nightly"));
}

#[test]
fn config_validate_rejects_bad_config() {
    let env = Env::new();
    let bad_mode = env.write("bad.toml", "[transaction]\nmode = \"sometimes\"\n");
    assert_eq!(code(&env.netinv(&["config", "validate", &bad_mode])), 62);

    let bad_delim = env.write("delim.toml", "[csv]\ndelimiter = \"::\"\n");
    assert_eq!(code(&env.netinv(&["config", "validate", &bad_delim])), 62);
}
