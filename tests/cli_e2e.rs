//! CLI end-to-end tests driving the `pbx` binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn pbx(workspace: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pbx").unwrap();
    cmd.current_dir(workspace);
    cmd
}

fn init_workspace(dir: &Path) {
    pbx(dir).arg("init").assert().success();
    assert!(dir.join(".packbox").is_dir());
    assert!(dir.join(".packbox").join("inventory.sqlite").is_file());
}

#[test]
fn test_init_add_list() {
    let dir = tempfile::tempdir().unwrap();
    init_workspace(dir.path());

    pbx(dir.path())
        .args(["add", "home", "Maple Street", "--primary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added home 'Maple Street'"));

    pbx(dir.path())
        .args(["add", "location", "Garage", "--home", "Maple Street"])
        .assert()
        .success();

    pbx(dir.path())
        .args([
            "add", "item", "Drill", "--location", "Garage", "--price", "129.99",
        ])
        .assert()
        .success();

    pbx(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 homes, 1 locations, 0 labels, 1 items"));

    pbx(dir.path())
        .args(["list", "item"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Drill").and(predicate::str::contains("129.99")));
}

#[test]
fn test_add_with_unknown_location_fails() {
    let dir = tempfile::tempdir().unwrap();
    init_workspace(dir.path());

    pbx(dir.path())
        .args(["add", "item", "Chair", "--location", "Atlantis"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Atlantis"));
}

#[test]
fn test_export_preview_import_across_workspaces() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source");
    let dest = dir.path().join("dest");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::create_dir_all(&dest).unwrap();
    init_workspace(&source);
    init_workspace(&dest);

    pbx(&source)
        .args(["add", "item", "Bookshelf"])
        .assert()
        .success();
    pbx(&source)
        .args(["add", "item", "Reading lamp"])
        .assert()
        .success();

    let archive = dir.path().join("export.zip");
    pbx(&source)
        .args(["export", archive.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 items"));
    assert!(archive.is_file());

    pbx(&dest)
        .args(["preview", archive.to_str().unwrap()])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Will import")
                .and(predicate::str::contains("Bookshelf")),
        );

    // Without --yes nothing is committed.
    pbx(&dest)
        .args(["import", archive.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing imported"));
    pbx(&dest)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 items"));

    pbx(&dest)
        .args(["import", archive.to_str().unwrap(), "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported"));
    pbx(&dest)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 items"));
}

#[test]
fn test_import_scope_only_items() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source");
    let dest = dir.path().join("dest");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::create_dir_all(&dest).unwrap();
    init_workspace(&source);
    init_workspace(&dest);

    pbx(&source)
        .args(["add", "home", "Cottage"])
        .assert()
        .success();
    pbx(&source).args(["add", "item", "Kettle"]).assert().success();

    let archive = dir.path().join("export.zip");
    pbx(&source)
        .args(["export", archive.to_str().unwrap()])
        .assert()
        .success();

    pbx(&dest)
        .args([
            "import",
            archive.to_str().unwrap(),
            "--only",
            "items",
            "--yes",
        ])
        .assert()
        .success();

    pbx(&dest)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 homes").and(predicate::str::contains("1 items")));
}

#[test]
fn test_backup_and_restore() {
    let dir = tempfile::tempdir().unwrap();
    init_workspace(dir.path());

    pbx(dir.path()).args(["add", "item", "Piano"]).assert().success();

    let backup = dir.path().join("backup.zip");
    pbx(dir.path())
        .args(["backup", backup.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup written"));

    // Diverge, then restore.
    pbx(dir.path()).args(["add", "item", "Stool"]).assert().success();
    pbx(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 items"));

    // Preview recognizes the snapshot variant.
    pbx(dir.path())
        .args(["preview", backup.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Snapshot backup"));

    // Importing a snapshot is redirected to restore.
    pbx(dir.path())
        .args(["import", backup.to_str().unwrap(), "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("restore"));

    // Without --yes restore only describes what would happen.
    pbx(dir.path())
        .args(["restore", backup.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"));

    pbx(dir.path())
        .args(["restore", backup.to_str().unwrap(), "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Store restored"));
    pbx(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 items"));
}

#[test]
fn test_import_garbage_archive_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    init_workspace(dir.path());

    let junk = dir.path().join("junk.zip");
    std::fs::write(&junk, b"not a zip").unwrap();

    pbx(dir.path())
        .args(["import", junk.to_str().unwrap(), "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("junk.zip"));
}

#[test]
fn test_json_output() {
    let dir = tempfile::tempdir().unwrap();
    init_workspace(dir.path());

    pbx(dir.path())
        .args(["add", "item", "Desk", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\":\"item\""));

    pbx(dir.path())
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"items\": 1"));
}

#[test]
fn test_version() {
    let dir = tempfile::tempdir().unwrap();
    pbx(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pbx"));
}
