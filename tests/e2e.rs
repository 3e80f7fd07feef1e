use std::process::Command;

fn run(args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_stitch-admin"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn quote_complete_draft() {
    let (stdout, stderr, success) = run(&[
        "quote",
        "tests/fixtures/catalog.csv",
        "tests/fixtures/items.csv",
        "--extra",
        "100",
        "--discount",
        "10",
    ]);

    assert!(success);
    assert!(stderr.is_empty());

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines[0],
        "items,base_total,extra_charges,discount,before_discount,after_discount,status"
    );
    assert_eq!(lines[1], "2,1000.00,100.00,10,1100.00,990.00,ready");
}

#[test]
fn errors_warn_but_do_not_block() {
    let (stdout, stderr, success) = run(&[
        "quote",
        "tests/fixtures/catalog.csv",
        "tests/fixtures/items_with_errors.csv",
    ]);

    assert!(success);
    assert!(stderr.contains("dress d9 is not in the catalog"));
    assert!(stderr.contains("missing dress"));

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines[1],
        "1,500.00,0.00,,500.00,500.00,please upload an image for Kurti (item 1)"
    );
}

#[test]
fn missing_catalog_fails() {
    let (stdout, stderr, success) = run(&[
        "quote",
        "tests/fixtures/nope.csv",
        "tests/fixtures/items.csv",
    ]);

    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("cannot open"));
}

#[test]
fn whoami_without_session() {
    let dir = tempfile::tempdir().unwrap();
    let storage = dir.path().to_str().unwrap();
    let (stdout, _, success) = run(&["--storage-dir", storage, "whoami"]);

    assert!(success);
    assert_eq!(stdout.trim(), "not logged in");
}

#[test]
fn submit_with_bad_rows_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let storage = dir.path().to_str().unwrap();
    // nothing listens on the discard port; reaching the network would fail
    // with a connection error instead
    let (stdout, stderr, success) = run(&[
        "--api-url",
        "http://127.0.0.1:9",
        "--storage-dir",
        storage,
        "submit",
        "--customer",
        "9123456780",
        "tests/fixtures/items_with_errors.csv",
    ]);

    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("missing dress"));
    assert!(stderr.contains("nothing was submitted"));
    assert!(!stderr.contains("connection failed"));
}
