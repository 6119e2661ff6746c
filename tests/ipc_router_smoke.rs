use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_quizbookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn quizbookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let value = read_response(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn error_code(resp: &serde_json::Value) -> &str {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("quizbook-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], true);
    assert!(health["result"]["workspacePath"].is_null());

    let early = request(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "X" }));
    assert_eq!(early["ok"], false);
    assert_eq!(error_code(&early), "no_workspace");

    let sel = request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(sel["ok"], true);
    assert!(workspace.join("quizbook.sqlite3").is_file());

    let families = [
        ("settings.get", json!({})),
        ("scales.list", json!({})),
        ("grades.classify", json!({ "percentage": 85 })),
        ("classes.get", json!({ "classId": "missing" })),
        ("quizzes.questions", json!({ "quizId": "missing" })),
        ("analytics.class", json!({ "classId": "missing" })),
        ("gradebook.export", json!({ "classId": "missing" })),
    ];
    for (i, (method, params)) in families.iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("f{}", i), method, params.clone());
        assert_ne!(error_code(&resp), "not_implemented", "{} not routed", method);
    }

    let unknown = request(&mut stdin, &mut reader, "4", "nope.method", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let bad = read_response(&mut reader);
    assert_eq!(bad["ok"], false);
    assert_eq!(bad["error"]["code"], "bad_json");

    // Still serving after a malformed line.
    let again = request(&mut stdin, &mut reader, "5", "health", json!({}));
    assert_eq!(again["ok"], true);
    assert!(again["result"]["workspacePath"].is_string());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn classify_uses_builtin_scales_without_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let list = request(&mut stdin, &mut reader, "1", "scales.list", json!({}));
    let keys: Vec<&str> = list["result"]["scales"]
        .as_array()
        .expect("scales")
        .iter()
        .filter_map(|s| s["key"].as_str())
        .collect();
    assert_eq!(keys, vec!["traditional", "plusMinus", "passFail", "excellence"]);

    let b = request(
        &mut stdin,
        &mut reader,
        "2",
        "grades.classify",
        json!({ "percentage": 85 }),
    );
    assert_eq!(b["result"]["verdict"]["grade"]["label"], "B");
    assert_eq!(b["result"]["verdict"]["passed"], true);

    let pf = request(
        &mut stdin,
        &mut reader,
        "3",
        "grades.classify",
        json!({ "percentage": 69.5, "scale": "passFail", "passingGrade": 70 }),
    );
    assert_eq!(pf["result"]["verdict"]["percentage"], 70);
    assert_eq!(pf["result"]["verdict"]["passed"], true);

    let unknown = request(
        &mut stdin,
        &mut reader,
        "4",
        "grades.classify",
        json!({ "percentage": 50, "scale": "nonsense" }),
    );
    assert_eq!(error_code(&unknown), "invalid_scale");

    let overlap = request(
        &mut stdin,
        &mut reader,
        "5",
        "scales.validate",
        json!({ "scale": {
            "name": "Overlap",
            "bands": [
                { "label": "Hi", "min": 50, "max": 100 },
                { "label": "Mid", "min": 40, "max": 60 }
            ]
        }}),
    );
    assert_eq!(overlap["ok"], true);
    assert!(!overlap["result"]["warnings"].as_array().expect("warnings").is_empty());
    assert_eq!(overlap["result"]["uncoveredRanges"][0]["min"], 0);
    assert_eq!(overlap["result"]["uncoveredRanges"][0]["max"], 39);

    drop(stdin);
    let _ = child.wait();
}
