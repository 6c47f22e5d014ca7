use assert_cmd::Command;
use devmentor_testkit::closed_port;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn personas_lists_the_five_mentors() {
    let workspace = TempDir::new().expect("workspace");
    let out = run_json(workspace.path(), &["--json", "personas"]);
    let personas = out.as_array().expect("array");
    assert_eq!(personas.len(), 5);
    assert_eq!(personas[0]["key"], "algo_interviewer");
    assert_eq!(personas[0]["port"], 8001);
    assert_eq!(personas[4]["key"], "soft_skills_coach");
    assert_eq!(personas[4]["port"], 8005);
}

#[test]
fn tool_runs_search_docs_in_process() {
    let workspace = TempDir::new().expect("workspace");
    let out = run_json(
        workspace.path(),
        &[
            "--json",
            "tool",
            "search_docs",
            "--args",
            r#"{"query":"big o notation"}"#,
        ],
    );
    assert_eq!(out["tool"], "search_docs");
    assert_eq!(out["remote"], false);
    let text = out["output"].as_str().expect("output");
    assert!(text.starts_with("📚 Results for 'big o notation':"));
}

#[test]
fn tool_generates_a_quiz_skeleton() {
    let workspace = TempDir::new().expect("workspace");
    let out = run_json(
        workspace.path(),
        &[
            "--json",
            "tool",
            "generate_quiz_json",
            "--args",
            r#"{"topic":"binary search","difficulty":"Hard","num_questions":2}"#,
        ],
    );
    let quiz: Value =
        serde_json::from_str(out["output"].as_str().expect("output")).expect("quiz json");
    assert_eq!(quiz["meta"]["topic"], "binary search");
    assert_eq!(quiz["meta"]["difficulty"], "Hard");
    assert_eq!(quiz["questions"].as_array().map(Vec::len), Some(2));
}

#[test]
fn tool_reads_a_file_snippet() {
    let workspace = TempDir::new().expect("workspace");
    let file = workspace.path().join("solution.py");
    fs::write(&file, "def a():\n    pass\n\ndef b():\n    return 1\n").expect("fixture");
    let args = json!({"file_path": file.to_string_lossy(), "start_line": 4, "end_line": 5});
    let out = run_json(
        workspace.path(),
        &["--json", "tool", "read_file_snippet", "--args", &args.to_string()],
    );
    let text = out["output"].as_str().expect("output");
    assert!(text.contains("(lines 4-5 of 5)"));
    assert!(text.contains("return 1"));
}

#[test]
fn tool_rejects_unknown_names_and_bad_arguments() {
    let workspace = TempDir::new().expect("workspace");
    write_settings(workspace.path(), json!({}));

    let unknown = command(workspace.path())
        .args(["tool", "draw_diagram"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&unknown).contains("unknown tool: draw_diagram"));

    let malformed = command(workspace.path())
        .args(["tool", "search_docs", "--args", "[1]"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&malformed).contains("Invalid Tool Arguments"));
}

#[test]
fn diagnose_reports_closed_listeners() {
    let workspace = TempDir::new().expect("workspace");
    let tool_port = closed_port();
    let coordinator_port = closed_port();
    write_settings(
        workspace.path(),
        json!({
            "network": {
                "host": "127.0.0.1",
                "tool_server_port": tool_port,
                "coordinator_port": coordinator_port
            },
            "diagnostics": {"port_timeout_ms": 300, "endpoint_timeout_ms": 300}
        }),
    );
    let out = run_json_in(workspace.path(), &["--json", "diagnose", "--tools"]);

    assert_eq!(out["summary"]["total"], 6);
    let servers = out["servers"].as_object().expect("servers");
    assert_eq!(servers.len(), 6);
    assert!(servers.contains_key("concept_tutor"));
    assert_eq!(servers["coordinator"]["port"], coordinator_port);
    assert_eq!(servers["coordinator"]["overall_status"], "port_closed");
    assert_eq!(servers["coordinator"]["port_open"], false);

    assert_eq!(out["tool_server"]["port"], tool_port);
    assert_eq!(out["tool_server"]["overall_status"], "port_closed");
    assert!(out["tool_server"]["note"].is_string());
}

#[test]
fn config_redacts_the_api_key() {
    let workspace = TempDir::new().expect("workspace");
    write_settings(
        workspace.path(),
        json!({
            "llm": {"api_key": "sk-or-v1-secret-value", "model": "openai/gpt-4o"},
            "router": {"default_persona": "concept_tutor"}
        }),
    );
    let out = run_json_in(workspace.path(), &["--json", "config"]);
    assert_eq!(out["llm"]["api_key"], "***REDACTED***");
    assert_eq!(out["llm"]["model"], "openai/gpt-4o");
    assert_eq!(out["router"]["default_persona"], "concept_tutor");
    assert_eq!(out["network"]["coordinator_port"], 8000);
}

#[test]
fn ask_rejects_unknown_personas_without_contacting_a_backend() {
    let workspace = TempDir::new().expect("workspace");
    write_settings(
        workspace.path(),
        json!({"router": {"unknown_persona": "reject"}}),
    );
    let out = run_json_in(workspace.path(), &["--json", "ask", "rust_guru", "hello"]);
    assert_eq!(out["ok"], false);
    let reply = out["reply"].as_str().expect("reply");
    assert!(reply.starts_with("❌ Unknown persona 'rust_guru'"));
    assert!(reply.contains("algo_interviewer"));
}

#[test]
fn dispatch_via_closed_coordinator_reports_failure() {
    let workspace = TempDir::new().expect("workspace");
    write_settings(
        workspace.path(),
        json!({
            "network": {"host": "127.0.0.1", "coordinator_port": closed_port()},
            "router": {"request_timeout_seconds": 2}
        }),
    );
    let out = run_json_in(
        workspace.path(),
        &["--json", "dispatch", "--via-coordinator", "code_reviewer:look at this"],
    );
    assert_eq!(out["target"], "coordinator");
    assert_eq!(out["ok"], false);
    assert!(
        out["reply"]
            .as_str()
            .is_some_and(|reply| reply.starts_with("❌ Error communicating with the coordinator"))
    );
}

#[test]
fn chat_handles_slash_commands_without_servers() {
    let workspace = TempDir::new().expect("workspace");
    write_settings(workspace.path(), json!({}));
    let output = command(workspace.path())
        .args(["chat", "--persona", "concept_tutor"])
        .write_stdin("/personas\n/persona rust_guru\n/persona code_reviewer\n/history\n/exit\n")
        .assert()
        .success()
        .get_output()
        .clone();
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(stdout.contains("mentor=concept_tutor port=8003 turns=0 route=direct"));
    assert!(stdout.contains("* concept_tutor"));
    assert!(stderr.contains("Unknown Persona"));
    assert!(stdout.contains("mentor=code_reviewer port=8004"));
    assert!(stdout.contains("(no messages yet)"));
}

#[test]
fn chat_refuses_an_unknown_starting_persona() {
    let workspace = TempDir::new().expect("workspace");
    write_settings(workspace.path(), json!({}));
    let stderr = command(workspace.path())
        .args(["chat", "--persona", "rust_guru"])
        .write_stdin("/exit\n")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&stderr).contains("'rust_guru' is not a registered persona"));
}

#[test]
fn completions_emit_a_script() {
    let workspace = TempDir::new().expect("workspace");
    write_settings(workspace.path(), json!({}));
    let stdout = command(workspace.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&stdout).contains("devmentor"));
}

fn command(workspace: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("devmentor"));
    cmd.current_dir(workspace)
        .env("HOME", workspace)
        .env_remove("DEVMENTOR_LOG");
    cmd
}

fn write_settings(workspace: &Path, overrides: Value) {
    let runtime = workspace.join(".devmentor");
    fs::create_dir_all(&runtime).expect("runtime dir");
    let mut settings = json!({"logging": {"level": "error", "ansi": false}});
    if let (Some(base), Some(extra)) = (settings.as_object_mut(), overrides.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    fs::write(runtime.join("settings.local.json"), settings.to_string()).expect("settings");
}

fn run_json(workspace: &Path, args: &[&str]) -> Value {
    write_settings(workspace, json!({}));
    run_json_in(workspace, args)
}

fn run_json_in(workspace: &Path, args: &[&str]) -> Value {
    let output = command(workspace)
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("json output")
}
