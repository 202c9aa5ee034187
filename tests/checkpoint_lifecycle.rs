use failsafe::core::checkpoint::{DriftSource, GitState, RESUME_SESSION};
use failsafe::core::config::FailsafeConfig;
use failsafe::core::ledger::{AuditLedger, JsonlLedger, LedgerEventType};
use failsafe::core::store::Store;
use failsafe::plugins::checkpoint::CheckpointManager;
use failsafe::plugins::lifecycle::LifecycleState;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("run git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn init_repo() -> TempDir {
    let tmp = TempDir::new().expect("tempdir");
    let dir = tmp.path();
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.email", "test@test.com"]);
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "commit.gpgsign", "false"]);

    std::fs::write(dir.join(".gitignore"), ".agent/\n.failsafe/\n").expect("write gitignore");
    std::fs::create_dir_all(dir.join("src")).expect("mkdir src");
    std::fs::write(dir.join("src/lib.rs"), "pub fn answer() -> u32 { 42 }\n").expect("write lib");
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", "init"]);
    tmp
}

fn commit_file(dir: &Path, rel: &str, content: &str, message: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(&path, content).expect("write file");
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", message]);
}

fn manager(dir: &Path) -> (CheckpointManager, Arc<JsonlLedger>) {
    let store = Store::with_config(dir, FailsafeConfig::default());
    let ledger = Arc::new(JsonlLedger::new(&store.ledger_path()));
    let shared: Arc<dyn AuditLedger> = ledger.clone();
    (CheckpointManager::new(&store, Some(shared)), ledger)
}

fn event_types(ledger: &JsonlLedger) -> Vec<LedgerEventType> {
    ledger
        .records()
        .expect("ledger readable")
        .into_iter()
        .map(|r| r.entry.event_type)
        .collect()
}

#[test]
fn pause_resume_reports_third_party_drift() {
    let repo = init_repo();
    let dir = repo.path();
    let (mgr, ledger) = manager(dir);

    let paused = mgr.pause("trying an ungoverned codegen skill").expect("pause");
    assert_eq!(mgr.state(), LifecycleState::Paused);
    assert_eq!(paused.snapshot.git_head, Some(git(dir, &["rev-parse", "HEAD"])));
    assert_eq!(paused.snapshot.git_status, GitState::Clean);

    commit_file(dir, "src/auth/login.rs", "pub fn login() {}\n", "skill: add login");

    let report = mgr.resume().expect("resume");
    assert!(report.detected);
    assert_eq!(report.git_commits, 1);
    assert_eq!(report.files_changed, vec!["src/auth/login.rs".to_string()]);
    assert_eq!(report.classification.l3, 1);
    assert_eq!(report.source, DriftSource::ThirdPartySkill);
    assert_eq!(report.manifold_delta["src"].file_count_delta, 1);

    assert_eq!(mgr.state(), LifecycleState::Active);
    let current = mgr.load().expect("resume checkpoint");
    assert!(current.is_sealed());
    assert_eq!(current.meta.paused, Some(false));
    assert_eq!(current.meta.skill_session.as_deref(), Some(RESUME_SESSION));
    assert_eq!(current.snapshot.git_head, Some(git(dir, &["rev-parse", "HEAD"])));

    let archives = mgr.persistence().list_archives().expect("archives");
    assert_eq!(archives.len(), 1);
    assert_eq!(archives[0].checkpoint, paused);

    assert_eq!(
        event_types(&ledger),
        vec![
            LedgerEventType::GovernancePaused,
            LedgerEventType::GovernanceResumed,
            LedgerEventType::ExternalDrift,
        ]
    );
    let records = ledger.records().expect("records");
    assert_eq!(records[1].entry.payload["files_changed"], 1);
    assert_eq!(records[2].entry.payload["source"], "third_party_skill");
    assert_eq!(ledger.verify_chain().expect("verify"), None);

    // Already active: no archive, no ledger write.
    let again = mgr.resume().expect("second resume");
    assert!(!again.detected);
    assert_eq!(again.duration_ms, 0);
    assert_eq!(mgr.persistence().list_archives().expect("archives").len(), 1);
    assert_eq!(ledger.records().expect("records").len(), 3);
}

#[test]
fn quiet_pause_resume_records_no_drift_entry() {
    let repo = init_repo();
    let (mgr, ledger) = manager(repo.path());

    mgr.pause("reading docs").expect("pause");
    let report = mgr.resume().expect("resume");
    assert!(!report.detected);
    assert!(report.files_changed.is_empty());
    assert_eq!(
        event_types(&ledger),
        vec![LedgerEventType::GovernancePaused, LedgerEventType::GovernanceResumed]
    );
}

#[test]
fn interrupted_ledger_write_does_not_wedge_the_lifecycle() {
    let repo = init_repo();
    let (mgr, ledger) = manager(repo.path());
    mgr.pause("first session").expect("pause");

    // A crash mid-append leaves a fragment with no newline.
    let mut content = std::fs::read_to_string(ledger.path()).expect("ledger");
    content.push_str("{\"id\":\"01J");
    std::fs::write(ledger.path(), content).expect("tear ledger");

    // A new process starts with no cached chain head.
    let (mgr, ledger) = manager(repo.path());
    mgr.resume().expect("resume after torn write");
    assert_eq!(mgr.state(), LifecycleState::Active);
    mgr.pause("second session").expect("pause again");

    assert_eq!(
        event_types(&ledger),
        vec![
            LedgerEventType::GovernancePaused,
            LedgerEventType::GovernanceResumed,
            LedgerEventType::GovernancePaused,
        ]
    );
    assert_eq!(ledger.verify_chain().expect("verify"), None);
}

#[test]
fn validate_uses_sealed_baseline_only() {
    let repo = init_repo();
    let dir = repo.path();
    let (mgr, ledger) = manager(dir);

    mgr.create("implement").expect("create");
    commit_file(dir, "src/api/users.rs", "pub fn list() {}\n", "add users api");
    // Unsealed work in progress is not a baseline.
    assert!(!mgr.validate().detected);

    let sealed = mgr.seal().expect("seal").expect("something to seal");
    let head = git(dir, &["rev-parse", "HEAD"]);
    assert_eq!(sealed.snapshot.git_head, Some(head.clone()));

    let records = ledger.records().expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entry.event_type, LedgerEventType::CheckpointCreated);
    assert_eq!(records[0].entry.agent_did, "implement");
    assert_eq!(records[0].entry.payload["git_head"], head);
    assert_eq!(records[0].entry.payload["manifold_summary"]["src"], 2);

    commit_file(dir, "src/payments/handler.rs", "pub fn pay() {}\n", "add handler");
    let report = mgr.validate();
    assert!(report.detected);
    assert_eq!(report.git_commits, 1);
    assert_eq!(report.classification.l2, 1);
    assert_eq!(report.source, DriftSource::Unknown);
}

#[test]
fn dirty_workspace_is_captured_as_dirty() {
    let repo = init_repo();
    let dir = repo.path();
    std::fs::write(dir.join("src/lib.rs"), "pub fn answer() -> u32 { 7 }\n").expect("edit");
    let (mgr, _ledger) = manager(dir);
    let cp = mgr.create("wip").expect("create");
    assert_eq!(cp.snapshot.git_status, GitState::Dirty);
}

#[test]
fn non_repository_degrades_snapshot() {
    let tmp = TempDir::new().expect("tempdir");
    let (mgr, _ledger) = manager(tmp.path());
    let cp = mgr.create("outside").expect("create");
    assert_eq!(cp.snapshot.git_head, None);
    assert_eq!(cp.snapshot.git_status, GitState::Unknown);
}

#[test]
fn cli_pause_status_resume_round_trip() {
    let repo = init_repo();
    let dir = repo.path();
    let bin = env!("CARGO_BIN_EXE_failsafe");

    let pause = Command::new(bin)
        .args(["checkpoint", "pause", "--reason", "manual session", "--format", "json"])
        .current_dir(dir)
        .output()
        .expect("failsafe pause");
    assert!(pause.status.success(), "pause failed: {}", String::from_utf8_lossy(&pause.stderr));

    let status = Command::new(bin)
        .args(["--format", "json", "checkpoint", "status"])
        .current_dir(dir)
        .output()
        .expect("failsafe status");
    assert!(status.status.success());
    let view: serde_json::Value = serde_json::from_slice(&status.stdout).expect("status json");
    assert_eq!(view["state"], "paused");
    assert_eq!(view["checkpoint"]["checkpoint"]["pause_reason"], "manual session");

    let resume = Command::new(bin)
        .args(["checkpoint", "resume", "--root"])
        .arg(dir)
        .arg("--format")
        .arg("json")
        .output()
        .expect("failsafe resume");
    assert!(resume.status.success());
    let report: serde_json::Value = serde_json::from_slice(&resume.stdout).expect("drift json");
    assert_eq!(report["detected"], false);

    let history = Command::new(bin)
        .args(["checkpoint", "history", "--format", "json"])
        .current_dir(dir)
        .output()
        .expect("failsafe history");
    let archives: serde_json::Value =
        serde_json::from_slice(&history.stdout).expect("history json");
    assert_eq!(archives.as_array().map(Vec::len), Some(1));
    assert_eq!(archives[0]["paused"], true);
}
