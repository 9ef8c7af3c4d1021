//! Integration tests for the roadmap engine against a real data directory.

mod common;

use async_trait::async_trait;
use common::TestEnv;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use keelson::git::{
    CommitContext, DisabledGitAutomation, GitAutomation, GitAutomationResult,
    compose_completion_summary,
};
use keelson::models::domain::{DomainEntity, DomainSnapshot};
use keelson::models::{
    DependencySummary, GateStatus, Milestone, MilestonePatch, RoadmapState, RoadmapStatus,
};
use keelson::roadmap::{RoadmapEngine, SyncOptions, UpdateOptions};
use keelson::storage::WriteMode;
use keelson::Error;

/// Git collaborator that records what the engine asked of it.
#[derive(Default)]
struct RecordingGit {
    commits: Mutex<Vec<String>>,
    summaries: Mutex<Vec<String>>,
}

#[async_trait]
impl GitAutomation for RecordingGit {
    async fn auto_commit_milestone(
        &self,
        milestone: &Milestone,
        context: &CommitContext,
    ) -> GitAutomationResult {
        self.commits
            .lock()
            .unwrap()
            .push(format!("{}:{}", milestone.id, context.reason));
        GitAutomationResult::committed("abc1234")
    }

    async fn generate_completion_summary(
        &self,
        milestone: &Milestone,
        dependency_summary: Option<&DependencySummary>,
    ) -> keelson::Result<String> {
        self.summaries.lock().unwrap().push(milestone.id.clone());
        Ok(compose_completion_summary(milestone, dependency_summary, &[]))
    }
}

/// Git collaborator whose every operation fails.
struct FailingGit;

#[async_trait]
impl GitAutomation for FailingGit {
    async fn auto_commit_milestone(
        &self,
        _milestone: &Milestone,
        _context: &CommitContext,
    ) -> GitAutomationResult {
        GitAutomationResult::failed("git commit exited with status 128")
    }

    async fn generate_completion_summary(
        &self,
        _milestone: &Milestone,
        _dependency_summary: Option<&DependencySummary>,
    ) -> keelson::Result<String> {
        Err(Error::Other("git log exited with status 128".to_string()))
    }
}

fn milestone(id: &str, status: RoadmapStatus, progress: u8, deps: &[&str]) -> Milestone {
    let mut m = Milestone::new(id, format!("Milestone {}", id.to_uppercase()));
    m.status = status;
    m.progress = progress;
    m.dependencies = deps.iter().map(|d| d.to_string()).collect();
    m
}

/// Write milestones straight to disk, the way an external author would.
async fn seed(env: &TestEnv, milestones: Vec<Milestone>) {
    let mut state = RoadmapState::default();
    for m in milestones {
        state.milestones.insert(m.id.clone(), m);
    }
    env.store()
        .write_now(state, WriteMode::WithoutBackup)
        .await
        .unwrap();
}

fn engine(env: &TestEnv) -> RoadmapEngine {
    env.engine(DomainSnapshot::default(), Arc::new(DisabledGitAutomation))
}

fn progress(value: i64) -> MilestonePatch {
    MilestonePatch {
        progress: Some(value),
        ..Default::default()
    }
}

fn status(value: &str) -> MilestonePatch {
    MilestonePatch {
        status: Some(value.to_string()),
        ..Default::default()
    }
}

fn backup_names(env: &TestEnv) -> Vec<String> {
    std::fs::read_dir(env.data_path().join("backups"))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect()
}

// === Update Semantics ===

#[tokio::test]
async fn test_repeated_update_is_idempotent() {
    let env = TestEnv::new();
    seed(&env, vec![milestone("a", RoadmapStatus::Active, 10, &[])]).await;
    let engine = engine(&env);

    let first = engine
        .update_milestone("a", progress(40), UpdateOptions::default())
        .await
        .unwrap();
    assert!(first.changed);
    assert_eq!(first.state.history.len(), 1);

    let second = engine
        .update_milestone("a", progress(40), UpdateOptions::default())
        .await
        .unwrap();
    assert!(!second.changed);
    assert!(second.changes.is_empty());
    assert_eq!(second.state.history.len(), 1);
    assert_eq!(second.state, first.state);
}

#[tokio::test]
async fn test_progress_is_clamped() {
    let env = TestEnv::new();
    seed(&env, vec![milestone("a", RoadmapStatus::Active, 10, &[])]).await;
    let engine = engine(&env);

    let result = engine
        .update_milestone("a", progress(250), UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(result.milestone.progress, 100);

    let result = engine
        .update_milestone("a", progress(-20), UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(result.milestone.progress, 0);
}

#[tokio::test]
async fn test_completed_is_terminal() {
    let env = TestEnv::new();
    seed(&env, vec![milestone("a", RoadmapStatus::Active, 90, &[])]).await;
    let engine = engine(&env);

    engine
        .update_milestone("a", status("completed"), UpdateOptions::default())
        .await
        .unwrap();

    let err = engine
        .update_milestone("a", status("active"), UpdateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid roadmap status transition: completed -> active"
    );

    // Staying completed is allowed and changes nothing
    let same = engine
        .update_milestone("a", status(" Completed "), UpdateOptions::default())
        .await
        .unwrap();
    assert!(!same.changed);
}

#[tokio::test]
async fn test_unknown_status_rejected() {
    let env = TestEnv::new();
    seed(&env, vec![milestone("a", RoadmapStatus::Pending, 0, &[])]).await;
    let engine = engine(&env);

    let err = engine
        .update_milestone("a", status("finished"), UpdateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownStatus(_)));
    assert!(err.to_string().starts_with("Unknown roadmap status"));
    assert!(engine.state().await.unwrap().history.is_empty());
}

#[tokio::test]
async fn test_numeric_ids_resolve() {
    let env = TestEnv::new();
    std::fs::write(
        env.state_path(),
        r#"{"milestones": {"7": {"id": 7, "title": "Seven", "status": "active", "progress": 5}}}"#,
    )
    .unwrap();
    let engine = engine(&env);

    let result = engine
        .update_milestone("7.0", progress(30), UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(result.milestone.id, "7");
    assert_eq!(result.milestone.progress, 30);
}

// === Dependency Gating & Cascade ===

#[tokio::test]
async fn test_dependency_gating_cascades_to_dependent() {
    let env = TestEnv::new();
    seed(
        &env,
        vec![
            milestone("a", RoadmapStatus::Active, 50, &[]),
            milestone("b", RoadmapStatus::Active, 100, &["a"]),
        ],
    )
    .await;
    let engine = engine(&env);

    let result = engine
        .update_milestone("a", progress(80), UpdateOptions::default())
        .await
        .unwrap();

    let b = &result.state.milestones["b"];
    assert_eq!(b.progress, 80);
    let summary = b.dependency_summary.as_ref().unwrap();
    assert_eq!(summary.status, GateStatus::Pending);
    assert_eq!(summary.gating_progress, 80);
    assert_eq!(result.cascade, vec!["b".to_string()]);

    // One history entry carries the direct change and the cascade
    assert_eq!(result.state.history.len(), 1);
    let entry = &result.state.history[0];
    assert_eq!(entry.changes.len(), 2);
    assert!(entry.changes.iter().any(|c| c.id == "b" && c.cascade));
}

#[tokio::test]
async fn test_blocked_dependency_propagates_in_one_call() {
    let env = TestEnv::new();
    seed(
        &env,
        vec![
            milestone("a", RoadmapStatus::Active, 50, &[]),
            milestone("b", RoadmapStatus::Active, 40, &["a"]),
            milestone("c", RoadmapStatus::Pending, 30, &["b"]),
        ],
    )
    .await;
    let engine = engine(&env);

    let result = engine
        .update_milestone("a", status("blocked"), UpdateOptions::default())
        .await
        .unwrap();

    let b = &result.state.milestones["b"];
    assert_eq!(b.status, RoadmapStatus::Blocked);
    assert_eq!(b.progress, 0);
    assert_eq!(
        b.dependency_summary.as_ref().unwrap().status,
        GateStatus::Blocked
    );
    // Transitive dependents settle in the same pass
    assert_eq!(result.state.milestones["c"].status, RoadmapStatus::Blocked);
    assert_eq!(result.cascade, vec!["b".to_string(), "c".to_string()]);
}

#[tokio::test]
async fn test_gate_blocked_dependent_resumes_when_cleared() {
    let env = TestEnv::new();
    let domain = DomainSnapshot {
        tickets: vec![
            DomainEntity::new("t1", "done"),
            DomainEntity::new("t2", "open"),
        ],
        ..Default::default()
    };
    let mut b = milestone("b", RoadmapStatus::Active, 0, &["a"]);
    b.linked_tickets = vec!["t1".into(), "t2".into()];
    seed(&env, vec![milestone("a", RoadmapStatus::Active, 100, &[]), b]).await;
    let engine = env.engine(domain, Arc::new(DisabledGitAutomation));

    engine
        .update_milestone("a", status("blocked"), UpdateOptions::default())
        .await
        .unwrap();
    // Blocking zeroed a's stored progress, so restore it alongside the status
    let resume = MilestonePatch {
        status: Some("active".to_string()),
        progress: Some(100),
        ..Default::default()
    };
    let result = engine
        .update_milestone("a", resume, UpdateOptions::default())
        .await
        .unwrap();

    let b = &result.state.milestones["b"];
    assert_eq!(b.status, RoadmapStatus::Active);
    assert_eq!(b.progress, 50);
}

#[tokio::test]
async fn test_missing_dependency_gates_to_zero() {
    let env = TestEnv::new();
    seed(&env, vec![milestone("b", RoadmapStatus::Active, 60, &["ghost"])]).await;
    let engine = engine(&env);

    let result = engine
        .update_milestone("b", progress(70), UpdateOptions::default())
        .await
        .unwrap();
    let summary = result.milestone.dependency_summary.as_ref().unwrap();
    assert_eq!(result.milestone.progress, 0);
    assert_eq!(summary.missing, 1);
    assert_eq!(summary.status, GateStatus::Pending);
}

#[tokio::test]
async fn test_cyclic_dependencies_terminate() {
    let env = TestEnv::new();
    seed(
        &env,
        vec![
            milestone("a", RoadmapStatus::Active, 50, &["b"]),
            milestone("b", RoadmapStatus::Active, 50, &["a"]),
        ],
    )
    .await;
    let engine = engine(&env);

    let result = engine
        .update_milestone("a", progress(20), UpdateOptions::default())
        .await
        .unwrap();
    assert!(result.changed);
    assert!(result.state.milestones["b"].progress <= 50);
}

// === Git Automation ===

#[tokio::test]
async fn test_git_commit_only_for_manual_completion() {
    let env = TestEnv::new();
    seed(
        &env,
        vec![
            milestone("a", RoadmapStatus::Active, 90, &[]),
            milestone("b", RoadmapStatus::Active, 90, &[]),
            milestone("c", RoadmapStatus::Active, 90, &[]),
        ],
    )
    .await;
    let git = Arc::new(RecordingGit::default());
    let engine = env.engine(DomainSnapshot::default(), git.clone());

    let manual = UpdateOptions {
        reason: "roadmap:manual-edit:dashboard".to_string(),
        actor: Some("ana".to_string()),
        ..Default::default()
    };
    let result = engine
        .update_milestone("a", status("completed"), manual)
        .await
        .unwrap();
    assert!(result.git_automation.as_ref().unwrap().success);
    assert!(result.milestone.completed_at.is_some());
    assert!(result.milestone.completion_summary.as_ref().unwrap().len() >= 20);

    let watcher = UpdateOptions {
        reason: "watcher:sync".to_string(),
        ..Default::default()
    };
    let result = engine
        .update_milestone("b", status("completed"), watcher)
        .await
        .unwrap();
    assert!(result.git_automation.is_none());

    let skipped = UpdateOptions {
        skip_git_automation: true,
        ..UpdateOptions::manual("ana")
    };
    engine
        .update_milestone("c", status("completed"), skipped)
        .await
        .unwrap();

    assert_eq!(
        *git.commits.lock().unwrap(),
        vec!["a:roadmap:manual-edit:dashboard".to_string()]
    );
    // The summary generator runs for every completion
    assert_eq!(git.summaries.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_existing_completion_summary_is_kept() {
    let env = TestEnv::new();
    seed(&env, vec![milestone("a", RoadmapStatus::Active, 90, &[])]).await;
    let git = Arc::new(RecordingGit::default());
    let engine = env.engine(DomainSnapshot::default(), git.clone());

    let patch = MilestonePatch {
        status: Some("completed".to_string()),
        completion_summary: Some("Shipped the storage rewrite end to end".to_string()),
        ..Default::default()
    };
    let result = engine
        .update_milestone("a", patch, UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(
        result.milestone.completion_summary.as_deref(),
        Some("Shipped the storage rewrite end to end")
    );
    assert!(git.summaries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_git_commit_still_completes() {
    let env = TestEnv::new();
    seed(&env, vec![milestone("a", RoadmapStatus::Active, 90, &[])]).await;
    let engine = env.engine(DomainSnapshot::default(), Arc::new(FailingGit));

    let result = engine
        .update_milestone("a", status("completed"), UpdateOptions::manual("ana"))
        .await
        .unwrap();

    let git = result.git_automation.unwrap();
    assert!(!git.success);
    assert_eq!(git.reason.as_deref(), Some("git commit exited with status 128"));
    assert!(git.commit.is_none());
    // Summary generation failed too; the milestone completes without one
    assert!(result.milestone.completion_summary.is_none());

    let on_disk = env.store().load().await.unwrap();
    let a = &on_disk.milestones["a"];
    assert_eq!(a.status, RoadmapStatus::Completed);
    assert!(a.completed_at.is_some());
    assert_eq!(on_disk.history.len(), 1);
    assert_eq!(on_disk.history[0].reason, "roadmap:manual");
    assert_eq!(on_disk.history[0].actor.as_deref(), Some("ana"));
}

// === Storage ===

#[tokio::test]
async fn test_backup_retention_keeps_five() {
    let env = TestEnv::new();
    seed(&env, vec![milestone("a", RoadmapStatus::Active, 0, &[])]).await;
    let engine = engine(&env);

    for value in 1..=7 {
        engine
            .update_milestone("a", progress(value), UpdateOptions::default())
            .await
            .unwrap();
    }

    assert_eq!(backup_names(&env).len(), 5);
    assert_eq!(engine.list_backups().await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_aged_backup_is_compressed_on_next_write() {
    let env = TestEnv::new();
    seed(&env, vec![milestone("a", RoadmapStatus::Active, 0, &[])]).await;
    let engine = engine(&env);

    engine
        .update_milestone("a", progress(10), UpdateOptions::default())
        .await
        .unwrap();
    let old = backup_names(&env).remove(0);
    let old_path = env.data_path().join("backups").join(&old);
    let file = std::fs::File::options().write(true).open(&old_path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(25 * 3600))
        .unwrap();
    drop(file);

    engine
        .update_milestone("a", progress(20), UpdateOptions::default())
        .await
        .unwrap();

    let names = backup_names(&env);
    assert!(!old_path.exists());
    assert!(names.contains(&format!("{}.gz", old)));
    assert_eq!(names.iter().filter(|n| n.ends_with(".gz")).count(), 1);
}

#[tokio::test]
async fn test_rollback_restores_milestones_exactly() {
    let env = TestEnv::new();
    seed(
        &env,
        vec![
            milestone("a", RoadmapStatus::Active, 10, &[]),
            milestone("b", RoadmapStatus::Pending, 0, &["a"]),
        ],
    )
    .await;
    let engine = engine(&env);

    engine
        .update_milestone("a", progress(30), UpdateOptions::default())
        .await
        .unwrap();
    engine
        .update_milestone("a", progress(60), UpdateOptions::default())
        .await
        .unwrap();

    // Most recent backup holds the state before the 60% write
    let backup = engine.list_backups().await.unwrap().remove(0);
    let raw: serde_json::Value = serde_json::from_slice(
        &engine
            .store()
            .backups()
            .read(&backup.filename)
            .await
            .unwrap(),
    )
    .unwrap();

    let restored = engine.rollback(&backup.filename, Some("ana")).await.unwrap();
    assert_eq!(
        serde_json::to_value(&restored.milestones).unwrap(),
        raw["milestones"]
    );
    assert_eq!(restored.milestones["a"].progress, 30);
    assert_eq!(restored.history.len(), 1);

    // Rollback itself is not backed up
    assert_eq!(engine.list_backups().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_unmodelled_milestone_keys_survive_update_and_rollback() {
    let env = TestEnv::new();
    std::fs::write(
        env.state_path(),
        r#"{
            "version": 1,
            "milestones": {
                "a": {
                    "id": "a",
                    "title": "Alpha",
                    "status": "active",
                    "progress": 10,
                    "targetDate": "2026-12-01",
                    "owner": {"team": "storage"}
                }
            }
        }"#,
    )
    .unwrap();
    let engine = engine(&env);

    engine
        .update_milestone("a", progress(30), UpdateOptions::default())
        .await
        .unwrap();
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(env.state_path()).unwrap()).unwrap();
    let a = &raw["milestones"]["a"];
    assert_eq!(a["progress"], 30);
    assert_eq!(a["targetDate"], "2026-12-01");
    assert_eq!(a["owner"]["team"], "storage");

    engine
        .update_milestone("a", progress(60), UpdateOptions::default())
        .await
        .unwrap();
    let backup = engine.list_backups().await.unwrap().remove(0);
    let restored = engine.rollback(&backup.filename, None).await.unwrap();

    let a = &restored.milestones["a"];
    assert_eq!(a.progress, 30);
    assert_eq!(a.extra["targetDate"], "2026-12-01");
    assert_eq!(a.extra["owner"]["team"], "storage");
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(env.state_path()).unwrap()).unwrap();
    assert_eq!(raw["milestones"]["a"]["targetDate"], "2026-12-01");
}

#[tokio::test]
async fn test_rollback_unknown_backup() {
    let env = TestEnv::new();
    let engine = engine(&env);

    let err = engine.rollback("roadmap-state-nope.json", None).await.unwrap_err();
    assert!(matches!(err, Error::BackupNotFound(_)));
}

#[tokio::test]
async fn test_lock_exhaustion_leaves_state_untouched() {
    let env = TestEnv::new();
    seed(&env, vec![milestone("a", RoadmapStatus::Active, 10, &[])]).await;
    let engine = engine(&env);
    let before = std::fs::read_to_string(env.state_path()).unwrap();

    std::fs::write(env.state_path().with_extension("json.lock"), "held").unwrap();
    let err = engine
        .update_milestone("a", progress(50), UpdateOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Failed to acquire roadmap state lock");
    assert_eq!(std::fs::read_to_string(env.state_path()).unwrap(), before);
    assert_eq!(engine.state().await.unwrap().milestones["a"].progress, 10);
}

#[tokio::test]
async fn test_corrupt_state_recovers_to_defaults() {
    let env = TestEnv::new();
    std::fs::write(env.state_path(), "{\"milestones\": [").unwrap();
    let engine = engine(&env);

    let state = engine.state().await.unwrap();
    assert!(state.milestones.is_empty());

    let on_disk = std::fs::read_to_string(env.state_path()).unwrap();
    assert!(serde_json::from_str::<serde_json::Value>(&on_disk).is_ok());
    assert_eq!(backup_names(&env).len(), 1);
}

// === Sync ===

#[tokio::test]
async fn test_sync_rederives_from_domain() {
    let env = TestEnv::new();
    let mut a = milestone("a", RoadmapStatus::Active, 0, &[]);
    a.linked_tickets = vec!["t1".into()];
    a.linked_features = vec!["f1".into()];
    seed(&env, vec![a]).await;

    let domain = DomainSnapshot {
        tickets: vec![DomainEntity::new("t1", "done")],
        features: vec![DomainEntity::new("f1", "in-progress")],
        ..Default::default()
    };
    let engine = env.engine(domain, Arc::new(DisabledGitAutomation));

    let result = engine.sync_now(SyncOptions::default()).await.unwrap();
    assert!(result.changed);
    // 1 of 4 weight complete
    assert_eq!(result.state.milestones["a"].progress, 25);
    assert_eq!(result.state.summary.ticket_count, 1);
    assert_eq!(result.state.history[0].reason, "roadmap:sync");

    let again = engine.sync_now(SyncOptions::default()).await.unwrap();
    assert!(!again.changed);
    assert_eq!(again.state.history.len(), 1);
}

#[tokio::test]
async fn test_debounced_syncs_share_one_write() {
    let env = TestEnv::new();
    let mut a = milestone("a", RoadmapStatus::Active, 0, &[]);
    a.linked_tickets = vec!["t1".into()];
    seed(&env, vec![a]).await;

    let domain = DomainSnapshot {
        tickets: vec![DomainEntity::new("t1", "done")],
        ..Default::default()
    };
    let engine = env.engine(domain, Arc::new(DisabledGitAutomation));

    let (first, second) = tokio::join!(
        engine.sync(SyncOptions::default()),
        engine.sync(SyncOptions::default())
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.state, second.state);
    assert_eq!(first.state.milestones["a"].progress, 100);
    assert_eq!(backup_names(&env).len(), 1);
}

#[tokio::test]
async fn test_debounced_sync_keeps_update_written_while_pending() {
    let env = TestEnv::new();
    let mut b = milestone("b", RoadmapStatus::Active, 0, &[]);
    b.linked_tickets = vec!["t1".into()];
    seed(&env, vec![milestone("a", RoadmapStatus::Active, 10, &[]), b]).await;

    let domain = DomainSnapshot {
        tickets: vec![DomainEntity::new("t1", "done")],
        ..Default::default()
    };
    let engine = env.engine(domain, Arc::new(DisabledGitAutomation));

    // The update lands inside the 50ms debounce window
    let (synced, updated) = tokio::join!(engine.sync(SyncOptions::default()), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        engine
            .update_milestone("a", progress(40), UpdateOptions::default())
            .await
    });
    let (synced, updated) = (synced.unwrap(), updated.unwrap());
    assert!(updated.changed);
    assert!(synced.changed);

    let on_disk = env.store().load().await.unwrap();
    assert_eq!(on_disk.milestones["a"].progress, 40);
    assert_eq!(on_disk.milestones["b"].progress, 100);
    assert_eq!(on_disk.history.len(), 2);
    assert_eq!(engine.state().await.unwrap().milestones, on_disk.milestones);
}

// === Events ===

#[tokio::test]
async fn test_state_sync_event_published() {
    let env = TestEnv::new();
    seed(&env, vec![milestone("a", RoadmapStatus::Active, 10, &[])]).await;
    let engine = engine(&env);
    let mut rx = engine.subscribe();

    let options = UpdateOptions {
        actor: Some("ana".to_string()),
        ..Default::default()
    };
    let result = engine
        .update_milestone("a", progress(45), options)
        .await
        .unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.reason, "roadmap:update");
    assert_eq!(event.actor.as_deref(), Some("ana"));
    assert_eq!(event.state, result.state);
    assert_eq!(event.summary, result.state.history[0].summary);

    let envelope = event.to_envelope();
    assert_eq!(envelope["event"], "state:sync");
    assert_eq!(envelope["payload"]["state"]["milestones"]["a"]["progress"], 45);
}

#[tokio::test]
async fn test_noop_update_publishes_nothing() {
    let env = TestEnv::new();
    seed(&env, vec![milestone("a", RoadmapStatus::Active, 10, &[])]).await;
    let engine = engine(&env);
    let mut rx = engine.subscribe();

    engine
        .update_milestone("a", progress(10), UpdateOptions::default())
        .await
        .unwrap();
    assert!(rx.try_recv().is_err());
}
