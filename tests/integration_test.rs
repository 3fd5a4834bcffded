//! Integration tests for the full session flow
//!
//! These tests drive `SessionManager` against a real SQLite database and
//! check the properties that must hold over any path through a form.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use diagnostic_engine::config::{
    Config, DatabaseConfig, EngineConfig, LogFormat, LoggingConfig, OptionOrder, RequestConfig,
};
use diagnostic_engine::engine::{
    Clock, SessionManager, SessionState, Severity, SubmitOutcome, SubmitRequest,
    TerminationReason,
};
use diagnostic_engine::error::DiagnosticError;
use diagnostic_engine::form::DiagnosticForm;
use diagnostic_engine::storage::SqliteStorage;

/// Clock that only moves when told to.
#[derive(Clone)]
struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Utc::now())))
    }

    fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn create_test_config(db_path: std::path::PathBuf) -> Config {
    Config {
        database: DatabaseConfig {
            path: db_path,
            max_connections: 1,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
        },
        request: RequestConfig {
            timeout_ms: 5000,
            max_retries: 3,
        },
        engine: EngineConfig {
            option_order: OptionOrder::Authored,
            ..EngineConfig::default()
        },
    }
}

fn sample_form() -> DiagnosticForm {
    serde_json::from_str(include_str!("fixtures/multiplication_form.json"))
        .expect("fixture form parses")
}

async fn create_manager() -> (SessionManager, ManualClock) {
    let storage = SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage");
    let clock = ManualClock::new();
    let config = create_test_config(":memory:".into());
    let manager = SessionManager::new(storage, &config).with_clock(Arc::new(clock.clone()));
    manager.register_form(sample_form()).await.unwrap();
    (manager, clock)
}

/// Answer `options` in order, returning every snapshot and the final outcome.
async fn run_path(
    manager: &SessionManager,
    options: &[&str],
) -> (Vec<SessionState>, SubmitOutcome) {
    let start = manager.start("learner-1", "form-mult-01").await.unwrap();
    let id = start.state.session_id.clone();
    let mut snapshots = vec![start.state];
    let mut last = None;

    for option in options {
        let outcome = manager
            .submit(SubmitRequest::new(&id, *option).with_time_spent(30))
            .await
            .unwrap();
        snapshots.push(manager.session(&id).await.unwrap());
        last = Some(outcome);
    }

    (snapshots, last.expect("at least one answer"))
}

/// Every answer sequence through the sample form, found by walking it.
async fn all_paths() -> Vec<Vec<String>> {
    let mut complete = Vec::new();
    let mut frontier: Vec<Vec<String>> = vec![Vec::new()];

    while let Some(prefix) = frontier.pop() {
        for option in ["A", "B", "C", "D"] {
            let (manager, _) = create_manager().await;
            let start = manager.start("learner-1", "form-mult-01").await.unwrap();
            let id = start.state.session_id;

            let mut path = prefix.clone();
            path.push(option.to_string());
            let mut outcome = None;
            let mut valid = true;
            for answer in &path {
                match manager.submit(SubmitRequest::new(&id, answer.as_str())).await {
                    Ok(o) => outcome = Some(o),
                    Err(DiagnosticError::InvalidOption { .. }) => {
                        valid = false;
                        break;
                    }
                    Err(e) => panic!("unexpected error on {:?}: {}", path, e),
                }
            }
            if !valid {
                continue;
            }
            match outcome {
                Some(o) if o.is_terminal() => complete.push(path),
                Some(_) => frontier.push(path),
                None => {}
            }
        }
    }

    complete
}

#[cfg(test)]
mod property_integration {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_invariants_hold_on_every_path() {
        let form = sample_form();
        let paths = all_paths().await;
        assert!(paths.len() >= 8, "expected several paths, got {:?}", paths);

        for path in paths {
            let options: Vec<&str> = path.iter().map(String::as_str).collect();
            let (manager, _) = create_manager().await;
            let (snapshots, outcome) = run_path(&manager, &options).await;
            assert!(outcome.is_terminal(), "{:?} should end the session", path);

            let mut previous: Option<&SessionState> = None;
            for snapshot in &snapshots {
                assert!(snapshot.visited_nodes.len() <= form.max_depth, "{:?}", path);

                let unique: HashSet<&String> = snapshot.visited_nodes.iter().collect();
                assert_eq!(unique.len(), snapshot.visited_nodes.len(), "{:?}", path);

                if let Some(prev) = previous {
                    for (tag, confidence) in &prev.suspected_misconceptions {
                        assert!(
                            snapshot.confidence(tag) >= *confidence,
                            "{} decreased on {:?}",
                            tag,
                            path
                        );
                    }
                    assert_eq!(snapshot.version, prev.version + 1);
                }
                previous = Some(snapshot);
            }

            let result = manager
                .result(&snapshots[0].session_id)
                .await
                .unwrap();
            assert!((0.0..=1.0).contains(&result.confidence_score));
            if result.all_misconceptions.is_empty() {
                assert_eq!(result.severity, Severity::Low, "{:?}", path);
            }
        }
    }

    #[tokio::test]
    async fn test_all_correct_session() {
        let (manager, _) = create_manager().await;
        let (_, outcome) = run_path(&manager, &["A"]).await;

        match outcome {
            SubmitOutcome::Terminal { result, progress, .. } => {
                assert!(result.all_misconceptions.is_empty());
                assert_eq!(result.severity, Severity::Low);
                assert!(result.recommended_interventions.is_empty());
                assert_eq!(progress.completion, 1.0);
            }
            other => panic!("expected terminal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_half_of_distractor_confirmed_by_probe() {
        let (manager, _) = create_manager().await;
        let (snapshots, outcome) = run_path(&manager, &["C", "C"]).await;

        let result = match outcome {
            SubmitOutcome::Terminal { result, .. } => result,
            other => panic!("expected terminal, got {:?}", other),
        };
        assert_eq!(result.primary_misconception.as_deref(), Some("mult-decreases"));
        assert!(result.confidence_score >= 0.65);
        assert!(!result.recommended_interventions.is_empty());
        assert!(matches!(result.severity, Severity::High | Severity::Critical));
        assert_eq!(result.response_path, vec!["item-root", "probe-decreases"]);

        let last = snapshots.last().unwrap();
        assert!(last.is_confirmed("mult-decreases"));
        assert!(last.is_corroborated("mult-decreases"));
    }

    #[tokio::test]
    async fn test_additive_distractor_without_probe() {
        let (manager, _) = create_manager().await;
        let (_, outcome) = run_path(&manager, &["D"]).await;

        let result = match outcome {
            SubmitOutcome::Terminal { result, .. } => result,
            other => panic!("expected terminal, got {:?}", other),
        };
        assert!(result.primary_misconception.is_none());
        assert_eq!(result.severity, Severity::Medium);
        assert_eq!(result.termination, TerminationReason::EndOfPath);
        assert!(result.all_misconceptions.contains_key("add-instead-of-multiply"));
    }
}

#[cfg(test)]
mod idempotence_integration {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_retry_of_applied_answer_is_not_double_counted() {
        let (manager, _) = create_manager().await;
        let start = manager.start("learner-1", "form-mult-01").await.unwrap();
        let id = start.state.session_id;

        let request = SubmitRequest::new(&id, "B").for_node("item-root");
        manager.submit(request.clone()).await.unwrap();
        let after_first = manager.session(&id).await.unwrap();

        for _ in 0..3 {
            let outcome = manager.submit(request.clone()).await.unwrap();
            match outcome {
                SubmitOutcome::Continue { next_node, replayed, .. } => {
                    assert!(replayed);
                    assert_eq!(next_node.node_id, "probe-bigger");
                }
                other => panic!("expected replay, got {:?}", other),
            }
        }

        assert_eq!(manager.session(&id).await.unwrap(), after_first);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_commit_once() {
        let (manager, _) = create_manager().await;
        let manager = Arc::new(manager);
        let start = manager.start("learner-1", "form-mult-01").await.unwrap();
        let id = start.state.session_id;

        let mut handles = Vec::new();
        for _ in 0..6 {
            let manager = Arc::clone(&manager);
            let request = SubmitRequest::new(&id, "C").for_node("item-root");
            handles.push(tokio::spawn(async move { manager.submit(request).await }));
        }

        let mut fresh = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                SubmitOutcome::Continue { replayed, next_node, .. } => {
                    assert_eq!(next_node.node_id, "probe-decreases");
                    if !replayed {
                        fresh += 1;
                    }
                }
                other => panic!("expected continue, got {:?}", other),
            }
        }
        assert_eq!(fresh, 1);

        let state = manager.session(&id).await.unwrap();
        assert_eq!(state.steps.len(), 1);
        assert_eq!(state.version, 1);
        assert!((state.confidence("mult-decreases") - 0.4).abs() < 1e-9);
    }
}

#[cfg(test)]
mod lifecycle_integration {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_completed_session_rejects_answers() {
        let (manager, _) = create_manager().await;
        let (snapshots, _) = run_path(&manager, &["A"]).await;
        let done = snapshots.last().unwrap().clone();

        let err = manager
            .submit(SubmitRequest::new(&done.session_id, "B"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SessionAlreadyComplete");
        assert_eq!(manager.session(&done.session_id).await.unwrap(), done);
    }

    #[tokio::test]
    async fn test_unknown_option_leaves_session_untouched() {
        let (manager, _) = create_manager().await;
        let start = manager.start("learner-1", "form-mult-01").await.unwrap();

        let err = manager
            .submit(SubmitRequest::new(&start.state.session_id, "E"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "InvalidOption");
        assert_eq!(
            manager.session(&start.state.session_id).await.unwrap(),
            start.state
        );
    }

    #[tokio::test]
    async fn test_expired_session_gets_result() {
        let (manager, clock) = create_manager().await;
        let start = manager.start("learner-1", "form-mult-01").await.unwrap();
        let id = start.state.session_id;
        manager
            .submit(SubmitRequest::new(&id, "B"))
            .await
            .unwrap();

        clock.advance(Duration::minutes(30));
        let expired = manager.expire_inactive(clock.now()).await.unwrap();
        assert_eq!(expired, vec![id.clone()]);

        let result = manager.result(&id).await.unwrap();
        assert_eq!(result.termination, TerminationReason::Expired);
        assert!(result.confidence_score <= 0.3);
        assert!(result.teacher_summary.contains("expired"));

        // A second sweep has nothing left to do.
        assert!(manager.expire_inactive(clock.now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sessions_survive_restart() {
        let dir = tempdir().unwrap();
        let config = create_test_config(dir.path().join("diagnostic.db"));
        let clock = ManualClock::new();

        let id = {
            let storage = SqliteStorage::new(&config.database).await.unwrap();
            let manager =
                SessionManager::new(storage, &config).with_clock(Arc::new(clock.clone()));
            manager.register_form(sample_form()).await.unwrap();
            let start = manager.start("learner-1", "form-mult-01").await.unwrap();
            manager
                .submit(SubmitRequest::new(&start.state.session_id, "C"))
                .await
                .unwrap();
            start.state.session_id
        };

        let storage = SqliteStorage::new(&config.database).await.unwrap();
        let manager = SessionManager::new(storage, &config).with_clock(Arc::new(clock));
        let node = manager.current_node(&id).await.unwrap().unwrap();
        assert_eq!(node.node_id, "probe-decreases");

        let outcome = manager
            .submit(SubmitRequest::new(&id, "C"))
            .await
            .unwrap();
        assert!(outcome.is_terminal());
    }
}
