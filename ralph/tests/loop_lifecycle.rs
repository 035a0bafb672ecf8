//! End-to-end loop over a real vault: claim, create, iterate, archive, and
//! the health views that follow from it.

use std::fs;

use ralph::core::selector::ClaimFilter;
use ralph::core::state::ContinueReason;
use ralph::core::types::{GroupStrategy, HealthStatus, MetricsRange, TaskStatus};
use ralph::states::CreateRequest;
use ralph::test_support::TestVault;

#[test]
fn claimed_task_runs_out_of_iterations_and_archives() {
    let vault = TestVault::new();
    let task = vault.write_task("T1.md", &["type: email", "priority: high"], "Invoice #12\n");
    let ralph = vault.ralph();

    let claimed = ralph
        .claim_next(&ClaimFilter::default())
        .expect("claim")
        .expect("a pending task");
    assert_eq!(claimed.path, task);

    let state = ralph
        .create_state(CreateRequest {
            path: claimed.path,
            prompt: "send invoice".to_string(),
            max_iterations: Some(3),
            strategy: None,
        })
        .expect("create");
    let id = state.task_id.clone();
    assert_eq!(state.current_iteration, 1);

    ralph.states.increment_iteration(&id).expect("increment 1");
    let state = ralph.states.increment_iteration(&id).expect("increment 2");
    assert_eq!(state.current_iteration, 3);

    let check = ralph.states.should_continue(&id).expect("should_continue");
    assert!(!check.continuation.should_continue);
    assert_eq!(check.continuation.reason, ContinueReason::MaxIterationsReached);

    let stuck = ralph.health.get_stuck_tasks().expect("stuck");
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].task_id, id);
    assert_eq!(ralph.health.get_health().expect("health").status, HealthStatus::Warning);

    ralph.states.archive(&id).expect("archive");
    assert!(ralph.health.get_stuck_tasks().expect("stuck").is_empty());
    assert_eq!(ralph.health.get_health().expect("health").status, HealthStatus::Healthy);

    let metrics = ralph
        .health
        .get_performance_metrics(MetricsRange::All)
        .expect("metrics");
    assert_eq!(metrics.total_archived, 1);
    assert_eq!(metrics.avg_iterations, 3.0);
    assert_eq!(metrics.success_rate, 0.0);
}

#[test]
fn file_movement_completes_and_counts_as_success() {
    let vault = TestVault::new();
    vault.write_task("INV.md", &["type: invoice"], "");
    let ralph = vault.ralph();
    let id = ralph
        .create_state(CreateRequest {
            path: "INV.md".into(),
            prompt: "file invoice".to_string(),
            max_iterations: None,
            strategy: None,
        })
        .expect("create")
        .task_id;

    ralph
        .states
        .update_progress(&id, TaskStatus::InProgress, Some("drafted".to_string()))
        .expect("update");
    fs::rename(
        vault.paths.inbox_dir.join("INV.md"),
        vault.paths.done_dir.join("INV.md"),
    )
    .expect("move to done");

    let check = ralph.states.check_completion(&id).expect("completion");
    assert!(check.completion.complete);
    assert_eq!(
        ralph.states.should_continue(&id).expect("continue").continuation.reason,
        ContinueReason::Complete
    );

    let outcome = ralph.states.archive(&id).expect("archive");
    assert_eq!(outcome.status, TaskStatus::Complete);
    let metrics = ralph
        .health
        .get_performance_metrics(MetricsRange::Today)
        .expect("metrics");
    assert_eq!(metrics.completed, 1);
    assert_eq!(metrics.success_rate, 1.0);
}

#[test]
fn three_stuck_tasks_are_critical() {
    let vault = TestVault::new();
    let ralph = vault.ralph();
    for name in ["A.md", "B.md", "C.md"] {
        vault.write_task(name, &["type: email"], "");
        let id = ralph
            .create_state(CreateRequest {
                path: name.into(),
                prompt: String::new(),
                max_iterations: Some(5),
                strategy: None,
            })
            .expect("create")
            .task_id;
        ralph
            .states
            .update_progress(&id, TaskStatus::Blocked, Some("needs input".to_string()))
            .expect("block");
    }

    let report = ralph.health.get_health().expect("health");
    assert_eq!(report.status, HealthStatus::Critical);
    assert_eq!(report.blocked_count, 3);
}

#[test]
fn groups_report_member_progress() {
    let vault = TestVault::new();
    let ralph = vault.ralph();
    let mut ids = Vec::new();
    for name in ["G1.md", "G2.md"] {
        vault.write_task(name, &["type: linkedin_post"], "");
        ids.push(
            ralph
                .create_state(CreateRequest {
                    path: name.into(),
                    prompt: String::new(),
                    max_iterations: Some(4),
                    strategy: None,
                })
                .expect("create")
                .task_id,
        );
    }
    ralph.states.increment_iteration(&ids[1]).expect("increment");

    let group = ralph
        .groups
        .create_group(ids.clone(), "weekly posts", GroupStrategy::Sequential)
        .expect("group");
    let report = ralph.groups.process_group(&group.group_id).expect("process");
    let iterations: Vec<Option<u32>> = report.members.iter().map(|m| m.current_iteration).collect();
    assert_eq!(iterations, vec![Some(1), Some(2)]);
    assert_eq!(report.summary["in_progress"], 2);
}
