//! Worker selection and the crash/cooldown state machine.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stylist_runtime::{LintParams, WorkerHealth, WorkerProcess, WorkerRegistry};
use stylist_types::{
    EnvironmentKey, LintOptions, LintOutcome, PnpConfiguration, RunnerOptions, WorkerContext,
    WorkerError,
};

use crate::common::{Behavior, FakeFactory, config};

fn context(workspace: &str, root: &str, key: &str) -> WorkerContext {
    WorkerContext::new(workspace, root).with_environment_key(Some(EnvironmentKey::new(key)))
}

async fn lint(
    registry: &WorkerRegistry,
    context: &WorkerContext,
) -> Result<Option<LintOutcome>, WorkerError> {
    let params = LintParams {
        options: LintOptions::new("a { color: red; }", None),
        runner_options: RunnerOptions::default(),
        global_modules_path: None,
    };
    registry
        .run_with_worker(context, move |worker: Arc<dyn WorkerProcess>| async move {
            worker.lint(params).await
        })
        .await
}

fn registry(factory: &Arc<FakeFactory>) -> WorkerRegistry {
    WorkerRegistry::new(factory.clone(), &config())
}

#[tokio::test]
async fn unchanged_context_reuses_one_worker() {
    let factory = FakeFactory::new();
    let registry = registry(&factory);
    let ctx = context("/ws", "/ws/pkg", "k1");

    for _ in 0..3 {
        assert!(lint(&registry, &ctx).await.unwrap().is_some());
    }
    assert_eq!(factory.created(), 1);
    assert_eq!(factory.calls(), 3);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn environment_change_replaces_and_disposes_old_worker() {
    let factory = FakeFactory::new();
    let registry = registry(&factory);

    lint(&registry, &context("/ws", "/ws/pkg", "k1")).await.unwrap();
    lint(&registry, &context("/ws", "/ws/pkg", "k2")).await.unwrap();

    assert_eq!(factory.created(), 2);
    assert!(factory.worker(0).is_disposed());
    assert!(!factory.worker(1).is_disposed());
    assert_eq!(factory.live_workers(), 1);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn pnp_change_replaces_worker() {
    let factory = FakeFactory::new();
    let registry = registry(&factory);
    let plain = context("/ws", "/ws", "k1");
    let pnp = plain
        .clone()
        .with_pnp(Some(PnpConfiguration::new("/ws/.pnp.cjs".into(), None)));

    lint(&registry, &plain).await.unwrap();
    lint(&registry, &pnp).await.unwrap();

    assert_eq!(factory.created(), 2);
    assert_eq!(factory.live_workers(), 1);
}

#[tokio::test]
async fn idle_evicted_worker_is_recreated() {
    let factory = FakeFactory::new();
    let registry = registry(&factory);
    let ctx = context("/ws", "/ws", "k1");

    lint(&registry, &ctx).await.unwrap();
    factory.worker(0).evict();
    assert_eq!(registry.len(), 0);

    lint(&registry, &ctx).await.unwrap();
    assert_eq!(factory.created(), 2);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn distinct_roots_get_distinct_workers() {
    let factory = FakeFactory::new();
    let registry = registry(&factory);

    lint(&registry, &context("/ws", "/ws/a", "k")).await.unwrap();
    lint(&registry, &context("/ws", "/ws/b", "k")).await.unwrap();
    lint(&registry, &context("/ws", "/ws/a", "k")).await.unwrap();

    assert_eq!(factory.created(), 2);
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn two_crashes_suppress_with_a_single_notification() {
    let factory = FakeFactory::new();
    factory.set_behavior(Behavior::Crash);
    let registry = registry(&factory);
    let ctx = context("/ws", "/ws", "k1");

    let first = lint(&registry, &ctx).await.unwrap_err();
    assert!(first.is_crash());
    assert_eq!(
        registry.health(Path::new("/ws")),
        Some(WorkerHealth::Degraded { crashes: 1 })
    );
    let second = lint(&registry, &ctx).await.unwrap_err();
    assert!(second.is_crash());
    assert_eq!(factory.calls(), 2);

    let third = lint(&registry, &ctx).await.unwrap_err();
    assert!(third.is_unavailable());
    assert!(third.notify_user());

    let fourth = lint(&registry, &ctx).await.unwrap_err();
    assert!(fourth.is_unavailable());
    assert!(!fourth.notify_user());

    assert_eq!(factory.calls(), 2, "suppressed calls never reach a worker");
    assert!(matches!(
        registry.health(Path::new("/ws")),
        Some(WorkerHealth::Suppressed { .. })
    ));
}

#[tokio::test]
async fn crashed_worker_is_replaced_on_next_call() {
    let factory = FakeFactory::new();
    factory.set_behavior(Behavior::Crash);
    let registry = registry(&factory);
    let ctx = context("/ws", "/ws", "k1");

    lint(&registry, &ctx).await.unwrap_err();
    assert!(factory.worker(0).is_disposed());

    factory.set_behavior(Behavior::Succeed);
    lint(&registry, &ctx).await.unwrap();
    assert_eq!(factory.created(), 2);
    assert_eq!(registry.health(Path::new("/ws")), Some(WorkerHealth::Healthy));
}

#[tokio::test]
async fn success_resets_crash_count() {
    let factory = FakeFactory::new();
    let registry = registry(&factory);
    let ctx = context("/ws", "/ws", "k1");

    factory.set_behavior(Behavior::Crash);
    lint(&registry, &ctx).await.unwrap_err();
    factory.set_behavior(Behavior::Succeed);
    lint(&registry, &ctx).await.unwrap();
    factory.set_behavior(Behavior::Crash);
    lint(&registry, &ctx).await.unwrap_err();

    assert_eq!(
        registry.health(Path::new("/ws")),
        Some(WorkerHealth::Degraded { crashes: 1 })
    );
}

#[tokio::test]
async fn linter_errors_are_not_crashes() {
    let factory = FakeFactory::new();
    factory.set_behavior(Behavior::Fail);
    let registry = registry(&factory);
    let ctx = context("/ws", "/ws", "k1");

    for _ in 0..3 {
        let err = lint(&registry, &ctx).await.unwrap_err();
        assert!(matches!(err, WorkerError::Failed(_)));
    }
    assert_eq!(factory.created(), 1);
    assert_eq!(registry.health(Path::new("/ws")), Some(WorkerHealth::Healthy));
}

#[tokio::test]
async fn creation_failures_count_as_crashes() {
    let factory = FakeFactory::new();
    factory.fail_creation(true);
    let registry = registry(&factory);
    let ctx = context("/ws", "/ws", "k1");

    assert!(lint(&registry, &ctx).await.unwrap_err().is_crash());
    assert!(lint(&registry, &ctx).await.unwrap_err().is_crash());
    let err = lint(&registry, &ctx).await.unwrap_err();
    assert!(err.is_unavailable() && err.notify_user());
}

#[tokio::test]
async fn workspace_activity_restores_suppressed_workers() {
    let factory = FakeFactory::new();
    factory.set_behavior(Behavior::Crash);
    let registry = registry(&factory);
    let ctx = context("/ws", "/ws/pkg", "k1");
    for _ in 0..3 {
        let _ = lint(&registry, &ctx).await;
    }
    let calls_before = factory.calls();

    factory.set_behavior(Behavior::Succeed);
    assert_eq!(registry.notify_workspace_activity(Path::new("/ws")), 1);
    assert_eq!(
        registry.health(Path::new("/ws/pkg")),
        Some(WorkerHealth::Healthy)
    );

    assert!(lint(&registry, &ctx).await.unwrap().is_some());
    assert_eq!(factory.calls(), calls_before + 1);
}

#[tokio::test]
async fn file_activity_restores_only_containing_workspace() {
    let factory = FakeFactory::new();
    factory.set_behavior(Behavior::Crash);
    let registry = registry(&factory);
    let a = context("/ws-a", "/ws-a", "k");
    let b = context("/ws-b", "/ws-b", "k");
    for _ in 0..3 {
        let _ = lint(&registry, &a).await;
        let _ = lint(&registry, &b).await;
    }

    factory.set_behavior(Behavior::Succeed);
    assert_eq!(
        registry.notify_file_activity(Path::new("/ws-a/packages/x/package.json")),
        1
    );

    assert!(lint(&registry, &a).await.unwrap().is_some());
    let err = lint(&registry, &b).await.unwrap_err();
    assert!(err.is_unavailable());
    assert!(!err.notify_user());
}

#[tokio::test]
async fn activity_for_healthy_roots_is_a_no_op() {
    let factory = FakeFactory::new();
    let registry = registry(&factory);
    lint(&registry, &context("/ws", "/ws", "k")).await.unwrap();

    assert_eq!(registry.notify_workspace_activity(Path::new("/ws")), 0);
    assert_eq!(factory.created(), 1);
}

#[tokio::test]
async fn dispose_all_forces_fresh_workers() {
    let factory = FakeFactory::new();
    let registry = registry(&factory);
    let a = context("/ws-a", "/ws-a", "k");
    let b = context("/ws-b", "/ws-b", "k");
    lint(&registry, &a).await.unwrap();
    lint(&registry, &b).await.unwrap();

    registry.dispose_all().await;
    assert_eq!(factory.disposals(), 2);
    assert!(registry.is_empty());

    lint(&registry, &a).await.unwrap();
    assert_eq!(factory.created(), 3);
}

#[tokio::test]
async fn dispose_is_scoped_to_one_workspace() {
    let factory = FakeFactory::new();
    let registry = registry(&factory);
    lint(&registry, &context("/ws-a", "/ws-a/x", "k")).await.unwrap();
    lint(&registry, &context("/ws-a", "/ws-a/y", "k")).await.unwrap();
    lint(&registry, &context("/ws-b", "/ws-b", "k")).await.unwrap();

    registry.dispose(Path::new("/ws-a")).await;

    assert_eq!(factory.disposals(), 2);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.health(Path::new("/ws-a/x")), None);
    assert_eq!(registry.health(Path::new("/ws-b")), Some(WorkerHealth::Healthy));
}

#[tokio::test]
async fn dispose_clears_suppression() {
    let factory = FakeFactory::new();
    factory.set_behavior(Behavior::Crash);
    let registry = registry(&factory);
    let ctx = context("/ws", "/ws", "k");
    for _ in 0..3 {
        let _ = lint(&registry, &ctx).await;
    }

    registry.dispose(Path::new("/ws")).await;
    factory.set_behavior(Behavior::Succeed);
    assert!(lint(&registry, &ctx).await.unwrap().is_some());
}

#[tokio::test]
async fn nested_folders_sharing_a_root_keep_it_until_both_are_disposed() {
    let factory = FakeFactory::new();
    let registry = registry(&factory);
    lint(&registry, &context("/ws", "/ws/pkg", "k")).await.unwrap();
    lint(&registry, &context("/ws/pkg", "/ws/pkg", "k")).await.unwrap();
    assert_eq!(factory.created(), 1);

    registry.dispose(Path::new("/ws/pkg")).await;
    assert!(!factory.worker(0).is_disposed());
    assert_eq!(registry.len(), 1);

    registry.dispose(Path::new("/ws")).await;
    assert!(factory.worker(0).is_disposed());
    assert!(registry.is_empty());
    assert_eq!(registry.health(Path::new("/ws/pkg")), None);
}

#[tokio::test]
async fn activity_in_any_owning_folder_restores_shared_root() {
    let factory = FakeFactory::new();
    factory.set_behavior(Behavior::Crash);
    let registry = registry(&factory);
    let _ = lint(&registry, &context("/ws", "/ws/pkg", "k")).await;
    let _ = lint(&registry, &context("/ws/pkg", "/ws/pkg", "k")).await;
    assert_eq!(
        registry.health(Path::new("/ws/pkg")),
        Some(WorkerHealth::Degraded { crashes: 2 })
    );

    assert_eq!(registry.notify_workspace_activity(Path::new("/ws")), 1);
    assert_eq!(
        registry.health(Path::new("/ws/pkg")),
        Some(WorkerHealth::Healthy)
    );
}

#[tokio::test]
async fn concurrent_creation_leaves_exactly_one_worker() {
    let factory = FakeFactory::slow(Duration::from_millis(20));
    let registry = registry(&factory);
    let ctx = context("/ws", "/ws", "k1");

    let (first, second) = tokio::join!(lint(&registry, &ctx), lint(&registry, &ctx));
    first.unwrap();
    second.unwrap();

    assert_eq!(factory.created(), 2);
    assert_eq!(factory.live_workers(), 1);
    assert_eq!(factory.disposals(), 1);
    assert_eq!(registry.len(), 1);

    lint(&registry, &ctx).await.unwrap();
    assert_eq!(factory.created(), 2);
}

#[tokio::test]
async fn suppression_expires_after_window() {
    let factory = FakeFactory::new();
    factory.set_behavior(Behavior::Crash);
    let config = stylist_config::RuntimeConfig {
        suppression_secs: 0,
        ..config()
    };
    let registry = WorkerRegistry::new(factory.clone(), &config);
    let ctx = context("/ws", "/ws", "k");

    lint(&registry, &ctx).await.unwrap_err();
    lint(&registry, &ctx).await.unwrap_err();
    let err = lint(&registry, &ctx).await.unwrap_err();
    assert!(err.is_unavailable());

    factory.set_behavior(Behavior::Succeed);
    assert!(lint(&registry, &ctx).await.unwrap().is_some());
    assert_eq!(registry.health(Path::new("/ws")), Some(WorkerHealth::Healthy));
}
