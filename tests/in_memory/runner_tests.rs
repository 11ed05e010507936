//! Background action dispatch tests.

use crate::in_memory::helpers::{Harness, harness, runner, server};
use async_trait::async_trait;
use nodewarden::server::{
    adapters::memory::EnvironmentVerb,
    domain::{PowerAction, ServerConfiguration},
    ports::InstallHook,
    services::{ActionRunner, ServerAction, ServerError},
};
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn dispatch_returns_before_the_action_finishes(harness: Harness, runner: ActionRunner) {
    let record = harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");
    harness
        .host
        .set_delay(Duration::from_millis(50))
        .expect("set delay");

    let handle = runner
        .dispatch(Arc::clone(&record), ServerAction::Power(PowerAction::Start))
        .expect("dispatch");

    assert!(runner.is_busy(record.id()));
    assert_eq!(handle.server_id(), record.id());
    handle.wait().await.expect("start completes");
    assert!(harness.host.is_running(record.id()).expect("host readable"));
    assert!(!runner.is_busy(record.id()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn overlapping_dispatch_is_rejected(harness: Harness, runner: ActionRunner) {
    let record = harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");
    harness
        .host
        .set_delay(Duration::from_millis(100))
        .expect("set delay");

    let first = runner
        .dispatch(Arc::clone(&record), ServerAction::Power(PowerAction::Start))
        .expect("first dispatch");
    let second = runner.dispatch(Arc::clone(&record), ServerAction::Power(PowerAction::Stop));

    assert!(matches!(second, Err(ServerError::OperationInProgress(_))));
    first.wait().await.expect("first completes");

    let third = runner
        .dispatch(record, ServerAction::Power(PowerAction::Stop))
        .expect("slot released after completion");
    third.wait().await.expect("stop completes");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn different_servers_run_independently(harness: Harness, runner: ActionRunner) {
    let first = harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create first");
    let second = harness
        .registry
        .create(server("bbbb-02"))
        .await
        .expect("create second");
    harness
        .host
        .set_delay(Duration::from_millis(20))
        .expect("set delay");

    let handles = [
        runner
            .dispatch(first, ServerAction::Power(PowerAction::Start))
            .expect("dispatch first"),
        runner
            .dispatch(second, ServerAction::Power(PowerAction::Start))
            .expect("dispatch second"),
    ];

    for handle in handles {
        handle.wait().await.expect("action completes");
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_action_reports_its_error_and_frees_the_slot(
    harness: Harness,
    runner: ActionRunner,
) {
    let record = harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");
    harness
        .host
        .fail_on(EnvironmentVerb::Kill, "kill refused")
        .expect("inject failure");

    let result = runner
        .dispatch(Arc::clone(&record), ServerAction::Power(PowerAction::Kill))
        .expect("dispatch")
        .wait()
        .await;

    assert!(matches!(result, Err(ServerError::Backend(_))));
    assert!(!runner.is_busy(record.id()));
}

struct FailingInstaller;

#[async_trait]
impl InstallHook for FailingInstaller {
    async fn install(
        &self,
        _server: &ServerConfiguration,
    ) -> Result<(), Arc<dyn std::error::Error + Send + Sync>> {
        Err(Arc::new(std::io::Error::other("script exited with 1")))
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn install_failure_is_surfaced(harness: Harness) {
    let record = harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");
    let installer = ActionRunner::new(1, Arc::new(FailingInstaller));

    let result = installer
        .dispatch(record, ServerAction::Install)
        .expect("dispatch")
        .wait()
        .await;

    assert!(matches!(result, Err(ServerError::Install { .. })));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rebuild_runs_in_the_background(harness: Harness, runner: ActionRunner) {
    let record = harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");

    runner
        .dispatch(Arc::clone(&record), ServerAction::Rebuild)
        .expect("dispatch")
        .wait()
        .await
        .expect("rebuild completes");

    assert_eq!(
        harness.host.verbs_for(record.id()).expect("host readable"),
        vec![EnvironmentVerb::Recreate]
    );
}
