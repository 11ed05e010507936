//! Lifecycle tests driving records against the in-memory backend.

use crate::in_memory::helpers::{Harness, harness, id, server};
use nodewarden::server::{
    adapters::memory::EnvironmentVerb::{self, Create, Destroy, Exec, Exists, Kill, Recreate, Start, Stop},
    services::ServerError,
};
use rstest::rstest;

async fn created(harness: &Harness) -> std::sync::Arc<nodewarden::server::services::ServerRecord> {
    harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create server")
}

fn verbs(harness: &Harness) -> Vec<EnvironmentVerb> {
    harness.host.verbs_for(&id("aaaa-01")).expect("host readable")
}

#[rstest]
#[tokio::test]
async fn first_start_creates_the_runtime_object(harness: Harness) {
    let record = created(&harness).await;

    record.start().await.expect("start");

    assert_eq!(verbs(&harness), vec![Exists, Create, Start]);
    assert!(harness.host.is_running(record.id()).expect("host readable"));
    let container = record.configuration().container;
    assert!(container.id.starts_with("mem-aaaa-"));
    let stored = harness
        .store
        .document(record.id())
        .expect("store readable")
        .expect("document present");
    assert_eq!(stored.container, container);
}

#[rstest]
#[tokio::test]
async fn start_reuses_an_existing_runtime_object(harness: Harness) {
    let record = created(&harness).await;
    harness
        .host
        .mark_existing(record.id().clone())
        .expect("mark existing");

    record.start().await.expect("start");

    assert_eq!(verbs(&harness), vec![Exists, Start]);
}

#[rstest]
#[tokio::test]
async fn environment_is_built_once_across_operations(harness: Harness) {
    let record = created(&harness).await;

    record.start().await.expect("start");
    record.stop().await.expect("stop");
    record.kill().await.expect("kill");

    assert_eq!(harness.host.constructions(record.id()).expect("host readable"), 1);
}

#[rstest]
#[tokio::test]
async fn failed_create_stops_the_start(harness: Harness) {
    let record = created(&harness).await;
    harness
        .host
        .fail_on(Create, "image pull failed")
        .expect("inject failure");

    let result = record.start().await;

    assert!(matches!(result, Err(ServerError::Backend(_))));
    assert_eq!(verbs(&harness), vec![Exists, Create]);
    assert!(!harness.host.is_running(record.id()).expect("host readable"));
}

#[rstest]
#[tokio::test]
async fn restart_stops_then_starts(harness: Harness) {
    let record = created(&harness).await;
    record.start().await.expect("start");

    record.restart().await.expect("restart");

    assert_eq!(
        verbs(&harness),
        vec![Exists, Create, Start, Stop, Exists, Start]
    );
}

#[rstest]
#[tokio::test]
async fn restart_skips_start_when_stop_fails(harness: Harness) {
    let record = created(&harness).await;
    record.start().await.expect("start");
    harness.host.fail_on(Stop, "daemon busy").expect("inject failure");

    let result = record.restart().await;

    assert!(result.is_err());
    assert_eq!(verbs(&harness), vec![Exists, Create, Start, Stop]);
}

#[rstest]
#[tokio::test]
async fn suspended_server_refuses_to_start(harness: Harness) {
    let record = created(&harness).await;
    record.set_suspended(true).await.expect("suspend");

    let start = record.start().await;
    let restart = record.restart().await;

    assert!(matches!(start, Err(ServerError::Suspended(_))));
    assert!(matches!(restart, Err(ServerError::Suspended(_))));
    assert!(verbs(&harness).is_empty());
    let stored = harness
        .store
        .document(record.id())
        .expect("store readable")
        .expect("document present");
    assert!(stored.suspended);
}

#[rstest]
#[tokio::test]
async fn suspended_server_can_still_stop(harness: Harness) {
    let record = created(&harness).await;
    record.start().await.expect("start");
    record.set_suspended(true).await.expect("suspend");

    record.stop().await.expect("stop");

    assert!(!harness.host.is_running(record.id()).expect("host readable"));
}

#[rstest]
#[tokio::test]
async fn exec_requires_a_running_server(harness: Harness) {
    let record = created(&harness).await;

    let stopped = record.exec("say hello").await;
    record.start().await.expect("start");
    let running = record.exec("say hello").await;

    assert!(matches!(stopped, Err(ServerError::Backend(_))));
    assert!(running.is_ok());
    let commands: Vec<Option<String>> = harness
        .host
        .calls()
        .expect("host readable")
        .into_iter()
        .filter(|call| call.verb == Exec)
        .map(|call| call.command)
        .collect();
    assert_eq!(
        commands,
        vec![Some("say hello".to_owned()), Some("say hello".to_owned())]
    );
}

#[rstest]
#[tokio::test]
async fn rebuild_records_the_new_container(harness: Harness) {
    let record = created(&harness).await;
    record.start().await.expect("start");
    let before = record.configuration().container;

    record.rebuild().await.expect("rebuild");

    let after = record.configuration().container;
    assert_ne!(before.id, after.id);
    assert_eq!(verbs(&harness).last(), Some(&Recreate));
}

#[rstest]
#[tokio::test]
async fn destroy_removes_the_runtime_object(harness: Harness) {
    let record = created(&harness).await;
    record.start().await.expect("start");

    record.destroy().await.expect("destroy");

    assert_eq!(verbs(&harness).last(), Some(&Destroy));
    assert!(!harness.host.exists_for(record.id()).expect("host readable"));
}

#[rstest]
#[tokio::test]
async fn kill_failure_is_surfaced_unchanged(harness: Harness) {
    let record = created(&harness).await;
    harness.host.fail_on(Kill, "no such process").expect("inject failure");

    let result = record.kill().await;

    assert!(
        matches!(&result, Err(ServerError::Backend(err)) if err.to_string().contains("no such process"))
    );
}

#[rstest]
#[tokio::test]
async fn unknown_environment_is_reported_and_not_cached(harness: Harness) {
    let registry = nodewarden::server::services::ServerRegistry::new(
        std::sync::Arc::new(harness.store.clone()),
        nodewarden::server::ports::EnvironmentBackends::new(),
        nodewarden::server::domain::ServiceCatalog::new(),
        crate::in_memory::helpers::layout(),
    );
    let record = registry.create(server("aaaa-01")).await.expect("create");

    let first = record.environment().await;
    let second = record.environment().await;

    assert!(first.is_err_and(|err| err.is_invalid_environment()));
    assert!(second.is_err_and(|err| err.is_invalid_environment()));
}

#[rstest]
#[tokio::test]
async fn data_paths_stay_inside_the_data_directory(harness: Harness) {
    let record = created(&harness).await;

    assert_eq!(
        record.data_path("plugins/config.yml").as_str(),
        "/srv/nodewarden/aaaa-01/plugins/config.yml"
    );
    assert_eq!(record.data_path("../../etc/passwd"), record.data_root());
    assert_eq!(record.path().as_str(), "/var/lib/nodewarden/aaaa-01");
}
