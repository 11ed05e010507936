//! Request boundary tests: permissions, dispatch and deletion.

use crate::in_memory::helpers::{GLOBAL_KEY, Harness, OPERATOR_KEY, harness, id, server};
use nodewarden::auth::permissions;
use nodewarden::server::{
    adapters::memory::EnvironmentVerb,
    domain::PowerActionRequest,
    services::{ControlError, DeleteOutcome, ServerError},
};
use rstest::rstest;
use serde_json::json;
use std::time::Duration;

const CONFIG_KEY: &str = "configurator";

#[rstest]
#[tokio::test]
async fn listing_requires_a_global_key(harness: Harness) {
    let control = harness.control();
    control
        .create_server(GLOBAL_KEY, server("aaaa-01"))
        .await
        .expect("create")
        .wait()
        .await
        .expect("install");

    let listed = control.list_servers(GLOBAL_KEY).expect("list");
    let denied = control.list_servers(OPERATOR_KEY);

    assert_eq!(listed.len(), 1);
    assert!(denied.is_err_and(|err| err.is_permission_denied()));
}

#[rstest]
#[tokio::test]
async fn server_keys_cannot_create_servers(harness: Harness) {
    let result = harness
        .control()
        .create_server(OPERATOR_KEY, server("aaaa-01"))
        .await;

    assert!(matches!(result, Err(ControlError::Unauthorized(_))));
    assert!(harness.registry.is_empty());
}

#[rstest]
#[tokio::test]
async fn operator_can_power_its_own_server(harness: Harness) {
    let control = harness.control();
    harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");

    control
        .power(OPERATOR_KEY, &id("aaaa-01"), &PowerActionRequest::new("start"))
        .expect("dispatch")
        .wait()
        .await
        .expect("start");

    assert!(harness.host.is_running(&id("aaaa-01")).expect("host readable"));
}

#[rstest]
#[tokio::test]
async fn operator_key_of_one_server_does_not_open_another(harness: Harness) {
    let control = harness.control();
    harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");
    let mut stranger = server("bbbb-02");
    stranger.keys.clear();
    harness.registry.create(stranger).await.expect("create");

    let result = control.power(OPERATOR_KEY, &id("bbbb-02"), &PowerActionRequest::new("start"));

    assert!(result.is_err_and(|err| err.is_permission_denied()));
}

#[rstest]
#[tokio::test]
async fn unknown_power_action_is_rejected(harness: Harness) {
    let control = harness.control();
    harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");

    let result = control.power(OPERATOR_KEY, &id("aaaa-01"), &PowerActionRequest::new("reboot"));

    assert!(matches!(result, Err(ControlError::InvalidAction(_))));
    assert!(harness.host.calls().expect("host readable").is_empty());
}

#[rstest]
#[tokio::test]
async fn start_of_suspended_server_is_rejected_at_the_boundary(harness: Harness) {
    let control = harness.control();
    harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");
    control
        .set_suspended(GLOBAL_KEY, &id("aaaa-01"), true)
        .await
        .expect("suspend");

    let result = control.power(OPERATOR_KEY, &id("aaaa-01"), &PowerActionRequest::new("start"));

    assert!(matches!(
        result,
        Err(ControlError::Server(ServerError::Suspended(_)))
    ));
}

#[rstest]
#[tokio::test]
async fn suspension_requires_a_global_key(harness: Harness) {
    let control = harness.control();
    harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");

    let result = control.set_suspended(OPERATOR_KEY, &id("aaaa-01"), true).await;

    assert!(result.is_err_and(|err| err.is_permission_denied()));
}

#[rstest]
#[tokio::test]
async fn missing_server_is_denied_even_for_global_key(harness: Harness) {
    let result = harness.control().get_server(GLOBAL_KEY, &id("ffff-99"));

    assert!(result.is_err_and(|err| err.is_permission_denied()));
}

#[rstest]
#[tokio::test]
async fn commands_reach_the_running_server(harness: Harness) {
    let control = harness.control();
    let record = harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");
    record.start().await.expect("start");

    control
        .send_command(OPERATOR_KEY, record.id(), "say hi")
        .await
        .expect("command");

    assert_eq!(
        harness.host.verbs_for(record.id()).expect("host readable").last(),
        Some(&EnvironmentVerb::Exec)
    );
}

#[rstest]
#[tokio::test]
async fn delete_destroys_then_removes(harness: Harness) {
    let control = harness.control();
    let record = harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");
    record.start().await.expect("start");

    let outcome = control
        .delete_server(GLOBAL_KEY, record.id())
        .await
        .expect("delete");

    assert_eq!(outcome, DeleteOutcome::Removed);
    assert!(harness.registry.is_empty());
    assert!(!harness.host.exists_for(record.id()).expect("host readable"));
}

#[rstest]
#[tokio::test]
async fn destroy_failure_aborts_delete(harness: Harness) {
    let control = harness.control();
    harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");
    harness
        .host
        .fail_on(EnvironmentVerb::Destroy, "container busy")
        .expect("inject failure");

    let result = control.delete_server(GLOBAL_KEY, &id("aaaa-01")).await;

    assert!(matches!(
        result,
        Err(ControlError::Server(ServerError::Backend(_)))
    ));
    assert_eq!(harness.registry.len(), 1);

    harness
        .host
        .clear_failure(EnvironmentVerb::Destroy)
        .expect("clear failure");
    harness
        .registry
        .get(&id("aaaa-01"))
        .expect("still registered")
        .start()
        .await
        .expect("server stays usable after an aborted delete");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn start_queued_behind_delete_cannot_recreate_the_server(harness: Harness) {
    let control = harness.control();
    let record = harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");
    harness
        .host
        .set_delay(Duration::from_millis(100))
        .expect("set delay");

    let deleter = control.clone();
    let deletion =
        tokio::spawn(async move { deleter.delete_server(GLOBAL_KEY, &id("aaaa-01")).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let queued = record.start().await;

    assert!(matches!(queued, Err(ServerError::Deleting(_))));
    assert_eq!(
        deletion.await.expect("delete task joins").expect("delete"),
        DeleteOutcome::Removed
    );
    assert_eq!(
        harness.host.verbs_for(record.id()).expect("host readable"),
        vec![EnvironmentVerb::Destroy]
    );
    assert!(!harness.host.exists_for(record.id()).expect("host readable"));
    assert!(harness.registry.is_empty());
}

#[rstest]
#[tokio::test]
async fn configuration_updates_need_the_config_permission(harness: Harness) {
    let control = harness.control();
    harness
        .registry
        .create(server("aaaa-01").with_key(CONFIG_KEY, [permissions::UPDATE_SERVER]))
        .await
        .expect("create");
    let patch = json!({"startupCommand": "./start.sh"});

    let denied = control.update_server(OPERATOR_KEY, &id("aaaa-01"), &patch).await;
    let updated = control
        .update_server(CONFIG_KEY, &id("aaaa-01"), &patch)
        .await
        .expect("update");

    assert!(denied.is_err_and(|err| err.is_permission_denied()));
    assert_eq!(updated.startup_command, "./start.sh");
    assert_eq!(
        control
            .get_server(GLOBAL_KEY, &id("aaaa-01"))
            .expect("get")
            .startup_command,
        "./start.sh"
    );
    assert_eq!(
        harness
            .store
            .document(&id("aaaa-01"))
            .expect("store readable")
            .expect("document saved")
            .startup_command,
        "./start.sh"
    );
}

#[rstest]
#[tokio::test]
async fn configuration_updates_cannot_unsuspend(harness: Harness) {
    let control = harness.control();
    harness
        .registry
        .create(server("aaaa-01").with_key(CONFIG_KEY, [permissions::UPDATE_SERVER]))
        .await
        .expect("create");
    control
        .set_suspended(GLOBAL_KEY, &id("aaaa-01"), true)
        .await
        .expect("suspend");

    let result = control
        .update_server(CONFIG_KEY, &id("aaaa-01"), &json!({"suspended": false}))
        .await;

    assert!(matches!(
        result,
        Err(ControlError::Server(ServerError::InvalidUpdate { .. }))
    ));
    assert!(
        control
            .get_server(GLOBAL_KEY, &id("aaaa-01"))
            .expect("get")
            .suspended
    );
}

#[rstest]
#[tokio::test]
async fn operator_cannot_delete(harness: Harness) {
    let control = harness.control();
    harness
        .registry
        .create(server("aaaa-01"))
        .await
        .expect("create");

    let result = control.delete_server(OPERATOR_KEY, &id("aaaa-01")).await;

    assert!(result.is_err_and(|err| err.is_permission_denied()));
    assert_eq!(harness.registry.len(), 1);
}
