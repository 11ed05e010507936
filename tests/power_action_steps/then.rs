//! Then steps for power action BDD scenarios.

use super::given::parse_verb;
use super::world::PowerWorld;
use nodewarden::server::services::{ControlError, ServerError};
use rstest_bdd_macros::then;

#[then("the action succeeds")]
fn action_succeeds(world: &PowerWorld) -> Result<(), eyre::Report> {
    match &world.outcome {
        Some(Ok(())) => Ok(()),
        Some(Err(err)) => Err(eyre::eyre!("action failed: {err}")),
        None => Err(eyre::eyre!("no action was dispatched")),
    }
}

#[then("the action fails")]
fn action_fails(world: &PowerWorld) -> Result<(), eyre::Report> {
    match &world.outcome {
        Some(Err(_)) => Ok(()),
        Some(Ok(())) => Err(eyre::eyre!("expected the action to fail")),
        None => Err(eyre::eyre!("no action was dispatched")),
    }
}

#[then("the server is running")]
fn server_is_running(world: &PowerWorld) -> Result<(), eyre::Report> {
    let server_id = world.server_id()?;
    if !world.host.is_running(&server_id)? {
        return Err(eyre::eyre!("server {server_id} is not running"));
    }
    Ok(())
}

#[then(r#"the backend saw "{verbs}""#)]
fn backend_saw(world: &PowerWorld, verbs: String) -> Result<(), eyre::Report> {
    let server_id = world.server_id()?;
    let expected = verbs
        .split(',')
        .map(str::trim)
        .map(parse_verb)
        .collect::<Result<Vec<_>, _>>()?;
    let seen = world.host.verbs_for(&server_id)?;
    if seen != expected {
        return Err(eyre::eyre!("expected calls {expected:?}, saw {seen:?}"));
    }
    Ok(())
}

#[then("the backend saw no calls")]
fn backend_saw_nothing(world: &PowerWorld) -> Result<(), eyre::Report> {
    let server_id = world.server_id()?;
    let seen = world.host.verbs_for(&server_id)?;
    if !seen.is_empty() {
        return Err(eyre::eyre!("expected no backend calls, saw {seen:?}"));
    }
    Ok(())
}

#[then("the request is rejected because the server is suspended")]
fn rejected_as_suspended(world: &PowerWorld) -> Result<(), eyre::Report> {
    match &world.rejection {
        Some(ControlError::Server(ServerError::Suspended(_))) => Ok(()),
        other => Err(eyre::eyre!("expected a suspension rejection, got {other:?}")),
    }
}

#[then("the request is rejected as an invalid action")]
fn rejected_as_invalid(world: &PowerWorld) -> Result<(), eyre::Report> {
    match &world.rejection {
        Some(ControlError::InvalidAction(_)) => Ok(()),
        other => Err(eyre::eyre!("expected an invalid action rejection, got {other:?}")),
    }
}
