//! Given steps for power action BDD scenarios.

use super::world::{GLOBAL_KEY, OPERATOR_KEY, PowerWorld, run_async};
use eyre::WrapErr;
use nodewarden::auth::permissions;
use nodewarden::server::{
    adapters::memory::EnvironmentVerb,
    domain::{ServerConfiguration, ServerId},
};
use rstest_bdd_macros::given;

#[given(r#"a registered server "{id}" with an operator key"#)]
fn registered_server(world: &mut PowerWorld, id: String) -> Result<(), eyre::Report> {
    let server_id = ServerId::new(id).wrap_err("parse server id")?;
    let configuration = ServerConfiguration::new(server_id.clone(), "minecraft")
        .with_key(OPERATOR_KEY, [permissions::POWER]);
    run_async(world.control.registry().create(configuration)).wrap_err("register server")?;
    world.server_id = Some(server_id);
    Ok(())
}

#[given("the server is suspended")]
fn server_is_suspended(world: &mut PowerWorld) -> Result<(), eyre::Report> {
    let server_id = world.server_id()?;
    run_async(world.control.set_suspended(GLOBAL_KEY, &server_id, true))
        .wrap_err("suspend server")?;
    Ok(())
}

#[given("the server has been started")]
fn server_has_been_started(world: &mut PowerWorld) -> Result<(), eyre::Report> {
    let server_id = world.server_id()?;
    let record = world.control.registry().require(&server_id)?;
    run_async(record.start()).wrap_err("start server")?;
    Ok(())
}

#[given(r#"the backend fails every "{verb}""#)]
fn backend_fails(world: &mut PowerWorld, verb: String) -> Result<(), eyre::Report> {
    let parsed = parse_verb(&verb)?;
    world
        .host
        .fail_on(parsed, format!("injected {verb} failure"))
        .wrap_err("inject backend failure")?;
    Ok(())
}

/// Parses a lifecycle verb name.
///
/// # Errors
///
/// Returns an error for names the in-memory backend does not record.
pub fn parse_verb(name: &str) -> Result<EnvironmentVerb, eyre::Report> {
    [
        EnvironmentVerb::Exists,
        EnvironmentVerb::Create,
        EnvironmentVerb::Start,
        EnvironmentVerb::Stop,
        EnvironmentVerb::Kill,
        EnvironmentVerb::Exec,
        EnvironmentVerb::Recreate,
        EnvironmentVerb::Destroy,
    ]
    .into_iter()
    .find(|verb| verb.as_str() == name)
    .ok_or_else(|| eyre::eyre!("unknown lifecycle verb '{name}'"))
}
