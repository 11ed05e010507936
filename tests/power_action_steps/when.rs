//! When steps for power action BDD scenarios.

use super::world::{OPERATOR_KEY, PowerWorld, run_async};
use nodewarden::server::domain::PowerActionRequest;
use rstest_bdd_macros::when;

#[when(r#"the operator requests the "{action}" power action"#)]
fn operator_requests(world: &mut PowerWorld, action: String) -> Result<(), eyre::Report> {
    let server_id = world.server_id()?;
    let request = PowerActionRequest::new(action);
    match world.control.power(OPERATOR_KEY, &server_id, &request) {
        Ok(handle) => world.outcome = Some(run_async(handle.wait())),
        Err(err) => world.rejection = Some(err),
    }
    Ok(())
}
