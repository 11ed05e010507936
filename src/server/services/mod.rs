//! Application services for the server registry, lifecycle and background
//! actions.

mod control;
mod error;
mod record;
mod registry;
mod runner;

pub use control::{ControlError, ControlResult, ServerControlService};
pub use error::{ServerError, ServerResult};
pub use record::ServerRecord;
pub use registry::{DeleteOutcome, ServerRegistry};
pub use runner::{ActionHandle, ActionRunner, ServerAction};
