//! Request authorization.
//!
//! A request presents a bearer token and needs one permission string.
//! Global keys configured on the node satisfy every permission; per-server
//! keys stored in a server's configuration satisfy server-scoped ones.

mod gate;
pub mod permissions;

pub use gate::{AuthorizationError, AuthorizationGate, bearer_token};
pub use permissions::PermissionScope;
