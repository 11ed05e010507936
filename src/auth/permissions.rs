//! Permission strings assigned to each control operation.
//!
//! The first character names the scope: `c` for controller-wide actions,
//! `g` for global-key actions on a resolved server, `s` for server-scoped
//! actions a server key may grant. The empty permission is unrestricted.

/// Unrestricted.
pub const NONE: &str = "";

/// List every server on the node.
pub const LIST_SERVERS: &str = "c:list";
/// Create a server.
pub const CREATE_SERVER: &str = "c:create";

/// Rebuild a server's runtime object.
pub const REBUILD_SERVER: &str = "g:server:rebuild";
/// Delete a server.
pub const DELETE_SERVER: &str = "g:server:delete";
/// Suspend or unsuspend a server.
pub const SUSPEND_SERVER: &str = "g:server:suspend";

/// Read a server's configuration.
pub const GET_SERVER: &str = "s:get";
/// Update a server's configuration.
pub const UPDATE_SERVER: &str = "s:config";
/// Reinstall a server.
pub const INSTALL_SERVER: &str = "s:install-server";
/// Change a server's power state.
pub const POWER: &str = "s:power";
/// Send a console command.
pub const SEND_COMMAND: &str = "s:command";

/// Read file contents.
pub const FILES_READ: &str = "s:files:read";
/// List directories and stat files.
pub const FILES_GET: &str = "s:files:get";
/// Create directories.
pub const FILES_CREATE: &str = "s:files:create";
/// Write files.
pub const FILES_WRITE: &str = "s:files:post";
/// Copy files.
pub const FILES_COPY: &str = "s:files:copy";
/// Rename or move files.
pub const FILES_MOVE: &str = "s:files:move";
/// Delete files and directories.
pub const FILES_DELETE: &str = "s:files:delete";

/// Grants every server-scoped permission when held as a server key.
pub const SERVER_WILDCARD: &str = crate::server::domain::SERVER_WILDCARD_PERMISSION;

/// Scope a permission string belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScope {
    /// Always allowed.
    Unrestricted,
    /// Requires a global key.
    Controller,
    /// Requires a global key and a resolved server.
    Global,
    /// Requires a resolved server granting it, or a global key.
    Server,
    /// Unrecognized prefix; always denied.
    Unknown,
}

impl PermissionScope {
    /// Classifies `permission` by its first character.
    #[must_use]
    pub fn of(permission: &str) -> Self {
        match permission.chars().next() {
            None => Self::Unrestricted,
            Some('c') => Self::Controller,
            Some('g') => Self::Global,
            Some('s') => Self::Server,
            Some(_) => Self::Unknown,
        }
    }

    /// Returns whether the scope needs a resolved server.
    #[must_use]
    pub const fn needs_server(self) -> bool {
        matches!(self, Self::Global | Self::Server)
    }
}
