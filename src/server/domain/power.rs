//! Power actions accepted at the request boundary.

use super::ParsePowerActionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Power state change requested for a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerAction {
    /// Create the runtime object when missing, then start it.
    Start,
    /// Gracefully stop the runtime object.
    Stop,
    /// Stop, then start.
    Restart,
    /// Forcibly terminate the runtime object.
    Kill,
}

impl PowerAction {
    /// Returns the canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Kill => "kill",
        }
    }

    /// Returns whether the action ends with the server running.
    #[must_use]
    pub const fn boots_server(self) -> bool {
        matches!(self, Self::Start | Self::Restart)
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PowerAction {
    type Error = ParsePowerActionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "kill" => Ok(Self::Kill),
            _ => Err(ParsePowerActionError(value.to_owned())),
        }
    }
}

/// Power action document sent by the orchestrator.
///
/// The action is kept as a raw string so that unknown values can be rejected
/// with a dedicated error instead of a generic decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerActionRequest {
    /// Requested action name.
    pub action: String,
}

impl PowerActionRequest {
    /// Creates a request for the given action name.
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
        }
    }

    /// Parses the requested action.
    ///
    /// # Errors
    ///
    /// Returns [`ParsePowerActionError`] for anything other than `start`,
    /// `stop`, `restart`, or `kill`.
    pub fn parse(&self) -> Result<PowerAction, ParsePowerActionError> {
        PowerAction::try_from(self.action.as_str())
    }
}
