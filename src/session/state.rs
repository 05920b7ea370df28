use std::cell::Cell;
use std::fmt;
use std::str::FromStr;

use anyhow::{Error, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            bail!("room id must not be empty");
        }
        Ok(RoomId::new(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Holds the device and produces readings.
    Measuring,
    /// Watches readings relayed from the measuring side.
    Observing,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Measuring => "measuring",
            Role::Observing => "observing",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "measuring" => Ok(Role::Measuring),
            "observing" => Ok(Role::Observing),
            _ => bail!("unknown role: {}", s),
        }
    }
}

/// idle → connecting → connected | error; connected → idle; error → idle | connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub room_id: RoomId,

    pub role: Role,

    pub status: ConnectionStatus,
}

/// Holds a status at connecting until settled. Dropping it unsettled, as
/// when the connecting future is cancelled, falls back to idle.
pub(crate) struct ConnectingGuard<'a> {
    status: &'a Cell<ConnectionStatus>,
    settled: bool,
}

impl<'a> ConnectingGuard<'a> {
    pub(crate) fn begin(status: &'a Cell<ConnectionStatus>) -> Self {
        status.set(ConnectionStatus::Connecting);
        Self {
            status,
            settled: false,
        }
    }

    pub(crate) fn settle(mut self, status: ConnectionStatus) {
        self.status.set(status);
        self.settled = true;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.status.set(ConnectionStatus::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_str() {
        assert_eq!("measuring".parse::<Role>().unwrap(), Role::Measuring);
        assert_eq!("observing".parse::<Role>().unwrap(), Role::Observing);
        assert!("clinician".parse::<Role>().is_err());
    }

    #[test]
    fn test_room_id_from_str() {
        assert_eq!("  ward-7 ".parse::<RoomId>().unwrap().as_str(), "ward-7");
        assert!("   ".parse::<RoomId>().is_err());
    }

    #[test]
    fn test_role_wire_name() {
        assert_eq!(serde_json::to_string(&Role::Measuring).unwrap(), "\"measuring\"");
    }
}
