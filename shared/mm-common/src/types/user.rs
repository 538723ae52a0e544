//! User Types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// User presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// User is online.
    Online,
    /// User is idle/away.
    Away,
    /// User is busy (do not disturb).
    Busy,
    /// User is offline.
    #[default]
    Offline,
}

impl UserStatus {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "away" => Ok(Self::Away),
            "busy" => Ok(Self::Busy),
            "offline" => Ok(Self::Offline),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&UserStatus::Busy).unwrap(), "\"busy\"");
        let parsed: UserStatus = serde_json::from_str("\"away\"").unwrap();
        assert_eq!(parsed, UserStatus::Away);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("online".parse::<UserStatus>(), Ok(UserStatus::Online));
        assert!("sleeping".parse::<UserStatus>().is_err());
    }
}
