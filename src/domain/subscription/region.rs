//! Deployment region of a subscriber.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Region whose data store owns a subscriber's records.
///
/// Chosen once at registration and persisted. Never derived from the shape
/// of a user id or from request geolocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    China,
    #[default]
    Global,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::China => "china",
            Region::Global => "global",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Region {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "china" | "cn" => Ok(Region::China),
            "global" | "intl" => Ok(Region::Global),
            other => Err(ValidationError::invalid_format(
                "region",
                format!("unknown region '{}'", other),
            )),
        }
    }
}
