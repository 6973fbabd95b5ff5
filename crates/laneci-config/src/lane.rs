//! Lane specifications.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ConfigError, ConfigResult};

/// A parsed project lane: `"ios beta"` is platform `ios`, lane `beta`;
/// a bare `"test"` has no platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneSpec {
    pub platform: Option<String>,
    pub lane: String,
}

impl LaneSpec {
    /// The last whitespace-separated token is the lane; everything before it is the platform.
    pub fn parse(spec: &str) -> ConfigResult<Self> {
        let pieces: Vec<&str> = spec.split_whitespace().collect();
        let Some((lane, platform)) = pieces.split_last() else {
            return Err(ConfigError::EmptyLane);
        };

        Ok(Self {
            platform: if platform.is_empty() {
                None
            } else {
                Some(platform.join(" "))
            },
            lane: lane.to_string(),
        })
    }
}

impl fmt::Display for LaneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.platform {
            Some(platform) => write!(f, "{} {}", platform, self.lane),
            None => f.write_str(&self.lane),
        }
    }
}
