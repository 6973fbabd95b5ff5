//! Configuration for laneci.
//!
//! This crate handles parsing of:
//! - Project lane specifications (`"ios beta"`)
//! - System settings (`laneci.kdl` plus environment overrides)

pub mod error;
pub mod lane;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use lane::LaneSpec;
pub use system::{
    CiUserSettings, CommitterSettings, ConfigRepoSettings, EngineSettings, Settings, load_settings,
    parse_settings,
};
