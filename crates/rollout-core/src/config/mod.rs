//! Project configuration (`rollout.toml`)
//!
//! Declares default and override profiles, the services they apply to, and external
//! steps that can prepare a build context.

pub mod parser;
pub mod schema;
pub mod store;

pub use parser::{parse_rollout_toml, parse_rollout_toml_str, to_toml};
pub use schema::{ProjectSection, RolloutConfig, ServiceEntry, Settings};
pub use store::{CONFIG_FILE_NAME, ConfigStore};
