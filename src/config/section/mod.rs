//! Configuration sections of `splitbuild.toml`.

mod build;
mod classify;
mod tools;

pub use build::BuildSectionConfig;
pub use classify::ClassifyConfig;
pub use tools::{ToolsConfig, WatchConfig};
