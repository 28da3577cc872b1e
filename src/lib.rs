/// The bollard backed [ContainerRuntime](runtime::ContainerRuntime) and tar
/// helpers
pub mod api_docker;
mod command;
pub mod config;
/// Data containers, import and export
pub mod data;
pub mod definitions;
mod error;
pub mod file_ops;
pub mod initialize;
pub mod inspect;
pub mod list;
mod loaders;
pub mod misc;
/// Container names and labels
pub mod naming;
mod paths;
pub mod runtime;
pub mod update;
pub mod version;

pub use command::*;
pub use error::*;
pub use loaders::*;
pub use paths::*;
/// This reexport helps with dependency wrangling
pub use stacked_errors;
