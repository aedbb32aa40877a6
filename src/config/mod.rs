pub mod env;
mod loader;

pub use env::{AppConfig, ClassifierConfig, DirectoryConfig, SyncConfig};
pub use loader::load_config;
