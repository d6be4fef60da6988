pub mod types;
pub mod config;
pub mod error;
pub mod file_config;

pub use types::*;
pub use config::Config;
pub use error::NearcastError;
pub use file_config::{load_config, FileConfig};
