pub mod settings;

pub use ::config::ConfigError;
pub use settings::{Settings, ENV_PREFIX};
