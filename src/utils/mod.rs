//! Small shared helpers: logging setup, environment, time, soft errors

pub mod env;
pub mod error;
pub mod logging;
pub mod time;

pub use env::{env_bool, env_opt, env_path};
pub use error::{log_error, with_default};
pub use logging::{init_logging, init_logging_from_config};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use time::{current_timestamp, elapsed_millis};
