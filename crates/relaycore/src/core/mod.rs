pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod metrics_server;
pub mod validation;

pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use logging::{init_logger, log_startup_configuration};
pub use validation::{extract_urls, is_valid_url, parse_urls};
