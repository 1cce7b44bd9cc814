use thiserror::Error;

/// Error type for problems that are not graph-domain failures:
/// loading configuration and validating settings.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },
}
