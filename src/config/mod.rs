mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BrokerBackend, BrokerSettings, DispatchSettings, LoggingSettings, Settings, ShutdownMode,
};

/// Environment variable prefix; nested keys use `__`
/// (`TOPICBUS_DISPATCH__MAX_IN_FLIGHT=8`).
pub const ENV_PREFIX: &str = "TOPICBUS";

/// Loads the configuration from `config/default` and environment variables.
///
/// Merges the configuration with default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(Path::new("config/default"))
}

/// Same as [`load_config`] with an explicit file stem. The file is optional;
/// its extension (`.toml`, `.yaml`, `.json`) is detected.
pub fn load_config_from(path: &Path) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(&path.to_string_lossy()).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_with_defaults())
}
