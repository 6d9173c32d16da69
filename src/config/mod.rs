mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BrokerSettings, LogSettings, ProducerSettings, QueueSettings, ServerSettings, Settings,
};

/// Prefix of environment overrides, e.g. `POPQUEUE_BROKER__PORT=6390`.
pub const ENV_PREFIX: &str = "POPQUEUE";

/// Loads `config/default.*` (if present) and environment overrides, merged
/// over the default settings.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit base file. The file is optional;
/// its format is picked from the extension.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::from(path.as_ref()).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}

#[cfg(test)]
mod tests;
