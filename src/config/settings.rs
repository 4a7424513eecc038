use serde::Deserialize;

use crate::codec::Codec;

/// Top-level configuration settings for the application.
///
/// Groups the broker connection, the dispatcher tuning and logging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub dispatch: DispatchSettings,
    pub logging: LoggingSettings,
}

/// Which broker implementation to connect to.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BrokerBackend {
    /// In-process broker; publishers and subscribers must share the process.
    Memory,
    Nats,
}

/// Configuration settings for the broker connection.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub backend: BrokerBackend,
    pub url: String,
    /// Per-channel buffer of the memory backend.
    pub channel_capacity: usize,
}

/// What cancelling a subscription waits for.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    /// Wait for the subscription's in-flight handler calls before reporting
    /// it closed.
    #[default]
    Graceful,
    /// Report closed at once; running handler calls finish on their own.
    Immediate,
}

/// Configuration settings for message dispatch.
///
/// `max_in_flight` bounds concurrent handler invocations per topic; `0`
/// removes the bound.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DispatchSettings {
    pub codec: Codec,
    pub max_in_flight: usize,
    pub shutdown: ShutdownMode,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from
/// `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub dispatch: Option<PartialDispatchSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub backend: Option<BrokerBackend>,
    pub url: Option<String>,
    pub channel_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialDispatchSettings {
    pub codec: Option<Codec>,
    pub max_in_flight: Option<usize>,
    pub shutdown: Option<ShutdownMode>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            backend: BrokerBackend::Nats,
            url: "nats://127.0.0.1:4222".to_string(),
            channel_capacity: 1024,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            codec: Codec::Bincode,
            max_in_flight: 256,
            shutdown: ShutdownMode::Graceful,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            dispatch: DispatchSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `Settings::default()`.
    pub fn merge_with_defaults(self) -> Settings {
        let default = Settings::default();

        Settings {
            broker: BrokerSettings {
                backend: self
                    .broker
                    .as_ref()
                    .and_then(|b| b.backend)
                    .unwrap_or(default.broker.backend),
                url: self
                    .broker
                    .as_ref()
                    .and_then(|b| b.url.clone())
                    .unwrap_or(default.broker.url),
                channel_capacity: self
                    .broker
                    .as_ref()
                    .and_then(|b| b.channel_capacity)
                    .unwrap_or(default.broker.channel_capacity),
            },
            dispatch: DispatchSettings {
                codec: self
                    .dispatch
                    .as_ref()
                    .and_then(|d| d.codec)
                    .unwrap_or(default.dispatch.codec),
                max_in_flight: self
                    .dispatch
                    .as_ref()
                    .and_then(|d| d.max_in_flight)
                    .unwrap_or(default.dispatch.max_in_flight),
                shutdown: self
                    .dispatch
                    .as_ref()
                    .and_then(|d| d.shutdown)
                    .unwrap_or(default.dispatch.shutdown),
            },
            logging: LoggingSettings {
                level: self
                    .logging
                    .and_then(|l| l.level)
                    .unwrap_or(default.logging.level),
            },
        }
    }
}
