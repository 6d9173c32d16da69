use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub queue: QueueSettings,
    pub log: LogSettings,
    pub producer: ProducerSettings,
}

/// Bind address of the development broker.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Where the queue finds its broker and how its connection pool behaves.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    /// Upper bound on pooled request connections. Subscriptions use their
    /// own dedicated connections and do not count against it.
    pub pool_size: usize,
    /// Connections dialed up front when the queue is created.
    pub min_idle: usize,
    pub dial_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

/// Subscription delivery policy.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct QueueSettings {
    /// Capacity of each subscription's output channel.
    pub buffer_capacity: usize,
    /// How long the delivery task waits for buffer room before dropping.
    pub delivery_timeout_ms: u64,
    /// Bound on the subscribe handshake.
    pub confirm_timeout_ms: u64,
    /// Ends a subscription that has not handed a message to its consumer
    /// for this long. Unset disables the check.
    pub idle_timeout_secs: Option<u64>,
    /// Hard cap on the lifetime of a subscription. Unset disables it.
    pub max_lifetime_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
}

/// Periodic producer loop run by the `produce` command.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProducerSettings {
    pub topic: String,
    pub interval_secs: u64,
}

impl BrokerSettings {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl QueueSettings {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_secs.map(Duration::from_secs)
    }
}

impl ProducerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Partial configuration loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub queue: Option<PartialQueueSettings>,
    pub log: Option<PartialLogSettings>,
    pub producer: Option<PartialProducerSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub pool_size: Option<usize>,
    pub min_idle: Option<usize>,
    pub dial_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialQueueSettings {
    pub buffer_capacity: Option<usize>,
    pub delivery_timeout_ms: Option<u64>,
    pub confirm_timeout_ms: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub max_lifetime_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
    pub json: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialProducerSettings {
    pub topic: Option<String>,
    pub interval_secs: Option<u64>,
}

impl PartialSettings {
    /// Merges the loaded values over `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let broker = self.broker.unwrap_or_default();
        let queue = self.queue.unwrap_or_default();
        let log = self.log.unwrap_or_default();
        let producer = self.producer.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(defaults.server.host),
                port: server.port.unwrap_or(defaults.server.port),
            },
            broker: BrokerSettings {
                host: broker.host.unwrap_or(defaults.broker.host),
                port: broker.port.unwrap_or(defaults.broker.port),
                pool_size: broker.pool_size.unwrap_or(defaults.broker.pool_size),
                min_idle: broker.min_idle.unwrap_or(defaults.broker.min_idle),
                dial_timeout_ms: broker
                    .dial_timeout_ms
                    .unwrap_or(defaults.broker.dial_timeout_ms),
                read_timeout_ms: broker
                    .read_timeout_ms
                    .unwrap_or(defaults.broker.read_timeout_ms),
                write_timeout_ms: broker
                    .write_timeout_ms
                    .unwrap_or(defaults.broker.write_timeout_ms),
            },
            queue: QueueSettings {
                buffer_capacity: queue
                    .buffer_capacity
                    .unwrap_or(defaults.queue.buffer_capacity),
                delivery_timeout_ms: queue
                    .delivery_timeout_ms
                    .unwrap_or(defaults.queue.delivery_timeout_ms),
                confirm_timeout_ms: queue
                    .confirm_timeout_ms
                    .unwrap_or(defaults.queue.confirm_timeout_ms),
                idle_timeout_secs: queue.idle_timeout_secs.or(defaults.queue.idle_timeout_secs),
                max_lifetime_secs: queue.max_lifetime_secs.or(defaults.queue.max_lifetime_secs),
            },
            log: LogSettings {
                level: log.level.unwrap_or(defaults.log.level),
                json: log.json.unwrap_or(defaults.log.json),
            },
            producer: ProducerSettings {
                topic: producer.topic.unwrap_or(defaults.producer.topic),
                interval_secs: producer
                    .interval_secs
                    .unwrap_or(defaults.producer.interval_secs),
            },
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            pool_size: 10,
            min_idle: 2,
            dial_timeout_ms: 5_000,
            read_timeout_ms: 3_000,
            write_timeout_ms: 3_000,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: 100,
            delivery_timeout_ms: 1_000,
            confirm_timeout_ms: 5_000,
            idle_timeout_secs: None,
            max_lifetime_secs: None,
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            broker: BrokerSettings::default(),
            queue: QueueSettings::default(),
            log: LogSettings {
                level: "info".to_string(),
                json: false,
            },
            producer: ProducerSettings {
                topic: "scraper_events".to_string(),
                interval_secs: 3_600,
            },
        }
    }
}
