//! connection config
//!
//! Shared by the listener and the publisher workers of the connection manager.

use std::time::Duration;

/// default bolt server host
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
/// default bolt server port
pub const DEFAULT_SERVER_PORT: u16 = 5200;
/// default bolt sink host
pub const DEFAULT_SINK_HOST: &str = "127.0.0.1";
/// default bolt sink port
pub const DEFAULT_SINK_PORT: u16 = 5201;
/// default subscribed topic
pub const DEFAULT_TOPIC: &str = "Test";

/// Connection manager config.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// bolt server host the listener connects to
    pub server_host: String,
    /// bolt server port the listener connects to
    pub server_port: u16,
    /// topics announced in the handshake
    pub subscribe_topics: Vec<String>,
    /// host identity announced in the handshake
    pub client_host: String,
    /// bolt sink host the publisher connects to
    pub sink_host: String,
    /// bolt sink port the publisher connects to
    pub sink_port: u16,
    /// timeout of a single connect attempt
    pub connect_timeout: Duration,
    /// max reconnect retries after the first attempt
    pub max_retries: u32,
    /// initial retry delay
    pub retry_delay: Duration,
    /// max retry delay
    pub max_retry_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            subscribe_topics: vec![DEFAULT_TOPIC.to_string()],
            client_host: local_hostname(),
            sink_host: DEFAULT_SINK_HOST.to_string(),
            sink_port: DEFAULT_SINK_PORT,
            connect_timeout: Duration::from_secs(10),
            max_retries: 5,
            retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

impl ConnectionConfig {
    /// create new config with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// set bolt server address.
    pub fn with_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.server_host = host.into();
        self.server_port = port;
        self
    }

    /// set bolt sink address.
    pub fn with_sink(mut self, host: impl Into<String>, port: u16) -> Self {
        self.sink_host = host.into();
        self.sink_port = port;
        self
    }

    /// set subscribed topics.
    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscribe_topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// set client host identity.
    pub fn with_client_host(mut self, host: impl Into<String>) -> Self {
        self.client_host = host.into();
        self
    }

    /// set connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// set retry_config
    pub fn with_retry_config(
        mut self,
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = base_delay;
        self.max_retry_delay = max_delay;
        self
    }

    /// `host:port` of the bolt server.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// `host:port` of the bolt sink.
    pub fn sink_addr(&self) -> String {
        format!("{}:{}", self.sink_host, self.sink_port)
    }

    /// Handshake sent once per listener connection: `<topics>:<client host>`.
    pub fn handshake(&self) -> String {
        format!("{}:{}", self.subscribe_topics.join(","), self.client_host)
    }
}

/// Best-effort hostname of this machine.
pub fn local_hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|name| !name.is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}
