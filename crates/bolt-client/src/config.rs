use std::path::PathBuf;
use std::time::Duration;

use bolt_comm::config::DEFAULT_SERVER_HOST;
use bolt_comm::config::DEFAULT_SERVER_PORT;
use bolt_comm::config::DEFAULT_SINK_HOST;
use bolt_comm::config::DEFAULT_SINK_PORT;
use bolt_comm::config::DEFAULT_TOPIC;
use bolt_comm::ConnectionConfig;
use clap::Parser;
use utils::version;

#[derive(Parser, Debug, Clone)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[arg(
        long,
        env = "BOLT_SERVER_HOST",
        default_value = DEFAULT_SERVER_HOST,
        help = "Host of the bolt server to subscribe to"
    )]
    pub server_host: String,

    #[arg(
        long,
        env = "BOLT_SERVER_PORT",
        default_value_t = DEFAULT_SERVER_PORT,
        help = "Port of the bolt server to subscribe to"
    )]
    pub server_port: u16,

    #[arg(
        long,
        env = "BOLT_SUBSCRIBE_TOPICS",
        value_delimiter = ',',
        default_value = DEFAULT_TOPIC,
        help = "Comma-separated topics announced in the handshake"
    )]
    pub subscribe_topics: Vec<String>,

    #[arg(
        long,
        env = "BOLT_SINK_HOST",
        default_value = DEFAULT_SINK_HOST,
        help = "Host of the bolt sink the publisher writes to"
    )]
    pub sink_host: String,

    #[arg(
        long,
        env = "BOLT_SINK_PORT",
        default_value_t = DEFAULT_SINK_PORT,
        help = "Port of the bolt sink the publisher writes to"
    )]
    pub sink_port: u16,

    #[arg(
        long,
        env = "BOLT_CLIENT_HOST",
        help = "Host identity announced in the handshake, defaults to the local hostname"
    )]
    pub client_host: Option<String>,

    #[arg(
        long,
        env = "BOLT_ENABLE_PUBLISHER",
        help = "Open the publisher connection and send the metric snapshot on shutdown",
        default_value_t = false
    )]
    pub enable_publisher: bool,

    #[arg(
        long,
        env = "BOLT_CONNECT_TIMEOUT",
        default_value = "10",
        value_parser = parse_seconds,
        help = "Timeout of a single connect attempt, in seconds"
    )]
    pub connect_timeout: Duration,

    #[arg(
        long,
        env = "BOLT_MAX_RETRIES",
        default_value_t = 5,
        help = "Reconnect attempts before a connection is considered lost"
    )]
    pub max_retries: u32,

    #[arg(
        long = "sampling-interval",
        value_name = "COLLECTOR=SECS",
        value_parser = parse_sampling_interval,
        help = "Override the sampling interval of one collector, e.g. cpu=1"
    )]
    pub sampling_intervals: Vec<(String, Duration)>,

    #[arg(
        long,
        env = "BOLT_COLLECTORS",
        value_delimiter = ',',
        help = "Comma-separated collectors to run, all built-in collectors when empty"
    )]
    pub collectors: Vec<String>,

    #[arg(long, help = "Do not run the metric sampling service", default_value_t = false)]
    pub disable_sampling: bool,

    #[arg(
        long,
        env = "BOLT_LOG_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "Also write logs to this file, rotated daily"
    )]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn connection_config(&self) -> ConnectionConfig {
        let defaults = ConnectionConfig::default();
        let config = ConnectionConfig::new()
            .with_server(self.server_host.clone(), self.server_port)
            .with_sink(self.sink_host.clone(), self.sink_port)
            .with_topics(self.subscribe_topics.iter().map(|topic| topic.trim().to_string()))
            .with_connect_timeout(self.connect_timeout)
            .with_retry_config(self.max_retries, defaults.retry_delay, defaults.max_retry_delay);

        match &self.client_host {
            Some(host) => config.with_client_host(host.clone()),
            None => config,
        }
    }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid number of seconds '{value}': {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration '{value}': {e}"))
}

fn parse_sampling_interval(value: &str) -> Result<(String, Duration), String> {
    let (name, secs) = value
        .split_once('=')
        .ok_or_else(|| format!("expected COLLECTOR=SECS, got '{value}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing collector name in '{value}'"));
    }
    Ok((name.to_string(), parse_seconds(secs)?))
}
