//! Wires the connection manager, the plugin router and the sampling service
//! together and drives them until a shutdown signal arrives or the listener
//! gives up reconnecting.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use bolt_comm::ConnectionManager;
use bolt_comm::MessageRouter;
use bolt_comm::PluginRegistry;
use bolt_metrics::CollectorRegistry;
use bolt_metrics::MetricSamplingService;
use bolt_metrics::MetricSnapshot;

use crate::config::Cli;
use crate::plugins;

pub async fn run(cli: Cli) -> Result<()> {
    serve(cli, plugins::builtin_registry(), wait_for_shutdown_signal()).await
}

async fn serve<R, S>(cli: Cli, plugins: R, shutdown: S) -> Result<()>
where
    R: PluginRegistry + 'static,
    S: Future<Output = Result<()>>,
{
    let router = MessageRouter::new(plugins);
    let mut manager = ConnectionManager::new(cli.connection_config());
    manager.register_handler(Arc::new(router));
    manager
        .start(cli.enable_publisher)
        .map_err(|e| anyhow::anyhow!("Failed to start connection manager: {e:?}"))?;

    let mut sampling = (!cli.disable_sampling).then(|| sampling_service(&cli));
    if let Some(service) = sampling.as_mut() {
        service.start();
    }

    let signal_result = tokio::select! {
        result = shutdown => result,
        _ = manager.listener_exited() => {
            tracing::error!("Bolt listener exited, initiating shutdown");
            Ok(())
        }
    };

    if let Some(mut service) = sampling.take() {
        let snapshot = service.stop().await;
        if let Err(e) = publish_snapshot(&manager, &snapshot).await {
            tracing::error!("Failed to publish metric snapshot: {e:?}");
        }
    }

    manager
        .stop()
        .await
        .map_err(|e| anyhow::anyhow!("Connection manager stopped with error: {e:?}"))?;
    tracing::info!("Bolt client stopped");

    signal_result
}

fn sampling_service(cli: &Cli) -> MetricSamplingService {
    let mut registry = CollectorRegistry::builtin();
    if !cli.collectors.is_empty() {
        registry.retain_enabled(cli.collectors.as_slice());
    }
    let service = MetricSamplingService::from_registry(&registry);
    cli.sampling_intervals
        .iter()
        .fold(service, |service, (name, interval)| {
            service.with_sampling_interval(name.clone(), *interval)
        })
}

async fn publish_snapshot(manager: &ConnectionManager, snapshot: &MetricSnapshot) -> Result<()> {
    let Some(publisher) = manager.publisher() else {
        tracing::debug!("Publisher disabled, snapshot not sent");
        return Ok(());
    };

    let body = serde_json::to_vec(snapshot).context("serialize metric snapshot")?;
    tracing::info!(
        series = snapshot.len(),
        samples = snapshot.sample_count(),
        bytes = body.len(),
        "Publishing metric snapshot"
    );
    publisher
        .publish(body)
        .await
        .map_err(|e| anyhow::anyhow!("publish metric snapshot: {e:?}"))
}

/// Resolves on SIGTERM or SIGINT.
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::signal;
        use tokio::signal::unix::SignalKind;

        let mut sigterm = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("install SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("install Ctrl+C handler")?;
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bolt_comm::ConnectionConfig;
    use bolt_comm::Payload;
    use bolt_comm::PluginExecutor;
    use bolt_comm::PluginFactory;
    use bolt_comm::StaticPluginRegistry;
    use bolt_metrics::Collector;
    use bolt_metrics::CollectorDefinition;
    use bolt_metrics::CollectorError;
    use bolt_metrics::MetricRecorder;
    use clap::Parser;
    use similar_asserts::assert_eq;
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[test]
    fn sampling_service_covers_builtin_collectors() {
        let cli = Cli::try_parse_from(["bolt-client", "--sampling-interval", "cpu=1"]).expect("parse");
        let service = sampling_service(&cli);

        let names: Vec<&str> = service.collectors().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["cpu", "memory"]);
        assert!(!service.is_running());
    }

    #[test]
    fn collector_selection_limits_the_service() {
        let cli = Cli::try_parse_from(["bolt-client", "--collectors", "memory"]).expect("parse");
        let service = sampling_service(&cli);

        let names: Vec<&str> = service.collectors().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["memory"]);
    }

    #[test_log::test(tokio::test)]
    async fn lost_connection_ends_the_client() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let port = port.to_string();
        let cli = Cli::try_parse_from([
            "bolt-client",
            "--server-port",
            port.as_str(),
            "--max-retries",
            "1",
            "--connect-timeout",
            "1",
            "--disable-sampling",
        ])
        .expect("parse");

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            serve(cli, plugins::builtin_registry(), std::future::pending()),
        )
        .await
        .expect("client exits without a signal");
        let err = outcome.expect_err("connection error surfaces");
        assert!(format!("{err}").contains("Connection manager stopped with error"));
    }

    /// Blocks for a long time on every payload.
    struct SlowPlugin;

    impl PluginExecutor for SlowPlugin {
        fn handle_payload(
            &mut self,
            _payload: &Payload,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            std::thread::sleep(Duration::from_millis(1500));
            Ok(())
        }
    }

    struct Counter {
        recorder: MetricRecorder,
    }

    impl Collector for Counter {
        fn recorder(&self) -> &MetricRecorder {
            &self.recorder
        }

        fn recorder_mut(&mut self) -> &mut MetricRecorder {
            &mut self.recorder
        }

        fn start_sampling(&mut self) -> Result<(), CollectorError> {
            self.recorder.record_now("x", 1.0);
            Ok(())
        }
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 1))]
    async fn slow_plugin_does_not_stall_sampling() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let config = ConnectionConfig::new()
            .with_server("127.0.0.1", port)
            .with_client_host("test-host");

        let registry =
            StaticPluginRegistry::new().with(PluginFactory::with_executor("slow", || SlowPlugin));
        let mut manager = ConnectionManager::new(config);
        manager.register_handler(Arc::new(MessageRouter::new(registry)));
        manager.start(false).expect("start");
        let (mut server_side, _) = listener.accept().await.expect("accept");

        let collectors = CollectorRegistry::new().with(CollectorDefinition::sampler("t", || {
            Counter {
                recorder: MetricRecorder::with_interval("t", Duration::from_millis(100)),
            }
        }));
        let mut sampling = MetricSamplingService::from_registry(&collectors);
        sampling.start();

        server_side
            .write_all(br#"{"id":"1","payload":{"plugin_name":"slow"}}"#)
            .await
            .expect("send");
        tokio::time::sleep(Duration::from_millis(1050)).await;
        let snapshot = sampling.stop().await;

        let samples = snapshot.get("t.x").map_or(0, |series| series.len());
        assert!(samples >= 8, "sampling stalled: {samples} samples");

        manager.stop().await.expect("clean stop");
    }

    #[test_log::test(tokio::test)]
    async fn snapshot_not_sent_without_publisher() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        let mut service = MetricSamplingService::new(Vec::new());
        service.start();
        let snapshot = service.stop().await;

        publish_snapshot(&manager, &snapshot).await.expect("no-op");
    }
}
