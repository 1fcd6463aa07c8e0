use anyhow::Result;
use clap::Parser;
use prometheus_client::registry::Registry;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use llm_gateway::config::Settings;
use llm_gateway::metrics::{self, GatewayMetrics};
use llm_gateway::router;
use llm_gateway::state::GatewayState;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
	/// Port the metrics (`/metrics`) listener binds to, separate from the API port.
	#[arg(long, value_name = "port", default_value_t = 9090)]
	metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
	// LOG_LEVEL is this gateway's documented knob; RUST_LOG (read by
	// EnvFilter::from_default_env) still wins when both are set.
	let default_directive = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)))
		.with_writer(std::io::stderr)
		.with_ansi(false)
		.init();

	let args = Args::parse();
	let settings = Settings::from_env()?;

	let mut registry = Registry::default();
	let gateway_metrics = GatewayMetrics::new(&mut registry);

	let host = settings.host.clone();
	let port = settings.port;
	let state = GatewayState::build(settings, gateway_metrics).await?;

	let mut run_set = JoinSet::new();

	let app = router::app(state);
	let api_listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
	run_set.spawn(async move {
		axum::serve(
			api_listener,
			app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
		)
		.await
	});

	let metrics_router = metrics::router(std::sync::Arc::new(registry));
	let metrics_listener = tokio::net::TcpListener::bind(("0.0.0.0", args.metrics_port)).await?;
	run_set.spawn(async move { axum::serve(metrics_listener, metrics_router).await });

	while let Some(result) = run_set.join_next().await {
		result??;
	}
	Ok(())
}
