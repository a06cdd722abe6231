use field_dispatch::{
    app_state::AppState,
    config::AppConfig,
    services::{
        agent::{follow_active_job, AgentExit, PollIntervals},
        geolocation::LocationSupervisor,
        position::RoutePositionSource,
    },
    shutdown,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    field_dispatch::init_tracing();

    tracing::info!("Starting field dispatch tracker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    if let Some(addr) = &config.metrics_addr {
        let addr: SocketAddr = addr.parse().expect("METRICS_ADDR must be host:port");
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .expect("Failed to install Prometheus exporter");
        tracing::info!(%addr, "Serving Prometheus metrics");
    }

    field_dispatch::describe_metrics();

    let state = AppState::from_config(&config).expect("Failed to initialize client");
    if !state.client.session().is_authenticated() {
        tracing::error!("Not logged in, run `field-dispatch login` first");
        std::process::exit(1);
    }

    let source = match &config.route_waypoints {
        Some(route) => RoutePositionSource::parse(route)
            .expect("Invalid ROUTE_WAYPOINTS")
            .with_leg_duration(config.location_interval()),
        None => {
            tracing::error!("ROUTE_WAYPOINTS is required to report the device position");
            std::process::exit(1);
        }
    };

    let shutdown = shutdown::install_shutdown_handler();
    let supervisor = LocationSupervisor::new(
        state.client.clone(),
        Arc::new(source),
        config.location_interval(),
    )
    .spawn(state.tracker.subscribe(), shutdown.clone());

    tracing::info!(
        refresh_secs = config.refresh_interval_secs,
        location_secs = config.location_interval_secs,
        "Tracker ready, following active job"
    );

    let intervals = PollIntervals {
        refresh: config.refresh_interval(),
        location: config.location_interval(),
    };
    match follow_active_job(&state.tracker, intervals, &shutdown).await {
        AgentExit::Shutdown => {}
        AgentExit::JobFinished => tracing::info!("Tracker exiting after job completion"),
        AgentExit::Refused(e) => tracing::error!(error = %e, "Tracker exiting"),
    }

    shutdown.cancel();
    if let Err(e) = supervisor.await {
        tracing::error!(error = %e, "Location supervisor failed");
    }
    tracing::info!("Tracker stopped");
}
