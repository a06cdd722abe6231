//! Field technician dispatch client
//!
//! Client-side core of the technician app of an assistance-dispatch
//! service: accepting open jobs, driving the active job through its
//! lifecycle, and reporting live location while en route. The dispatch
//! backend is reached over its REST API.

pub mod app_state;
pub mod config;
pub mod models;
pub mod services;
pub mod shutdown;

/// Structured JSON logs on stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();
}

/// Help text for every counter the crate emits.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "dispatch_transitions_total",
        "Lifecycle transitions accepted by the backend"
    );
    metrics::describe_counter!(
        "dispatch_transition_failures_total",
        "Lifecycle transitions that failed"
    );
    metrics::describe_counter!("dispatch_accept_total", "Job acceptance attempts, by outcome");
    metrics::describe_counter!("location_samples_sent_total", "Location samples pushed");
    metrics::describe_counter!(
        "location_samples_failed_total",
        "Location samples that could not be read or pushed"
    );
}
