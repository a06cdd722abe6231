//! Live location reporting while the technician is en route.
//!
//! [`LocationSampler::start`] returns a [`SamplerHandle`]; sampling runs until
//! the handle is stopped or dropped. Each sample is pushed fire-and-forget,
//! but pushes still in flight are aborted when the sampler stops, so nothing
//! reaches the backend after [`SamplerHandle::stop`] returns.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::models::job::JobStatus;
use crate::services::api::DispatchApi;
use crate::services::position::PositionSource;

pub struct LocationSampler;

impl LocationSampler {
    /// Start sampling now and then every `interval`.
    pub fn start<A, P>(api: Arc<A>, source: Arc<P>, interval: Duration) -> SamplerHandle
    where
        A: DispatchApi,
        P: PositionSource,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_sampler(api, source, interval, cancel.clone()));
        SamplerHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Running sampler. Dropping it stops sampling as well.
pub struct SamplerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    /// Stop sampling and wait until in-flight pushes are gone.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Location sampler task failed");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_sampler<A, P>(api: Arc<A>, source: Arc<P>, interval: Duration, cancel: CancellationToken)
where
    A: DispatchApi,
    P: PositionSource,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pushes = JoinSet::new();

    tracing::debug!(interval_secs = interval.as_secs_f64(), "Location sampling started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                pushes.spawn(sample_and_push(api.clone(), source.clone()));
            }
            Some(joined) = pushes.join_next(), if !pushes.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Location push task failed");
                }
            }
        }
    }

    pushes.abort_all();
    while pushes.join_next().await.is_some() {}

    tracing::debug!("Location sampling stopped");
}

async fn sample_and_push<A, P>(api: Arc<A>, source: Arc<P>)
where
    A: DispatchApi,
    P: PositionSource,
{
    let sample = match source.current_position().await {
        Ok(sample) => sample,
        Err(e) => {
            metrics::counter!("location_samples_failed_total").increment(1);
            tracing::warn!(error = %e, "Could not read device position");
            return;
        }
    };

    match api.push_location(&sample).await {
        Ok(()) => {
            metrics::counter!("location_samples_sent_total").increment(1);
            tracing::debug!(
                latitude = sample.latitude,
                longitude = sample.longitude,
                captured_at = ?sample.captured_at,
                "Location sample sent"
            );
        }
        Err(e) => {
            metrics::counter!("location_samples_failed_total").increment(1);
            tracing::warn!(
                error = %e,
                captured_at = ?sample.captured_at,
                "Location sample dropped"
            );
        }
    }
}

/// Keeps a sampler running exactly while the tracked job is en route.
pub struct LocationSupervisor<A, P> {
    api: Arc<A>,
    source: Arc<P>,
    interval: Duration,
}

impl<A: DispatchApi, P: PositionSource> LocationSupervisor<A, P> {
    pub fn new(api: Arc<A>, source: Arc<P>, interval: Duration) -> Self {
        Self {
            api,
            source,
            interval,
        }
    }

    pub fn spawn(
        self,
        status: watch::Receiver<Option<JobStatus>>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(status, shutdown))
    }

    /// Follow `status` until shutdown or until its sender goes away.
    pub async fn run(
        self,
        mut status: watch::Receiver<Option<JobStatus>>,
        shutdown: CancellationToken,
    ) {
        let mut sampler: Option<SamplerHandle> = None;

        loop {
            let en_route = *status.borrow_and_update() == Some(JobStatus::EnRoute);

            if en_route && sampler.is_none() {
                tracing::info!("Job en route, starting location sampling");
                sampler = Some(LocationSampler::start(
                    self.api.clone(),
                    self.source.clone(),
                    self.interval,
                ));
            } else if !en_route {
                if let Some(handle) = sampler.take() {
                    handle.stop().await;
                    tracing::info!("Job left en route, location sampling stopped");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if let Some(handle) = sampler.take() {
            handle.stop().await;
        }
    }
}
