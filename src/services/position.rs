use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::models::location::LocationSample;

/// The device positioning API.
pub trait PositionSource: Send + Sync + 'static {
    fn current_position(&self) -> impl Future<Output = Result<LocationSample, PositionError>> + Send;
}

/// Replays a fixed list of waypoints, one per reading, then stays parked on
/// the last one. Stands in for a GPS receiver when running the agent.
///
/// With a leg duration each hop is assumed to take that long, which gives
/// the reported speed; otherwise speed is left unset.
pub struct RoutePositionSource {
    waypoints: Vec<(f64, f64)>,
    cursor: AtomicUsize,
    leg_duration: Option<Duration>,
}

impl RoutePositionSource {
    pub fn new(waypoints: Vec<(f64, f64)>) -> Result<Self, PositionError> {
        if waypoints.is_empty() {
            return Err(PositionError::Unavailable("route has no waypoints".to_string()));
        }
        Ok(Self {
            waypoints,
            cursor: AtomicUsize::new(0),
            leg_duration: None,
        })
    }

    pub fn fixed(latitude: f64, longitude: f64) -> Self {
        Self {
            waypoints: vec![(latitude, longitude)],
            cursor: AtomicUsize::new(0),
            leg_duration: None,
        }
    }

    pub fn with_leg_duration(mut self, leg: Duration) -> Self {
        self.leg_duration = Some(leg).filter(|leg| !leg.is_zero());
        self
    }

    /// Parse `"lat,lon;lat,lon;..."`.
    pub fn parse(route: &str) -> Result<Self, PositionError> {
        let waypoints = route
            .split(';')
            .map(str::trim)
            .filter(|point| !point.is_empty())
            .map(|point| {
                let (lat, lon) = point
                    .split_once(',')
                    .ok_or_else(|| PositionError::InvalidRoute(point.to_string()))?;
                let lat = lat.trim().parse::<f64>();
                let lon = lon.trim().parse::<f64>();
                match (lat, lon) {
                    (Ok(lat), Ok(lon)) => Ok((lat, lon)),
                    _ => Err(PositionError::InvalidRoute(point.to_string())),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(waypoints)
    }
}

impl PositionSource for RoutePositionSource {
    async fn current_position(&self) -> Result<LocationSample, PositionError> {
        let last = self.waypoints.len() - 1;
        let index = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1).min(last)))
            .unwrap_or(last);

        let (lat, lon) = self.waypoints[index];
        let mut sample = LocationSample::new(lat, lon);
        let next = self.waypoints.get(index + 1).copied();
        sample.heading = next.map(|next| bearing_degrees((lat, lon), next));
        sample.speed = self.leg_duration.map(|leg| match next {
            Some(next) => haversine_metres((lat, lon), next) / leg.as_secs_f64(),
            None => 0.0,
        });
        Ok(sample)
    }
}

/// Initial great-circle bearing from `from` to `to`, in [0, 360).
fn bearing_degrees(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lat2) = (from.0.to_radians(), to.0.to_radians());
    let delta_lon = (to.1 - from.1).to_radians();
    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

const EARTH_RADIUS_M: f64 = 6_371_000.0;

fn haversine_metres(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lat2) = (from.0.to_radians(), to.0.to_radians());
    let delta_lat = lat2 - lat1;
    let delta_lon = (to.1 - from.1).to_radians();
    let a = (delta_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

#[derive(Debug, thiserror::Error)]
pub enum PositionError {
    #[error("Position unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid route waypoint: {0:?}")]
    InvalidRoute(String),
}
