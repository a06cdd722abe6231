use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

/// A single device position reading pushed to the backend while en route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LocationSample {
    #[garde(custom(finite), range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[garde(custom(finite), range(min = -180.0, max = 180.0))]
    pub longitude: f64,

    /// Degrees clockwise from true north, in `[0, 360)`.
    #[garde(custom(compass_bearing))]
    pub heading: Option<f64>,

    /// Metres per second.
    #[garde(custom(finite_if_present), range(min = 0.0))]
    pub speed: Option<f64>,

    #[serde(skip)]
    #[garde(skip)]
    pub captured_at: Option<DateTime<Utc>>,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            heading: None,
            speed: None,
            captured_at: Some(Utc::now()),
        }
    }

    pub fn with_motion(mut self, heading: f64, speed: f64) -> Self {
        self.heading = Some(heading);
        self.speed = Some(speed);
        self
    }
}

// NaN slips through range checks and serializes as `null`.
fn finite(value: &f64, _: &()) -> garde::Result {
    if value.is_finite() {
        Ok(())
    } else {
        Err(garde::Error::new("must be a finite number"))
    }
}

fn finite_if_present(value: &Option<f64>, ctx: &()) -> garde::Result {
    value.as_ref().map_or(Ok(()), |v| finite(v, ctx))
}

fn compass_bearing(value: &Option<f64>, ctx: &()) -> garde::Result {
    let Some(heading) = value else {
        return Ok(());
    };
    finite(heading, ctx)?;
    if (0.0..360.0).contains(heading) {
        Ok(())
    } else {
        Err(garde::Error::new("heading must be in [0, 360)"))
    }
}
