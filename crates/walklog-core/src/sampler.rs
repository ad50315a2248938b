//! Decides which position fixes become recorded waypoints.
//!
//! A fix is kept when it is the first of the session, when the recording
//! interval has passed since the last kept fix, or when the walker moved far
//! enough. Fixes arriving faster than the minimum interval are always
//! dropped, which bounds the write rate no matter how noisy the provider is.
//!
//! Movement only counts when it exceeds the fix's own accuracy radius, so a
//! stationary device with a wobbling error circle does not record points.
//!
//! Distances and elapsed times are measured against the last *accepted*
//! fix using its raw, unrounded coordinates. Rounding only applies to what
//! gets stored.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use walklog_types::{Fix, GeoPoint, haversine_distance};

use crate::error::{Error, Result};

/// Thresholds for accepting fixes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Fixes closer together than this are dropped, in seconds.
    pub min_interval_secs: f64,
    /// A fix is kept once this many seconds have passed, in seconds.
    pub record_interval_secs: f64,
    /// A fix is kept once the walker moved this far, in meters.
    pub record_distance_m: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 5.0,
            record_interval_secs: 60.0,
            record_distance_m: 20.0,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<()> {
        let all_finite = [
            self.min_interval_secs,
            self.record_interval_secs,
            self.record_distance_m,
        ]
        .iter()
        .all(|v| v.is_finite() && *v >= 0.0);
        if !all_finite {
            return Err(Error::InvalidConfig(
                "sampler thresholds must be finite and non-negative".to_string(),
            ));
        }
        if self.min_interval_secs > self.record_interval_secs {
            return Err(Error::InvalidConfig(format!(
                "min_interval_secs ({}) must not exceed record_interval_secs ({})",
                self.min_interval_secs, self.record_interval_secs
            )));
        }
        Ok(())
    }
}

/// The last accepted fix, unrounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub point: GeoPoint,
    pub time: OffsetDateTime,
}

impl From<&Fix> for Anchor {
    fn from(fix: &Fix) -> Self {
        Self {
            point: fix.point(),
            time: fix.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptReason {
    /// Nothing was accepted yet in this session.
    First,
    IntervalElapsed,
    Moved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Arrived within the minimum interval, or before the last accepted fix.
    TooSoon,
    /// Neither the recording interval nor the recording distance was reached,
    /// or the movement was within the fix's accuracy radius.
    NotMoved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept(AcceptReason),
    Reject(RejectReason),
}

impl Decision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept(_))
    }
}

/// Outcome of evaluating one fix.
///
/// `elapsed_secs` and `distance_m` are zero for the first fix of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub decision: Decision,
    pub elapsed_secs: f64,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Sampler {
    config: SamplerConfig,
}

impl Sampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Evaluate `fix` against the last accepted fix. Pure; the caller updates the anchor.
    pub fn evaluate(&self, fix: &Fix, last: Option<&Anchor>) -> Evaluation {
        let Some(last) = last else {
            return Evaluation {
                decision: Decision::Accept(AcceptReason::First),
                elapsed_secs: 0.0,
                distance_m: 0.0,
            };
        };

        let elapsed_secs = (fix.timestamp - last.time).as_seconds_f64();
        let distance_m = haversine_distance(&last.point, &fix.point());

        let decision = if elapsed_secs < 0.0 || elapsed_secs < self.config.min_interval_secs {
            Decision::Reject(RejectReason::TooSoon)
        } else if elapsed_secs >= self.config.record_interval_secs {
            Decision::Accept(AcceptReason::IntervalElapsed)
        } else if distance_m >= self.config.record_distance_m && distance_m > fix.accuracy {
            Decision::Accept(AcceptReason::Moved)
        } else {
            Decision::Reject(RejectReason::NotMoved)
        };

        Evaluation {
            decision,
            elapsed_secs,
            distance_m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const T0: i64 = 1_700_000_000;

    fn fix_at(lat: f64, lng: f64, secs: i64) -> Fix {
        fix_acc(lat, lng, 5.0, secs)
    }

    fn fix_acc(lat: f64, lng: f64, accuracy: f64, secs: i64) -> Fix {
        let ts = OffsetDateTime::from_unix_timestamp(T0 + secs).unwrap();
        Fix::new(lat, lng, accuracy, ts)
    }

    fn meters_north(m: f64) -> f64 {
        (m / walklog_types::geo::EARTH_RADIUS_M).to_degrees()
    }

    fn anchor(lat: f64, lng: f64, secs: i64) -> Anchor {
        Anchor::from(&fix_at(lat, lng, secs))
    }

    #[test]
    fn test_first_fix_accepted() {
        let sampler = Sampler::default();
        let eval = sampler.evaluate(&fix_at(35.0, 135.0, 0), None);
        assert_eq!(eval.decision, Decision::Accept(AcceptReason::First));
        assert_eq!(eval.elapsed_secs, 0.0);
    }

    #[test]
    fn test_too_soon_even_if_far() {
        let sampler = Sampler::default();
        let last = anchor(35.0, 135.0, 0);
        let eval = sampler.evaluate(&fix_at(35.0 + meters_north(500.0), 135.0, 3), Some(&last));
        assert_eq!(eval.decision, Decision::Reject(RejectReason::TooSoon));
    }

    #[test]
    fn test_moved_enough() {
        let sampler = Sampler::default();
        let last = anchor(35.0, 135.0, 0);
        let eval = sampler.evaluate(&fix_at(35.0 + meters_north(25.0), 135.0, 10), Some(&last));
        assert_eq!(eval.decision, Decision::Accept(AcceptReason::Moved));
        assert!((eval.distance_m - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_movement_within_accuracy_rejected() {
        let sampler = Sampler::default();
        let last = Anchor::from(&fix_acc(0.0, 0.0, 30.0, 0));
        let eval = sampler.evaluate(&fix_acc(meters_north(25.0), 0.0, 30.0, 10), Some(&last));
        assert_eq!(eval.decision, Decision::Reject(RejectReason::NotMoved));
    }

    #[test]
    fn test_stationary_rejected() {
        let sampler = Sampler::default();
        let last = anchor(35.0, 135.0, 0);
        let eval = sampler.evaluate(&fix_at(35.0 + meters_north(5.0), 135.0, 30), Some(&last));
        assert_eq!(eval.decision, Decision::Reject(RejectReason::NotMoved));
    }

    #[test]
    fn test_interval_elapsed_without_movement() {
        let sampler = Sampler::default();
        let last = anchor(35.0, 135.0, 0);
        let eval = sampler.evaluate(&fix_at(35.0, 135.0, 60), Some(&last));
        assert_eq!(eval.decision, Decision::Accept(AcceptReason::IntervalElapsed));
    }

    #[test]
    fn test_backwards_timestamp_is_too_soon() {
        let sampler = Sampler::new(SamplerConfig {
            min_interval_secs: 0.0,
            ..Default::default()
        });
        let last = anchor(35.0, 135.0, 100);
        let eval = sampler.evaluate(&fix_at(36.0, 135.0, 90), Some(&last));
        assert_eq!(eval.decision, Decision::Reject(RejectReason::TooSoon));
    }

    #[test]
    fn test_config_validation() {
        assert!(SamplerConfig::default().validate().is_ok());
        let bad = SamplerConfig {
            min_interval_secs: 120.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let nan = SamplerConfig {
            record_distance_m: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_config_partial_toml_style_defaults() {
        let config: SamplerConfig = serde_json::from_str(r#"{"record_distance_m": 50.0}"#).unwrap();
        assert_eq!(config.record_distance_m, 50.0);
        assert_eq!(config.min_interval_secs, 5.0);
    }

    proptest! {
        #[test]
        fn prop_never_accepts_within_min_interval(
            secs in 0i64..5,
            lat in -80.0f64..80.0,
            dlat in -1.0f64..1.0,
        ) {
            let sampler = Sampler::default();
            let last = anchor(lat, 10.0, 0);
            let eval = sampler.evaluate(&fix_at(lat + dlat, 10.0, secs), Some(&last));
            prop_assert_eq!(eval.decision, Decision::Reject(RejectReason::TooSoon));
        }

        #[test]
        fn prop_always_accepts_after_record_interval(
            secs in 60i64..10_000,
            lat in -80.0f64..80.0,
            lng in -170.0f64..170.0,
        ) {
            let sampler = Sampler::default();
            let last = anchor(lat, lng, 0);
            let eval = sampler.evaluate(&fix_at(lat, lng, secs), Some(&last));
            prop_assert!(eval.decision.is_accept());
        }

        #[test]
        fn prop_rejects_small_or_uncertain_moves_mid_interval(
            secs in 5i64..60,
            meters in 0.0f64..60.0,
            accuracy in 0.0f64..80.0,
        ) {
            prop_assume!(meters < 19.9 || meters <= accuracy - 0.1);
            let sampler = Sampler::default();
            let last = anchor(0.0, 0.0, 0);
            let fix = fix_acc(meters_north(meters), 0.0, accuracy, secs);
            let eval = sampler.evaluate(&fix, Some(&last));
            prop_assert_eq!(eval.decision, Decision::Reject(RejectReason::NotMoved));
        }
    }
}
