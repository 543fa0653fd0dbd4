use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::covering::{CellUnion, Coverer};
use crate::geo::Footprint;
use crate::{DssError, DssResult, Timestamp};

/// Footprint plus optional altitude band, in meters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Volume3d {
    pub footprint: Footprint,
    pub altitude_lower: Option<f64>,
    pub altitude_upper: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Volume4d {
    pub volume: Volume3d,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
}

/// Rules applied when turning a requested volume into a stored extent.
#[derive(Clone, Copy, Debug)]
pub struct TimePolicy {
    pub max_clock_skew: Duration,
    /// Used when the caller omits an end time; `None` makes it mandatory.
    pub default_duration: Option<Duration>,
    pub max_duration: Option<Duration>,
}

impl Volume4d {
    pub fn new(footprint: Footprint, start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        Self {
            volume: Volume3d {
                footprint,
                altitude_lower: None,
                altitude_upper: None,
            },
            start,
            end,
        }
    }

    pub fn with_altitudes(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.volume.altitude_lower = lower;
        self.volume.altitude_upper = upper;
        self
    }

    /// Validates the time window and altitude band, then covers the footprint.
    pub fn resolve(
        &self,
        coverer: &Coverer,
        now: Timestamp,
        policy: &TimePolicy,
    ) -> DssResult<Extent> {
        let start = self.start.unwrap_or(now);
        if start < now.minus(policy.max_clock_skew) {
            return Err(DssError::bad_request("start time is too far in the past"));
        }
        let end = match (self.end, policy.default_duration) {
            (Some(end), _) => end,
            (None, Some(duration)) => start.plus(duration),
            (None, None) => return Err(DssError::bad_request("end time is required")),
        };
        if end <= start {
            return Err(DssError::bad_request("end time must be after start time"));
        }
        if end <= now {
            return Err(DssError::bad_request("end time is in the past"));
        }
        if let Some(max) = policy.max_duration.filter(|max| end > start.plus(*max)) {
            return Err(DssError::bad_request(format!(
                "time window exceeds {} hours",
                max.as_secs() / 3600
            )));
        }
        let (altitude_lower, altitude_upper) = self.altitudes()?;
        let cells = coverer.cover(&self.volume.footprint)?;
        Ok(Extent {
            cells,
            start,
            end,
            altitude_lower,
            altitude_upper,
        })
    }

    /// Query window for searches. Missing bounds are open, except that
    /// records which ended before `now` are never of interest.
    pub fn resolve_search(&self, coverer: &Coverer, now: Timestamp) -> DssResult<Extent> {
        let start = self.start.map_or(now, |start| start.max(now));
        let end = self.end.unwrap_or(Timestamp::MAX);
        if end <= start {
            return Err(DssError::bad_request("search window is empty"));
        }
        let (altitude_lower, altitude_upper) = self.altitudes()?;
        Ok(Extent {
            cells: coverer.cover(&self.volume.footprint)?,
            start,
            end,
            altitude_lower,
            altitude_upper,
        })
    }

    fn altitudes(&self) -> DssResult<(Option<f64>, Option<f64>)> {
        let (lower, upper) = (self.volume.altitude_lower, self.volume.altitude_upper);
        if lower.is_some_and(|value| !value.is_finite())
            || upper.is_some_and(|value| !value.is_finite())
        {
            return Err(DssError::bad_request("altitudes must be finite"));
        }
        if matches!((lower, upper), (Some(lower), Some(upper)) if lower > upper) {
            return Err(DssError::bad_request(
                "altitude_lower must not exceed altitude_upper",
            ));
        }
        Ok((lower, upper))
    }
}

/// Resolved spatial-temporal extent of a stored record: `[start, end)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub cells: CellUnion,
    pub start: Timestamp,
    pub end: Timestamp,
    pub altitude_lower: Option<f64>,
    pub altitude_upper: Option<f64>,
}

impl Extent {
    /// Smallest extent containing both.
    pub fn union(&self, other: &Extent) -> Extent {
        Extent {
            cells: self.cells.union(&other.cells),
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            altitude_lower: match (self.altitude_lower, other.altitude_lower) {
                (Some(a), Some(b)) => Some(a.min(b)),
                _ => None,
            },
            altitude_upper: match (self.altitude_upper, other.altitude_upper) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            },
        }
    }

    pub fn covers(&self, other: &Extent) -> bool {
        let lower_ok = match (self.altitude_lower, other.altitude_lower) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => a <= b,
        };
        let upper_ok = match (self.altitude_upper, other.altitude_upper) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => a >= b,
        };
        self.cells.contains_all(&other.cells)
            && self.start <= other.start
            && self.end >= other.end
            && lower_ok
            && upper_ok
    }

    pub fn overlaps_in_time(&self, start: Timestamp, end: Timestamp) -> bool {
        self.start < end && start < self.end
    }

    /// Missing bounds are treated as unbounded.
    pub fn overlaps_in_altitude(&self, lower: Option<f64>, upper: Option<f64>) -> bool {
        let below = matches!((self.altitude_upper, lower), (Some(top), Some(bottom)) if top < bottom);
        let above = matches!((self.altitude_lower, upper), (Some(bottom), Some(top)) if bottom > top);
        !below && !above
    }

    pub fn overlaps(&self, other: &Extent) -> bool {
        self.cells.intersects(&other.cells)
            && self.overlaps_in_time(other.start, other.end)
            && self.overlaps_in_altitude(other.altitude_lower, other.altitude_upper)
    }

    pub fn is_active_at(&self, now: Timestamp) -> bool {
        self.end > now
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Extent, TimePolicy, Volume4d};
    use crate::cell::CellId;
    use crate::covering::{CellUnion, Coverer};
    use crate::geo::{Footprint, GeoPolygon, LatLng};
    use crate::{ErrorKind, Timestamp};

    const MINUTE: Duration = Duration::from_secs(60);

    fn policy() -> TimePolicy {
        TimePolicy {
            max_clock_skew: MINUTE * 5,
            default_duration: None,
            max_duration: None,
        }
    }

    fn footprint() -> Footprint {
        Footprint::Polygon(GeoPolygon::new(vec![
            LatLng::new(46.2, 7.4),
            LatLng::new(46.2, 7.42),
            LatLng::new(46.22, 7.42),
        ]))
    }

    fn extent(cells: &[u64], start: i64, end: i64) -> Extent {
        Extent {
            cells: CellUnion::from_cells(cells.iter().map(|cell| CellId(*cell))),
            start: Timestamp(start),
            end: Timestamp(end),
            altitude_lower: None,
            altitude_upper: None,
        }
    }

    #[test]
    fn resolve_applies_time_rules() {
        let coverer = Coverer::default();
        let now = Timestamp(10_000_000_000);
        let ok = Volume4d::new(footprint(), None, Some(now.plus(MINUTE)));
        let resolved = ok.resolve(&coverer, now, &policy()).expect("resolve");
        assert_eq!(resolved.start, now);
        assert!(!resolved.cells.is_empty());

        let stale = Volume4d::new(footprint(), Some(now.minus(MINUTE * 10)), Some(now.plus(MINUTE)));
        assert_eq!(
            stale.resolve(&coverer, now, &policy()).expect_err("stale").kind(),
            ErrorKind::BadRequest
        );
        let inverted = Volume4d::new(footprint(), Some(now.plus(MINUTE * 2)), Some(now.plus(MINUTE)));
        assert!(inverted.resolve(&coverer, now, &policy()).is_err());
        let missing_end = Volume4d::new(footprint(), None, None);
        assert!(missing_end.resolve(&coverer, now, &policy()).is_err());
        let skewed = Volume4d::new(footprint(), Some(now.minus(MINUTE * 4)), Some(now.plus(MINUTE)));
        assert!(skewed.resolve(&coverer, now, &policy()).is_ok());
    }

    #[test]
    fn resolve_defaults_and_caps_duration() {
        let coverer = Coverer::default();
        let now = Timestamp(10_000_000_000);
        let capped = TimePolicy {
            max_clock_skew: MINUTE,
            default_duration: Some(MINUTE * 60),
            max_duration: Some(MINUTE * 60),
        };
        let defaulted = Volume4d::new(footprint(), None, None)
            .resolve(&coverer, now, &capped)
            .expect("default end");
        assert_eq!(defaulted.end, now.plus(MINUTE * 60));
        let too_long = Volume4d::new(footprint(), None, Some(now.plus(MINUTE * 61)));
        assert!(too_long.resolve(&coverer, now, &capped).is_err());
    }

    #[test]
    fn inverted_altitudes_are_rejected() {
        let coverer = Coverer::default();
        let now = Timestamp(10_000_000_000);
        let volume = Volume4d::new(footprint(), None, Some(now.plus(MINUTE)))
            .with_altitudes(Some(120.0), Some(50.0));
        assert!(volume.resolve(&coverer, now, &policy()).is_err());
    }

    #[test]
    fn union_widens_and_covers() {
        let a = extent(&[1, 3], 10, 20);
        let b = extent(&[3, 5], 15, 40);
        let merged = a.union(&b);
        assert_eq!(merged.cells.len(), 3);
        assert_eq!((merged.start, merged.end), (Timestamp(10), Timestamp(40)));
        assert!(merged.covers(&a));
        assert!(merged.covers(&b));
        assert!(!a.covers(&b));
    }

    #[test]
    fn overlap_requires_cells_time_and_altitude() {
        let a = extent(&[1, 3], 10, 20);
        assert!(a.overlaps(&extent(&[3], 19, 30)));
        assert!(!a.overlaps(&extent(&[3], 20, 30)));
        assert!(!a.overlaps(&extent(&[5], 10, 20)));

        let mut low = extent(&[1], 10, 20);
        low.altitude_lower = Some(0.0);
        low.altitude_upper = Some(100.0);
        let mut high = extent(&[1], 10, 20);
        high.altitude_lower = Some(150.0);
        high.altitude_upper = Some(300.0);
        assert!(!low.overlaps(&high));
        assert!(low.overlaps(&extent(&[1], 10, 20)));
    }
}
