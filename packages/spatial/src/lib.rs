#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Great-circle distances and nearest-neighbor matching.
//!
//! Matches crash coordinates against the set of weather observation points.
//! The search is a brute-force scan over every reference point: crash
//! batches are matched against a few thousand weather points at most, and
//! an exact scan keeps tie-breaking fully deterministic. With the `rayon`
//! feature the per-point searches run in parallel; results are identical.

use geo::{Distance, HaversineMeasure, Point};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default match distance between a crash and a weather point, in meters.
pub const DEFAULT_THRESHOLD_M: f64 = 600.0;

/// Errors that can occur while computing distances or matches.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// Coordinates, threshold or set sizes are unusable.
    #[error("Invalid spatial input: {message}")]
    InvalidInput {
        /// Description of what went wrong.
        message: String,
    },
}

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// The same position as a `geo` point (x = longitude, y = latitude).
    #[must_use]
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// The reference point closest to a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Index into the reference set.
    pub index: usize,
    /// Distance in meters.
    pub distance_m: f64,
}

/// Haversine distance between two points on a sphere of
/// [`EARTH_RADIUS_M`], in meters.
#[must_use]
pub fn haversine(a: Coordinate, b: Coordinate) -> f64 {
    HaversineMeasure::new(EARTH_RADIUS_M).distance(a.to_point(), b.to_point())
}

fn validate_points(points: &[Coordinate], side: &str) -> Result<(), SpatialError> {
    match points.iter().position(|p| !p.is_finite()) {
        Some(i) => Err(SpatialError::InvalidInput {
            message: format!(
                "{side} point #{i} has a non-finite coordinate ({}, {})",
                points[i].latitude, points[i].longitude
            ),
        }),
        None => Ok(()),
    }
}

fn validate_threshold(threshold_m: f64) -> Result<(), SpatialError> {
    if threshold_m.is_finite() && threshold_m >= 0.0 {
        Ok(())
    } else {
        Err(SpatialError::InvalidInput {
            message: format!("threshold must be a finite, non-negative distance, got {threshold_m}"),
        })
    }
}

/// Full distance matrix: `result[i][j]` is the distance between `a[i]` and
/// `b[j]` in meters.
///
/// # Errors
///
/// Returns [`SpatialError::InvalidInput`] if any coordinate is not finite,
/// or if exactly one of the sets is empty.
pub fn distance_matrix(a: &[Coordinate], b: &[Coordinate]) -> Result<Vec<Vec<f64>>, SpatialError> {
    validate_points(a, "left")?;
    validate_points(b, "right")?;

    if a.is_empty() != b.is_empty() {
        return Err(SpatialError::InvalidInput {
            message: format!(
                "cannot build a {}x{} distance matrix with one empty side",
                a.len(),
                b.len()
            ),
        });
    }

    Ok(a
        .iter()
        .map(|&p| b.iter().map(|&q| haversine(p, q)).collect())
        .collect())
}

/// Closest reference point to `point`. On exactly equal distances the
/// earliest reference index wins. Returns `None` for an empty reference set.
#[must_use]
pub fn nearest(point: Coordinate, reference: &[Coordinate]) -> Option<Match> {
    let mut best: Option<Match> = None;
    for (index, &candidate) in reference.iter().enumerate() {
        let distance_m = haversine(point, candidate);
        if best.is_none_or(|b| distance_m < b.distance_m) {
            best = Some(Match { index, distance_m });
        }
    }
    best
}

/// Closest reference point for every query point, in query order.
///
/// # Errors
///
/// Returns [`SpatialError::InvalidInput`] if any coordinate is not finite,
/// or if the reference set is empty while there are points to match.
pub fn nearest_all(
    points: &[Coordinate],
    reference: &[Coordinate],
) -> Result<Vec<Match>, SpatialError> {
    validate_points(points, "query")?;
    validate_points(reference, "reference")?;

    if points.is_empty() {
        return Ok(Vec::new());
    }
    if reference.is_empty() {
        return Err(SpatialError::InvalidInput {
            message: format!("cannot match {} points against an empty reference set", points.len()),
        });
    }

    let search = |p: &Coordinate| nearest(*p, reference);

    #[cfg(feature = "rayon")]
    let matches: Vec<Option<Match>> = {
        use rayon::prelude::*;
        points.par_iter().map(search).collect()
    };
    #[cfg(not(feature = "rayon"))]
    let matches: Vec<Option<Match>> = points.iter().map(search).collect();

    // Non-empty reference set: every search yields a match.
    Ok(matches.into_iter().flatten().collect())
}

/// Filter mode: whether each point lies within `threshold_m` of at least
/// one reference point.
///
/// # Errors
///
/// Returns [`SpatialError::InvalidInput`] on invalid coordinates, an
/// invalid threshold, or an empty reference set.
pub fn within_threshold(
    points: &[Coordinate],
    reference: &[Coordinate],
    threshold_m: f64,
) -> Result<Vec<bool>, SpatialError> {
    validate_threshold(threshold_m)?;
    Ok(nearest_all(points, reference)?
        .into_iter()
        .map(|m| m.distance_m <= threshold_m)
        .collect())
}

/// Assign mode: the nearest reference point for each point, or `None` when
/// even the nearest one is farther than `threshold_m`.
///
/// # Errors
///
/// See [`within_threshold`].
pub fn assign_nearest(
    points: &[Coordinate],
    reference: &[Coordinate],
    threshold_m: f64,
) -> Result<Vec<Option<Match>>, SpatialError> {
    validate_threshold(threshold_m)?;
    let matches = nearest_all(points, reference)?;

    let assigned: Vec<Option<Match>> = matches
        .into_iter()
        .map(|m| (m.distance_m <= threshold_m).then_some(m))
        .collect();

    log::trace!(
        "Assigned {}/{} points within {threshold_m} m",
        assigned.iter().filter(|m| m.is_some()).count(),
        points.len()
    );

    Ok(assigned)
}

/// Assign mode returning the label of the matched reference point.
///
/// # Errors
///
/// Returns [`SpatialError::InvalidInput`] if `labels` and `reference`
/// differ in length, or for any reason listed in [`within_threshold`].
pub fn assign_labels<L: Clone>(
    points: &[Coordinate],
    reference: &[Coordinate],
    labels: &[L],
    threshold_m: f64,
) -> Result<Vec<Option<L>>, SpatialError> {
    if labels.len() != reference.len() {
        return Err(SpatialError::InvalidInput {
            message: format!(
                "{} labels supplied for {} reference points",
                labels.len(),
                reference.len()
            ),
        });
    }

    Ok(assign_nearest(points, reference, threshold_m)?
        .into_iter()
        .map(|m| m.map(|m| labels[m.index].clone()))
        .collect())
}
