//! Breakpoint curves for the scanner.
//!
//! A [`Curve`] is immutable once built: editors construct a new one and
//! publish it whole, so the block path never sees a half-edited point list.

use patchwire_core::{Error, PropertyValue, Result};
use serde::{Deserialize, Serialize};

/// One breakpoint. `x` is a position in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Position.
    pub x: f32,
    /// Value at that position.
    pub y: f32,
}

impl CurvePoint {
    /// Creates a breakpoint.
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Piecewise-linear curve over `[0, 1]`.
///
/// # Example
///
/// ```rust
/// use patchwire_units::curve::{Curve, CurvePoint};
///
/// let tri = Curve::new(vec![
///     CurvePoint::new(0.0, 0.0),
///     CurvePoint::new(0.5, 1.0),
///     CurvePoint::new(1.0, 0.0),
/// ])?;
/// assert_eq!(tri.sample(0.25), 0.5);
/// assert_eq!(tri.sample(2.0), 0.0); // clamped to the last point
/// # Ok::<(), patchwire_core::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    points: Vec<CurvePoint>,
}

impl Default for Curve {
    /// Rising ramp from 0 to 1.
    fn default() -> Self {
        Self {
            points: vec![CurvePoint::new(0.0, 0.0), CurvePoint::new(1.0, 1.0)],
        }
    }
}

impl Curve {
    /// Validates and builds a curve.
    ///
    /// Points must be finite, non-empty, sorted by `x`, and inside `[0, 1]`.
    pub fn new(points: Vec<CurvePoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::SnapshotBuild("curve has no points".into()));
        }
        for (i, p) in points.iter().enumerate() {
            if !(p.x.is_finite() && p.y.is_finite()) {
                return Err(Error::SnapshotBuild(format!("point {i} is not finite")));
            }
            if !(0.0..=1.0).contains(&p.x) {
                return Err(Error::SnapshotBuild(format!(
                    "point {i} position {} outside [0, 1]",
                    p.x
                )));
            }
            if i > 0 && p.x < points[i - 1].x {
                return Err(Error::SnapshotBuild(format!("point {i} is out of order")));
            }
        }
        Ok(Self { points })
    }

    /// Constant curve.
    pub fn flat(y: f32) -> Self {
        Self {
            points: vec![CurvePoint::new(0.0, y)],
        }
    }

    /// Breakpoints in order.
    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// Number of breakpoints.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always `false`; a built curve has at least one point.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Value at `x`, holding the end values outside the first and last point.
    ///
    /// Real-time safe.
    #[inline]
    pub fn sample(&self, x: f32) -> f32 {
        let points = &self.points;
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return 0.0;
        };
        if x.is_nan() || x <= first.x {
            return first.y;
        }
        if x >= last.x {
            return last.y;
        }
        // first index with p.x > x; 1..len by the checks above
        let hi = points.partition_point(|p| p.x <= x);
        let (a, b) = (points[hi - 1], points[hi]);
        let span = b.x - a.x;
        if span <= 0.0 {
            return b.y;
        }
        a.y + (b.y - a.y) * ((x - a.x) / span)
    }

    /// Encodes as a list of `[x, y]` pairs for a property bag.
    pub fn to_property(&self) -> PropertyValue {
        PropertyValue::List(
            self.points
                .iter()
                .map(|p| {
                    PropertyValue::List(vec![
                        PropertyValue::from(p.x),
                        PropertyValue::from(p.y),
                    ])
                })
                .collect(),
        )
    }

    /// Decodes what [`to_property`](Self::to_property) wrote.
    pub fn from_property(key: &str, value: &PropertyValue) -> Result<Self> {
        let list = value
            .as_list()
            .ok_or_else(|| Error::invalid_state(key, "expected a list of [x, y] pairs"))?;
        let mut points = Vec::with_capacity(list.len());
        for (i, entry) in list.iter().enumerate() {
            let pair = entry.as_list().unwrap_or_default();
            let [x, y] = pair else {
                return Err(Error::invalid_state(key, format!("entry {i} is not an [x, y] pair")));
            };
            let (Some(x), Some(y)) = (x.as_f64(), y.as_f64()) else {
                return Err(Error::invalid_state(key, format!("entry {i} is not numeric")));
            };
            points.push(CurvePoint::new(x as f32, y as f32));
        }
        Self::new(points).map_err(|e| Error::invalid_state(key, e.to_string()))
    }
}
