//! Restricted-area polygon.
//!
//! A `Zone` is a static, simple polygon in frame pixel coordinates. It is
//! built once from configuration and never mutated while a session runs.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Minimum number of vertices for a polygon.
pub const MIN_ZONE_POINTS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    points: Vec<Point>,
}

impl Zone {
    pub fn new(points: Vec<Point>) -> Result<Self> {
        if points.len() < MIN_ZONE_POINTS {
            return Err(anyhow!(
                "zone polygon needs at least {} points, got {}",
                MIN_ZONE_POINTS,
                points.len()
            ));
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(anyhow!("zone polygon coordinates must be finite"));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Strict containment: points on an edge or vertex are outside.
    pub fn contains(&self, point: Point) -> bool {
        if self.on_boundary(point) {
            return false;
        }
        let mut inside = false;
        let n = self.points.len();
        let mut j = n - 1;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[j];
            if (a.y > point.y) != (b.y > point.y) {
                let x_cross = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
                if point.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    fn on_boundary(&self, point: Point) -> bool {
        let n = self.points.len();
        (0..n).any(|i| on_segment(self.points[i], self.points[(i + 1) % n], point))
    }
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > f32::EPSILON * (1.0 + a.x.abs().max(b.x.abs()).max(p.x.abs())) {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Zone {
        Zone::new(vec![
            Point::new(100.0, 100.0),
            Point::new(300.0, 100.0),
            Point::new(300.0, 300.0),
            Point::new(100.0, 300.0),
        ])
        .expect("valid square")
    }

    #[test]
    fn rejects_degenerate_polygons() {
        assert!(Zone::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]).is_err());
        assert!(Zone::new(vec![
            Point::new(0.0, 0.0),
            Point::new(f32::NAN, 1.0),
            Point::new(1.0, 0.0),
        ])
        .is_err());
    }

    #[test]
    fn interior_point_is_contained() {
        assert!(square().contains(Point::new(175.0, 200.0)));
    }

    #[test]
    fn exterior_points_are_not_contained() {
        let zone = square();
        for p in [
            Point::new(425.0, 435.0),
            Point::new(50.0, 200.0),
            Point::new(200.0, 301.0),
            Point::new(-1.0, -1.0),
        ] {
            assert!(!zone.contains(p), "{:?} should be outside", p);
        }
    }

    #[test]
    fn boundary_points_are_not_contained() {
        let zone = square();
        assert!(!zone.contains(Point::new(100.0, 200.0)));
        assert!(!zone.contains(Point::new(200.0, 300.0)));
        assert!(!zone.contains(Point::new(300.0, 300.0)));
    }

    #[test]
    fn concave_polygon_notch_is_outside() {
        // U shape opening upwards.
        let zone = Zone::new(vec![
            Point::new(0.0, 0.0),
            Point::new(30.0, 0.0),
            Point::new(30.0, 30.0),
            Point::new(20.0, 30.0),
            Point::new(20.0, 10.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 30.0),
            Point::new(0.0, 30.0),
        ])
        .expect("valid polygon");
        assert!(zone.contains(Point::new(5.0, 20.0)));
        assert!(!zone.contains(Point::new(15.0, 20.0)));
    }
}
