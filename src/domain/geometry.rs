//! Geometric primitives attached to recognition results.

use serde::{Deserialize, Serialize};

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X-coordinate of the point.
    pub x: f32,
    /// Y-coordinate of the point.
    pub y: f32,
}

impl Point {
    /// Creates a new point with the given coordinates.
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A bounding box represented by a collection of points.
///
/// Recognition engines report boxes in pixel-buffer coordinates; use
/// [`scaled`](BoundingBox::scaled) with the buffer's scale factor to map them
/// back onto the original page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// The points that define the bounding box.
    pub points: Vec<Point>,
}

impl BoundingBox {
    /// Creates a new bounding box from a vector of points.
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Creates an axis-aligned rectangle from two corners.
    pub fn from_coords(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let points = vec![
            Point::new(x1, y1),
            Point::new(x2, y1),
            Point::new(x2, y2),
            Point::new(x1, y2),
        ];
        Self { points }
    }

    /// Calculates the area of the bounding box using the shoelace formula.
    ///
    /// Returns 0.0 if the bounding box has fewer than 3 points.
    pub fn area(&self) -> f32 {
        if self.points.len() < 3 {
            return 0.0;
        }

        let mut area = 0.0;
        let n = self.points.len();
        for i in 0..n {
            let j = (i + 1) % n;
            area += self.points[i].x * self.points[j].y;
            area -= self.points[j].x * self.points[i].y;
        }
        area.abs() / 2.0
    }

    /// Gets the minimum x-coordinate, or 0.0 if there are no points.
    pub fn x_min(&self) -> f32 {
        self.fold_axis(|p| p.x, f32::INFINITY, f32::min)
    }

    /// Gets the minimum y-coordinate, or 0.0 if there are no points.
    pub fn y_min(&self) -> f32 {
        self.fold_axis(|p| p.y, f32::INFINITY, f32::min)
    }

    /// Gets the maximum x-coordinate, or 0.0 if there are no points.
    pub fn x_max(&self) -> f32 {
        self.fold_axis(|p| p.x, f32::NEG_INFINITY, f32::max)
    }

    /// Gets the maximum y-coordinate, or 0.0 if there are no points.
    pub fn y_max(&self) -> f32 {
        self.fold_axis(|p| p.y, f32::NEG_INFINITY, f32::max)
    }

    /// Returns a copy with every point divided by `scale`.
    ///
    /// A non-positive scale returns the box unchanged.
    pub fn scaled(&self, scale: f32) -> Self {
        if scale <= 0.0 {
            return self.clone();
        }
        Self {
            points: self
                .points
                .iter()
                .map(|p| Point::new(p.x / scale, p.y / scale))
                .collect(),
        }
    }

    fn fold_axis(&self, axis: impl Fn(&Point) -> f32, init: f32, f: fn(f32, f32) -> f32) -> f32 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points.iter().map(axis).fold(init, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_area_and_extent() {
        let bbox = BoundingBox::from_coords(10.0, 20.0, 110.0, 70.0);
        assert_eq!(bbox.area(), 5000.0);
        assert_eq!(bbox.x_min(), 10.0);
        assert_eq!(bbox.y_min(), 20.0);
        assert_eq!(bbox.x_max(), 110.0);
        assert_eq!(bbox.y_max(), 70.0);
    }

    #[test]
    fn empty_box_has_zero_extent() {
        let bbox = BoundingBox::new(Vec::new());
        assert_eq!(bbox.area(), 0.0);
        assert_eq!(bbox.x_min(), 0.0);
        assert_eq!(bbox.y_max(), 0.0);
    }

    #[test]
    fn scaling_maps_back_to_source_resolution() {
        let bbox = BoundingBox::from_coords(0.0, 0.0, 50.0, 25.0);
        let original = bbox.scaled(0.5);
        assert_eq!(original.x_max(), 100.0);
        assert_eq!(original.y_max(), 50.0);
        assert_eq!(bbox.scaled(0.0), bbox);
    }
}
