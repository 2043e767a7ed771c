use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;
use tracing::{debug, instrument, trace};

use crate::config::DetectionConfig;
use crate::models::{BoundingBox, Contour, Quadrilateral};

/// Why a contour was not accepted as a card outline.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    TooSmall { area: f64 },
    NotQuadrilateral { vertices: usize },
    AspectRatio { ratio: f64 },
    Degenerate,
}

/// Finds card-shaped quadrilaterals in a binary edge map.
#[derive(Debug, Clone)]
pub struct QuadrilateralDetector {
    pub min_area: f64,
    pub epsilon_fraction: f64,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
}

impl QuadrilateralDetector {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            min_area: config.min_contour_area,
            epsilon_fraction: config.approx_epsilon_fraction,
            min_aspect_ratio: config.min_aspect_ratio,
            max_aspect_ratio: config.max_aspect_ratio,
        }
    }

    #[instrument(skip_all, fields(width = edges.width(), height = edges.height()))]
    pub fn detect(&self, edges: &GrayImage) -> Vec<Quadrilateral> {
        let contours = external_contours(edges);
        let total = contours.len();
        let quads: Vec<Quadrilateral> = contours
            .iter()
            .filter_map(|c| match self.classify(c) {
                Ok(q) => Some(q),
                Err(reason) => {
                    trace!(?reason, points = c.points.len(), "contour rejected");
                    None
                }
            })
            .collect();
        debug!(contours = total, quadrilaterals = quads.len(), "contours classified");
        quads
    }

    /// Area filter, then polygon approximation, then the bounding-box ratio test.
    pub fn classify(&self, contour: &Contour) -> Result<Quadrilateral, Rejection> {
        let area = contour.area();
        if area < self.min_area {
            return Err(Rejection::TooSmall { area });
        }

        let epsilon = contour.perimeter() * self.epsilon_fraction;
        let polygon = approximate_polygon(&contour.points, epsilon);
        let corners: [Point<i32>; 4] = polygon
            .as_slice()
            .try_into()
            .map_err(|_| Rejection::NotQuadrilateral { vertices: polygon.len() })?;

        let bounds = contour.bounding_box().ok_or(Rejection::Degenerate)?;
        if !self.accepts_bounds(&bounds) {
            return Err(Rejection::AspectRatio { ratio: bounds.aspect_ratio() });
        }

        let quad = Quadrilateral::from_unordered(corners);
        if quad.is_degenerate() {
            return Err(Rejection::Degenerate);
        }
        Ok(quad)
    }

    /// Inclusive on both ends of the ratio band.
    pub fn accepts_bounds(&self, bounds: &BoundingBox) -> bool {
        let ratio = bounds.aspect_ratio();
        ratio >= self.min_aspect_ratio && ratio <= self.max_aspect_ratio
    }
}

/// Outermost borders only: nested shapes (title bars, artwork) are skipped.
pub fn external_contours(edges: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(edges)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| Contour::new(c.points))
        .collect()
}

/// Orders four corners as top-left, top-right, bottom-right, bottom-left.
///
/// Top-left has the smallest `x + y`, bottom-right the largest. Of the other
/// two, top-right has the smaller `y - x`. Ties keep input order, so a shape
/// turned by exactly 45 degrees has no single answer. Beyond roughly 45
/// degrees the labels rotate with the card.
pub fn order_points(points: [Point<i32>; 4]) -> [Point<i32>; 4] {
    let mut by_sum = points;
    by_sum.sort_by_key(|p| p.x + p.y);

    let top_left = by_sum[0];
    let bottom_right = by_sum[3];
    let mut middle = [by_sum[1], by_sum[2]];
    middle.sort_by_key(|p| p.y - p.x);

    [top_left, middle[0], bottom_right, middle[1]]
}

/// Douglas-Peucker simplification of a closed curve.
///
/// The curve is split at two mutually distant points and each half is
/// simplified as an open chain, so the result never repeats its first vertex.
pub fn approximate_polygon(points: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    let n = points.len();
    if n <= 3 {
        return points.to_vec();
    }

    let far_from = |origin: usize| {
        let o = points[origin];
        (0..n)
            .max_by_key(|&i| {
                let dx = (points[i].x - o.x) as i64;
                let dy = (points[i].y - o.y) as i64;
                (dx * dx + dy * dy, std::cmp::Reverse(i))
            })
            .unwrap_or(origin)
    };
    let b = far_from(0);
    let a = far_from(b);
    if a == b {
        return vec![points[a]];
    }

    let chain = |from: usize, to: usize| -> Vec<Point<i32>> {
        let len = (to + n - from) % n + 1;
        (0..len).map(|k| points[(from + k) % n]).collect()
    };

    let mut first = simplify_open(&chain(a, b), epsilon);
    let mut second = simplify_open(&chain(b, a), epsilon);
    first.pop();
    second.pop();
    first.extend(second);
    first
}

fn simplify_open(points: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;
    let mut stack = vec![(0usize, n - 1)];

    while let Some((start, end)) = stack.pop() {
        if end - start <= 1 {
            continue;
        }
        let mut max_dist = 0.0;
        let mut max_index = start;
        for i in (start + 1)..end {
            let d = segment_distance(points[i], points[start], points[end]);
            if d > max_dist {
                max_dist = d;
                max_index = i;
            }
        }
        if max_dist > epsilon {
            keep[max_index] = true;
            stack.push((start, max_index));
            stack.push((max_index, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

fn segment_distance(p: Point<i32>, a: Point<i32>, b: Point<i32>) -> f64 {
    let (px, py) = (p.x as f64, p.y as f64);
    let (ax, ay) = (a.x as f64, a.y as f64);
    let (bx, by) = (b.x as f64, b.y as f64);
    let (dx, dy) = (bx - ax, by - ay);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return ((px - ax).powi(2) + (py - ay).powi(2)).sqrt();
    }
    ((dy * px - dx * py + bx * ay - by * ax).abs()) / len2.sqrt()
}
