//! Closed-form geometry used by the integrator and by line-of-sight queries.
//!
//! Polygons are slices of points in winding order; the last point connects
//! back to the first. Both windings are accepted.

use ghostwire_shared::Point;

/// Earliest collision found by a sweep.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweptHit {
    /// Contact point on the obstacle.
    pub point: Point,
    /// Fraction of the sweep, `0.0..=1.0`, at which contact happens.
    pub fraction: f32,
}

/// Smallest root of `a*x^2 + b*x + c` inside `[0, upper]`.
///
/// Returns `None` when there is no real root in the interval.
#[must_use]
pub fn find_lowest_root_in_interval(a: f32, b: f32, c: f32, upper: f32) -> Option<f32> {
    let in_range = |x: f32| (0.0..=upper).contains(&x);

    if a == 0.0 {
        if b == 0.0 {
            return None;
        }
        let x = -c / b;
        return in_range(x).then_some(x);
    }

    let determinant = b * b - 4.0 * a * c;
    if determinant < 0.0 {
        return None;
    }
    let root = determinant.sqrt();

    // Numerically stable form: never subtract two nearly equal values.
    let q = if b < 0.0 { -0.5 * (b - root) } else { -0.5 * (b + root) };
    let mut x1 = q / a;
    let mut x2 = if q == 0.0 { x1 } else { c / q };
    if x1 > x2 {
        std::mem::swap(&mut x1, &mut x2);
    }

    if in_range(x1) {
        Some(x1)
    } else if in_range(x2) {
        Some(x2)
    } else {
        None
    }
}

fn polygon_edges(poly: &[Point]) -> impl Iterator<Item = (Point, Point)> + '_ {
    let count = poly.len();
    (0..count).map(move |i| (poly[i], poly[(i + 1) % count]))
}

/// Sweeps a circle of `radius` from `start` along `delta` against a polygon.
///
/// Returns the first point of contact and the fraction of `delta` travelled.
/// A circle already touching the outline at `start` reports fraction `0.0`.
#[must_use]
pub fn polygon_swept_circle_intersect(
    poly: &[Point],
    start: Point,
    delta: Point,
    radius: f32,
) -> Option<SweptHit> {
    if poly.len() < 2 {
        return None;
    }

    let mut best: Option<SweptHit> = None;
    let mut consider = |hit: SweptHit| {
        if best.map_or(true, |b| hit.fraction < b.fraction) {
            best = Some(hit);
        }
    };

    for (p0, p1) in polygon_edges(poly) {
        let edge = p1 - p0;
        let length = edge.len();
        if length == 0.0 {
            continue;
        }
        let along = edge * (1.0 / length);
        let mut normal = Point::new(along.y, -along.x);

        let mut side = (start - p0).dot(normal);
        if side < 0.0 {
            normal = -normal;
            side = -side;
        }

        if side <= radius {
            let proj = (start - p0).dot(along);
            if (0.0..=length).contains(&proj) {
                consider(SweptHit { point: p0 + along * proj, fraction: 0.0 });
            }
        } else {
            let closing = delta.dot(normal);
            if closing < 0.0 {
                let t = (side - radius) / -closing;
                if t <= 1.0 {
                    let center = start + delta * t;
                    let proj = (center - p0).dot(along);
                    if (0.0..=length).contains(&proj) {
                        consider(SweptHit { point: p0 + along * proj, fraction: t });
                    }
                }
            }
        }
    }

    // Vertices catch glancing contacts past the end of an edge.
    let r2 = radius * radius;
    for vertex in poly {
        let offset = start - *vertex;
        let c = offset.len_squared() - r2;
        let fraction = if c <= 0.0 {
            Some(0.0)
        } else {
            find_lowest_root_in_interval(delta.len_squared(), 2.0 * delta.dot(offset), c, 1.0)
        };
        if let Some(fraction) = fraction {
            consider(SweptHit { point: *vertex, fraction });
        }
    }

    best
}

/// Fraction along `start..end` where the segment first crosses the polygon outline.
#[must_use]
pub fn ray_polygon_intersect(poly: &[Point], start: Point, end: Point) -> Option<f32> {
    let dir = end - start;
    polygon_edges(poly)
        .filter_map(|(p0, p1)| ray_segment_intersect(start, dir, p0, p1))
        .min_by(f32::total_cmp)
}

fn ray_segment_intersect(start: Point, dir: Point, p0: Point, p1: Point) -> Option<f32> {
    let edge = p1 - p0;
    let denom = dir.x * edge.y - dir.y * edge.x;
    if denom == 0.0 {
        return None;
    }
    let diff = p0 - start;
    let t = (diff.x * edge.y - diff.y * edge.x) / denom;
    let u = (diff.x * dir.y - diff.y * dir.x) / denom;
    ((0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)).then_some(t)
}

/// Fraction along `start..end` where the segment first enters a circle.
#[must_use]
pub fn ray_circle_intersect(center: Point, radius: f32, start: Point, end: Point) -> Option<f32> {
    let dir = end - start;
    let offset = start - center;
    let c = offset.len_squared() - radius * radius;
    if c <= 0.0 {
        return Some(0.0);
    }
    find_lowest_root_in_interval(dir.len_squared(), 2.0 * dir.dot(offset), c, 1.0)
}

/// Even-odd point containment test.
#[must_use]
pub fn point_in_polygon(poly: &[Point], p: Point) -> bool {
    let mut inside = false;
    for (a, b) in polygon_edges(poly) {
        if (a.y > p.y) != (b.y > p.y) {
            let cross_x = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < cross_x {
                inside = !inside;
            }
        }
    }
    inside
}
