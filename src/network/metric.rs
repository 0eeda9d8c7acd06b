use geo::{
    Bearing, Destination, Distance, Euclidean, Haversine, InterpolatePoint, Line,
    LineLocatePoint, Point,
};
use rstar::AABB;

/// The distance, projection and heading functions the matcher measures
/// the world with.
///
/// Two implementations are provided:
/// - [`Planar`], for projected coordinates in metres.
/// - [`Spherical`], for longitude/latitude coordinates, using [`Haversine`].
///
/// Every length handed to the matcher (candidate range, sigma, route lengths)
/// is expressed in the unit returned by [`DistanceFunction::distance`].
pub trait DistanceFunction: Send + Sync {
    /// Point-to-point distance between `a` and `b`.
    fn distance(&self, a: Point, b: Point) -> f64;

    /// Compass heading (degrees, clockwise from north, `[0, 360)`)
    /// of travel from `from` to `to`.
    fn heading(&self, from: Point, to: Point) -> f64;

    /// An axis-aligned box that contains every position within
    /// `radius` of `point`.
    fn envelope(&self, point: Point, radius: f64) -> AABB<Point>;

    /// The closest position to `point` upon the segment `line`.
    ///
    /// We locate the point upon the line, and then project that
    /// fraction (%) upon the line to obtain a point. A degenerate
    /// line projects everything onto its start.
    #[inline]
    fn project(&self, point: Point, line: &Line) -> Point {
        line.line_locate_point(&point)
            .map(|frac| Euclidean.point_at_ratio_between(line.start_point(), line.end_point(), frac))
            .unwrap_or_else(|| line.start_point())
    }

    /// The position `ratio` of the way along `line`, measured with this metric.
    fn interpolate(&self, line: &Line, ratio: f64) -> Point;

    /// The fraction (`0..=1`) of `line` at which `point` lies.
    #[inline]
    fn fraction(&self, point: Point, line: &Line) -> f64 {
        let length = self.distance(line.start_point(), line.end_point());
        if length <= f64::EPSILON {
            return 0.0;
        }

        (self.distance(line.start_point(), point) / length).clamp(0.0, 1.0)
    }
}

/// Euclidean geometry over projected coordinates.
#[derive(Clone, Copy, Debug, Default)]
pub struct Planar;

impl DistanceFunction for Planar {
    #[inline]
    fn distance(&self, a: Point, b: Point) -> f64 {
        Euclidean.distance(a, b)
    }

    #[inline]
    fn heading(&self, from: Point, to: Point) -> f64 {
        let (dx, dy) = (to.x() - from.x(), to.y() - from.y());
        dx.atan2(dy).to_degrees().rem_euclid(360.0)
    }

    #[inline]
    fn interpolate(&self, line: &Line, ratio: f64) -> Point {
        Euclidean.point_at_ratio_between(line.start_point(), line.end_point(), ratio)
    }

    fn envelope(&self, point: Point, radius: f64) -> AABB<Point> {
        AABB::from_corners(
            Point::new(point.x() - radius, point.y() - radius),
            Point::new(point.x() + radius, point.y() + radius),
        )
    }
}

/// Great-circle geometry over longitude/latitude coordinates, in metres.
#[derive(Clone, Copy, Debug, Default)]
pub struct Spherical;

impl DistanceFunction for Spherical {
    #[inline]
    fn distance(&self, a: Point, b: Point) -> f64 {
        Haversine.distance(a, b)
    }

    #[inline]
    fn heading(&self, from: Point, to: Point) -> f64 {
        Haversine.bearing(from, to).rem_euclid(360.0)
    }

    #[inline]
    fn interpolate(&self, line: &Line, ratio: f64) -> Point {
        Haversine.point_at_ratio_between(line.start_point(), line.end_point(), ratio)
    }

    fn envelope(&self, point: Point, radius: f64) -> AABB<Point> {
        // The corners sit on the diagonal, so the box must reach
        // `radius * √2` away to contain the full circle.
        let reach = radius * std::f64::consts::SQRT_2;

        let bottom_right = Haversine.destination(point, 135.0, reach);
        let top_left = Haversine.destination(point, 315.0, reach);

        AABB::from_corners(top_left, bottom_right)
    }
}

/// The absolute difference between two compass headings, folded into `[0, 180]`.
#[inline]
pub fn heading_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}
