use geo::Point;
use itertools::Itertools;
use rstar::{RTreeObject, AABB};

use crate::network::metric::DistanceFunction;
use crate::network::road::{PointMatch, RoadNetwork, SegmentIx};

/// A sample position of a road segment stored in the candidate index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct IndexedPoint {
    pub(crate) position: Point,
    pub(crate) segment: SegmentIx,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<Point>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

pub trait SpatialIndex {
    /// Finds the projection of `position` onto every road segment
    /// strictly closer than `radius`.
    ///
    /// Each segment appears at most once. The output is sorted by distance
    /// to `position`, then by segment, so equal inputs always produce the
    /// same ordering.
    fn query(&self, position: Point, radius: f64) -> Vec<PointMatch>;
}

impl<D: DistanceFunction> SpatialIndex for RoadNetwork<D> {
    fn query(&self, position: Point, radius: f64) -> Vec<PointMatch> {
        // A segment within `radius` has a sample point at most half an
        // interval further away than its projection.
        let envelope = self
            .metric
            .envelope(position, radius + self.interval / 2.0);

        self.index
            .locate_in_envelope(&envelope)
            .map(|entry| entry.segment)
            .unique()
            .filter_map(|ix| {
                let segment = self.segment(ix)?;
                let point = self.metric.project(position, &segment.line);
                let distance = self.metric.distance(position, point);

                (distance < radius).then(|| {
                    let road = self.roads[segment.road].id.clone();
                    let matched = PointMatch {
                        road,
                        segment: ix,
                        line: segment.line,
                        point,
                    };
                    (distance, matched)
                })
            })
            .sorted_by(|(a, left), (b, right)| {
                a.total_cmp(b).then_with(|| left.segment.cmp(&right.segment))
            })
            .map(|(_, matched)| matched)
            .collect()
    }
}
