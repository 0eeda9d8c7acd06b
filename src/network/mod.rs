//! The road network the matcher operates upon:
//! geometry, candidate index and routing graph.

#[doc(hidden)]
pub mod dijkstra;
#[doc(hidden)]
pub mod index;
#[doc(hidden)]
pub mod metric;
#[doc(hidden)]
pub mod road;
#[doc(hidden)]
pub mod routing;
#[doc(hidden)]
#[cfg(test)]
mod test;

#[doc(inline)]
pub use index::SpatialIndex;
#[doc(inline)]
pub use metric::{heading_difference, DistanceFunction, Planar, Spherical};
#[doc(inline)]
pub use road::{
    NodeId, PointMatch, RoadId, RoadNetwork, RoadNetworkBuilder, RoadNode, RoadWay, Segment,
    SegmentIx,
};
#[doc(inline)]
pub use routing::{Reachable, RoutingGraph};

/// Everything a decoder needs from the map, shared read-only
/// between matching threads.
pub trait MapView: SpatialIndex + RoutingGraph + Sync {
    type Metric: DistanceFunction;

    fn metric(&self) -> &Self::Metric;
}

impl<D: DistanceFunction> MapView for RoadNetwork<D> {
    type Metric = D;

    #[inline]
    fn metric(&self) -> &D {
        &self.metric
    }
}
