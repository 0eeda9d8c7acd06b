use log::trace;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::network::dijkstra::{Dijkstra, Length};
use crate::network::metric::DistanceFunction;
use crate::network::road::{NodeIx, PointMatch, RoadId, RoadNetwork, SegmentIx};

/// The outcome of routing from one point match to another.
#[derive(Clone, Debug, PartialEq)]
pub struct Reachable {
    /// The travelled distance, `f64::INFINITY` when unreachable.
    pub distance: f64,
    /// The roads travelled, in order, without consecutive repeats.
    pub path: Vec<RoadId>,
}

impl Reachable {
    pub fn unreachable() -> Self {
        Reachable {
            distance: f64::INFINITY,
            path: vec![],
        }
    }

    #[inline]
    pub fn is_reachable(&self) -> bool {
        self.distance.is_finite()
    }
}

pub trait RoutingGraph {
    /// Routes from `source` to each of `targets`, exploring no further than
    /// `max_distance` from the end of the source segment.
    ///
    /// The output is aligned with `targets`. Targets not reached within
    /// the bound are [`Reachable::unreachable`].
    fn shortest_paths(
        &self,
        source: &PointMatch,
        targets: &[PointMatch],
        max_distance: f64,
    ) -> Vec<Reachable>;

    /// The compass bearings of the first and last segment of `road`.
    fn road_bearings(&self, road: &RoadId) -> Option<(f64, f64)>;

    /// The segments leaving the end node of `segment`.
    fn successors(&self, segment: SegmentIx) -> Vec<SegmentIx>;
}

impl<D: DistanceFunction> RoadNetwork<D> {
    fn edge_roads(&self, nodes: &[NodeIx]) -> Vec<&RoadId> {
        nodes
            .windows(2)
            .filter_map(|pair| self.graph.edge_weight(pair[0], pair[1]))
            .filter_map(|segment| self.segment_road(*segment))
            .collect()
    }
}

impl<D: DistanceFunction> RoutingGraph for RoadNetwork<D> {
    fn shortest_paths(
        &self,
        source: &PointMatch,
        targets: &[PointMatch],
        max_distance: f64,
    ) -> Vec<Reachable> {
        let mut results = vec![Reachable::unreachable(); targets.len()];
        let Some(origin) = self.segment(source.segment) else {
            return results;
        };

        let remaining = self
            .metric
            .distance(source.point, source.line.end_point());

        // Targets are reached once the start node of their segment is settled.
        let mut pending: FxHashMap<NodeIx, SmallVec<[usize; 4]>> = FxHashMap::default();

        for (index, target) in targets.iter().enumerate() {
            let ahead = self.metric.distance(target.point, target.line.end_point());

            if target.segment == source.segment && remaining >= ahead {
                results[index] = Reachable {
                    distance: self.metric.distance(source.point, target.point),
                    path: vec![target.road.clone()],
                };
                continue;
            }

            if let Some(segment) = self.segment(target.segment) {
                pending.entry(segment.from).or_default().push(index);
            }
        }

        if pending.is_empty() {
            return results;
        }

        let budget = max_distance - remaining;
        let mut reach = Dijkstra.reach(&origin.to, |node| {
            self.graph
                .edges(*node)
                .filter_map(|(_, to, segment)| {
                    self.segment(*segment)
                        .map(|segment| (to, Length(segment.length)))
                })
                .collect::<SmallVec<[(NodeIx, Length); 4]>>()
        });

        while let Some(item) = reach.next() {
            if item.total_cost.0 >= budget {
                break;
            }

            let Some(waiting) = pending.remove(&item.node) else {
                continue;
            };

            let nodes = reach.path(&item.node);
            let roads = self.edge_roads(&nodes);

            for index in waiting {
                let target = &targets[index];

                let mut path: Vec<RoadId> = Vec::with_capacity(roads.len() + 2);
                if remaining != 0.0 {
                    path.push(source.road.clone());
                }

                for road in roads.iter().copied().chain(std::iter::once(&target.road)) {
                    if path.last() != Some(road) {
                        path.push(road.clone());
                    }
                }

                let entry = self
                    .metric
                    .distance(target.line.start_point(), target.point);

                results[index] = Reachable {
                    distance: item.total_cost.0 + remaining + entry,
                    path,
                };
            }

            if pending.is_empty() {
                break;
            }
        }

        trace!(
            "Routed {} targets from {}, {} unreached",
            targets.len(),
            source.road,
            pending.values().map(|waiting| waiting.len()).sum::<usize>()
        );

        results
    }

    fn road_bearings(&self, road: &RoadId) -> Option<(f64, f64)> {
        let way = self.road(road)?;
        let first = self.segments.get(way.segments.start)?;
        let last = self.segments.get(way.segments.end.checked_sub(1)?)?;

        Some((
            self.metric
                .heading(first.line.start_point(), first.line.end_point()),
            self.metric
                .heading(last.line.start_point(), last.line.end_point()),
        ))
    }

    fn successors(&self, segment: SegmentIx) -> Vec<SegmentIx> {
        self.segment(segment)
            .map(|segment| {
                self.graph
                    .edges(segment.to)
                    .map(|(_, _, next)| *next)
                    .collect()
            })
            .unwrap_or_default()
    }
}
