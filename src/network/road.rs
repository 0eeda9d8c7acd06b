use std::fmt::{Debug, Display, Formatter};
use std::ops::Range;

use geo::{Line, Point};
use log::{debug, info};
use petgraph::prelude::DiGraphMap;
use rstar::RTree;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;
use crate::network::index::IndexedPoint;
use crate::network::metric::DistanceFunction;

/// The external identifier of an OSM-like node.
pub type NodeId = u64;

pub(crate) type NodeIx = usize;
pub(crate) type RoadIx = usize;

/// The directed road identifier.
///
/// A two-way road is stored as two directed roads, `id` and its
/// reverse twin `-id`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoadId(String);

impl RoadId {
    pub fn new(id: impl Into<String>) -> Self {
        RoadId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier of the same road travelled the other way.
    pub fn reverse(&self) -> RoadId {
        match self.0.strip_prefix('-') {
            Some(forward) => RoadId(forward.to_string()),
            None => RoadId(format!("-{}", self.0)),
        }
    }

    /// Whether `other` is this road's reverse twin.
    pub fn is_reverse_of(&self, other: &RoadId) -> bool {
        match (self.0.strip_prefix('-'), other.0.strip_prefix('-')) {
            (Some(this), None) => this == other.0,
            (None, Some(that)) => self.0 == that,
            _ => false,
        }
    }
}

impl Display for RoadId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoadId {
    fn from(value: &str) -> Self {
        RoadId::new(value)
    }
}

impl From<String> for RoadId {
    fn from(value: String) -> Self {
        RoadId(value)
    }
}

/// Dense identifier of a directed road segment within a [`RoadNetwork`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentIx(pub(crate) usize);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoadNode {
    pub id: NodeId,
    pub position: Point,
}

/// A single directed piece of a road, between two consecutive road nodes.
#[derive(Clone, Debug)]
pub struct Segment {
    pub line: Line,
    pub length: f64,
    pub(crate) road: RoadIx,
    pub(crate) from: NodeIx,
    pub(crate) to: NodeIx,
}

/// A directed road: an ordered sequence of nodes with one segment per
/// consecutive node pair.
#[derive(Clone, Debug)]
pub struct RoadWay {
    pub id: RoadId,
    pub(crate) nodes: Vec<NodeIx>,
    pub(crate) segments: Range<usize>,
    pub temporary: bool,
    pub(crate) active: bool,
}

impl RoadWay {
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// The projection of a position onto one road segment.
#[derive(Clone, Debug, PartialEq)]
pub struct PointMatch {
    pub road: RoadId,
    pub segment: SegmentIx,
    pub line: Line,
    pub point: Point,
}

/// The road network, holding the geometry, the routing graph and
/// the candidate index.
///
/// Built through a [`RoadNetworkBuilder`]. Temporary roads are declared
/// up front and toggled with [`RoadNetwork::activate_road`] and
/// [`RoadNetwork::deactivate_road`].
pub struct RoadNetwork<D: DistanceFunction> {
    pub(crate) metric: D,
    pub(crate) nodes: Vec<RoadNode>,
    pub(crate) roads: Vec<RoadWay>,
    pub(crate) segments: Vec<Segment>,
    pub(crate) lookup: FxHashMap<RoadId, RoadIx>,
    pub(crate) graph: DiGraphMap<NodeIx, SegmentIx>,
    pub(crate) index: RTree<IndexedPoint>,
    pub(crate) interval: f64,
}

impl<D: DistanceFunction> Debug for RoadNetwork<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RoadNetwork with Roads: {}, Segments: {}",
            self.roads.len(),
            self.segments.len()
        )
    }
}

impl<D: DistanceFunction> RoadNetwork<D> {
    pub fn builder(metric: D) -> RoadNetworkBuilder<D> {
        RoadNetworkBuilder::new(metric)
    }

    #[inline]
    pub fn metric(&self) -> &D {
        &self.metric
    }

    pub fn road(&self, id: &RoadId) -> Option<&RoadWay> {
        self.lookup.get(id).map(|ix| &self.roads[*ix])
    }

    #[inline]
    pub fn segment(&self, ix: SegmentIx) -> Option<&Segment> {
        self.segments.get(ix.0)
    }

    #[inline]
    pub fn node(&self, ix: NodeIx) -> Option<&RoadNode> {
        self.nodes.get(ix)
    }

    /// The road owning the segment `ix`.
    #[inline]
    pub fn segment_road(&self, ix: SegmentIx) -> Option<&RoadId> {
        self.segment(ix).map(|segment| &self.roads[segment.road].id)
    }

    pub fn roads(&self) -> impl Iterator<Item = &RoadWay> {
        self.roads.iter()
    }

    /// Inserts a temporary road into the routing graph and candidate index.
    /// Activating an already active road is a no-op.
    pub fn activate_road(&mut self, id: &RoadId) -> Result<(), NetworkError> {
        let ix = self.temporary_road(id)?;
        if self.roads[ix].active {
            return Ok(());
        }

        for segment in self.roads[ix].segments.clone() {
            let ix = SegmentIx(segment);
            let Segment { from, to, .. } = self.segments[segment];
            self.graph.add_edge(from, to, ix);

            for entry in self.samples(ix) {
                self.index.insert(entry);
            }
        }

        debug!("Activated temporary road {id}");
        self.roads[ix].active = true;
        Ok(())
    }

    /// Removes a temporary road from the routing graph and candidate index.
    /// Deactivating an inactive road is a no-op.
    pub fn deactivate_road(&mut self, id: &RoadId) -> Result<(), NetworkError> {
        let ix = self.temporary_road(id)?;
        if !self.roads[ix].active {
            return Ok(());
        }

        for segment in self.roads[ix].segments.clone() {
            let ix = SegmentIx(segment);
            let Segment { from, to, .. } = self.segments[segment];
            self.graph.remove_edge(from, to);

            for entry in self.samples(ix) {
                self.index.remove(&entry);
            }
        }

        debug!("Deactivated temporary road {id}");
        self.roads[ix].active = false;
        Ok(())
    }

    fn temporary_road(&self, id: &RoadId) -> Result<RoadIx, NetworkError> {
        let ix = *self
            .lookup
            .get(id)
            .ok_or_else(|| NetworkError::UnknownRoad(id.clone()))?;

        if !self.roads[ix].temporary {
            return Err(NetworkError::PermanentRoad(id.clone()));
        }

        Ok(ix)
    }

    /// The index points of a segment: both endpoints, plus interior
    /// points every `interval` along segments longer than it.
    pub(crate) fn samples(&self, ix: SegmentIx) -> Vec<IndexedPoint> {
        let Some(segment) = self.segment(ix) else {
            return vec![];
        };

        sample_segment(&self.metric, &segment.line, segment.length, self.interval)
            .into_iter()
            .map(|position| IndexedPoint {
                position,
                segment: ix,
            })
            .collect()
    }
}

pub(crate) fn sample_segment<D: DistanceFunction>(
    metric: &D,
    line: &Line,
    length: f64,
    interval: f64,
) -> Vec<Point> {
    let mut points = vec![line.start_point()];

    if interval > 0.0 && length > interval {
        let mut offset = interval;
        while offset < length {
            points.push(metric.interpolate(line, offset / length));
            offset += interval;
        }
    }

    points.push(line.end_point());
    points
}

/// Collects nodes and roads, validating them, and produces a [`RoadNetwork`].
///
/// ```rust
/// use geo::Point;
/// use roadmatch::network::{Planar, RoadNetwork};
///
/// let mut builder = RoadNetwork::builder(Planar);
/// builder.add_node(1, Point::new(0.0, 0.0))?;
/// builder.add_node(2, Point::new(100.0, 0.0))?;
/// builder.add_two_way_road("1", [1, 2])?;
///
/// let network = builder.build()?;
/// assert_eq!(network.roads().count(), 2);
/// # Ok::<(), roadmatch::error::NetworkError>(())
/// ```
pub struct RoadNetworkBuilder<D: DistanceFunction> {
    metric: D,
    candidate_range: f64,
    nodes: Vec<RoadNode>,
    node_lookup: FxHashMap<NodeId, NodeIx>,
    roads: Vec<(RoadId, Vec<NodeIx>, bool)>,
    road_lookup: FxHashSet<RoadId>,
}

impl<D: DistanceFunction> RoadNetworkBuilder<D> {
    pub fn new(metric: D) -> Self {
        RoadNetworkBuilder {
            metric,
            candidate_range: crate::config::DEFAULT_CANDIDATE_RANGE,
            nodes: vec![],
            node_lookup: FxHashMap::default(),
            roads: vec![],
            road_lookup: FxHashSet::default(),
        }
    }

    /// The candidate range the index spacing is tuned for.
    /// Queries with other radii remain exact, only less efficient.
    pub fn with_candidate_range(mut self, candidate_range: f64) -> Self {
        self.candidate_range = candidate_range;
        self
    }

    pub fn add_node(&mut self, id: NodeId, position: Point) -> Result<(), NetworkError> {
        if self.node_lookup.contains_key(&id) {
            return Err(NetworkError::DuplicateNode(id));
        }

        self.node_lookup.insert(id, self.nodes.len());
        self.nodes.push(RoadNode { id, position });
        Ok(())
    }

    /// Declares a directed road through the given node sequence.
    pub fn add_road(
        &mut self,
        id: impl Into<RoadId>,
        nodes: impl IntoIterator<Item = NodeId>,
    ) -> Result<(), NetworkError> {
        self.push_road(id.into(), nodes, false)
    }

    /// Declares a road which stays out of the graph and index until activated.
    pub fn add_temporary_road(
        &mut self,
        id: impl Into<RoadId>,
        nodes: impl IntoIterator<Item = NodeId>,
    ) -> Result<(), NetworkError> {
        self.push_road(id.into(), nodes, true)
    }

    /// Declares `id` along the given nodes and its reverse twin `-id` back.
    pub fn add_two_way_road(
        &mut self,
        id: impl Into<RoadId>,
        nodes: impl IntoIterator<Item = NodeId>,
    ) -> Result<(), NetworkError> {
        let id = id.into();
        let nodes = nodes.into_iter().collect::<Vec<_>>();

        self.push_road(id.reverse(), nodes.iter().rev().copied(), false)?;
        self.push_road(id, nodes, false)
    }

    fn push_road(
        &mut self,
        id: RoadId,
        nodes: impl IntoIterator<Item = NodeId>,
        temporary: bool,
    ) -> Result<(), NetworkError> {
        if self.road_lookup.contains(&id) {
            return Err(NetworkError::DuplicateRoad(id));
        }

        let nodes = nodes
            .into_iter()
            .map(|node| {
                self.node_lookup
                    .get(&node)
                    .copied()
                    .ok_or_else(|| NetworkError::UnknownNode {
                        road: id.clone(),
                        node,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if nodes.len() < 2 {
            return Err(NetworkError::DegenerateRoad(id));
        }

        self.road_lookup.insert(id.clone());
        self.roads.push((id, nodes, temporary));
        Ok(())
    }

    pub fn build(self) -> Result<RoadNetwork<D>, NetworkError> {
        let RoadNetworkBuilder {
            metric,
            candidate_range,
            nodes,
            roads: declared,
            ..
        } = self;

        let mut roads = Vec::with_capacity(declared.len());
        let mut segments = Vec::new();
        let mut lookup = FxHashMap::default();
        let mut joined = FxHashSet::default();
        let mut graph = DiGraphMap::new();

        for (road_ix, (id, way, temporary)) in declared.into_iter().enumerate() {
            let start = segments.len();

            for pair in way.windows(2) {
                let (from, to) = (pair[0], pair[1]);
                if !joined.insert((from, to)) {
                    return Err(NetworkError::ParallelSegment(nodes[from].id, nodes[to].id));
                }

                let line = Line::new(nodes[from].position, nodes[to].position);
                let length = metric.distance(line.start_point(), line.end_point());
                let ix = SegmentIx(segments.len());

                if !temporary {
                    graph.add_edge(from, to, ix);
                }

                segments.push(Segment {
                    line,
                    length,
                    road: road_ix,
                    from,
                    to,
                });
            }

            lookup.insert(id.clone(), road_ix);
            roads.push(RoadWay {
                id,
                nodes: way,
                segments: start..segments.len(),
                temporary,
                active: !temporary,
            });
        }

        let interval = (4.0 * std::f64::consts::SQRT_2 - 2.0) * candidate_range;
        let samples = roads
            .iter()
            .filter(|road| road.active)
            .flat_map(|road| road.segments.clone())
            .flat_map(|ix| {
                let segment = &segments[ix];
                sample_segment(&metric, &segment.line, segment.length, interval)
                    .into_iter()
                    .map(move |position| IndexedPoint {
                        position,
                        segment: SegmentIx(ix),
                    })
            })
            .collect::<Vec<_>>();

        info!(
            "Built network of {} roads, {} segments, {} index points",
            roads.len(),
            segments.len(),
            samples.len()
        );

        Ok(RoadNetwork {
            metric,
            nodes,
            roads,
            segments,
            lookup,
            graph,
            index: RTree::bulk_load(samples),
            interval,
        })
    }
}
