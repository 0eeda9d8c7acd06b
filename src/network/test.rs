use approx::assert_relative_eq;
use geo::{Destination, Haversine, Point};
use rstar::Envelope;

use crate::error::NetworkError;
use crate::fixtures::{joined_roads, straight_road, two_way_road};
use crate::network::{
    heading_difference, DistanceFunction, MapView, Planar, PointMatch, RoadId, RoadNetwork,
    RoutingGraph, SpatialIndex, Spherical,
};

fn matched<M: MapView>(map: &M, x: f64, y: f64, road: &str) -> PointMatch {
    map.query(Point::new(x, y), 50.0)
        .into_iter()
        .find(|matched| matched.road.as_str() == road)
        .expect("a match on the road")
}

#[test]
fn road_ids_reverse() {
    let forward = RoadId::from("7");

    assert_eq!(forward.reverse(), RoadId::from("-7"));
    assert_eq!(forward.reverse().reverse(), forward);
    assert!(forward.is_reverse_of(&RoadId::from("-7")));
    assert!(RoadId::from("-7").is_reverse_of(&forward));
    assert!(!forward.is_reverse_of(&RoadId::from("-8")));
    assert!(!forward.is_reverse_of(&forward));
}

#[test]
fn planar_headings() {
    let origin = Point::new(0.0, 0.0);

    assert_relative_eq!(Planar.heading(origin, Point::new(0.0, 10.0)), 0.0);
    assert_relative_eq!(Planar.heading(origin, Point::new(10.0, 0.0)), 90.0);
    assert_relative_eq!(Planar.heading(origin, Point::new(0.0, -10.0)), 180.0);
    assert_relative_eq!(Planar.heading(origin, Point::new(-10.0, 0.0)), 270.0);

    assert_relative_eq!(heading_difference(350.0, 10.0), 20.0);
    assert_relative_eq!(heading_difference(10.0, 350.0), 20.0);
    assert_relative_eq!(heading_difference(90.0, 270.0), 180.0);
    assert_relative_eq!(heading_difference(45.0, 45.0), 0.0);
}

#[test]
fn spherical_envelope_contains_the_radius() {
    let centre = Point::new(151.183886, -33.885197);
    let envelope = Spherical.envelope(centre, 100.0);

    for bearing in [0.0, 45.0, 90.0, 180.0, 270.0, 333.0] {
        let edge = Haversine.destination(centre, bearing, 99.0);
        assert!(envelope.contains_point(&edge), "bearing {bearing}");
    }

    let outside = Haversine.destination(centre, 90.0, 500.0);
    assert!(!envelope.contains_point(&outside));
}

#[test]
fn fraction_along_a_line() {
    let line = geo::Line::new(Point::new(0.0, 0.0), Point::new(100.0, 0.0));

    assert_relative_eq!(Planar.fraction(Point::new(25.0, 0.0), &line), 0.25);
    assert_relative_eq!(Planar.fraction(Point::new(100.0, 0.0), &line), 1.0);
    let projected = Planar.project(Point::new(40.0, 30.0), &line);
    assert_relative_eq!(projected.x(), 40.0);
    assert_relative_eq!(projected.y(), 0.0);

    let quarter = Planar.interpolate(&line, 0.25);
    assert_relative_eq!(quarter.x(), 25.0);
    assert_relative_eq!(quarter.y(), 0.0);

    // Halfway up a meridian is halfway in latitude.
    let meridian = geo::Line::new(Point::new(0.0, 0.0), Point::new(0.0, 10.0));
    let middle = Spherical.interpolate(&meridian, 0.5);
    assert_relative_eq!(middle.x(), 0.0, epsilon = 1e-9);
    assert_relative_eq!(middle.y(), 5.0, epsilon = 1e-9);
}

#[test_log::test]
fn query_projects_onto_nearby_segments() {
    let network = straight_road();

    // Far from every index sample point, still within range of the segment.
    let matches = network.query(Point::new(91.0, 10.0), 50.0);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].road, RoadId::from("east"));
    assert_relative_eq!(matches[0].point.x(), 91.0);
    assert_relative_eq!(matches[0].point.y(), 0.0);

    assert!(network.query(Point::new(500.0, 60.0), 50.0).is_empty());
    // Strictly closer than the radius.
    assert!(network.query(Point::new(500.0, 50.0), 50.0).is_empty());
}

#[test_log::test]
fn query_orders_equal_distances_by_segment() {
    let network = two_way_road();

    let matches = network.query(Point::new(300.0, 5.0), 50.0);
    let roads = matches.iter().map(|m| m.road.as_str()).collect::<Vec<_>>();

    // The reverse twin is declared first.
    assert_eq!(roads, vec!["-east", "east"]);
    assert!(matches[0].segment < matches[1].segment);
}

#[test_log::test]
fn routes_along_the_same_segment() {
    let network = straight_road();
    let source = matched(&network, 100.0, 0.0, "east");
    let ahead = matched(&network, 300.0, 0.0, "east");
    let behind = matched(&network, 50.0, 0.0, "east");

    let reached = network.shortest_paths(&source, &[ahead, behind], 1000.0);

    assert_relative_eq!(reached[0].distance, 200.0);
    assert_eq!(reached[0].path, vec![RoadId::from("east")]);
    assert!(!reached[1].is_reachable());
    assert!(reached[1].path.is_empty());
}

#[test_log::test]
fn routes_across_roads_within_the_bound() {
    let network = joined_roads();
    let source = matched(&network, 400.0, 0.0, "west");
    let target = matched(&network, 600.0, 0.0, "east");

    let reached = network.shortest_paths(&source, &[target.clone()], 1000.0);
    assert_relative_eq!(reached[0].distance, 200.0);
    assert_eq!(reached[0].path, vec![RoadId::from("west"), RoadId::from("east")]);

    // The search does not reach past the source segment's remaining length.
    let bounded = network.shortest_paths(&source, &[target], 50.0);
    assert!(!bounded[0].is_reachable());
}

#[test_log::test]
fn bearings_and_successors() {
    let network = joined_roads();

    let (first, last) = network
        .road_bearings(&RoadId::from("west"))
        .expect("known road");
    assert_relative_eq!(first, 90.0);
    assert_relative_eq!(last, 90.0);
    assert!(network.road_bearings(&RoadId::from("north")).is_none());

    let west = matched(&network, 250.0, 0.0, "west");
    let east = matched(&network, 750.0, 0.0, "east");
    assert_eq!(network.successors(west.segment), vec![east.segment]);
    assert!(network.successors(east.segment).is_empty());
}

#[test_log::test]
fn temporary_roads_toggle() -> Result<(), NetworkError> {
    let mut builder = RoadNetwork::builder(Planar);
    builder.add_node(1, Point::new(0.0, 0.0))?;
    builder.add_node(2, Point::new(500.0, 0.0))?;
    builder.add_node(3, Point::new(500.0, 500.0))?;
    builder.add_road("main", [1, 2])?;
    builder.add_temporary_road("spur", [2, 3])?;
    let mut network = builder.build()?;

    let spur = RoadId::from("spur");
    let near_spur = Point::new(505.0, 250.0);

    assert!(!network.road(&spur).expect("declared").is_active());
    assert!(network.query(near_spur, 50.0).is_empty());

    network.activate_road(&spur)?;
    assert!(network.road(&spur).expect("declared").is_active());

    let target = matched(&network, 505.0, 250.0, "spur");
    let source = matched(&network, 400.0, 0.0, "main");
    let reached = network.shortest_paths(&source, &[target], 1000.0);
    assert_relative_eq!(reached[0].distance, 350.0);
    assert_eq!(reached[0].path, vec![RoadId::from("main"), spur.clone()]);

    // Activating twice is harmless.
    network.activate_road(&spur)?;
    network.deactivate_road(&spur)?;
    assert!(network.query(near_spur, 50.0).is_empty());

    assert_eq!(
        network.deactivate_road(&RoadId::from("main")),
        Err(NetworkError::PermanentRoad(RoadId::from("main")))
    );
    assert_eq!(
        network.activate_road(&RoadId::from("nowhere")),
        Err(NetworkError::UnknownRoad(RoadId::from("nowhere")))
    );

    Ok(())
}

#[test]
fn builder_rejects_malformed_networks() {
    let mut builder = RoadNetwork::builder(Planar);
    builder.add_node(1, Point::new(0.0, 0.0)).expect("node");
    builder.add_node(2, Point::new(10.0, 0.0)).expect("node");

    assert_eq!(
        builder.add_node(1, Point::new(5.0, 5.0)),
        Err(NetworkError::DuplicateNode(1))
    );
    assert_eq!(
        builder.add_road("r", [1, 9]),
        Err(NetworkError::UnknownNode {
            road: RoadId::from("r"),
            node: 9
        })
    );
    assert_eq!(
        builder.add_road("r", [1]),
        Err(NetworkError::DegenerateRoad(RoadId::from("r")))
    );

    builder.add_road("r", [1, 2]).expect("road");
    assert_eq!(
        builder.add_road("r", [2, 1]),
        Err(NetworkError::DuplicateRoad(RoadId::from("r")))
    );

    builder.add_road("s", [1, 2]).expect("declared");
    assert_eq!(builder.build().err(), Some(NetworkError::ParallelSegment(1, 2)));
}
