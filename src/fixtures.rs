//! Small synthetic networks and trajectories shared by the unit tests.

use geo::{wkt, Point};

use crate::network::{Planar, RoadNetwork};
use crate::transition::{Observation, Trajectory};

/// A single one-way road `east` from (0, 0) to (1000, 0).
pub(crate) fn straight_road() -> RoadNetwork<Planar> {
    let mut builder = RoadNetwork::builder(Planar);
    builder.add_node(1, Point::new(0.0, 0.0)).expect("node");
    builder.add_node(2, Point::new(1000.0, 0.0)).expect("node");
    builder.add_road("east", [1, 2]).expect("road");
    builder.build().expect("network")
}

/// The straight road, travelled both ways (`east` and `-east`).
pub(crate) fn two_way_road() -> RoadNetwork<Planar> {
    let mut builder = RoadNetwork::builder(Planar);
    builder.add_node(1, Point::new(0.0, 0.0)).expect("node");
    builder.add_node(2, Point::new(1000.0, 0.0)).expect("node");
    builder.add_two_way_road("east", [1, 2]).expect("road");
    builder.build().expect("network")
}

/// Two one-way roads heading east, `a` at y = 0 and `b` at y = 3,
/// never connected to one another.
pub(crate) fn parallel_roads() -> RoadNetwork<Planar> {
    let mut builder = RoadNetwork::builder(Planar);
    builder.add_node(1, Point::new(0.0, 0.0)).expect("node");
    builder.add_node(2, Point::new(1000.0, 0.0)).expect("node");
    builder.add_node(3, Point::new(0.0, 3.0)).expect("node");
    builder.add_node(4, Point::new(1000.0, 3.0)).expect("node");
    builder.add_road("a", [1, 2]).expect("road");
    builder.add_road("b", [3, 4]).expect("road");
    builder.build().expect("network")
}

/// Two one-way roads heading east, `a` at y = 0 and `b` at y = 3, with
/// nodes every 200 m. Two-way rungs `x{k}` join them at every node, so
/// moving between them is only routable across a rung.
pub(crate) fn ladder_roads() -> RoadNetwork<Planar> {
    let mut builder = RoadNetwork::builder(Planar);
    for k in 0..=5 {
        let x = 200.0 * k as f64;
        builder.add_node(k, Point::new(x, 0.0)).expect("node");
        builder.add_node(10 + k, Point::new(x, 3.0)).expect("node");
    }

    builder.add_road("a", 0..=5).expect("road");
    builder.add_road("b", 10..=15).expect("road");
    for k in 0..=5 {
        builder.add_two_way_road(format!("x{k}"), [k, 10 + k]).expect("road");
    }

    builder.build().expect("network")
}

/// Two one-way roads in sequence, `west` from (0, 0) to (500, 0)
/// continuing as `east` to (1000, 0).
pub(crate) fn joined_roads() -> RoadNetwork<Planar> {
    let mut builder = RoadNetwork::builder(Planar);
    builder.add_node(1, Point::new(0.0, 0.0)).expect("node");
    builder.add_node(2, Point::new(500.0, 0.0)).expect("node");
    builder.add_node(3, Point::new(1000.0, 0.0)).expect("node");
    builder.add_road("west", [1, 2]).expect("road");
    builder.add_road("east", [2, 3]).expect("road");
    builder.build().expect("network")
}

/// A square block of two-way streets, `size` by `size` nodes,
/// `spacing` apart. Horizontal streets are `h{row}-{col}`, running
/// from column `col` to `col + 1`; vertical streets are `v{col}-{row}`.
pub(crate) fn grid(size: u64, spacing: f64) -> RoadNetwork<Planar> {
    let mut builder = RoadNetwork::builder(Planar);
    let id = |row: u64, col: u64| row * size + col;

    for row in 0..size {
        for col in 0..size {
            let position = Point::new(col as f64 * spacing, row as f64 * spacing);
            builder.add_node(id(row, col), position).expect("node");
        }
    }

    for line in 0..size {
        for step in 0..size - 1 {
            builder
                .add_two_way_road(format!("h{line}-{step}"), [id(line, step), id(line, step + 1)])
                .expect("road");
            builder
                .add_two_way_road(format!("v{line}-{step}"), [id(step, line), id(step + 1, line)])
                .expect("road");
        }
    }

    builder.build().expect("network")
}

/// Observations one second apart, 12 m apart along y = 2.
pub(crate) fn straight_trajectory(count: usize) -> Trajectory {
    Trajectory::new(
        "straight",
        (0..count)
            .map(|i| Observation::new(i as f64, Point::new(10.0 + 12.0 * i as f64, 2.0)))
            .collect(),
    )
}

/// Observations 10 m apart heading east between the parallel roads,
/// alternating between y = 1.0 and y = 1.8.
pub(crate) fn wavering_trajectory(count: usize) -> Trajectory {
    Trajectory::new(
        "wavering",
        (0..count)
            .map(|i| {
                let y = if i % 2 == 0 { 1.0 } else { 1.8 };
                Observation::new(i as f64, Point::new(5.0 + 10.0 * i as f64, y))
            })
            .collect(),
    )
}

/// The wavering trajectory reporting an eastward heading, where every
/// observation `i` with `i % 20 == 9` falls 2 m behind the one before it.
/// Those lie at least 60 m away from the rungs of [`ladder_roads`].
pub(crate) fn drifting_trajectory(count: usize) -> Trajectory {
    let mut observations: Vec<Observation> = Vec::with_capacity(count);
    for i in 0..count {
        let y = if i % 2 == 0 { 1.0 } else { 1.8 };
        let x = match observations.last() {
            Some(previous) if i % 20 == 9 => previous.position.x() - 2.0,
            _ => 5.0 + 10.0 * i as f64,
        };

        observations.push(Observation::new(i as f64, Point::new(x, y)).with_heading(90.0));
    }

    Trajectory::new("drifting", observations)
}

/// East along y = 200 from x = 5, then north along x = 800, 10 m per
/// second with up to 3.5 m of alternating noise. Fits [`grid`] with ten
/// nodes 100 m apart.
pub(crate) fn staircase_trajectory() -> Trajectory {
    let noise = |i: usize| [3.0, -2.0, 1.5, -3.5][i % 4];
    let east = (0..80).map(|i| Point::new(5.0 + 10.0 * i as f64, 200.0 + noise(i)));
    let north = (0..60).map(|i| Point::new(800.0 + noise(i), 205.0 + 10.0 * i as f64));

    Trajectory::new(
        "staircase",
        east.chain(north)
            .enumerate()
            .map(|(i, position)| Observation::new(i as f64, position))
            .collect(),
    )
}

/// Ten observations along [`joined_roads`] around the junction at
/// x = 500, with observation 4 far off the network and both of its
/// neighbours 20 m off the road.
pub(crate) fn outlier_trajectory() -> Trajectory {
    let points = wkt! {
        LINESTRING (440.0 2.0, 452.0 -1.0, 464.0 2.0, 476.0 20.0, 488.0 500.0, 500.0 20.0, 512.0 2.0, 524.0 -1.0, 536.0 2.0, 548.0 1.0)
    };

    Trajectory::new(
        "outlier",
        points
            .into_points()
            .into_iter()
            .enumerate()
            .map(|(i, point)| Observation::new(i as f64, point))
            .collect(),
    )
}
