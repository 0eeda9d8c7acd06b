use approx::assert_relative_eq;
use geo::{Line, Point};

use crate::config::MatchConfig;
use crate::error::MatchError;
use crate::fixtures::{grid, joined_roads, straight_road, two_way_road};
use crate::network::{PointMatch, RoadId, SegmentIx};
use crate::transition::step::turn_cost;
use crate::transition::{
    collapse, CandidateGenerator, Observation, ProbabilityModel, ResultAssembler, RoadPath,
    SequenceState, StateKind, TransitionSolver,
};

fn point_match(road: &str, segment: usize, x: f64) -> PointMatch {
    PointMatch {
        road: RoadId::from(road),
        segment: SegmentIx(segment),
        line: Line::new(Point::new(0.0, 0.0), Point::new(1000.0, 0.0)),
        point: Point::new(x, 0.0),
    }
}

fn path(from: &PointMatch, to: &PointMatch, roads: &[&str]) -> RoadPath {
    RoadPath {
        from: from.clone(),
        to: to.clone(),
        roads: roads.iter().map(|road| RoadId::from(*road)).collect(),
    }
}

#[test]
fn emission_decreases_with_distance() {
    let model = ProbabilityModel::new(4.07, 0.08);

    let peak = -((2.0 * std::f64::consts::PI).sqrt() * 4.07).ln();
    assert_relative_eq!(model.emission_log_probability(0.0), peak);

    let mut previous = model.emission_log_probability(0.0);
    for distance in 1..50 {
        let current = model.emission_log_probability(distance as f64);
        assert!(current < previous, "not decreasing at {distance}");
        previous = current;
    }

    assert_relative_eq!(
        model.emission_probability(3.0),
        model.emission_log_probability(3.0).exp()
    );
}

#[test]
fn transition_prefers_direct_routes() -> Result<(), MatchError> {
    let model = ProbabilityModel::new(4.07, 0.08);

    let direct = model.transition_log_probability(100.0, 100.0, 10.0)?;
    assert_relative_eq!(direct, -(0.08f64.ln()));

    // |linear - route| / Δt² = 0.5
    let detour = model.transition_log_probability(150.0, 100.0, 10.0)?;
    assert_relative_eq!(detour, -(0.08f64.ln()) - 0.5 / 0.08);

    assert_eq!(
        model.transition_log_probability(100.0, 100.0, 0.0),
        Err(MatchError::NonPositiveTimeDelta(0.0))
    );

    assert_relative_eq!(ProbabilityModel::max_route_distance(100.0, 1.0), 50.0);
    assert_relative_eq!(ProbabilityModel::max_route_distance(10.0, 10.0), 80.0);

    let bound = model.max_transition_log_probability(10.0, 10.0)?;
    assert_relative_eq!(bound, -(0.08f64.ln()) - 0.7 / 0.08);
    Ok(())
}

#[test]
fn turn_costs_by_angle() {
    assert_eq!(turn_cost(0.0), 0.0);
    assert_eq!(turn_cost(44.9), 0.0);
    assert_eq!(turn_cost(45.0), 1.0);
    assert_eq!(turn_cost(134.9), 1.0);
    assert_eq!(turn_cost(135.0), 2.0);
    assert_eq!(turn_cost(179.0), 2.0);
    assert_eq!(turn_cost(180.0), 10.0);
}

#[test_log::test]
fn turn_cost_along_grid_roads() {
    let network = grid(3, 100.0);
    let solver = TransitionSolver::new(&network, &MatchConfig::default());
    let roads = |ids: &[&str]| ids.iter().map(|id| RoadId::from(*id)).collect::<Vec<_>>();

    assert_eq!(solver.turn_cost(&roads(&["h0-0", "h0-1"])), 0.0);
    assert_eq!(solver.turn_cost(&roads(&["h0-0", "v1-0"])), 1.0);
    assert_eq!(solver.turn_cost(&roads(&["h0-0", "-h0-0"])), 10.0);
    assert_eq!(solver.turn_cost(&roads(&["h0-0", "v1-0", "-h1-0"])), 2.0);
}

#[test_log::test]
fn generator_scores_candidates() {
    let network = two_way_road();
    let config = MatchConfig::default();
    let generator = CandidateGenerator::new(&network, &config);
    let model = ProbabilityModel::from_config(&config);

    let candidates = generator.generate(&Observation::new(0.0, Point::new(300.0, 5.0)));
    assert_eq!(candidates.len(), 2);

    for candidate in &candidates {
        assert_relative_eq!(candidate.distance, 5.0);
        assert_relative_eq!(candidate.emission, model.emission_log_probability(5.0));
    }

    assert!(generator
        .generate(&Observation::new(0.0, Point::new(300.0, 80.0)))
        .is_empty());
}

#[test_log::test]
fn solver_charges_u_turns() -> Result<(), MatchError> {
    let network = two_way_road();
    let config = MatchConfig::default();
    let generator = CandidateGenerator::new(&network, &config);
    let solver = TransitionSolver::new(&network, &config);

    let previous = Observation::new(0.0, Point::new(10.0, 2.0));
    let current = Observation::new(1.0, Point::new(22.0, 2.0));

    let sources = generator.generate(&previous);
    let targets = generator.generate(&current);
    let reverse = sources
        .iter()
        .position(|c| c.matched.road.as_str() == "-east")
        .expect("reverse candidate");
    let forward = targets
        .iter()
        .position(|c| c.matched.road.as_str() == "east")
        .expect("forward candidate");

    let transitions = solver.solve(&previous, &[&sources[reverse].matched], &current, &targets)?;
    let transition = transitions[0][forward].as_ref().expect("reachable");

    // 10 m back to the end of `-east`, 22 m along `east`, and the U-turn.
    assert_relative_eq!(transition.route_length, 82.0);
    assert_eq!(
        transition.path.roads,
        vec![RoadId::from("-east"), RoadId::from("east")]
    );

    let model = ProbabilityModel::from_config(&config);
    assert_relative_eq!(
        transition.log_probability,
        model.transition_log_probability(82.0, 12.0, 1.0)?
    );

    // Staying on `-east` would need a loop far beyond the bound.
    assert!(transitions[0][1 - forward].is_none());
    Ok(())
}

#[test_log::test]
fn continuity_holds_candidates_drifting_backwards() {
    let network = straight_road();
    let config = MatchConfig::default();
    let generator = CandidateGenerator::new(&network, &config);

    let previous = Observation::new(0.0, Point::new(100.0, 2.0)).with_heading(90.0);
    let prior = generator.generate(&previous);
    let predecessors = prior.iter().collect::<Vec<_>>();

    let behind = Observation::new(1.0, Point::new(98.0, 2.0));
    let fresh = generator.generate(&behind);
    let held = generator.with_continuity(&previous, &behind, fresh, &predecessors);

    assert_eq!(held.len(), 1);
    assert_eq!(held[0].matched.point, prior[0].matched.point);
    assert_relative_eq!(held[0].distance, 8.0f64.sqrt());

    let ahead = Observation::new(1.0, Point::new(102.0, 2.0));
    let fresh = generator.generate(&ahead);
    let kept = generator.with_continuity(&previous, &ahead, fresh.clone(), &predecessors);
    assert_eq!(kept, fresh);

    // Without a heading, a fix at the same position gives no direction.
    let still = Observation::new(0.0, Point::new(100.0, 2.0));
    let fresh = generator.generate(&behind);
    let unchanged = generator.with_continuity(&still, &still, fresh.clone(), &predecessors);
    assert_eq!(unchanged, fresh);
}

#[test_log::test]
fn minimization_drops_redundant_segment_starts() {
    let network = joined_roads();
    let junction = Observation::new(0.0, Point::new(500.0, 5.0));

    let config = MatchConfig::default();
    let all = CandidateGenerator::new(&network, &config).generate(&junction);
    let roads = all.iter().map(|c| c.matched.road.as_str()).collect::<Vec<_>>();
    assert_eq!(roads, vec!["west", "east"]);

    let config = config.with_minimize_candidates(true);
    let minimal = CandidateGenerator::new(&network, &config).generate(&junction);
    let roads = minimal.iter().map(|c| c.matched.road.as_str()).collect::<Vec<_>>();
    assert_eq!(roads, vec!["west"]);
}

#[test]
fn collapse_attaches_endpoint_roads() {
    let a = point_match("a", 0, 10.0);
    let b = point_match("b", 1, 20.0);

    let roads = |ids: &[&str]| ids.iter().map(|id| RoadId::from(*id)).collect::<Vec<_>>();

    assert_eq!(collapse(&path(&a, &a, &[])), roads(&["a"]));
    assert_eq!(collapse(&path(&a, &b, &[])), roads(&["a", "b"]));
    assert_eq!(collapse(&path(&a, &b, &["x"])), roads(&["a", "x", "b"]));
    assert_eq!(collapse(&path(&a, &b, &["a", "x", "x", "b"])), roads(&["a", "x", "b"]));
}

#[test]
fn assembler_marks_breakpoints() {
    let first = point_match("a", 0, 10.0);
    let second = point_match("a", 0, 20.0);
    let elsewhere = point_match("a", 0, 45.0);
    let restart = point_match("a", 0, 60.0);

    let states = vec![
        SequenceState {
            observation: 0,
            matched: Some(first.clone()),
            kind: StateKind::Origin,
        },
        SequenceState {
            observation: 1,
            matched: Some(second.clone()),
            kind: StateKind::Routed(path(&first, &second, &["a"])),
        },
        SequenceState {
            observation: 2,
            matched: Some(elsewhere.clone()),
            kind: StateKind::Routed(path(&elsewhere, &elsewhere, &["a"])),
        },
        SequenceState::unmatched(3),
        SequenceState {
            observation: 4,
            matched: Some(restart.clone()),
            kind: StateKind::Origin,
        },
    ];

    let ranked = ResultAssembler::new(5).rank(states, Some(-10.0));

    assert_eq!(ranked.breakpoints, vec![false, false, true, true, true]);
    assert_eq!(ranked.breakpoint_count(), 3);
    assert_eq!(ranked.routes[0].roads, vec![RoadId::from("a")]);
    assert!(ranked.routes[3].is_empty());
    assert_eq!(ranked.points[3], None);
    assert_eq!(ranked.roads(), vec![RoadId::from("a")]);
    assert_relative_eq!(ranked.probability, (-2.0f64).exp());

    let empty = ResultAssembler::new(5).rank(vec![], None);
    assert_eq!(empty.probability, 0.0);
    assert_eq!(empty.log_probability, f64::NEG_INFINITY);
}
