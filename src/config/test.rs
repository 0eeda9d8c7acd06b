use std::collections::HashMap;
use std::str::FromStr;

use crate::config::{MatchConfig, PolicyKind, WindowConfig};
use crate::error::ConfigError;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let values = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<HashMap<_, _>>();

    move |key| values.get(key).cloned()
}

#[test_log::test]
fn defaults_are_valid() {
    let config = MatchConfig::default();

    assert!(config.validate().is_ok());
    assert_eq!(config.candidate_range, 50.0);
    assert_eq!(config.max_time_gap, 180.0);
    assert_eq!(config.window.policy, PolicyKind::Fixed);
}

#[test_log::test]
fn policy_names_parse() {
    assert_eq!(PolicyKind::from_str("fixed"), Ok(PolicyKind::Fixed));
    assert_eq!(PolicyKind::from_str("Goh"), Ok(PolicyKind::Goh));
    assert_eq!(PolicyKind::from_str("EDDY"), Ok(PolicyKind::Eddy));
    assert!(PolicyKind::from_str("lru").is_err());

    assert_eq!(PolicyKind::Eddy.to_string(), "eddy");
}

#[test_log::test]
fn lookup_overrides_defaults() {
    let config = MatchConfig::from_lookup(lookup(&[
        ("SIGMA", "6.5"),
        ("RANK_LENGTH", "3"),
        ("WINDOW_POLICY", "eddy"),
        ("WINDOW_GAMMA", "0.25"),
        ("WINDOW_MAX_STATE_NUM", "none"),
        ("MINIMIZE_CANDIDATES", "true"),
    ]))
    .expect("valid configuration");

    assert_eq!(config.sigma, 6.5);
    assert_eq!(config.rank_length, 3);
    assert_eq!(config.window.policy, PolicyKind::Eddy);
    assert_eq!(config.window.gamma, 0.25);
    assert_eq!(config.window.max_state_num, None);
    assert!(config.minimize_candidates);

    // Untouched keys keep their defaults
    assert_eq!(config.beta, MatchConfig::default().beta);
}

#[test_log::test]
fn unparsable_values_are_reported() {
    let error = MatchConfig::from_lookup(lookup(&[("BETA", "steep")])).unwrap_err();

    assert_eq!(
        error,
        ConfigError::Unparsable {
            key: "BETA",
            value: "steep".to_string()
        }
    );
}

#[test_log::test]
fn out_of_range_values_are_rejected() {
    let error = MatchConfig::from_lookup(lookup(&[("SIGMA", "-1")])).unwrap_err();
    assert!(matches!(error, ConfigError::OutOfRange { key: "sigma", .. }));

    let config = MatchConfig::default().with_rank_length(0);
    assert!(config.validate().is_err());

    let config = MatchConfig::default().with_workers(0);
    assert!(config.validate().is_err());

    let mut window = WindowConfig::default();
    window.max_state_num = Some(0);
    assert!(matches!(
        MatchConfig::default().with_window(window).validate(),
        Err(ConfigError::OutOfRange {
            key: "window.max_state_num",
            ..
        })
    ));
}

#[test_log::test]
fn window_builders_compose() {
    let window = WindowConfig {
        policy: PolicyKind::Goh,
        max_state_num: Some(4),
        max_waiting_time: Some(30.0),
        gamma: 0.0,
    };

    let config = MatchConfig::default()
        .with_window(window.clone())
        .with_policy(PolicyKind::Fixed);

    assert_eq!(config.window.policy, PolicyKind::Fixed);
    assert_eq!(config.window.max_state_num, window.max_state_num);
    assert_eq!(config.window.max_waiting_time, window.max_waiting_time);
}

#[test]
fn errors_lift_into_the_crate_error() {
    let error: crate::Error = MatchConfig::default()
        .with_rank_length(0)
        .validate()
        .unwrap_err()
        .into();
    assert!(matches!(
        error,
        crate::Error::Config(ConfigError::OutOfRange {
            key: "rank_length",
            ..
        })
    ));

    let error: crate::Error = crate::error::MatchError::NoPointsProvided.into();
    assert_eq!(error.to_string(), "match failed: no input points were given");
}
