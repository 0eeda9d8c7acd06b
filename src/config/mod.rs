//! Matching configuration.
//!
//! Every option has a default, so a partial file (or `.env`)
//! only needs to name what it changes.

use std::env;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ConfigError;

#[cfg(test)]
mod test;

pub const DEFAULT_CANDIDATE_RANGE: f64 = 50.0;
pub const DEFAULT_SIGMA: f64 = 4.07;
pub const DEFAULT_BETA: f64 = 0.08;
pub const DEFAULT_MAX_TIME_GAP: f64 = 180.0;

const ENV_PREFIX: &str = "ROADMATCH_";

/// The sliding window eviction policy of the online decoder.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Evict the oldest state once the window is too long or too old.
    #[default]
    Fixed,
    /// Emit as soon as the chain converges onto a single state.
    Goh,
    /// Emit once the remaining uncertainty costs less than waiting longer.
    Eddy,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub policy: PolicyKind,
    /// Largest number of time steps kept once a shrink has run.
    pub max_state_num: Option<usize>,
    /// Largest time span (seconds) between the oldest and newest time step.
    pub max_waiting_time: Option<f64>,
    /// Latency cost per second of waiting, used by [`PolicyKind::Eddy`].
    pub gamma: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            policy: PolicyKind::Fixed,
            max_state_num: Some(16),
            max_waiting_time: None,
            gamma: 0.1,
        }
    }
}

/// The options shared by both decoders.
///
/// ```rust
/// use roadmatch::config::{MatchConfig, PolicyKind};
///
/// let config = MatchConfig::default()
///     .with_sigma(5.0)
///     .with_rank_length(3)
///     .with_policy(PolicyKind::Goh);
///
/// assert_eq!(config.rank_length, 3);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Radius around an observation in which road segments become candidates.
    pub candidate_range: f64,
    /// Standard deviation of the GPS noise.
    pub sigma: f64,
    /// Scale of the exponential transition distribution.
    pub beta: f64,
    /// Number of ranked sequences the offline decoder keeps.
    pub rank_length: usize,
    /// Observations further than this from every candidate extend an unmatched span.
    pub gap_extension_dist: f64,
    /// Time difference (seconds) above which the offline decoder restarts.
    pub max_time_gap: f64,
    /// Distance added to a route which turns back onto its own road.
    pub u_turn_penalty: f64,
    /// Distance added per unit of turn cost along a route. Zero disables it.
    pub turn_weight: f64,
    /// Removes candidates made redundant by a connected neighbour.
    pub minimize_candidates: bool,
    /// Threads used by the batch matcher. Defaults to rayon's choice.
    pub workers: Option<usize>,
    pub window: WindowConfig,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            candidate_range: DEFAULT_CANDIDATE_RANGE,
            sigma: DEFAULT_SIGMA,
            beta: DEFAULT_BETA,
            rank_length: 1,
            gap_extension_dist: 15.0,
            max_time_gap: DEFAULT_MAX_TIME_GAP,
            u_turn_penalty: 50.0,
            turn_weight: 0.0,
            minimize_candidates: false,
            workers: None,
            window: WindowConfig::default(),
        }
    }
}

impl MatchConfig {
    pub fn with_candidate_range(mut self, candidate_range: f64) -> Self {
        self.candidate_range = candidate_range;
        self
    }

    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_rank_length(mut self, rank_length: usize) -> Self {
        self.rank_length = rank_length;
        self
    }

    pub fn with_gap_extension_dist(mut self, gap_extension_dist: f64) -> Self {
        self.gap_extension_dist = gap_extension_dist;
        self
    }

    pub fn with_max_time_gap(mut self, max_time_gap: f64) -> Self {
        self.max_time_gap = max_time_gap;
        self
    }

    pub fn with_u_turn_penalty(mut self, u_turn_penalty: f64) -> Self {
        self.u_turn_penalty = u_turn_penalty;
        self
    }

    pub fn with_turn_weight(mut self, turn_weight: f64) -> Self {
        self.turn_weight = turn_weight;
        self
    }

    pub fn with_minimize_candidates(mut self, minimize_candidates: bool) -> Self {
        self.minimize_candidates = minimize_candidates;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.window = window;
        self
    }

    pub fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.window.policy = policy;
        self
    }

    /// Checks every option lies in its domain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("candidate_range", self.candidate_range)?;
        positive("sigma", self.sigma)?;
        positive("beta", self.beta)?;
        positive("max_time_gap", self.max_time_gap)?;
        non_negative("gap_extension_dist", self.gap_extension_dist)?;
        non_negative("u_turn_penalty", self.u_turn_penalty)?;
        non_negative("turn_weight", self.turn_weight)?;
        non_negative("window.gamma", self.window.gamma)?;

        if self.rank_length == 0 {
            return Err(ConfigError::OutOfRange {
                key: "rank_length",
                requirement: "at least 1",
                value: 0.0,
            });
        }

        if self.window.max_state_num == Some(0) {
            return Err(ConfigError::OutOfRange {
                key: "window.max_state_num",
                requirement: "at least 1",
                value: 0.0,
            });
        }

        if let Some(max_waiting_time) = self.window.max_waiting_time {
            non_negative("window.max_waiting_time", max_waiting_time)?;
        }

        if self.workers == Some(0) {
            return Err(ConfigError::OutOfRange {
                key: "workers",
                requirement: "at least 1",
                value: 0.0,
            });
        }

        Ok(())
    }

    /// Builds a configuration from the defaults, overridden by any
    /// `ROADMATCH_*` environment variable. A `.env` file in the working
    /// directory (or its parents) is loaded first, when present.
    ///
    /// Recognised variables: `ROADMATCH_CANDIDATE_RANGE`, `ROADMATCH_SIGMA`,
    /// `ROADMATCH_BETA`, `ROADMATCH_RANK_LENGTH`, `ROADMATCH_GAP_EXTENSION_DIST`,
    /// `ROADMATCH_MAX_TIME_GAP`, `ROADMATCH_U_TURN_PENALTY`, `ROADMATCH_TURN_WEIGHT`,
    /// `ROADMATCH_MINIMIZE_CANDIDATES`, `ROADMATCH_WORKERS`, `ROADMATCH_WINDOW_POLICY`,
    /// `ROADMATCH_WINDOW_MAX_STATE_NUM`, `ROADMATCH_WINDOW_MAX_WAITING_TIME`
    /// and `ROADMATCH_WINDOW_GAMMA`.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenv::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }

        Self::from_lookup(|key| env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Builds a configuration from the defaults, overridden by whatever
    /// `lookup` yields for each (unprefixed) key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = MatchConfig::default();

        read(&lookup, "CANDIDATE_RANGE", &mut config.candidate_range)?;
        read(&lookup, "SIGMA", &mut config.sigma)?;
        read(&lookup, "BETA", &mut config.beta)?;
        read(&lookup, "RANK_LENGTH", &mut config.rank_length)?;
        read(&lookup, "GAP_EXTENSION_DIST", &mut config.gap_extension_dist)?;
        read(&lookup, "MAX_TIME_GAP", &mut config.max_time_gap)?;
        read(&lookup, "U_TURN_PENALTY", &mut config.u_turn_penalty)?;
        read(&lookup, "TURN_WEIGHT", &mut config.turn_weight)?;
        read(&lookup, "MINIMIZE_CANDIDATES", &mut config.minimize_candidates)?;
        read_optional(&lookup, "WORKERS", &mut config.workers)?;

        read(&lookup, "WINDOW_POLICY", &mut config.window.policy)?;
        read_optional(&lookup, "WINDOW_MAX_STATE_NUM", &mut config.window.max_state_num)?;
        read_optional(
            &lookup,
            "WINDOW_MAX_WAITING_TIME",
            &mut config.window.max_waiting_time,
        )?;
        read(&lookup, "WINDOW_GAMMA", &mut config.window.gamma)?;

        config.validate()?;
        Ok(config)
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Unparsable {
        key,
        value: value.to_string(),
    })
}

fn read<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(key) {
        *slot = parse(key, &value)?;
    }

    Ok(())
}

/// As [`read`], where `none` (or an empty value) clears the option.
fn read_optional<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    slot: &mut Option<T>,
) -> Result<(), ConfigError> {
    match lookup(key) {
        Some(value) if value.trim().is_empty() || value.trim().eq_ignore_ascii_case("none") => {
            *slot = None
        }
        Some(value) => *slot = Some(parse(key, &value)?),
        None => {}
    }

    Ok(())
}

fn positive(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        return Ok(());
    }

    Err(ConfigError::OutOfRange {
        key,
        requirement: "positive and finite",
        value,
    })
}

fn non_negative(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        return Ok(());
    }

    Err(ConfigError::OutOfRange {
        key,
        requirement: "non-negative and finite",
        value,
    })
}
