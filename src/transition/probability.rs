use std::f64::consts::PI;

use crate::config::MatchConfig;
use crate::error::MatchError;

/// Largest plausible speed (metres per second) between two observations.
const MAX_SPEED: f64 = 50.0;

/// Largest plausible detour ratio between route and linear distance.
const MAX_DETOUR: f64 = 8.0;

/// The emission and transition model of Newson & Krumm.
///
/// Emissions follow a zero-mean Gaussian over the distance between an
/// observation and its candidate, transitions follow an exponential
/// distribution over the (time normalised) difference between the route
/// and the straight-line distance of two consecutive observations.
///
/// ```rust
/// use roadmatch::transition::ProbabilityModel;
///
/// let model = ProbabilityModel::new(4.07, 0.08);
/// assert!(model.emission_log_probability(1.0) > model.emission_log_probability(10.0));
///
/// let straight = model.transition_log_probability(100.0, 100.0, 10.0)?;
/// let detour = model.transition_log_probability(180.0, 100.0, 10.0)?;
/// assert!(straight > detour);
/// # Ok::<(), roadmatch::error::MatchError>(())
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbabilityModel {
    sigma: f64,
    beta: f64,
}

impl ProbabilityModel {
    pub fn new(sigma: f64, beta: f64) -> Self {
        ProbabilityModel { sigma, beta }
    }

    pub fn from_config(config: &MatchConfig) -> Self {
        ProbabilityModel::new(config.sigma, config.beta)
    }

    #[inline]
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    #[inline]
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Gaussian log-density of the observation noise at `distance`.
    #[inline]
    pub fn emission_log_probability(&self, distance: f64) -> f64 {
        let normal = (2.0 * PI).sqrt() * self.sigma;
        -normal.ln() - 0.5 * (distance / self.sigma).powi(2)
    }

    #[inline]
    pub fn emission_probability(&self, distance: f64) -> f64 {
        self.emission_log_probability(distance).exp()
    }

    /// Exponential log-density of travelling `route_length` between two
    /// observations `linear_distance` apart and `time_diff` seconds apart.
    pub fn transition_log_probability(
        &self,
        route_length: f64,
        linear_distance: f64,
        time_diff: f64,
    ) -> Result<f64, MatchError> {
        if time_diff <= 0.0 {
            return Err(MatchError::NonPositiveTimeDelta(time_diff));
        }

        let metric = (linear_distance - route_length).abs() / time_diff.powi(2);
        Ok(-self.beta.ln() - metric / self.beta)
    }

    /// The transition log-probability of the longest plausible route,
    /// charged for observations the decoder could not match.
    pub fn max_transition_log_probability(
        &self,
        linear_distance: f64,
        time_diff: f64,
    ) -> Result<f64, MatchError> {
        let route_length = Self::max_route_distance(linear_distance, time_diff);
        self.transition_log_probability(route_length, linear_distance, time_diff)
    }

    /// Search bound for routes between two observations.
    #[inline]
    pub fn max_route_distance(linear_distance: f64, time_diff: f64) -> f64 {
        (MAX_SPEED * time_diff).min(MAX_DETOUR * linear_distance)
    }
}
