use log::{info, warn};
use measure_time::info_time;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::MatchConfig;
use crate::error::MatchError;
use crate::network::MapView;
use crate::transition::{MatchResult, OfflineDecoder, Trajectory};

/// Matches many trajectories in parallel against one shared network.
///
/// Decoding runs on a dedicated pool of `config.workers` threads
/// (rayon's default when unset). A failing trajectory is logged and
/// reported in its slot of the output, the others continue.
pub struct BatchMatcher<'a, M: MapView> {
    decoder: OfflineDecoder<'a, M>,
    pool: ThreadPool,
}

impl<'a, M: MapView> BatchMatcher<'a, M> {
    pub fn new(map: &'a M, config: &MatchConfig) -> crate::Result<Self> {
        config.validate()?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.unwrap_or(0))
            .thread_name(|index| format!("roadmatch-{index}"))
            .build()?;

        Ok(BatchMatcher {
            decoder: OfflineDecoder::new(map, config),
            pool,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Decodes every trajectory. The output is aligned with the input.
    pub fn match_all(&self, trajectories: &[Trajectory]) -> Vec<Result<MatchResult, MatchError>> {
        info_time!("matched {} trajectories", trajectories.len());

        let results = self.pool.install(|| {
            trajectories
                .par_iter()
                .map(|trajectory| {
                    self.decoder.decode(trajectory).inspect_err(|e| {
                        warn!("Trajectory {} could not be matched: {e}", trajectory.id)
                    })
                })
                .collect::<Vec<_>>()
        });

        let failed = results.iter().filter(|result| result.is_err()).count();
        info!(
            "Matched {} of {} trajectories on {} workers",
            trajectories.len() - failed,
            trajectories.len(),
            self.workers()
        );

        results
    }
}
