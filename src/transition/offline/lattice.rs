use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::transition::{Candidate, SequenceState, StateKind, Transition};

/// One ranked way of reaching a candidate.
#[derive(Clone, Debug)]
struct Entry {
    score: f64,
    /// The `(slot, rank)` entry of the previous step this one extends.
    predecessor: Option<(usize, usize)>,
    transition: Option<Transition>,
}

#[derive(Clone, Debug)]
pub(crate) struct LatticeStep {
    pub(crate) observation: usize,
    pub(crate) candidates: Vec<Candidate>,
    entries: Vec<SmallVec<[Entry; 2]>>,
}

/// Orders by descending score, then ascending `(slot, rank)`.
fn ranking(a: (f64, usize, usize), b: (f64, usize, usize)) -> Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| a.1.cmp(&b.1))
        .then_with(|| a.2.cmp(&b.2))
}

/// A rank-K Viterbi lattice: every candidate keeps the K best distinct
/// ways of reaching it, so the K best sequences can be recovered.
#[derive(Clone, Debug)]
pub(crate) struct Lattice {
    rank_length: usize,
    steps: Vec<LatticeStep>,
}

impl Lattice {
    pub(crate) fn new(rank_length: usize) -> Self {
        Lattice {
            rank_length: rank_length.max(1),
            steps: vec![],
        }
    }

    pub(crate) fn last(&self) -> Option<&LatticeStep> {
        self.steps.last()
    }

    pub(crate) fn clear(&mut self) {
        self.steps.clear();
    }

    /// Starts a new run at `observation`, scored by emission alone.
    pub(crate) fn start(&mut self, observation: usize, candidates: Vec<Candidate>) {
        let entries = candidates
            .iter()
            .map(|candidate| {
                SmallVec::from_elem(
                    Entry {
                        score: candidate.emission,
                        predecessor: None,
                        transition: None,
                    },
                    1,
                )
            })
            .collect();

        self.steps.clear();
        self.steps.push(LatticeStep {
            observation,
            candidates,
            entries,
        });
    }

    /// Extends the run by one observation. `transitions` is indexed as
    /// `[previous slot][slot]`.
    ///
    /// Returns `false`, leaving the lattice untouched, when no candidate
    /// can be reached from the previous step.
    pub(crate) fn advance(
        &mut self,
        observation: usize,
        candidates: Vec<Candidate>,
        transitions: Vec<Vec<Option<Transition>>>,
    ) -> bool {
        let Some(previous) = self.steps.last() else {
            return false;
        };

        let mut entries: Vec<SmallVec<[Entry; 2]>> = Vec::with_capacity(candidates.len());

        for (slot, candidate) in candidates.iter().enumerate() {
            let mut options = previous
                .entries
                .iter()
                .enumerate()
                .filter_map(|(prev_slot, ranked)| {
                    let transition = transitions.get(prev_slot)?.get(slot)?.as_ref()?;
                    Some(ranked.iter().enumerate().map(move |(rank, entry)| {
                        let score = entry.score + transition.log_probability + candidate.emission;
                        (score, prev_slot, rank)
                    }))
                })
                .flatten()
                .filter(|(score, ..)| *score > f64::NEG_INFINITY)
                .collect::<Vec<_>>();

            options.sort_by(|a, b| ranking(*a, *b));
            options.truncate(self.rank_length);

            entries.push(
                options
                    .into_iter()
                    .map(|(score, prev_slot, rank)| Entry {
                        score,
                        predecessor: Some((prev_slot, rank)),
                        transition: transitions[prev_slot][slot].clone(),
                    })
                    .collect(),
            );
        }

        if entries.iter().all(|ranked| ranked.is_empty()) {
            return false;
        }

        self.steps.push(LatticeStep {
            observation,
            candidates,
            entries,
        });
        true
    }

    /// The K most likely sequences of the run with their log-probabilities,
    /// best first.
    pub(crate) fn ranked(&self) -> Vec<(Vec<SequenceState>, f64)> {
        let Some(last) = self.steps.last() else {
            return vec![];
        };

        let mut finals = last
            .entries
            .iter()
            .enumerate()
            .flat_map(|(slot, ranked)| {
                ranked
                    .iter()
                    .enumerate()
                    .map(move |(rank, entry)| (entry.score, slot, rank))
            })
            .collect::<Vec<_>>();

        finals.sort_by(|a, b| ranking(*a, *b));
        finals.truncate(self.rank_length);

        finals
            .into_iter()
            .map(|(score, slot, rank)| (self.backtrack(slot, rank), score))
            .collect()
    }

    fn backtrack(&self, slot: usize, rank: usize) -> Vec<SequenceState> {
        let mut sequence = Vec::with_capacity(self.steps.len());
        let mut cursor = Some((slot, rank));

        for step in self.steps.iter().rev() {
            let Some((slot, rank)) = cursor else {
                break;
            };

            let Some(entry) = step.entries.get(slot).and_then(|ranked| ranked.get(rank)) else {
                break;
            };

            let kind = match &entry.transition {
                Some(transition) => StateKind::Routed(transition.path.clone()),
                None => StateKind::Origin,
            };

            sequence.push(SequenceState {
                observation: step.observation,
                matched: step.candidates.get(slot).map(|c| c.matched.clone()),
                kind,
            });

            cursor = entry.predecessor;
        }

        sequence.reverse();
        sequence
    }
}
