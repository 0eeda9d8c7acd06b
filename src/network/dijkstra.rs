use indexmap::map::Entry;
use indexmap::IndexMap;
use pathfinding::num_traits::Zero;
use rustc_hash::{FxHashSet, FxHasher};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::hash::{BuildHasherDefault, Hash};
use std::ops::Add;

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// A path length, totally ordered so it may sit inside a [`BinaryHeap`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Length(pub f64);

impl Eq for Length {}

impl PartialOrd for Length {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Length {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Add for Length {
    type Output = Length;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Length(self.0 + rhs.0)
    }
}

impl Zero for Length {
    #[inline]
    fn zero() -> Self {
        Length(0.0)
    }

    #[inline]
    fn is_zero(&self) -> bool {
        self.0 == 0.0
    }
}

#[derive(Debug)]
struct SmallestHolder {
    cost: Length,
    index: usize,
}

impl PartialEq for SmallestHolder {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for SmallestHolder {}

impl PartialOrd for SmallestHolder {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SmallestHolder {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed, so the max-heap pops the cheapest entry first.
        // Ties resolve on insertion order to keep the walk deterministic.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Iterator returned by [`Dijkstra::reach`].
pub struct DijkstraReachable<N, FN> {
    to_see: BinaryHeap<SmallestHolder>,
    seen: FxHashSet<usize>,
    parents: FxIndexMap<N, (usize, Length)>,
    successors: FN,
}

/// Information about a node reached by [`Dijkstra::reach`].
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DijkstraReachableItem<N> {
    /// The node that was reached.
    pub node: N,
    /// The previous node that the current node came from.
    /// The start node has no parent.
    pub parent: Option<N>,
    /// The total cost from the starting node.
    pub total_cost: Length,
}

impl<N, FN> DijkstraReachable<N, FN>
where
    N: Copy + Hash + Eq,
{
    /// Rebuilds the node sequence from the start node to `node`.
    ///
    /// Only meaningful for nodes already yielded by the iterator, whose
    /// cost (and therefore parent chain) is settled.
    pub fn path(&self, node: &N) -> Vec<N> {
        let mut path = Vec::new();
        let mut cursor = self.parents.get_full(node).map(|(index, _, _)| index);

        while let Some((node, (parent, _))) = cursor.and_then(|i| self.parents.get_index(i)) {
            path.push(*node);
            cursor = Some(*parent);
        }

        path.reverse();
        path
    }
}

impl<N, FN, IN> Iterator for DijkstraReachable<N, FN>
where
    N: Copy + Hash + Eq,
    FN: FnMut(&N) -> IN,
    IN: IntoIterator<Item = (N, Length)>,
{
    type Item = DijkstraReachableItem<N>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(SmallestHolder { cost, index }) = self.to_see.pop() {
            if !self.seen.insert(index) {
                continue;
            }

            let Some((node, (parent_index, total_cost))) = self.parents.get_index(index) else {
                continue;
            };

            let item = DijkstraReachableItem {
                node: *node,
                parent: self.parents.get_index(*parent_index).map(|x| *x.0),
                total_cost: *total_cost,
            };

            let successors = (self.successors)(&item.node);

            for (successor, move_cost) in successors {
                let new_cost = cost + move_cost;

                let index = match self.parents.entry(successor) {
                    Entry::Vacant(e) => {
                        let n = e.index();
                        e.insert((index, new_cost));
                        n
                    }
                    Entry::Occupied(mut e) => {
                        if e.get().1 > new_cost {
                            e.insert((index, new_cost));
                            e.index()
                        } else {
                            continue;
                        }
                    }
                };

                self.to_see.push(SmallestHolder {
                    cost: new_cost,
                    index,
                });
            }

            return Some(item);
        }

        None
    }
}

pub struct Dijkstra;

impl Dijkstra {
    /// Visit all nodes that are reachable from a start node. The node
    /// will be visited in order of cost, with the closest nodes first.
    ///
    /// The `successors` function receives the current node, and returns
    /// an iterator of successors associated with their move cost.
    pub fn reach<N, FN, IN>(&self, start: &N, successors: FN) -> DijkstraReachable<N, FN>
    where
        N: Copy + Hash + Eq,
        FN: FnMut(&N) -> IN,
        IN: IntoIterator<Item = (N, Length)>,
    {
        let mut to_see: BinaryHeap<SmallestHolder> = BinaryHeap::with_capacity(256);
        to_see.push(SmallestHolder {
            cost: Zero::zero(),
            index: 0,
        });

        let mut parents: FxIndexMap<N, (usize, Length)> =
            FxIndexMap::with_capacity_and_hasher(64, BuildHasherDefault::<FxHasher>::default());

        parents.insert(*start, (usize::MAX, Zero::zero()));

        DijkstraReachable {
            to_see,
            seen: FxHashSet::default(),
            parents,
            successors,
        }
    }
}
