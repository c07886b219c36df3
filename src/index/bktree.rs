//! Metric tree for bounded edit-distance search, after Burkhard and
//! Keller. Every edge carries the exact distance between its two
//! nodes, so a search for everything within `max_distance` of a query
//! only has to descend edges whose label stays inside the triangle
//! inequality window around the computed distance.
//!
//! Nodes live in an arena and reference each other through plain
//! indices: clearing the tree is one arena reset, and both insert and
//! search walk iteratively so that a degenerate chain of nodes cannot
//! blow the stack.

use std::collections::{BTreeMap, VecDeque};

use log::warn;

use crate::dictionary::WordId;
use crate::distance::DistanceFn;
use crate::interner::Word;

/// Hard cap on the search radius. A query asking for more is
/// silently clamped down to it.
pub const MAX_DISTANCE: usize = 10;

/// An insert descending deeper than this is dropped with a warning
/// instead of looping forever on a corrupted tree. Real dictionaries
/// produce depths in the low tens.
const DEPTH_LIMIT: usize = 1 << 16;

/// How many words are inserted between two collect hints during a
/// batch insert.
const BATCH_SIZE: usize = 1000;

#[derive(Debug)]
struct Node {
    word: Word,
    id: WordId,
    /// Edge label (distance to this node) to arena index of the child.
    children: BTreeMap<u32, u32>,
}

/// BK-tree over a caller-chosen distance function.
#[derive(Debug)]
pub struct BkTree {
    /// Arena; the root is nodes[0] whenever the tree is not empty.
    nodes: Vec<Node>,
    distance: DistanceFn,
    max_distance: usize,
}

impl BkTree {
    /// Tree with the default search radius cap.
    pub fn new(distance: DistanceFn) -> Self {
        BkTree::with_max_distance(distance, MAX_DISTANCE)
    }

    pub fn with_max_distance(distance: DistanceFn, max_distance: usize) -> Self {
        BkTree {
            nodes: Vec::new(),
            distance,
            max_distance,
        }
    }

    /// How many nodes the tree holds.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node. The arena keeps its storage for the rebuild.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Insert the word, walking down from the root. Meeting a node at
    /// distance zero means the same surface form is already there: its
    /// id is overwritten and the tree shape is untouched.
    pub fn insert(&mut self, word: Word, id: WordId) {
        if self.nodes.is_empty() {
            self.nodes.push(Node {
                word,
                id,
                children: BTreeMap::new(),
            });
            return;
        }

        let mut current = 0usize;

        for _depth in 0..DEPTH_LIMIT {
            let node_word = self.nodes[current].word.clone();
            // The exact distance is needed for the edge label, so the
            // cutoff is wide enough to never trigger.
            let cutoff = word.len().max(node_word.len());
            let distance = (self.distance)(&word, &node_word, cutoff) as u32;

            if distance == 0 {
                self.nodes[current].id = id;
                return;
            }

            match self.nodes[current].children.get(&distance) {
                Some(child) => current = *child as usize,
                None => {
                    let index = self.nodes.len() as u32;
                    self.nodes.push(Node {
                        word,
                        id,
                        children: BTreeMap::new(),
                    });
                    self.nodes[current].children.insert(distance, index);
                    return;
                }
            }
        }

        warn!(
            "bk-tree insert of {:?} gave up below depth {}, word dropped until next rebuild",
            String::from_utf8_lossy(&word),
            DEPTH_LIMIT
        );
    }

    /// Insert aligned (words, ids) pairs in order. Every `BATCH_SIZE`
    /// inserts the collect hint is invoked, giving the host a chance
    /// to reclaim intermediates between batches.
    pub fn insert_batch(
        &mut self,
        words: &[Word],
        ids: &[WordId],
        mut collect_hint: Option<&mut dyn FnMut()>,
    ) {
        debug_assert_eq!(words.len(), ids.len());

        for (count, (word, id)) in words.iter().zip(ids.iter()).enumerate() {
            self.insert(word.clone(), *id);

            if (count + 1) % BATCH_SIZE == 0 {
                if let Some(hint) = collect_hint.as_mut() {
                    hint();
                }
            }
        }
    }

    /// Everything within `max_distance` of the query, as (id, distance)
    /// pairs sorted by distance then id, so an exact hit always comes
    /// first. The radius is clamped to the configured cap.
    ///
    /// The walk is a breadth-style frontier: each visited node is
    /// measured against the query, and only children whose edge label
    /// lies in `[distance - radius, distance + radius]` can contain
    /// further results. Exhaustive mode widens that window by one on
    /// each side, trading work for recall on degenerate trees.
    pub fn search(&self, query: &[u8], max_distance: usize, exhaustive: bool) -> Vec<(WordId, usize)> {
        if self.nodes.is_empty() {
            return Vec::new();
        }

        let radius = max_distance.min(self.max_distance);
        let widen = exhaustive as usize;

        let mut hits: Vec<(WordId, usize)> = Vec::new();
        let mut frontier: VecDeque<u32> = VecDeque::new();
        frontier.push_back(0);

        while let Some(index) = frontier.pop_front() {
            let node = &self.nodes[index as usize];
            let distance = (self.distance)(query, &node.word, radius + 1);

            if distance <= radius {
                hits.push((node.id, distance));
            }

            let low = distance.saturating_sub(radius + widen).max(1) as u32;
            let high = (distance + radius + widen) as u32;

            for child in node.children.range(low..=high).map(|(_, child)| child) {
                frontier.push_back(*child);
            }
        }

        hits.sort_by(|a, b| (a.1, a.0).cmp(&(b.1, b.0)));
        hits
    }

    /// Count edges whose label does not match the recomputed distance
    /// between its two nodes. Used by the validation pass; a healthy
    /// tree answers zero.
    pub fn mislabeled_edges(&self) -> usize {
        let mut mislabeled = 0;

        for node in self.nodes.iter() {
            for (label, child) in node.children.iter() {
                let child = &self.nodes[*child as usize];
                let cutoff = node.word.len().max(child.word.len());
                if (self.distance)(&node.word, &child.word, cutoff) as u32 != *label {
                    mislabeled += 1;
                }
            }
        }

        mislabeled
    }
}
