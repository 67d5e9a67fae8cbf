//! The hierarchical path store.
//!
//! Tracks, for every batch with an active claim, which nodes of the
//! namespace's path tree that claim passes through. A claim on path `p`
//! is recorded at every node from the root down to `p`'s own node (its
//! "leaf"): the leaf itself is marked `terminal` for that batch, and every
//! strict ancestor of the leaf is marked `passing`.
//!
//! This distinction is what makes prefix-conflict detection exact. A
//! probe for path `q` must find:
//!   - every batch `terminal` at any node from the root down to `q`'s own
//!     node (those batches claimed `p` with `p` a prefix of, or equal to,
//!     `q`), and
//!   - every batch `passing` through `q`'s own node (those claimed some
//!     `p` with `q` a strict prefix of `p`).
//! Sibling claims (neither path a prefix of the other) share only
//! ancestor nodes, where they are never more than `passing`, so they
//! never collide in a probe.

use std::collections::HashMap;

use crate::protocol::Mode;

pub type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Clone, Copy)]
struct ClaimEntry {
    mode: Mode,
    refcount: u32,
}

#[derive(Debug, Default)]
struct PathNode {
    parent: Option<NodeId>,
    segment: String,
    children: HashMap<String, NodeId>,
    terminal: HashMap<u64, ClaimEntry>,
    passing: HashMap<u64, ClaimEntry>,
}

/// An arena-backed tree of path segments, bookkeeping which batches have
/// an active claim crossing each node.
#[derive(Debug)]
pub struct PathStore {
    nodes: Vec<PathNode>,
}

impl Default for PathStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PathStore {
    pub fn new() -> Self {
        PathStore {
            nodes: vec![PathNode::default()],
        }
    }

    /// Walks an existing node chain for `path` without creating anything.
    /// Returns `None` once a missing segment is hit, along with the
    /// terminal batches collected along the way — a missing suffix means
    /// no batch's leaf lies at or below that point.
    fn walk_existing(&self, path: &[String]) -> (Vec<(u64, Mode)>, Option<NodeId>) {
        let mut out = Vec::new();
        let mut current = ROOT;
        out.extend(self.terminal_at(current));
        for segment in path {
            match self.nodes[current].children.get(segment) {
                Some(&child) => {
                    current = child;
                    out.extend(self.terminal_at(current));
                }
                None => return (out, None),
            }
        }
        (out, Some(current))
    }

    fn terminal_at(&self, node: NodeId) -> impl Iterator<Item = (u64, Mode)> + '_ {
        self.nodes[node].terminal.iter().map(|(&id, e)| (id, e.mode))
    }

    fn passing_at(&self, node: NodeId) -> impl Iterator<Item = (u64, Mode)> + '_ {
        self.nodes[node].passing.iter().map(|(&id, e)| (id, e.mode))
    }

    /// Every batch (and the mode it holds) whose claim is related to
    /// `path` by a prefix relation in either direction. Does not include
    /// `path`'s own batch, since a probe always runs before that batch's
    /// own claim is recorded.
    pub fn probe(&self, path: &[String]) -> Vec<(u64, Mode)> {
        let (mut out, leaf) = self.walk_existing(path);
        if let Some(leaf) = leaf {
            out.extend(self.passing_at(leaf));
        }
        out
    }

    /// Records `batch`'s claim of `mode` on `path`: marks every strict
    /// ancestor of the leaf as `passing`, and the leaf itself `terminal`.
    pub fn claim(&mut self, batch: u64, mode: Mode, path: &[String]) {
        let mut current = ROOT;
        let leaf = if path.is_empty() {
            ROOT
        } else {
            // Walk ancestors (all but the last segment), marking `passing`.
            for segment in &path[..path.len() - 1] {
                current = self.ensure_child(current, segment);
                Self::bump(&mut self.nodes[current].passing, batch, mode);
            }
            self.ensure_child(current, path.last().unwrap())
        };
        Self::bump(&mut self.nodes[leaf].terminal, batch, mode);
    }

    fn ensure_child(&mut self, parent: NodeId, segment: &str) -> NodeId {
        if let Some(&child) = self.nodes[parent].children.get(segment) {
            return child;
        }
        let id = self.nodes.len();
        self.nodes.push(PathNode {
            parent: Some(parent),
            segment: segment.to_string(),
            ..Default::default()
        });
        self.nodes[parent].children.insert(segment.to_string(), id);
        id
    }

    fn bump(map: &mut HashMap<u64, ClaimEntry>, batch: u64, mode: Mode) {
        map.entry(batch)
            .and_modify(|e| {
                e.mode = e.mode.dominant(mode);
                e.refcount += 1;
            })
            .or_insert(ClaimEntry { mode, refcount: 1 });
    }

    /// Removes `batch`'s claim of `mode` on `path`, recorded earlier via
    /// [`PathStore::claim`], and prunes any node left with no claims and
    /// no children.
    pub fn release(&mut self, batch: u64, path: &[String]) {
        let leaf = match self.resolve(path) {
            Some(id) => id,
            None => return,
        };
        Self::unbump(&mut self.nodes[leaf].terminal, batch);

        if !path.is_empty() {
            let mut current = ROOT;
            let mut ancestors = Vec::with_capacity(path.len() - 1);
            for segment in &path[..path.len() - 1] {
                current = match self.nodes[current].children.get(segment) {
                    Some(&c) => c,
                    None => break,
                };
                ancestors.push(current);
            }
            for node in ancestors {
                Self::unbump(&mut self.nodes[node].passing, batch);
            }
        }

        self.prune_upward(leaf);
    }

    fn resolve(&self, path: &[String]) -> Option<NodeId> {
        let mut current = ROOT;
        for segment in path {
            current = *self.nodes[current].children.get(segment)?;
        }
        Some(current)
    }

    fn unbump(map: &mut HashMap<u64, ClaimEntry>, batch: u64) {
        if let Some(entry) = map.get_mut(&batch) {
            entry.refcount -= 1;
            if entry.refcount == 0 {
                map.remove(&batch);
            }
        }
    }

    fn prune_upward(&mut self, mut node: NodeId) {
        loop {
            if node == ROOT {
                return;
            }
            let prunable = {
                let n = &self.nodes[node];
                n.children.is_empty() && n.terminal.is_empty() && n.passing.is_empty()
            };
            if !prunable {
                return;
            }
            let parent = self.nodes[node].parent.expect("non-root has a parent");
            let segment = self.nodes[node].segment.clone();
            self.nodes[parent].children.remove(&segment);
            node = parent;
        }
    }

    /// True if the tree holds no claims at all (used by namespace
    /// bookkeeping to decide when a namespace is idle).
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 && self.nodes[ROOT].terminal.is_empty() && self.nodes[ROOT].passing.is_empty()
    }
}
