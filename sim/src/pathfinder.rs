//! Weighted A* over an implicit 4-connected grid.
//!
//! The graph is parameterized by caller-supplied callbacks:
//!
//! - `walkable(ctx, x, y)`: cells that may be entered
//! - `base_cost(ctx, to)`: cost of occupying a cell regardless of direction
//! - `edge_cost(ctx, from, to)`: directional surcharge (e.g. climbing)
//!
//! Moving between adjacent cells costs `1 + max(0, base + edge)`; the
//! surcharge is clamped so the search never prefers a detour just because
//! it looks cheaper than zero. The heuristic is Euclidean distance, which
//! never overestimates with non-negative surcharges.
//!
//! The callbacks receive a borrowed context `C` (typically the `GridWorld`)
//! so they can read layers without owning them.
//!
//! If the goal cannot be reached the search returns the path to the visited
//! node with the best estimate instead. Callers check whether the last cell
//! is the goal.
//!
//! Node state is pooled and reset between searches, so one graph runs one
//! search at a time. A search can be spread across frames with `begin` and
//! `advance`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Grid cell coordinate.
pub type Cell = (i32, i32);

pub type WalkableFn<C> = Arc<dyn Fn(&C, i32, i32) -> bool + Send + Sync>;
pub type BaseCostFn<C> = Arc<dyn Fn(&C, Cell) -> f32 + Send + Sync>;
pub type EdgeCostFn<C> = Arc<dyn Fn(&C, Cell, Cell) -> f32 + Send + Sync>;

const NO_NODE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Node {
    x: i32,
    y: i32,
    /// Best known cost from the start.
    cost: f32,
    /// Heuristic distance to the goal.
    remainder: f32,
    visited: bool,
    closed: bool,
    parent: u32,
}

impl Node {
    fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            cost: 0.0,
            remainder: 0.0,
            visited: false,
            closed: false,
            parent: NO_NODE,
        }
    }

    #[inline]
    fn estimate(&self) -> f32 {
        self.cost + self.remainder
    }
}

/// Open-set entry. Stale entries are skipped when popped.
#[derive(Debug, Clone, Copy)]
struct Open {
    estimate: f32,
    remainder: f32,
    seq: u32,
    node: u32,
}

impl PartialEq for Open {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Open {}

impl PartialOrd for Open {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Open {
    // Reversed so the max-heap pops the lowest estimate first; ties go to
    // the node closer to the goal, then to the earlier push.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .total_cmp(&self.estimate)
            .then_with(|| other.remainder.total_cmp(&self.remainder))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Progress of an incremental search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// No search has been started.
    Idle,
    Running,
    /// Finished; the path is ready.
    Done,
}

#[derive(Debug, Default)]
struct Search {
    goal: Cell,
    open: BinaryHeap<Open>,
    closest: u32,
    seq: u32,
    reached_goal: bool,
    path: Vec<Cell>,
}

/// Reusable A* search over a `width`×`height` grid.
pub struct PathfinderGraph<C: ?Sized> {
    width: i32,
    height: i32,
    walkable: WalkableFn<C>,
    base_cost: BaseCostFn<C>,
    edge_cost: EdgeCostFn<C>,
    /// Cell → node slot, `NO_NODE` when the cell is untouched.
    slots: Vec<u32>,
    nodes: Vec<Node>,
    search: Search,
    status: SearchStatus,
}

/// Clones share the callbacks but get their own idle node pool.
impl<C: ?Sized> Clone for PathfinderGraph<C> {
    fn clone(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            walkable: Arc::clone(&self.walkable),
            base_cost: Arc::clone(&self.base_cost),
            edge_cost: Arc::clone(&self.edge_cost),
            slots: vec![NO_NODE; self.slots.len()],
            nodes: Vec::new(),
            search: Search::default(),
            status: SearchStatus::Idle,
        }
    }
}

impl<C: ?Sized> PathfinderGraph<C> {
    /// Uniform graph: every cell walkable, no surcharges.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width as i32,
            height: height as i32,
            walkable: Arc::new(|_, _, _| true),
            base_cost: Arc::new(|_, _| 0.0),
            edge_cost: Arc::new(|_, _, _| 0.0),
            slots: vec![NO_NODE; width * height],
            nodes: Vec::new(),
            search: Search::default(),
            status: SearchStatus::Idle,
        }
    }

    pub fn with_walkable(
        mut self,
        f: impl Fn(&C, i32, i32) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.walkable = Arc::new(f);
        self
    }

    pub fn with_base_cost(mut self, f: impl Fn(&C, Cell) -> f32 + Send + Sync + 'static) -> Self {
        self.base_cost = Arc::new(f);
        self
    }

    pub fn with_edge_cost(
        mut self,
        f: impl Fn(&C, Cell, Cell) -> f32 + Send + Sync + 'static,
    ) -> Self {
        self.edge_cost = Arc::new(f);
        self
    }

    pub fn width(&self) -> usize {
        self.width as usize
    }

    pub fn height(&self) -> usize {
        self.height as usize
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.width && y >= 0 && y < self.height
    }

    /// In bounds and accepted by the walkable callback.
    pub fn walkable(&self, ctx: &C, x: i32, y: i32) -> bool {
        self.in_bounds(x, y) && (self.walkable)(ctx, x, y)
    }

    /// Cost of stepping from `from` to the adjacent cell `to`.
    pub fn transition_cost(&self, ctx: &C, from: Cell, to: Cell) -> f32 {
        let dist = distance(from, to);
        let base = (self.base_cost)(ctx, to);
        let edge = (self.edge_cost)(ctx, from, to);
        dist + (base + edge).max(0.0)
    }

    pub fn status(&self) -> SearchStatus {
        self.status
    }

    /// Return every pooled node to its initial state.
    pub fn reset(&mut self) {
        for node in &self.nodes {
            let slot = (node.y * self.width + node.x) as usize;
            self.slots[slot] = NO_NODE;
        }
        self.nodes.clear();
        self.search.open.clear();
        self.search.path.clear();
        self.search.seq = 0;
        self.search.reached_goal = false;
        self.status = SearchStatus::Idle;
    }

    fn node_at(&mut self, x: i32, y: i32) -> u32 {
        let slot = (y * self.width + x) as usize;
        let id = self.slots[slot];
        if id != NO_NODE {
            return id;
        }
        let id = self.nodes.len() as u32;
        self.nodes.push(Node::new(x, y));
        self.slots[slot] = id;
        id
    }

    fn push_open(&mut self, id: u32) {
        let node = &self.nodes[id as usize];
        self.search.open.push(Open {
            estimate: node.estimate(),
            remainder: node.remainder,
            seq: self.search.seq,
            node: id,
        });
        self.search.seq += 1;
    }

    /// Full search. The result excludes the start cell.
    pub fn pathfind(&mut self, ctx: &C, x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<Cell> {
        self.begin(x0, y0, x1, y1);
        self.advance(ctx, usize::MAX);
        self.take_path()
    }

    /// Start a new search, discarding any previous one.
    pub fn begin(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) {
        self.reset();
        self.search.goal = (x1, y1);
        self.status = SearchStatus::Running;

        if !self.in_bounds(x0, y0) {
            self.status = SearchStatus::Done;
            return;
        }
        let start = self.node_at(x0, y0);
        let node = &mut self.nodes[start as usize];
        node.remainder = distance((x0, y0), (x1, y1));
        node.visited = true;
        self.search.closest = start;
        self.push_open(start);
    }

    /// Expand up to `budget` nodes. Returns the new status.
    pub fn advance(&mut self, ctx: &C, budget: usize) -> SearchStatus {
        if self.status != SearchStatus::Running {
            return self.status;
        }

        let goal = self.search.goal;
        let mut expanded = 0usize;
        while expanded < budget {
            let Some(open) = self.search.open.pop() else {
                self.finish();
                return self.status;
            };
            let current = self.nodes[open.node as usize];
            if current.closed || open.estimate != current.estimate() {
                continue;
            }
            if (current.x, current.y) == goal {
                self.search.closest = open.node;
                self.search.reached_goal = true;
                self.finish();
                return self.status;
            }

            self.nodes[open.node as usize].closed = true;
            expanded += 1;

            let from = (current.x, current.y);
            for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
                let to = (current.x + dx, current.y + dy);
                if !self.walkable(ctx, to.0, to.1) {
                    continue;
                }
                let id = self.node_at(to.0, to.1);
                let neighbor = self.nodes[id as usize];
                if neighbor.closed {
                    continue;
                }

                let cost = current.cost + self.transition_cost(ctx, from, to);
                if neighbor.visited && cost >= neighbor.cost {
                    continue;
                }

                let remainder = distance(to, goal);
                let node = &mut self.nodes[id as usize];
                node.visited = true;
                node.parent = open.node;
                node.cost = cost;
                node.remainder = remainder;
                let updated = *node;

                let closest = self.nodes[self.search.closest as usize];
                let delta = updated.estimate() - closest.estimate();
                if delta < 0.0 || (delta == 0.0 && updated.cost < closest.cost) {
                    self.search.closest = id;
                }
                self.push_open(id);
            }
        }
        self.status
    }

    fn finish(&mut self) {
        let mut path = Vec::new();
        if !self.nodes.is_empty() {
            let mut id = self.search.closest;
            while id != NO_NODE {
                let node = self.nodes[id as usize];
                if node.parent == NO_NODE {
                    break;
                }
                path.push((node.x, node.y));
                id = node.parent;
            }
            path.reverse();
        }
        if !self.search.reached_goal {
            tracing::debug!(
                goal = ?self.search.goal,
                len = path.len(),
                "goal unreachable, returning closest path"
            );
        }
        self.search.path = path;
        self.status = SearchStatus::Done;
    }

    /// Whether the finished search ended on the goal cell.
    pub fn reached_goal(&self) -> bool {
        self.search.reached_goal
    }

    /// Take the finished path. Empty while the search is still running.
    pub fn take_path(&mut self) -> Vec<Cell> {
        if self.status != SearchStatus::Done {
            return Vec::new();
        }
        std::mem::take(&mut self.search.path)
    }
}

#[inline]
fn distance(a: Cell, b: Cell) -> f32 {
    let dx = (b.0 - a.0) as f32;
    let dy = (b.1 - a.1) as f32;
    (dx * dx + dy * dy).sqrt()
}
