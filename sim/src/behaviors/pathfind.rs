//! Reusable pathfinding states.
//!
//! `PathfindFragment` produces three states that can be merged into any
//! behavior's `StateMap`:
//!
//! - `{prefix}target`: think for a few frames, then pick a random walkable
//!   destination
//! - `{prefix}moveLoop`: search from the current cell toward the destination,
//!   through an intermediate point when it is farther than
//!   `max_search_distance`
//! - `{prefix}move`: walk the found path one cell per `move_delay` frames
//!
//! The fragment does not know about actors or grids directly. It reads the
//! current cell through a position callback and reports each step through an
//! `on_move` callback, so it works with any context type `C`.
//!
//! Searches are awaited by the state machine. With a `path_budget` of 0 the
//! search completes in the frame it is requested; otherwise it expands at most
//! `path_budget` nodes per frame.

use crate::config::PathfindConfig;
use crate::grid::{GridHandle, GridWorld};
use crate::pathfinder::{Cell, PathfinderGraph, SearchStatus};
use crate::rng::SharedRng;
use crate::state_machine::{Arg, Deferred, Pending, Routine, StateMap, Step};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Intermediate-point guesses tried before heading straight for the target.
const MAX_JITTER_ATTEMPTS: u32 = 64;

// ============================================================================
// Search space
// ============================================================================

/// Supplies the borrowed context the pathfinder's cost callbacks read.
pub trait SearchSpace: Clone + Send + Sync + 'static {
    type Ctx: ?Sized;

    fn with_ctx<R>(&self, f: impl FnOnce(&Self::Ctx) -> R) -> R;
}

impl SearchSpace for () {
    type Ctx = ();

    fn with_ctx<R>(&self, f: impl FnOnce(&Self::Ctx) -> R) -> R {
        f(&())
    }
}

impl SearchSpace for GridHandle {
    type Ctx = GridWorld;

    fn with_ctx<R>(&self, f: impl FnOnce(&Self::Ctx) -> R) -> R {
        f(&self.read())
    }
}

// ============================================================================
// Fragment
// ============================================================================

pub type PositionFn<C> = Arc<dyn Fn(&C) -> Option<Cell> + Send + Sync>;
pub type MoveFn<C> = Arc<dyn Fn(&mut C, Cell) + Send + Sync>;
/// Returns the state to abort to after a step, if any.
pub type InterruptFn<C> = Arc<dyn Fn(&mut C, Cell) -> Option<String> + Send + Sync>;

/// Idle graphs handed out to searches, one per search in flight.
type GraphPool<X> = Arc<Mutex<Vec<PathfinderGraph<X>>>>;

struct Inner<S: SearchSpace, C: ?Sized> {
    space: S,
    /// Callbacks and dimensions; never runs a search itself.
    graph: PathfinderGraph<S::Ctx>,
    pool: GraphPool<S::Ctx>,
    position: PositionFn<C>,
    on_move: MoveFn<C>,
    interrupt: Option<InterruptFn<C>>,
    rng: SharedRng,
    options: PathfindConfig,
    path_budget: usize,
}

impl<S: SearchSpace, C: ?Sized> Clone for Inner<S, C> {
    fn clone(&self) -> Self {
        Self {
            space: self.space.clone(),
            graph: self.graph.clone(),
            pool: GraphPool::default(),
            position: Arc::clone(&self.position),
            on_move: Arc::clone(&self.on_move),
            interrupt: self.interrupt.clone(),
            rng: self.rng.clone(),
            options: self.options.clone(),
            path_budget: self.path_budget,
        }
    }
}

impl<S: SearchSpace, C: ?Sized> Inner<S, C> {
    fn state(&self, name: &str) -> String {
        format!("{}{}", self.options.prefix, name)
    }

    fn walkable(&self, x: i32, y: i32) -> bool {
        self.space.with_ctx(|ctx| self.graph.walkable(ctx, x, y))
    }

    fn dimensions(&self) -> (i32, i32) {
        (self.graph.width() as i32, self.graph.height() as i32)
    }

    /// Goal for one search leg from `start` toward `dest`.
    fn leg_goal(&self, start: Cell, dest: Cell) -> Cell {
        let dx = (dest.0 - start.0) as f32;
        let dy = (dest.1 - start.1) as f32;
        let m = (dx * dx + dy * dy).sqrt() / self.options.max_search_distance;
        if m <= 1.0 {
            return dest;
        }

        // Straight-line point at the search radius, jittered until walkable.
        let xi = (start.0 as f32 + dx / m).ceil() as i32;
        let yi = (start.1 as f32 + dy / m).ceil() as i32;
        let (mut xg, mut yg) = (xi, yi);
        let mut jitter = 1.0f32;
        let mut attempts = 0;
        while !self.walkable(xg, yg) {
            if attempts == MAX_JITTER_ATTEMPTS {
                tracing::debug!(
                    ?start,
                    ?dest,
                    "no walkable intermediate point, searching to target"
                );
                return dest;
            }
            xg = xi + (self.rng.sign() + self.rng.range_f(1.0, jitter)).floor() as i32;
            yg = yi + (self.rng.sign() + self.rng.range_f(1.0, jitter)).floor() as i32;
            jitter += 0.25;
            attempts += 1;
        }
        (xg, yg)
    }

    fn search(&self, start: Cell, goal: Cell) -> PathSearch<S> {
        let mut graph = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| self.graph.clone());
        graph.begin(start.0, start.1, goal.0, goal.1);

        let mut search = PathSearch {
            space: self.space.clone(),
            graph: Some(graph),
            pool: Arc::clone(&self.pool),
            budget: if self.path_budget == 0 { usize::MAX } else { self.path_budget },
            result: Deferred::new(),
        };
        if self.path_budget == 0 {
            search.poll();
        }
        search
    }
}

/// Builder for the pathfinding states.
pub struct PathfindFragment<S: SearchSpace, C: ?Sized> {
    inner: Arc<Inner<S, C>>,
}

impl<S: SearchSpace, C: ?Sized> Clone for PathfindFragment<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SearchSpace, C: ?Sized + 'static> PathfindFragment<S, C> {
    pub fn new(
        space: S,
        graph: PathfinderGraph<S::Ctx>,
        position: impl Fn(&C) -> Option<Cell> + Send + Sync + 'static,
        on_move: impl Fn(&mut C, Cell) + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                space,
                graph,
                pool: GraphPool::default(),
                position: Arc::new(position),
                on_move: Arc::new(on_move),
                interrupt: None,
                rng: SharedRng::default(),
                options: PathfindConfig::default(),
                path_budget: 0,
            }),
        }
    }

    fn inner_mut(&mut self) -> &mut Inner<S, C> {
        Arc::make_mut(&mut self.inner)
    }

    /// Builder methods leave earlier clones and state maps untouched.
    pub fn with_rng(mut self, rng: SharedRng) -> Self {
        self.inner_mut().rng = rng;
        self
    }

    pub fn with_options(mut self, options: PathfindConfig) -> Self {
        self.inner_mut().options = options;
        self
    }

    pub fn with_path_budget(mut self, budget: usize) -> Self {
        self.inner_mut().path_budget = budget;
        self
    }

    pub fn with_interrupt(
        mut self,
        f: impl Fn(&mut C, Cell) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.inner_mut().interrupt = Some(Arc::new(f));
        self
    }

    pub fn target_state(&self) -> String {
        self.inner.state("target")
    }

    pub fn move_loop_state(&self) -> String {
        self.inner.state("moveLoop")
    }

    pub fn move_state(&self) -> String {
        self.inner.state("move")
    }

    /// Transition that walks to `dest`, then enters `done_state`.
    pub fn goto(&self, dest: Cell, done_state: impl Into<String>) -> Step {
        let args = vec![Arg::Cell(dest), Arg::Text(done_state.into())];
        Step::goto_with(self.move_loop_state(), args)
    }

    pub fn states(&self) -> StateMap<C> {
        let target = Arc::clone(&self.inner);
        let move_loop = Arc::clone(&self.inner);
        let walk = Arc::clone(&self.inner);
        StateMap::new()
            .state(self.target_state(), move |_| TargetRoutine {
                inner: Arc::clone(&target),
                thought: false,
            })
            .state(self.move_loop_state(), move |args: Vec<Arg>| {
                let dest = args.first().and_then(Arg::as_cell).unwrap_or_default();
                let done_state = args
                    .get(1)
                    .and_then(Arg::as_text)
                    .map(str::to_string)
                    .unwrap_or_else(|| move_loop.state("target"));
                MoveLoopRoutine {
                    inner: Arc::clone(&move_loop),
                    dest,
                    done_state,
                    result: None,
                }
            })
            .state(self.move_state(), move |args: Vec<Arg>| {
                let path = args.first().and_then(Arg::as_path).unwrap_or_default();
                let dest = args.get(1).and_then(Arg::as_cell).unwrap_or_default();
                let done_state = args
                    .get(2)
                    .and_then(Arg::as_text)
                    .map(str::to_string)
                    .unwrap_or_else(|| walk.state("target"));
                MoveRoutine {
                    inner: Arc::clone(&walk),
                    path: path.iter().copied().collect(),
                    dest,
                    done_state,
                }
            })
    }
}

// ============================================================================
// Pending search
// ============================================================================

/// A search in progress, advanced each time the state machine polls it.
///
/// Each search runs on its own graph taken from the fragment's pool, so
/// actors sharing one fragment never disturb each other's searches.
pub struct PathSearch<S: SearchSpace> {
    space: S,
    graph: Option<PathfinderGraph<S::Ctx>>,
    pool: GraphPool<S::Ctx>,
    budget: usize,
    result: Deferred<Vec<Cell>>,
}

impl<S: SearchSpace> PathSearch<S> {
    pub fn result(&self) -> Deferred<Vec<Cell>> {
        self.result.clone()
    }

    fn release(&mut self) {
        if let Some(graph) = self.graph.take() {
            self.pool.lock().unwrap_or_else(PoisonError::into_inner).push(graph);
        }
    }
}

impl<S: SearchSpace> Pending for PathSearch<S> {
    fn poll(&mut self) -> bool {
        let Some(graph) = self.graph.as_mut() else {
            return true;
        };
        let budget = self.budget;
        let status = self.space.with_ctx(|ctx| graph.advance(ctx, budget));
        if status == SearchStatus::Running {
            return false;
        }
        self.result.resolve(graph.take_path());
        self.release();
        true
    }
}

impl<S: SearchSpace> Drop for PathSearch<S> {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// Routines
// ============================================================================

struct TargetRoutine<S: SearchSpace, C: ?Sized> {
    inner: Arc<Inner<S, C>>,
    thought: bool,
}

impl<S: SearchSpace, C: ?Sized + 'static> Routine<C> for TargetRoutine<S, C> {
    fn resume(&mut self, _ctx: &mut C) -> Step {
        let inner = &self.inner;
        if !self.thought {
            self.thought = true;
            let (lo, hi) = inner.options.think_frames;
            return Step::Wait(inner.rng.range_i(lo, hi).max(0) as u32);
        }

        let (width, height) = inner.dimensions();
        let ex = inner.rng.range_i(0, width);
        let ey = inner.rng.range_i(0, height);
        if !inner.walkable(ex, ey) {
            return Step::goto(inner.state("target"));
        }
        Step::goto_with(inner.state("moveLoop"), vec![Arg::Cell((ex, ey))])
    }
}

/// Searches one leg at a time toward `dest`, then enters `done_state`.
///
/// A leg that makes no progress (empty path) also enters `done_state`, so
/// that state runs both on arrival and when the walker gives up. Callers
/// that care compare the actor's position with `dest`.
struct MoveLoopRoutine<S: SearchSpace, C: ?Sized> {
    inner: Arc<Inner<S, C>>,
    dest: Cell,
    done_state: String,
    result: Option<Deferred<Vec<Cell>>>,
}

impl<S: SearchSpace, C: ?Sized + 'static> Routine<C> for MoveLoopRoutine<S, C> {
    fn resume(&mut self, ctx: &mut C) -> Step {
        let inner = &self.inner;

        if let Some(result) = self.result.take() {
            let path = result.take().unwrap_or_default();
            if path.is_empty() {
                tracing::debug!(dest = ?self.dest, "no progress toward destination");
                return Step::goto(self.done_state.clone());
            }
            return Step::goto_with(
                inner.state("move"),
                vec![
                    Arg::Path(path),
                    Arg::Cell(self.dest),
                    Arg::Text(self.done_state.clone()),
                ],
            );
        }

        let Some(start) = (inner.position)(ctx) else {
            tracing::warn!("pathfinding actor has no grid position");
            return Step::goto(self.done_state.clone());
        };
        if !inner.walkable(start.0, start.1) {
            tracing::warn!(?start, "starting on an unwalkable cell");
        }
        if start == self.dest {
            return Step::goto(self.done_state.clone());
        }

        let goal = inner.leg_goal(start, self.dest);
        let search = inner.search(start, goal);
        self.result = Some(search.result());
        Step::Await(Box::new(search))
    }
}

struct MoveRoutine<S: SearchSpace, C: ?Sized> {
    inner: Arc<Inner<S, C>>,
    path: VecDeque<Cell>,
    dest: Cell,
    done_state: String,
}

impl<S: SearchSpace, C: ?Sized + 'static> Routine<C> for MoveRoutine<S, C> {
    fn resume(&mut self, ctx: &mut C) -> Step {
        let inner = &self.inner;
        let Some(cell) = self.path.pop_front() else {
            return Step::goto_with(
                inner.state("moveLoop"),
                vec![Arg::Cell(self.dest), Arg::Text(self.done_state.clone())],
            );
        };

        (inner.on_move)(ctx, cell);
        if let Some(interrupt) = &inner.interrupt {
            if let Some(state) = interrupt(ctx, cell) {
                return Step::goto(state);
            }
        }
        Step::Wait(inner.options.move_delay)
    }
}
