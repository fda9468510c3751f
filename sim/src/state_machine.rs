//! Cooperative state machine.
//!
//! A behavior is a map of named states. Entering a state builds a fresh
//! `Routine` from the state's factory, passing along any transition
//! arguments. Every `update()` resumes the current routine at most once, and
//! the routine tells the machine what to do next through the returned `Step`:
//!
//! - `Yield`: resume again next update
//! - `Wait(n)`: skip the next `n` updates
//! - `Await(pending)`: skip updates until `pending.poll()` reports ready
//! - `Done(None)`: terminate the machine
//! - `Done(Some(transition))`: enter another state
//!
//! A state entered through a transition first runs on the following update.
//!
//! Routines are plain structs with an explicit phase, so the machine is a
//! synchronous step function callable from any frame loop.

use crate::error::{Result, SimError};
use crate::pathfinder::Cell;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Name of the state entered when the machine is created.
pub const START_STATE: &str = "start";

// ============================================================================
// Steps and transitions
// ============================================================================

/// Value passed to a state on entry.
#[derive(Clone)]
pub enum Arg {
    Int(i64),
    Float(f64),
    Text(String),
    Cell(Cell),
    Path(Vec<Cell>),
    Any(Arc<dyn Any + Send + Sync>),
}

impl Arg {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Arg::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Arg::Float(v) => Some(*v),
            Arg::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Arg::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_cell(&self) -> Option<Cell> {
        match self {
            Arg::Cell(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&[Cell]> {
        match self {
            Arg::Path(v) => Some(v),
            _ => None,
        }
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Arg::Any(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(v) => write!(f, "Int({v})"),
            Arg::Float(v) => write!(f, "Float({v})"),
            Arg::Text(v) => write!(f, "Text({v:?})"),
            Arg::Cell(v) => write!(f, "Cell{v:?}"),
            Arg::Path(v) => write!(f, "Path(len={})", v.len()),
            Arg::Any(_) => f.write_str("Any(..)"),
        }
    }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Arg::Int(v)
    }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self {
        Arg::Int(v as i64)
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Float(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Text(v.to_string())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::Text(v)
    }
}

impl From<Cell> for Arg {
    fn from(v: Cell) -> Self {
        Arg::Cell(v)
    }
}

impl From<Vec<Cell>> for Arg {
    fn from(v: Vec<Cell>) -> Self {
        Arg::Path(v)
    }
}

/// Move to `state`, passing `args` to its factory.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: String,
    pub args: Vec<Arg>,
}

/// An operation the machine waits on without resuming the routine.
pub trait Pending: Send + Sync {
    /// Make progress and report whether the result is ready.
    fn poll(&mut self) -> bool;
}

/// What a routine asks for after being resumed.
pub enum Step {
    Yield,
    Wait(u32),
    Await(Box<dyn Pending>),
    Done(Option<Transition>),
}

impl Step {
    pub fn finish() -> Self {
        Step::Done(None)
    }

    pub fn goto(state: impl Into<String>) -> Self {
        Step::Done(Some(Transition {
            state: state.into(),
            args: Vec::new(),
        }))
    }

    pub fn goto_with(state: impl Into<String>, args: Vec<Arg>) -> Self {
        Step::Done(Some(Transition {
            state: state.into(),
            args,
        }))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Yield => f.write_str("Yield"),
            Step::Wait(n) => write!(f, "Wait({n})"),
            Step::Await(_) => f.write_str("Await(..)"),
            Step::Done(t) => write!(f, "Done({t:?})"),
        }
    }
}

// ============================================================================
// Deferred results
// ============================================================================

/// Single-slot result shared between a `Pending` and the routine awaiting it.
pub struct Deferred<T>(Arc<Mutex<Option<T>>>);

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").field("ready", &self.is_ready()).finish()
    }
}

impl<T> Deferred<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, value: T) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    pub fn is_ready(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    pub fn take(&self) -> Option<T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl<T: Send> Pending for Deferred<T> {
    fn poll(&mut self) -> bool {
        self.is_ready()
    }
}

// ============================================================================
// Routines and the state map
// ============================================================================

/// One resumable state body. `C` is the object the behavior is bound to.
pub trait Routine<C: ?Sized>: Send + Sync {
    fn resume(&mut self, ctx: &mut C) -> Step;
}

impl<C: ?Sized, F> Routine<C> for F
where
    F: FnMut(&mut C) -> Step + Send + Sync,
{
    fn resume(&mut self, ctx: &mut C) -> Step {
        self(ctx)
    }
}

pub type StateFactory<C> = Arc<dyn Fn(Vec<Arg>) -> Box<dyn Routine<C>> + Send + Sync>;

/// Named state factories.
pub struct StateMap<C: ?Sized> {
    states: HashMap<String, StateFactory<C>>,
}

impl<C: ?Sized> Default for StateMap<C> {
    fn default() -> Self {
        Self {
            states: HashMap::new(),
        }
    }
}

impl<C: ?Sized> Clone for StateMap<C> {
    fn clone(&self) -> Self {
        Self {
            states: self.states.clone(),
        }
    }
}

impl<C: ?Sized> StateMap<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state<F, R>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(Vec<Arg>) -> R + Send + Sync + 'static,
        R: Routine<C> + 'static,
    {
        self.insert(name, factory);
        self
    }

    pub fn insert<F, R>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(Vec<Arg>) -> R + Send + Sync + 'static,
        R: Routine<C> + 'static,
    {
        let factory: StateFactory<C> =
            Arc::new(move |args| -> Box<dyn Routine<C>> { Box::new(factory(args)) });
        self.states.insert(name.into(), factory);
    }

    /// Merge another map in; its states win on name clashes.
    pub fn extend(&mut self, other: StateMap<C>) {
        self.states.extend(other.states);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn create(&self, name: &str, args: Vec<Arg>) -> Option<Box<dyn Routine<C>>> {
        self.states.get(name).map(|factory| factory(args))
    }
}

// ============================================================================
// State machine
// ============================================================================

pub struct StateMachine<C: ?Sized> {
    states: StateMap<C>,
    current: Option<Box<dyn Routine<C>>>,
    current_state: Option<String>,
    wait: u32,
    pending: Option<Box<dyn Pending>>,
}

impl<C: ?Sized> fmt::Debug for StateMachine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("current_state", &self.current_state)
            .field("wait", &self.wait)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

impl<C: ?Sized> StateMachine<C> {
    /// Enter the `start` state. Its routine first runs on the first update.
    pub fn new(states: StateMap<C>) -> Result<Self> {
        let current = states
            .create(START_STATE, Vec::new())
            .ok_or(SimError::MissingStartState)?;
        Ok(Self {
            states,
            current: Some(current),
            current_state: Some(START_STATE.to_string()),
            wait: 0,
            pending: None,
        })
    }

    pub fn current_state(&self) -> Option<&str> {
        self.current_state.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.current.is_none()
    }

    /// Remaining updates to skip.
    pub fn waiting(&self) -> u32 {
        self.wait
    }

    /// Advance one scheduling step.
    pub fn update(&mut self, ctx: &mut C) {
        let Some(routine) = self.current.as_mut() else {
            return;
        };
        if self.wait > 0 {
            self.wait -= 1;
            return;
        }
        if let Some(pending) = self.pending.as_mut() {
            if !pending.poll() {
                return;
            }
            self.pending = None;
        }

        match routine.resume(ctx) {
            Step::Yield => {}
            Step::Wait(n) => self.wait = n,
            Step::Await(mut pending) => {
                if !pending.poll() {
                    self.pending = Some(pending);
                }
            }
            Step::Done(None) => {
                tracing::debug!(state = ?self.current_state, "state machine finished");
                self.current = None;
                self.current_state = None;
            }
            Step::Done(Some(transition)) => self.enter(transition),
        }
    }

    fn enter(&mut self, transition: Transition) {
        let Transition { state, args } = transition;
        self.current = self.states.create(&state, args);
        if self.current.is_none() {
            tracing::warn!(state = %state, "transition to unknown state, stopping");
            self.current_state = None;
            return;
        }
        tracing::trace!(state = %state, "state transition");
        self.current_state = Some(state);
    }
}
