//! Asynchronous variables: a value, the queue of continuations that may
//! mutate it, and the listeners notified of its terminal outcome.
//!
//! ```
//! use quanah::avar::{EventKind, Turn};
//! use quanah::host::EventLoop;
//! use quanah::scheduler::{Scheduler, SchedulerConfig};
//!
//! let host = EventLoop::new();
//! let scheduler = Scheduler::new(host.clone(), SchedulerConfig::default());
//! let x = scheduler.avar(1);
//! x.q(|turn: &mut Turn<'_, i32>| {
//!   *turn.val *= 10;
//!   turn.exit()
//! })
//! .unwrap()
//! .on(EventKind::Fail, |ev| eprintln!("{ev}"));
//! host.run();
//! assert_eq!(x.val(), Ok(10));
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::str::FromStr;

use hashbrown::HashMap;
use itertools::Itertools;
use trait_set::trait_set;

use crate::error::{Conflict, Failure, InvalidState, Panicked, SignalMisuse, TurnError, TurnResult};
use crate::queue::TaskQueue;
use crate::scheduler::{Runnable, Scheduler};
use crate::signal::{Disposition, Settle, Signal};
use crate::utils::unwrap_or;

/// Identity of an AVar, unique within its [Scheduler]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AVarId(pub u64);
impl fmt::Display for AVarId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// Lifecycle of an AVar. The last two are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerminalState {
  /// Accepting and executing work
  Running,
  /// The last continuation exited with nothing queued behind it
  Exited,
  /// A continuation failed
  Failed,
}
impl TerminalState {
  /// Whether work can no longer be queued
  pub fn is_terminal(self) -> bool { self != Self::Running }
}
impl fmt::Display for TerminalState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Running => write!(f, "running"),
      Self::Exited => write!(f, "exited"),
      Self::Failed => write!(f, "failed"),
    }
  }
}

/// The names listeners can be registered under
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
  /// The queue ran out after an `exit`
  Exit,
  /// A continuation failed; unrecoverable
  Fail,
  /// Something went wrong but the AVar keeps running, eg. a signal was misused
  Error,
}
impl EventKind {
  /// Whether emitting this event leaves the AVar failed
  pub fn is_unrecoverable(self) -> bool { self == Self::Fail }
}
impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Exit => write!(f, "exit"),
      Self::Fail => write!(f, "fail"),
      Self::Error => write!(f, "error"),
    }
  }
}
impl FromStr for EventKind {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "exit" => Ok(Self::Exit),
      "fail" => Ok(Self::Fail),
      "error" => Ok(Self::Error),
      _ => Err(format!("unknown event {s:?}, expected one of exit, fail, error")),
    }
  }
}

/// An emission received by listeners
#[derive(Clone, Debug)]
pub enum Event {
  /// See [EventKind::Exit]
  Exit,
  /// See [EventKind::Fail]
  Fail(Failure),
  /// See [EventKind::Error]
  Error(Failure),
}
impl Event {
  /// The name listeners for this event were registered with
  pub fn kind(&self) -> EventKind {
    match self {
      Self::Exit => EventKind::Exit,
      Self::Fail(_) => EventKind::Fail,
      Self::Error(_) => EventKind::Error,
    }
  }
  /// The payload of `fail` and `error`
  pub fn failure(&self) -> Option<&Failure> {
    match self {
      Self::Exit => None,
      Self::Fail(f) | Self::Error(f) => Some(f),
    }
  }
}
impl fmt::Display for Event {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.failure() {
      None => write!(f, "{}", self.kind()),
      Some(e) => write!(f, "{}: {e}", self.kind()),
    }
  }
}

trait_set! {
  /// A unit of work queued on an AVar with [AVar::q]
  pub trait Continuation<T> = FnMut(&mut Turn<'_, T>) -> TurnResult + 'static;
  /// A handler registered with [AVar::on]
  pub trait Listener = FnMut(&Event) + 'static;
}

/// Everything a continuation can touch while it holds the turn
pub struct Turn<'a, T> {
  /// The value of the AVar. Only continuations get mutable access.
  pub val: &'a mut T,
  avar: &'a AVar<T>,
  signal: Signal,
}
impl<'a, T: 'static> Turn<'a, T> {
  /// The AVar this continuation was queued on
  pub fn avar(&self) -> &AVar<T> { self.avar }
  /// A copy of the signal for this invocation, to be called after the
  /// continuation has returned
  pub fn signal(&self) -> Signal { self.signal.clone() }
  /// Run this continuation again on the next turn
  pub fn stay(&self) -> TurnResult { Ok(self.signal.stay()?) }
  /// Retire this continuation
  pub fn exit(&self) -> TurnResult { Ok(self.signal.exit()?) }
  /// Fail the AVar. Returning an error from the continuation does the same.
  pub fn fail(&self, failure: Failure) -> TurnResult { Ok(self.signal.fail(failure)?) }
  /// End the scheduler pass after this turn, giving the host a chance to run
  pub fn snooze(&self) { self.avar.scheduler().snooze() }
}

#[derive(Default)]
struct Listeners {
  handlers: HashMap<EventKind, Vec<Box<dyn Listener>>>,
  /// Buffered emissions. `exit` and `fail` happen at most once; of the
  /// recoverable `error`s only the latest is kept.
  past: Vec<Event>,
}

struct AVarCell<T> {
  id: AVarId,
  me: Weak<AVarCell<T>>,
  scheduler: Scheduler,
  value: RefCell<T>,
  queue: RefCell<TaskQueue<Box<dyn Continuation<T>>>>,
  parked: RefCell<Option<Box<dyn Continuation<T>>>>,
  state: Cell<TerminalState>,
  listeners: RefCell<Listeners>,
  in_run_set: Cell<bool>,
}

/// A shared handle to an asynchronous variable. Cloning is cheap and every
/// clone refers to the same value.
pub struct AVar<T>(Rc<AVarCell<T>>);

impl<T: 'static> AVar<T> {
  /// Wrap a value. Nothing runs until a continuation is queued.
  pub fn new(scheduler: &Scheduler, value: T) -> Self {
    Self(Rc::new_cyclic(|me| AVarCell {
      id: scheduler.next_id(),
      me: me.clone(),
      scheduler: scheduler.clone(),
      value: RefCell::new(value),
      queue: RefCell::new(TaskQueue::new()),
      parked: RefCell::new(None),
      state: Cell::new(TerminalState::Running),
      listeners: RefCell::default(),
      in_run_set: Cell::new(false),
    }))
  }

  /// Unique ID within the scheduler
  pub fn id(&self) -> AVarId { self.0.id }

  /// Current lifecycle state
  pub fn state(&self) -> TerminalState { self.0.state.get() }

  /// The scheduler driving this AVar
  pub fn scheduler(&self) -> &Scheduler { &self.0.scheduler }

  /// Number of continuations that haven't finished, including one that is
  /// running or awaiting a detached signal
  pub fn pending(&self) -> usize {
    let queue = self.0.queue.borrow();
    queue.len() + usize::from(queue.is_busy())
  }

  /// Queue a continuation. It runs after everything queued before it has
  /// exited, and is invoked once per turn until it calls `exit` or fails.
  ///
  /// # Errors
  ///
  /// [InvalidState] if the AVar has already exited or failed
  pub fn q(
    &self,
    continuation: impl FnMut(&mut Turn<'_, T>) -> TurnResult + 'static,
  ) -> Result<&Self, InvalidState> {
    let state = self.state();
    if state.is_terminal() {
      return Err(InvalidState { avar: self.id(), op: "enqueue", reason: Conflict::Terminal(state) });
    }
    let boxed: Box<dyn Continuation<T>> = Box::new(continuation);
    let wake = self.0.queue.borrow_mut().enqueue(boxed);
    if wake {
      self.0.request_turn();
    }
    Ok(self)
  }

  /// Register a listener. Each listener is called at most once per emission,
  /// in registration order. This is accepted in every state. If the scheduler
  /// buffers events, matching past emissions are delivered immediately.
  pub fn on(&self, kind: EventKind, mut handler: impl FnMut(&Event) + 'static) -> &Self {
    let past = (self.0.listeners.borrow().past.iter())
      .filter(|ev| ev.kind() == kind)
      .cloned()
      .collect_vec();
    for ev in &past {
      handler(ev)
    }
    let boxed: Box<dyn Listener> = Box::new(handler);
    self.0.listeners.borrow_mut().handlers.entry(kind).or_default().push(boxed);
    self
  }

  /// Read the value outside a continuation
  ///
  /// # Errors
  ///
  /// [InvalidState] if called from within a continuation of this AVar
  pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, InvalidState> {
    let val = (self.0.value.try_borrow())
      .map_err(|_| InvalidState { avar: self.id(), op: "read", reason: Conflict::Busy })?;
    Ok(f(&val))
  }

  /// Copy the value out, see [AVar::with]
  ///
  /// # Errors
  ///
  /// [InvalidState] if called from within a continuation of this AVar
  pub fn val(&self) -> Result<T, InvalidState>
  where T: Clone {
    self.with(T::clone)
  }
}

impl<T: 'static> AVarCell<T> {
  fn request_turn(&self) {
    if self.in_run_set.replace(true) {
      return;
    }
    let me = unwrap_or!(self.me.upgrade(); return);
    self.scheduler.wake(me);
  }

  fn trace(&self, what: impl fmt::Display) {
    if self.scheduler.config().trace {
      self.scheduler.logger().log(format!("AVar {} {what}", self.id))
    }
  }

  /// Act on a decision about the continuation that was lent out. Returns
  /// whether the AVar has a continuation ready to run.
  fn apply(&self, continuation: Box<dyn Continuation<T>>, disposition: Disposition) -> bool {
    self.trace(disposition.name());
    match disposition {
      Disposition::Stay => {
        self.queue.borrow_mut().restore(continuation);
        true
      },
      Disposition::Exit => {
        drop(continuation);
        let more = {
          let mut queue = self.queue.borrow_mut();
          queue.retire();
          !queue.is_empty()
        };
        if !more {
          self.state.set(TerminalState::Exited);
          self.emit(Event::Exit);
        }
        more
      },
      Disposition::Fail(failure) => {
        let discarded = {
          let mut queue = self.queue.borrow_mut();
          queue.retire();
          queue.clear()
        };
        drop(continuation);
        if !discarded.is_empty() {
          self.trace(format_args!("discarded {} continuation(s)", discarded.len()));
        }
        drop(discarded);
        self.emit(Event::Fail(failure));
        false
      },
    }
  }

  /// Notify the listeners of an event. The AVar is marked failed before
  /// listeners run so that they can't queue work that would never execute.
  fn emit(&self, event: Event) {
    let kind = event.kind();
    if kind.is_unrecoverable() {
      self.state.set(TerminalState::Failed);
    }
    let mut handlers = {
      let mut listeners = self.listeners.borrow_mut();
      if self.scheduler.config().buffer_events {
        if kind == EventKind::Error {
          listeners.past.retain(|ev| ev.kind() != EventKind::Error);
        }
        listeners.past.push(event.clone());
      }
      listeners.handlers.remove(&kind).unwrap_or_default()
    };
    let handled = !handlers.is_empty();
    for handler in handlers.iter_mut() {
      handler(&event)
    }
    {
      let mut listeners = self.listeners.borrow_mut();
      let slot = listeners.handlers.entry(kind).or_default();
      // listeners registered during the emission go after the existing ones
      handlers.append(slot);
      *slot = handlers;
    }
    if !handled {
      if let Some(failure) = event.failure() {
        let msg = format!("AVar {} emitted {kind} with no listener: {failure}", self.id);
        self.scheduler.logger().log(msg)
      }
    }
  }
}

impl<T: 'static> Runnable for AVarCell<T> {
  fn turn(self: Rc<Self>) -> bool {
    self.in_run_set.set(false);
    if self.state.get().is_terminal() {
      return false;
    }
    let next = self.queue.borrow_mut().begin();
    let mut continuation = unwrap_or!(next; return false);
    let signal = Signal::new(self.clone());
    let result = match self.value.try_borrow_mut() {
      Ok(mut val) => {
        let avar = AVar(self.clone());
        let mut turn = Turn { val: &mut *val, avar: &avar, signal: signal.clone() };
        match catch_unwind(AssertUnwindSafe(|| continuation(&mut turn))) {
          Ok(result) => result,
          Err(payload) => Err(Panicked::from_payload(&*payload).rc()),
        }
      },
      Err(_) => Err(InvalidState { avar: self.id, op: "run", reason: Conflict::Busy }.rc()),
    };
    match signal.conclude(result) {
      Some(disposition) => {
        let ready = self.apply(continuation, disposition);
        self.in_run_set.set(ready);
        ready
      },
      None => {
        self.trace("parked");
        *self.parked.borrow_mut() = Some(continuation);
        self.scheduler.park(self.id);
        // if this was the last copy, dropping it settles the AVar as failed
        drop(signal);
        false
      },
    }
  }
}

impl<T: 'static> Settle for AVarCell<T> {
  fn settle(&self, disposition: Disposition) {
    let parked = self.parked.borrow_mut().take();
    let continuation = unwrap_or!(parked; return);
    self.scheduler.unpark(self.id);
    if self.apply(continuation, disposition) {
      self.request_turn()
    }
  }

  fn misuse(&self, misuse: SignalMisuse) {
    self.trace(misuse);
    self.emit(Event::Error(misuse.rc()))
  }
}

impl<T> Clone for AVar<T> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T: 'static> fmt::Debug for AVar<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AVar")
      .field("id", &self.id())
      .field("state", &self.state())
      .field("pending", &self.pending())
      .finish_non_exhaustive()
  }
}
