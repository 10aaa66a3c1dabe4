//! The cooperative driver that turns queued continuations into executed work.
//!
//! A [Scheduler] keeps a run set of AVars whose head continuation is ready.
//! Each pass ([Scheduler::revive]) gives AVars one turn each in round-robin
//! order until either the run set is empty or the pass has to yield, in which
//! case the next pass is handed to the [Host] and control returns to it.
//! Passes are loops, not recursion, so a continuation can `stay` forever
//! without growing the stack.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;
use std::rc::Rc;
use std::thread;

use hashbrown::HashSet;
use itertools::Itertools;

use crate::avar::{AVar, AVarId};
use crate::host::Host;
use crate::logging::{LogStrategy, Logger};
use crate::utils::unwrap_or;

/// Something that can take a turn, implemented by AVars
pub(crate) trait Runnable {
  /// Run the head continuation once. Returns true if another turn is needed.
  fn turn(self: Rc<Self>) -> bool;
}

/// Where the scheduler is in its cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SchedulerState {
  /// No pass is running or requested
  Idle,
  /// A pass is invoking continuations
  Draining,
  /// A pass gave up its turn and the next one is queued on the host
  Yielded,
}

/// Tunables of a [Scheduler]
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
  /// Turns taken in one pass before yielding to the host. [None] drains the
  /// run set synchronously, which never returns if a continuation stays
  /// forever.
  pub turns_per_pass: Option<NonZeroUsize>,
  /// Replay past events to listeners registered after the emission
  pub buffer_events: bool,
  /// Log every disposition
  pub trace: bool,
  /// Where diagnostics go
  pub log: LogStrategy,
}
impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      turns_per_pass: NonZeroUsize::new(1),
      buffer_events: false,
      trace: false,
      log: LogStrategy::StdErr,
    }
  }
}

struct SchedulerCore {
  host: Box<dyn Host>,
  config: SchedulerConfig,
  logger: Logger,
  run_set: RefCell<VecDeque<Rc<dyn Runnable>>>,
  parked: RefCell<HashSet<AVarId>>,
  state: Cell<SchedulerState>,
  resume_pending: Cell<bool>,
  snoozed: Cell<bool>,
  next_id: Cell<u64>,
  turns: Cell<u64>,
}

/// Shared handle to a scheduler. All AVars created through a scheduler keep
/// it alive, and the run set keeps the AVars with pending work alive. That
/// cycle is broken when the run set drains, so a host that is dropped while
/// a pass is still queued on it leaks the scheduler and those AVars.
#[derive(Clone)]
pub struct Scheduler(Rc<SchedulerCore>);
impl Scheduler {
  /// Create a scheduler that yields to the given host
  pub fn new(host: impl Host + 'static, config: SchedulerConfig) -> Self {
    Self(Rc::new(SchedulerCore {
      host: Box::new(host),
      logger: Logger::new(config.log.clone()),
      config,
      run_set: RefCell::default(),
      parked: RefCell::default(),
      state: Cell::new(SchedulerState::Idle),
      resume_pending: Cell::new(false),
      snoozed: Cell::new(false),
      next_id: Cell::new(0),
      turns: Cell::new(0),
    }))
  }

  /// Create an AVar driven by this scheduler
  pub fn avar<T: 'static>(&self, value: T) -> AVar<T> { AVar::new(self, value) }

  /// Current phase
  pub fn state(&self) -> SchedulerState { self.0.state.get() }

  /// Number of AVars waiting for a turn
  pub fn pending(&self) -> usize { self.0.run_set.borrow().len() }

  /// AVars whose continuation returned without calling its signal, in
  /// ascending order
  pub fn parked(&self) -> Vec<AVarId> { self.0.parked.borrow().iter().copied().sorted().collect() }

  /// Total number of turns taken
  pub fn turns(&self) -> u64 { self.0.turns.get() }

  /// The configuration this scheduler was created with
  pub fn config(&self) -> &SchedulerConfig { &self.0.config }

  /// The diagnostic channel
  pub fn logger(&self) -> &Logger { &self.0.logger }

  /// Ask the running pass to yield to the host after the current turn. Has no
  /// effect outside a pass.
  pub fn snooze(&self) {
    if self.state() == SchedulerState::Draining {
      self.0.snoozed.set(true)
    }
  }

  /// Resumption entry point, called by the host. Calls made while a pass is
  /// already running return immediately; that pass will pick up any new work.
  pub fn revive(&self) {
    let core = &self.0;
    if core.state.get() == SchedulerState::Draining {
      return;
    }
    core.resume_pending.set(false);
    core.snoozed.set(false);
    core.state.set(SchedulerState::Draining);
    let _guard = PassGuard(self);
    let budget = core.config.turns_per_pass.map(NonZeroUsize::get);
    let mut turns = 0;
    loop {
      let next = core.run_set.borrow_mut().pop_front();
      let avar = unwrap_or!(next; break);
      turns += 1;
      core.turns.set(core.turns.get() + 1);
      if avar.clone().turn() {
        core.run_set.borrow_mut().push_back(avar);
      }
      let exhausted = matches!(budget, Some(b) if turns >= b);
      if (exhausted || core.snoozed.get()) && !core.run_set.borrow().is_empty() {
        core.state.set(SchedulerState::Yielded);
        self.schedule_pass();
        return;
      }
    }
    core.state.set(SchedulerState::Idle);
    if core.config.trace {
      let parked = self.parked();
      if !parked.is_empty() {
        core.logger.log(format!("scheduler idle, awaiting signals for {}", parked.iter().join(", ")))
      }
    }
  }

  pub(crate) fn next_id(&self) -> AVarId {
    let id = self.0.next_id.get();
    self.0.next_id.set(id + 1);
    AVarId(id)
  }

  /// Add an AVar to the run set. The caller makes sure it isn't already in.
  pub(crate) fn wake(&self, avar: Rc<dyn Runnable>) {
    self.0.run_set.borrow_mut().push_back(avar);
    if self.state() == SchedulerState::Idle {
      self.schedule_pass()
    }
  }

  pub(crate) fn park(&self, id: AVarId) { self.0.parked.borrow_mut().insert(id); }

  pub(crate) fn unpark(&self, id: AVarId) { self.0.parked.borrow_mut().remove(&id); }

  fn schedule_pass(&self) {
    if self.0.resume_pending.replace(true) {
      return;
    }
    let this = self.clone();
    self.0.host.run_soon(Box::new(move || this.revive()))
  }
}

/// Returns an unwinding pass to [SchedulerState::Idle] and reschedules the
/// AVars left in the run set, so a panic escaping one turn (eg. from a
/// listener) doesn't stall the rest.
struct PassGuard<'a>(&'a Scheduler);
impl Drop for PassGuard<'_> {
  fn drop(&mut self) {
    if !thread::panicking() {
      return;
    }
    let core = &(self.0).0;
    core.state.set(SchedulerState::Idle);
    core.resume_pending.set(false);
    if core.run_set.try_borrow().is_ok_and(|set| !set.is_empty()) {
      self.0.schedule_pass()
    }
  }
}

impl fmt::Debug for Scheduler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Scheduler")
      .field("state", &self.state())
      .field("pending", &self.pending())
      .field("parked", &self.parked())
      .field("turns", &self.turns())
      .finish()
  }
}
