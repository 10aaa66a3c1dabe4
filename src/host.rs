//! The host run-loop the scheduler yields to.
//!
//! The scheduler only ever asks its host to run a callback "soon", after the
//! current call stack has unwound. [EventLoop] is a single-threaded host that
//! also supports timers, so detached signals can be fired later.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use crate::utils::{unwrap_or, DeleteCell};

/// A callback handed to the host
pub type Tick = Box<dyn FnOnce()>;

/// The deferred-execution primitive the scheduler depends on
pub trait Host {
  /// Run the callback at the next opportunity without blocking the caller.
  /// The only guarantee required is that it runs after the current
  /// synchronous call stack.
  fn run_soon(&self, tick: Tick);
}

impl<H: Host + ?Sized> Host for Rc<H> {
  fn run_soon(&self, tick: Tick) { (**self).run_soon(tick) }
}

/// A callback scheduled for a specific point in time
///
/// In order to work with Rust's builtin [BinaryHeap] which is a max heap, the
/// [Ord] implementation of this struct is reversed; it can be intuitively
/// thought of as ordering by urgency. Timers due at the same instant fire in
/// the order they were set.
struct Timer {
  expires: Instant,
  seq: u64,
  tick: DeleteCell<Tick>,
}
impl Eq for Timer {}
impl PartialEq for Timer {
  fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}
impl PartialOrd for Timer {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}
impl Ord for Timer {
  fn cmp(&self, other: &Self) -> Ordering {
    (other.expires, other.seq).cmp(&(self.expires, self.seq))
  }
}

/// Cancels a timer set with [EventLoop::set_timeout]
#[derive(Clone)]
pub struct TimerHandle(DeleteCell<Tick>);
impl TimerHandle {
  /// Prevent the callback from running. Returns false if it already ran or
  /// was cancelled.
  pub fn cancel(&self) -> bool { self.0.take().is_some() }
  /// Whether the callback is still due to run
  pub fn is_pending(&self) -> bool { self.0.is_live() }
}
impl fmt::Debug for TimerHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TimerHandle").field("pending", &self.is_pending()).finish()
  }
}

#[derive(Default)]
struct LoopCore {
  immediates: RefCell<VecDeque<Tick>>,
  timers: RefCell<BinaryHeap<Timer>>,
  next_seq: Cell<u64>,
}

/// A single-threaded event loop with a FIFO of immediate callbacks and a heap
/// of timers. Clones share the same queues.
#[derive(Clone, Default)]
pub struct EventLoop(Rc<LoopCore>);
impl EventLoop {
  /// Create an empty loop
  #[must_use]
  pub fn new() -> Self { Self::default() }

  /// Run a callback once the duration has elapsed and all immediates queued
  /// before that point have run
  pub fn set_timeout(&self, duration: Duration, tick: impl FnOnce() + 'static) -> TimerHandle {
    let seq = self.0.next_seq.get();
    self.0.next_seq.set(seq + 1);
    let cell = DeleteCell::new(Box::new(tick) as Tick);
    self.0.timers.borrow_mut().push(Timer { expires: Instant::now() + duration, seq, tick: cell.clone() });
    TimerHandle(cell)
  }

  /// Number of queued immediates and live timers
  pub fn pending(&self) -> usize {
    let timers = self.0.timers.borrow().iter().filter(|t| t.tick.is_live()).count();
    self.0.immediates.borrow().len() + timers
  }

  /// Run the oldest immediate, or if there are none, the most urgent expired
  /// timer. Returns false if nothing was ready.
  pub fn run_once(&self) -> bool {
    let immediate = self.0.immediates.borrow_mut().pop_front();
    if let Some(tick) = immediate {
      tick();
      return true;
    }
    loop {
      let due = {
        let mut timers = self.0.timers.borrow_mut();
        match timers.peek() {
          Some(t) if t.expires <= Instant::now() => timers.pop(),
          _ => None,
        }
      };
      let timer = unwrap_or!(due; return false);
      // cancelled timers are skipped
      if let Some(tick) = timer.tick.take() {
        tick();
        return true;
      }
    }
  }

  /// Run until there are no immediates and no live timers left, sleeping
  /// until the next timer when idle. Returns the number of callbacks run.
  pub fn run(&self) -> usize {
    let mut count = 0;
    loop {
      if self.run_once() {
        count += 1;
        continue;
      }
      let next = unwrap_or!(self.next_deadline(); return count);
      let now = Instant::now();
      if now < next {
        sleep(next - now);
      }
    }
  }

  /// Drop cancelled timers from the top of the heap and report when the next
  /// live one expires
  fn next_deadline(&self) -> Option<Instant> {
    let mut timers = self.0.timers.borrow_mut();
    while timers.peek().is_some_and(|t| !t.tick.is_live()) {
      timers.pop();
    }
    timers.peek().map(|t| t.expires)
  }
}
impl Host for EventLoop {
  fn run_soon(&self, tick: Tick) { self.0.immediates.borrow_mut().push_back(tick) }
}
impl fmt::Debug for EventLoop {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EventLoop").field("pending", &self.pending()).finish()
  }
}

#[cfg(test)]
mod test {
  use std::cell::RefCell;
  use std::rc::Rc;
  use std::time::Duration;

  use super::{EventLoop, Host};

  fn push(log: &Rc<RefCell<Vec<&'static str>>>, s: &'static str) -> impl FnOnce() + 'static {
    let log = log.clone();
    move || log.borrow_mut().push(s)
  }

  #[test]
  fn immediates_before_timers() {
    let ev = EventLoop::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    ev.set_timeout(Duration::ZERO, push(&log, "timer"));
    ev.run_soon(Box::new(push(&log, "a")));
    ev.run_soon(Box::new(push(&log, "b")));
    assert_eq!(ev.pending(), 3);
    assert_eq!(ev.run(), 3);
    assert_eq!(*log.borrow(), vec!["a", "b", "timer"]);
  }

  #[test]
  fn timers_by_deadline() {
    let ev = EventLoop::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    ev.set_timeout(Duration::from_millis(20), push(&log, "late"));
    ev.set_timeout(Duration::from_millis(5), push(&log, "early"));
    ev.set_timeout(Duration::from_millis(5), push(&log, "early2"));
    ev.run();
    assert_eq!(*log.borrow(), vec!["early", "early2", "late"]);
  }

  #[test]
  fn cancelled_timer_never_fires() {
    let ev = EventLoop::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let handle = ev.set_timeout(Duration::from_millis(1), push(&log, "x"));
    assert!(handle.is_pending());
    assert!(handle.cancel());
    assert!(!handle.cancel());
    assert_eq!(ev.pending(), 0);
    assert_eq!(ev.run(), 0);
    assert!(log.borrow().is_empty());
  }

  #[test]
  fn callbacks_can_schedule_more() {
    let ev = EventLoop::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let (ev2, log2) = (ev.clone(), log.clone());
    ev.run_soon(Box::new(move || {
      log2.borrow_mut().push("outer");
      ev2.run_soon(Box::new(push(&log2, "inner")));
    }));
    ev.run_soon(Box::new(push(&log, "sibling")));
    ev.run();
    assert_eq!(*log.borrow(), vec!["outer", "sibling", "inner"]);
  }
}
