//! The ordered list of continuations waiting on one AVar.
//!
//! The head is lent out for the duration of a turn with [TaskQueue::begin] and
//! either returned with [TaskQueue::restore] or dropped with
//! [TaskQueue::retire]. While it's out the queue reports itself as busy and
//! nothing behind it can start.

use std::collections::VecDeque;
use std::{fmt, mem};

/// FIFO of pending work for a single AVar
pub struct TaskQueue<C> {
  entries: VecDeque<C>,
  busy: bool,
}
impl<C> TaskQueue<C> {
  /// Create an empty queue
  pub fn new() -> Self { Self { entries: VecDeque::new(), busy: false } }

  /// Append to the tail. Returns true if this made an idle, empty queue
  /// runnable, meaning the owner has to ask for a turn.
  pub fn enqueue(&mut self, c: C) -> bool {
    let wake = self.is_empty() && !self.busy;
    self.entries.push_back(c);
    wake
  }

  /// The head, unless it's currently lent out
  pub fn peek_front(&self) -> Option<&C> {
    if self.busy { None } else { self.entries.front() }
  }

  /// Whether there's anything waiting behind the lent-out head, or anything
  /// at all if the head is home
  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  /// Number of entries excluding the one lent out
  pub fn len(&self) -> usize { self.entries.len() }

  /// Whether the head is lent out
  pub fn is_busy(&self) -> bool { self.busy }

  /// Whether [TaskQueue::begin] would yield something
  pub fn is_ready(&self) -> bool { !self.busy && !self.entries.is_empty() }

  /// Lend out the head for a turn
  pub fn begin(&mut self) -> Option<C> {
    if self.busy {
      return None;
    }
    let head = self.entries.pop_front()?;
    self.busy = true;
    Some(head)
  }

  /// Return the head to its position, it will run again next
  ///
  /// # Panics
  ///
  /// if nothing was lent out
  pub fn restore(&mut self, c: C) {
    assert!(self.busy, "restore without begin");
    self.busy = false;
    self.entries.push_front(c);
  }

  /// Forget the lent-out head, the next entry becomes the head
  ///
  /// # Panics
  ///
  /// if nothing was lent out
  pub fn retire(&mut self) {
    assert!(self.busy, "retire without begin");
    self.busy = false;
  }

  /// Remove every waiting entry. They are handed back so that the caller can
  /// drop them after releasing its borrow of the queue.
  pub fn clear(&mut self) -> VecDeque<C> { mem::take(&mut self.entries) }
}

impl<C> Default for TaskQueue<C> {
  fn default() -> Self { Self::new() }
}

impl<C> fmt::Debug for TaskQueue<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskQueue").field("len", &self.len()).field("busy", &self.busy).finish()
  }
}
