//! The one-shot capability a continuation uses to say what should happen to it
//! once it returns.
//!
//! A [Signal] is usually called before the continuation returns, in which case
//! the disposition is applied by the scheduler right after the turn. It can
//! also be cloned and called later, eg. from a timer callback. Until then the
//! AVar is parked and the scheduler serves other AVars.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{Failure, SignalMisuse, TurnError, TurnResult};
use crate::utils::take_with_output;

/// What a continuation asked for
#[derive(Clone, Debug)]
pub enum Disposition {
  /// Run the same continuation again on the next turn
  Stay,
  /// Retire the continuation and advance the queue
  Exit,
  /// Fail the AVar with the given payload
  Fail(Failure),
}
impl Disposition {
  /// Lowercase name for logs
  pub fn name(&self) -> &'static str {
    match self {
      Self::Stay => "stay",
      Self::Exit => "exit",
      Self::Fail(_) => "fail",
    }
  }
}

/// The receiving end of a signal, implemented by AVars
pub(crate) trait Settle {
  /// Apply a disposition that arrived after the continuation returned
  fn settle(&self, disposition: Disposition);
  /// Report a protocol violation
  fn misuse(&self, misuse: SignalMisuse);
}

enum Phase {
  /// The continuation body is executing, maybe with a decision already
  Running(Option<Disposition>),
  /// The body returned undecided
  Parked,
  /// A disposition has been handed to the AVar
  Settled,
  /// The body failed without deciding
  Void,
}

struct SignalCore {
  phase: RefCell<Phase>,
  target: Rc<dyn Settle>,
}
impl Drop for SignalCore {
  fn drop(&mut self) {
    let phase = self.phase.get_mut();
    if let Phase::Parked = phase {
      *phase = Phase::Settled;
      self.target.settle(Disposition::Fail(SignalMisuse::Dropped.rc()))
    }
  }
}

/// Capability handed to exactly one continuation invocation. Exactly one of
/// [Signal::stay], [Signal::exit] or [Signal::fail] must be called per
/// invocation; further calls are rejected with [SignalMisuse::Repeated].
#[derive(Clone)]
pub struct Signal(Rc<SignalCore>);
impl Signal {
  pub(crate) fn new(target: Rc<dyn Settle>) -> Self {
    Self(Rc::new(SignalCore { phase: RefCell::new(Phase::Running(None)), target }))
  }

  /// Ask for the same continuation to be invoked again
  pub fn stay(&self) -> Result<(), SignalMisuse> { self.dispose(Disposition::Stay) }

  /// Retire the continuation so the next one can run
  pub fn exit(&self) -> Result<(), SignalMisuse> { self.dispose(Disposition::Exit) }

  /// Fail the AVar, discarding the rest of its queue
  pub fn fail(&self, failure: Failure) -> Result<(), SignalMisuse> {
    self.dispose(Disposition::Fail(failure))
  }

  /// Whether a disposition was already given
  pub fn is_decided(&self) -> bool {
    !matches!(&*self.0.phase.borrow(), Phase::Running(None) | Phase::Parked)
  }

  fn dispose(&self, d: Disposition) -> Result<(), SignalMisuse> {
    let res = take_with_output(&mut *self.0.phase.borrow_mut(), |phase| match phase {
      Phase::Running(None) => (Phase::Running(Some(d)), Ok(None)),
      Phase::Parked => (Phase::Settled, Ok(Some(d))),
      Phase::Void => (Phase::Void, Err(SignalMisuse::Stale)),
      p @ (Phase::Running(Some(_)) | Phase::Settled) => (p, Err(SignalMisuse::Repeated)),
    });
    match res {
      Ok(None) => Ok(()),
      Ok(Some(d)) => {
        self.0.target.settle(d);
        Ok(())
      },
      Err(e) => {
        self.0.target.misuse(e);
        Err(e)
      },
    }
  }

  /// Close the running phase with the continuation's return value. A failed
  /// return overrides whatever the body decided. [None] means the AVar parks.
  pub(crate) fn conclude(&self, result: TurnResult) -> Option<Disposition> {
    take_with_output(&mut *self.0.phase.borrow_mut(), |phase| match (phase, result) {
      (Phase::Running(Some(_)), Err(f)) => (Phase::Settled, Some(Disposition::Fail(f))),
      (Phase::Running(None), Err(f)) => (Phase::Void, Some(Disposition::Fail(f))),
      (Phase::Running(Some(d)), Ok(())) => (Phase::Settled, Some(d)),
      (Phase::Running(None), Ok(())) => (Phase::Parked, None),
      (other, _) => (other, None),
    })
  }
}

impl fmt::Debug for Signal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let phase = match &*self.0.phase.borrow() {
      Phase::Running(None) => "running",
      Phase::Running(Some(d)) => d.name(),
      Phase::Parked => "parked",
      Phase::Settled => "settled",
      Phase::Void => "void",
    };
    f.debug_tuple("Signal").field(&phase).finish()
  }
}

#[cfg(test)]
mod test {
  use std::cell::RefCell;
  use std::rc::Rc;

  use super::{Disposition, Settle, Signal};
  use crate::error::{fail, SignalMisuse};

  #[derive(Default)]
  struct Recorder {
    settled: RefCell<Vec<&'static str>>,
    misused: RefCell<Vec<SignalMisuse>>,
  }
  impl Settle for Recorder {
    fn settle(&self, disposition: Disposition) {
      self.settled.borrow_mut().push(disposition.name())
    }
    fn misuse(&self, misuse: SignalMisuse) { self.misused.borrow_mut().push(misuse) }
  }

  fn signal() -> (Rc<Recorder>, Signal) {
    let rec = Rc::new(Recorder::default());
    (rec.clone(), Signal::new(rec))
  }

  #[test]
  fn second_call_is_rejected() {
    let (rec, sig) = signal();
    assert_eq!(sig.exit(), Ok(()));
    assert_eq!(sig.exit(), Err(SignalMisuse::Repeated));
    assert_eq!(sig.stay(), Err(SignalMisuse::Repeated));
    assert!(matches!(sig.conclude(Ok(())), Some(Disposition::Exit)));
    assert_eq!(sig.exit(), Err(SignalMisuse::Repeated));
    assert!(rec.settled.borrow().is_empty());
    assert_eq!(rec.misused.borrow().len(), 3);
  }

  #[test]
  fn error_return_overrides_decision() {
    let (_, sig) = signal();
    sig.stay().unwrap();
    let d = sig.conclude(fail("bad"));
    assert!(matches!(d, Some(Disposition::Fail(f)) if f.to_string() == "bad"));
  }

  #[test]
  fn failed_without_decision_is_stale() {
    let (_, sig) = signal();
    assert!(sig.conclude(fail("bad")).is_some());
    assert_eq!(sig.exit(), Err(SignalMisuse::Stale));
  }

  #[test]
  fn parked_signal_settles_later() {
    let (rec, sig) = signal();
    let detached = sig.clone();
    assert!(sig.conclude(Ok(())).is_none());
    drop(sig);
    assert!(!detached.is_decided());
    detached.stay().unwrap();
    assert_eq!(*rec.settled.borrow(), vec!["stay"]);
    assert_eq!(detached.exit(), Err(SignalMisuse::Repeated));
  }

  #[test]
  fn dropping_parked_signal_fails() {
    let (rec, sig) = signal();
    assert!(sig.conclude(Ok(())).is_none());
    drop(sig);
    assert_eq!(*rec.settled.borrow(), vec!["fail"]);
  }
}
