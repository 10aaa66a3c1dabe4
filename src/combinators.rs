//! Extensions built purely on [AVar::q] and [AVar::on]. They add no state of
//! their own.

use std::fmt::Display;
use std::io::{self, Write};

use crate::avar::{AVar, EventKind, Turn};
use crate::error::{fail, Failure, InvalidState};

/// Loops and printing for every [AVar]
pub trait AVarExt<T> {
  /// Non-blocking `while !body() {}`. The body runs once per turn; the loop
  /// repeats while it returns false and ends on the first true.
  ///
  /// # Errors
  ///
  /// [InvalidState] if the AVar has already exited or failed
  fn until(&self, body: impl FnMut(&mut T) -> bool + 'static) -> Result<&Self, InvalidState>;

  /// Like [AVarExt::until], but an error from the body fails the AVar
  ///
  /// # Errors
  ///
  /// [InvalidState] if the AVar has already exited or failed
  fn try_until(
    &self,
    body: impl FnMut(&mut T) -> Result<bool, Failure> + 'static,
  ) -> Result<&Self, InvalidState>;

  /// Write the value to `out` once everything before has finished, and
  /// report a failure of the AVar to `err`
  ///
  /// # Errors
  ///
  /// [InvalidState] if the AVar has already exited or failed
  fn print_to(
    &self,
    out: impl Write + 'static,
    err: impl Write + 'static,
  ) -> Result<&Self, InvalidState>
  where
    T: Display;

  /// [AVarExt::print_to] with stdout and stderr
  ///
  /// # Errors
  ///
  /// [InvalidState] if the AVar has already exited or failed
  fn print(&self) -> Result<&Self, InvalidState>
  where T: Display {
    self.print_to(io::stdout(), io::stderr())
  }
}

impl<T: 'static> AVarExt<T> for AVar<T> {
  fn until(&self, mut body: impl FnMut(&mut T) -> bool + 'static) -> Result<&Self, InvalidState> {
    self.try_until(move |val| Ok(body(val)))
  }

  fn try_until(
    &self,
    mut body: impl FnMut(&mut T) -> Result<bool, Failure> + 'static,
  ) -> Result<&Self, InvalidState> {
    self.q(move |turn: &mut Turn<'_, T>| match body(&mut *turn.val)? {
      false => turn.stay(),
      true => turn.exit(),
    })
  }

  fn print_to(
    &self,
    mut out: impl Write + 'static,
    mut err: impl Write + 'static,
  ) -> Result<&Self, InvalidState>
  where
    T: Display,
  {
    self.q(move |turn: &mut Turn<'_, T>| match writeln!(out, "{}", turn.val) {
      Ok(()) => turn.exit(),
      Err(e) => fail(format!("failed to print AVar {}: {e}", turn.avar().id())),
    })?;
    self.on(EventKind::Fail, move |ev| {
      if let Some(failure) = ev.failure() {
        let _ = writeln!(err, "Error: {failure}");
      }
    });
    Ok(self)
  }
}

#[cfg(test)]
mod test {
  use std::cell::RefCell;
  use std::io::{self, Write};
  use std::rc::Rc;

  use super::AVarExt;
  use crate::avar::TerminalState;
  use crate::error::fail;
  use crate::host::EventLoop;
  use crate::logging::LogStrategy;
  use crate::scheduler::{Scheduler, SchedulerConfig};

  #[derive(Clone, Default)]
  struct Sink(Rc<RefCell<Vec<u8>>>);
  impl Sink {
    fn text(&self) -> String { String::from_utf8(self.0.borrow().clone()).unwrap() }
  }
  impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      self.0.borrow_mut().extend_from_slice(buf);
      Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> { Ok(()) }
  }

  fn setup() -> (EventLoop, Scheduler) {
    let host = EventLoop::new();
    let config = SchedulerConfig { log: LogStrategy::Discard, ..SchedulerConfig::default() };
    (host.clone(), Scheduler::new(host, config))
  }

  #[test]
  fn until_counts_iterations() {
    let (host, sch) = setup();
    let calls = Rc::new(RefCell::new(Vec::new()));
    let c2 = calls.clone();
    let (out, err) = (Sink::default(), Sink::default());
    let x = sch.avar(2.0_f64);
    x.until(move |val| {
      *val += 1.0;
      c2.borrow_mut().push(*val);
      *val > 5.0
    })
    .unwrap()
    .print_to(out.clone(), err.clone())
    .unwrap();
    host.run();
    assert_eq!(*calls.borrow(), vec![3.0, 4.0, 5.0, 6.0]);
    assert_eq!(x.val(), Ok(6.0));
    assert_eq!(out.text(), "6\n");
    assert_eq!(err.text(), "");
    assert_eq!(x.state(), TerminalState::Exited);
  }

  #[test]
  fn until_runs_once_per_turn() {
    let (host, sch) = setup();
    let x = sch.avar(0);
    x.until(|val| {
      *val += 1;
      *val == 3
    })
    .unwrap();
    let mut passes = 0;
    while host.run_once() {
      passes += 1;
    }
    assert_eq!(passes, 3);
    assert_eq!(sch.turns(), 3);
  }

  #[test]
  fn true_on_first_call_exits_immediately() {
    let (host, sch) = setup();
    let x = sch.avar(10);
    x.until(|_| true).unwrap();
    host.run();
    assert_eq!(sch.turns(), 1);
    assert_eq!(x.val(), Ok(10));
  }

  #[test]
  fn print_reports_failure() {
    let (host, sch) = setup();
    let (out, err) = (Sink::default(), Sink::default());
    let x = sch.avar(0);
    x.try_until(|val| {
      *val += 1;
      if *val > 2 { fail("too far") } else { Ok(false) }
    })
    .unwrap()
    .print_to(out.clone(), err.clone())
    .unwrap();
    host.run();
    assert_eq!(out.text(), "");
    assert_eq!(err.text(), "Error: too far\n");
    assert_eq!(x.state(), TerminalState::Failed);
    assert_eq!(x.val(), Ok(3));
    assert!(x.until(|_| true).is_err());
  }
}
