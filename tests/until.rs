use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use quanah::host::{EventLoop, Host};
use quanah::logging::{LogBuffer, LogStrategy};
use quanah::{AVarExt, EventKind, Scheduler, SchedulerConfig, TerminalState, Turn};

fn scheduler(host: &EventLoop) -> (Scheduler, LogBuffer) {
  let buf = LogBuffer::new();
  let config = SchedulerConfig { log: LogStrategy::Buffer(buf.clone()), ..SchedulerConfig::default() };
  (Scheduler::new(host.clone(), config), buf)
}

#[test]
fn loop_stops_after_passing_threshold() {
  let host = EventLoop::new();
  let (sch, buf) = scheduler(&host);
  let iterations = Rc::new(RefCell::new(0));
  let counter = iterations.clone();
  let x = sch.avar(2);
  x.until(move |val| {
    *counter.borrow_mut() += 1;
    *val += 1;
    *val > 5
  })
  .unwrap();
  host.run();
  assert_eq!(*iterations.borrow(), 4);
  assert_eq!(x.val(), Ok(6));
  assert_eq!(x.state(), TerminalState::Exited);
  assert!(buf.lines().is_empty());
}

#[test]
fn independent_loops_interleave_with_host_work() {
  let host = EventLoop::new();
  let (sch, _) = scheduler(&host);
  let trail = Rc::new(RefCell::new(String::new()));
  for (name, limit) in [('a', 3), ('b', 2)] {
    let trail = trail.clone();
    sch
      .avar(0)
      .until(move |val| {
        *val += 1;
        trail.borrow_mut().push(name);
        *val >= limit
      })
      .unwrap();
  }
  let t2 = trail.clone();
  host.run_soon(Box::new(move || t2.borrow_mut().push('h')));
  host.run();
  // one turn per pass, and the host callback queued before the first pass
  // runs before the second
  assert_eq!(*trail.borrow(), "ahbaba");
}

#[test]
fn timer_resumes_parked_avar() {
  let host = EventLoop::new();
  let (sch, _) = scheduler(&host);
  let events = Rc::new(RefCell::new(Vec::new()));
  let x = sch.avar(Vec::new());
  let timers = host.clone();
  x.q(move |t: &mut Turn<'_, Vec<&'static str>>| {
    t.val.push("waiting");
    let signal = t.signal();
    timers.set_timeout(Duration::from_millis(5), move || signal.exit().unwrap());
    Ok(())
  })
  .unwrap()
  .q(|t: &mut Turn<'_, Vec<&'static str>>| {
    t.val.push("woken");
    t.exit()
  })
  .unwrap();
  let e2 = events.clone();
  x.on(EventKind::Exit, move |ev| e2.borrow_mut().push(ev.to_string()));
  host.run();
  assert_eq!(x.val().unwrap(), vec!["waiting", "woken"]);
  assert_eq!(*events.borrow(), vec!["exit".to_string()]);
}
