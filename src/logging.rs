//! Diagnostic channel for conditions nobody is listening for

use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

/// An in-memory log sink, mostly useful in tests
#[derive(Clone, Debug, Default)]
pub struct LogBuffer(Rc<RefCell<Vec<String>>>);
impl LogBuffer {
  /// Create an empty buffer
  pub fn new() -> Self { Self::default() }
  /// Copy out the lines logged so far
  pub fn lines(&self) -> Vec<String> { self.0.borrow().clone() }
  /// Whether any line contains the given fragment
  pub fn contains(&self, fragment: &str) -> bool {
    self.0.borrow().iter().any(|l| l.contains(fragment))
  }
}

/// Where log lines go
#[derive(Clone, Debug, Default)]
pub enum LogStrategy {
  /// Print to standard error
  #[default]
  StdErr,
  /// Append to a file, which is created if missing
  File(PathBuf),
  /// Collect lines in memory
  Buffer(LogBuffer),
  /// Drop everything
  Discard,
}

/// Line-oriented logger shared by a scheduler and all of its AVars
#[derive(Clone, Debug, Default)]
pub struct Logger(LogStrategy);
impl Logger {
  /// Create a logger with the given strategy
  pub fn new(strat: LogStrategy) -> Self { Self(strat) }
  /// Write one line. Failing to write to a log file is not an error.
  pub fn log(&self, msg: impl AsRef<str>) {
    let msg = msg.as_ref();
    match &self.0 {
      LogStrategy::StdErr => eprintln!("{msg}"),
      LogStrategy::File(f) =>
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(f) {
          let _ = writeln!(file, "{msg}");
        },
      LogStrategy::Buffer(buf) => buf.0.borrow_mut().push(msg.to_string()),
      LogStrategy::Discard => (),
    }
  }
}
