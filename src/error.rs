//! Errors raised by continuations and by misuse of the AVar API, unified under
//! a common clonable trait object.

use std::any::Any;
use std::error::Error;
use std::fmt::{self, Debug, Display};
use std::rc::Rc;

use dyn_clone::DynClone;

use crate::avar::{AVarId, TerminalState};

/// Anything a continuation can fail with. Implementors only need [Display] and
/// [Clone]; [TurnError::rc] erases the type.
pub trait TurnError: Display + DynClone {
  /// Convert into trait object
  #[must_use]
  fn rc(self) -> Failure
  where Self: 'static + Sized {
    Rc::new(self)
  }
}

impl Debug for dyn TurnError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "TurnError({self})") }
}

impl Error for dyn TurnError {}

/// A type-erased failure, the payload of `fail` and `error` events
pub type Failure = Rc<dyn TurnError>;

/// Return type of every continuation body
pub type TurnResult = Result<(), Failure>;

/// A failure described only by a message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message(pub String);
impl Display for Message {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}
impl TurnError for Message {}

/// Construct a [Message], upcast it and wrap it in a Result that never
/// succeeds for easy short-circuiting
pub fn fail<T>(message: impl Into<String>) -> Result<T, Failure> {
  Err(Message(message.into()).rc())
}

/// A continuation panicked. The panic is caught at the turn boundary and
/// fails only the AVar that ran it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Panicked(pub String);
impl Panicked {
  /// Extract the message from a panic payload
  pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
    let msg = if let Some(s) = payload.downcast_ref::<&str>() {
      s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
      s.clone()
    } else {
      "unknown panic".to_string()
    };
    Self(msg)
  }
}
impl Display for Panicked {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "continuation panicked: {}", self.0)
  }
}
impl TurnError for Panicked {}

/// Why an operation was refused by an AVar
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conflict {
  /// The AVar has already exited or failed
  Terminal(TerminalState),
  /// The value is borrowed by a running continuation
  Busy,
}

/// An operation was attempted on an AVar in a state that doesn't allow it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidState {
  /// The AVar that refused the operation
  pub avar: AVarId,
  /// Name of the operation, for the message
  pub op: &'static str,
  /// The state that caused the refusal
  pub reason: Conflict,
}
impl Display for InvalidState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "cannot {} on AVar {}: ", self.op, self.avar)?;
    match self.reason {
      Conflict::Terminal(state) => write!(f, "it has {state}"),
      Conflict::Busy => write!(f, "its value is held by a running continuation"),
    }
  }
}
impl TurnError for InvalidState {}
impl Error for InvalidState {}
impl From<InvalidState> for Failure {
  fn from(value: InvalidState) -> Self { value.rc() }
}

/// A [crate::signal::Signal] was used in a way the protocol forbids
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalMisuse {
  /// The signal had already been given a disposition
  Repeated,
  /// The continuation failed before the signal was used
  Stale,
  /// Every copy of a pending signal was dropped without a call
  Dropped,
}
impl Display for SignalMisuse {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Repeated => write!(f, "signal called more than once"),
      Self::Stale => write!(f, "signal called after its continuation failed"),
      Self::Dropped => write!(f, "signal dropped before stay, exit or fail was called"),
    }
  }
}
impl TurnError for SignalMisuse {}
impl Error for SignalMisuse {}
impl From<SignalMisuse> for Failure {
  fn from(value: SignalMisuse) -> Self { value.rc() }
}
