#![warn(missing_docs)]
//! Asynchronous variables for cooperative, single-threaded programs.
//!
//! An [AVar] holds a value and a queue of continuations that may mutate it.
//! A [Scheduler] runs the continuations one at a time, and each of them uses
//! a [signal::Signal] to decide whether it runs again (`stay`) or lets the
//! next one in (`exit`). Between passes the scheduler yields to a
//! [host::Host], so an unbounded loop built with [AVarExt::until] never
//! starves the surrounding event loop.
pub mod avar;
pub mod combinators;
pub mod error;
pub mod host;
pub mod logging;
pub mod queue;
pub mod scheduler;
pub mod signal;
mod utils;

pub use avar::{AVar, Event, EventKind, TerminalState, Turn};
pub use combinators::AVarExt;
pub use scheduler::{Scheduler, SchedulerConfig};
