use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use quanah::host::EventLoop;
use quanah::logging::LogStrategy;
use quanah::{AVarExt, Scheduler, SchedulerConfig, TerminalState};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Grow a number asynchronously until it passes a threshold, then print it
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// Initial value
  #[arg(long, default_value_t = 2.0)]
  pub start: f64,
  /// The loop ends once the value is greater than this
  #[arg(long, default_value_t = 5.0)]
  pub threshold: f64,
  /// Fixed increment per iteration. Random in [0, 1) if omitted
  #[arg(long)]
  pub step: Option<f64>,
  /// Seed for the random increments
  #[arg(long)]
  pub seed: Option<u64>,
  /// Iterations per scheduler pass before yielding to the event loop, 0 runs
  /// the whole loop in one pass
  #[arg(long, default_value_t = 1)]
  pub turns_per_pass: usize,
  /// Print every intermediate value and log each scheduling decision
  #[arg(long)]
  pub trace: bool,
  /// Write diagnostics to this file instead of stderr
  #[arg(long)]
  pub log_file: Option<PathBuf>,
  /// Replay past events to listeners registered late
  #[arg(long)]
  pub buffer_events: bool,
}
impl Args {
  /// Reject loops that could never end
  pub fn chk_progress(&self) -> Result<(), String> {
    if !self.start.is_finite() || !self.threshold.is_finite() {
      return Err("start and threshold must be finite".to_string());
    }
    match self.step {
      Some(step) if !(step > 0.0) && self.start <= self.threshold =>
        Err(format!("a step of {step} never gets from {} past {}", self.start, self.threshold)),
      _ => Ok(()),
    }
  }

  pub fn config(&self) -> SchedulerConfig {
    SchedulerConfig {
      turns_per_pass: NonZeroUsize::new(self.turns_per_pass),
      buffer_events: self.buffer_events,
      trace: self.trace,
      log: match &self.log_file {
        Some(path) => LogStrategy::File(path.clone()),
        None => LogStrategy::StdErr,
      },
    }
  }
}

pub fn main() -> ExitCode {
  let args = Args::parse();
  if let Err(e) = args.chk_progress() {
    eprintln!("{e}");
    return ExitCode::FAILURE;
  }
  let host = EventLoop::new();
  let scheduler = Scheduler::new(host.clone(), args.config());
  let mut rng = ChaCha8Rng::seed_from_u64(args.seed.unwrap_or_else(rand::random));
  let (step, threshold, trace) = (args.step, args.threshold, args.trace);
  let x = scheduler.avar(args.start);
  let chain = x.until(move |val| {
    *val += step.unwrap_or_else(|| rng.gen::<f64>());
    if trace {
      println!("{val}");
    }
    *val > threshold
  });
  if let Err(e) = chain.and_then(|x| x.print()) {
    eprintln!("{e}");
    return ExitCode::FAILURE;
  }
  host.run();
  match x.state() {
    TerminalState::Failed => ExitCode::FAILURE,
    _ => ExitCode::SUCCESS,
  }
}
