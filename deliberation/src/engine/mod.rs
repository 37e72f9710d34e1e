//! Round orchestration.

mod orchestrator;
mod result;
mod state;

pub use orchestrator::DeliberationEngine;
pub use result::{DeliberationResult, Termination};
pub use state::{RoundLog, RoundTrace};
