//! pidwatch daemon: lists and terminates host processes on behalf of an
//! automation agent.
//!
//! A list request validates its arguments, primes per-process CPU baselines,
//! waits out the sampling window, enumerates again and normalizes each
//! process into a [`record::ProcessRecord`] before filtering, sorting and
//! truncating. A kill request refuses the daemon's own pid, sends a forceful
//! signal and waits a bounded time for the target to exit.

pub mod collector;
pub mod config;
pub mod error;
pub mod executor;
pub mod filter;
pub mod memory;
pub mod protocol;
pub mod record;
pub mod sampler;
pub mod socket;
pub mod tools;

pub use error::{Error, Result};
