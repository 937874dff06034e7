//! # Session Progress Tracker
//!
//! Client-side tracking of resource and conversation sessions.
//!
//! ## Features
//!
//! - Polling scheduler with an in-flight guard and stale-while-revalidate results
//! - Progress accumulator with bounded percentage and one-shot completion
//! - Remote sync buffer that flushes on a coarser cadence than local ticks
//! - REST client for saving progress and polling conversation messages

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod poller;
pub mod progress;
pub mod sync;
pub mod tracker;

pub use client::ProgressApi;
pub use config::{ApiConfig, AppConfig, PollConfig, TrackerConfig};
pub use error::TrackerError;
pub use poller::{Fetcher, PollingScheduler};
pub use progress::{ProgressSnapshot, SessionId, SessionPhase};
pub use sync::{ProgressStore, ProgressUpdate};
pub use tracker::SessionTracker;
