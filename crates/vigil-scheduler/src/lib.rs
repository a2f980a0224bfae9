//! vigil-scheduler: adaptive check scheduling for Vigil.
//!
//! Decides which services are due and how long the agent may sleep in
//! between, then runs due checks as a concurrent batch.
//!
//! # Scheduling Algorithm
//!
//! ```text
//! effective_period = max(period * 0.8 - lag * 3.0, 0)
//! due_in(now)      = 0                                        if never checked
//!                  = max(effective_period - (now - last_checked), 0)
//!
//! sleep_time(now)  = min(due_in(now)) over all services
//!
//! check_pass(now):
//!     max_lag  = max(lag)
//!     selected = services with due_in(now) <= max_lag
//!     run selected concurrently, store each lag, last_checked = now
//!     return (max(period) over selected, results)
//! ```
//!
//! A slow check shrinks its own interval three times as fast as it lags,
//! and the slowest check widens the window so services due close together
//! are checked in one batch.

pub mod error;
pub mod monitor;
pub mod service;

pub use error::{SchedulerError, SchedulerResult};
pub use monitor::{CheckPass, ServicesMonitor};
pub use service::Service;
