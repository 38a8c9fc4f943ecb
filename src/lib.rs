//! Bounded local job runner and remote task waiter.
//!
//! [`local::LocalJobRunner`] runs independent units of work on a worker pool
//! of fixed size and hands back their output and errors once they finish.
//! [`remote::RemoteTaskWaiter`] polls server-side tasks until each reaches a
//! terminal state, estimating the time left and retrying through
//! communication failures.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod local;
pub mod remote;
pub mod ui;

pub use error::JobyardError;
