//! Thread-affine asynchronous observer notification.
//!
//! See [`notifications`] for the notifier API and [`signal`] for the event
//! signal the background dispatch loop parks on.

pub mod cli;
pub mod config;
pub mod demo;
pub mod logging;
pub mod notifications;
pub mod signal;
