//! Upstream stream multiplexing.
//!
//! Each stream id has at most one upstream fetch. The [`upstream`] task
//! writes chunks into a [`buffer::StreamBuffer`] ring and every viewer gets
//! its own [`dispatcher`] task copying from the ring into a bounded queue.
//! The [`manager::Manager`] owns the stream table and decides when a
//! stream starts and stops.

pub mod buffer;
pub mod config;
pub(crate) mod dispatcher;
pub mod manager;
pub mod session;
pub(crate) mod upstream;

pub use manager::{Manager, StreamHandle, StreamRequest, Subscription, TeardownReason};
