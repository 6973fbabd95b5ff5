//! Build execution for laneci.
//!
//! This crate provides:
//! - [`OutputPublisher`], ordered fan-out of build output rows
//! - [`BuildRunner`], the `pending -> running -> success | failure` state machine
//! - [`CommandLaneEngine`], a lane engine that drives a subprocess

pub mod error;
pub mod publisher;
pub mod runner;
pub mod shell;

pub use error::{RunnerError, RunnerResult};
pub use publisher::OutputPublisher;
pub use runner::BuildRunner;
pub use shell::CommandLaneEngine;
