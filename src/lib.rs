//! Fixed-timestep invaders simulation exposed as a reinforcement-learning
//! environment, with an experience-replay Q-learner that plays it.
//!
//! Terminal I/O lives in the binary; everything here is pure game and
//! learning logic.

pub mod agent;
pub mod compute;
pub mod config;
pub mod constants;
pub mod entities;
pub mod env;
pub mod error;
pub mod orchestrator;
pub mod persistence;
pub mod replay;

pub use error::{Error, Result};
