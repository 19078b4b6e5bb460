//! # shadow-simulator
//!
//! Signal producers for the vehicle shadow.
//!
//! This crate provides:
//! - [`Producer`]: unlocked writes into the store, plus vehicle-level helpers
//! - [`DriveSimulator`]: synthetic driving telemetry, one frame per tick
//! - [`run_demo`]: periodic loop feeding simulator frames to the store

pub mod drive;
pub mod producer;

pub use drive::{run_demo, DriveSimulator, Frame};
pub use producer::{vehicle, Producer};
