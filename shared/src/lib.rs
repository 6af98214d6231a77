//! # MicroSat Bus Shared Library
//!
//! Shared types and utilities for the MicroSat bus flight software:
//! the core error taxonomy, 3D vector math used by attitude control,
//! monotonic-time helpers, and the packed telemetry encodings that form
//! part of the ground contract.
//!
//! The crate is `no_std`-capable (disable the default `std` feature) so
//! the same types serve flight targets and host-side tooling.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(trivial_casts, trivial_numeric_casts)]
#![warn(unused_qualifications)]

pub mod error;
pub mod math;
pub mod telemetry;
pub mod time;

// Re-export commonly used types
pub use error::{FswError, Result};
pub use math::Vec3;
pub use telemetry::{AdcsTelemetry, DeploymentTelemetry};
