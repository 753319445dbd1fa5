//! # Gleaner Core
//!
//! Core types, traits, and error definitions for the Gleaner ingestion
//! pipeline. This crate provides the foundational abstractions used across
//! all layers: candidate items, fingerprinting, identifiers, and the
//! unified error type.

pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod id;
pub mod telemetry;

pub use domain::*;
pub use error::*;
pub use fingerprint::*;
pub use id::*;
pub use telemetry::*;
