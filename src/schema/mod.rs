//! Inbound batch schema
//!
//! This module defines the accepted request shapes for heart-rate and step
//! batches and the validator that turns them into raw samples.

mod adapter;
mod payload;

pub use adapter::*;
pub use payload::*;
