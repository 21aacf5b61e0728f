//! Eqtrain infrastructure layer
//!
//! Device and file adapters for the ports defined in `eqtrain-core`.

pub mod audio;

pub use audio::{CpalEnumerator, CpalOutput, SymphoniaLoader};
