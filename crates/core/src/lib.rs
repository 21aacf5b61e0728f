//! Signal path and round engine for the eqtrain ear-training exercise
//!
//! The `domain` module holds everything that does not touch the operating
//! system: settings, DSP, sources, the signal chain and the game state machine.
//! Device and file-format integrations live in `eqtrain-infra`.

pub mod domain;
