//! # nthread-core
//!
//! Safe building blocks for the native thread abstraction.
//!
//! This crate holds everything that can be decided without touching the
//! operating system: the thread lifecycle state machine and its transition
//! planners, the held-lock errno contract, the error taxonomy and the runtime
//! configuration. The `nthread-native` crate applies these decisions to real
//! pthread objects. No `unsafe` code is permitted here.

#![deny(unsafe_code)]

pub mod config;
pub mod errno;
pub mod error;
pub mod lifecycle;
pub mod mutex;

pub use config::{CancelMode, cancel_mode, mutex_kind};
pub use error::{NativeOp, ThreadError};
pub use lifecycle::{
    Disposition, ExitKind, JoinStep, NativeSlot, Observation, TerminateStep, ThreadState,
};
pub use mutex::MutexKind;
