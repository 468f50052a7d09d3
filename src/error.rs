// Copyright 2025 The parloop authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types for loop configuration and pool lifecycle misuse.
//!
//! These are all programming errors that the caller can check for. Anything
//! environmental (a poisoned lock, a worker thread panicking) is treated as
//! fatal and panics instead of surfacing here.

/// Errors returned by loop-range configuration and pool lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The loop step must be strictly positive. Reverse iteration is a
    /// task-body concern, never encoded as a negative step.
    #[error("loop step must be positive, got {0}")]
    InvalidStep(i64),

    /// The minimum number of iterations per partition must be strictly
    /// positive.
    #[error("minimum iterations per partition must be positive, got {0}")]
    InvalidMinIterations(i64),

    /// [`dispatch()`](crate::LoopDispatcher::dispatch) was called before a
    /// loop range was configured.
    #[error("no loop range configured for this dispatcher")]
    RangeNotSet,

    /// The thread pool was already joined; no further tasks can be enqueued
    /// and it cannot be joined again.
    #[error("thread pool was already joined")]
    PoolJoined,
}

/// A specialized [`Result`](std::result::Result) type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
