// Copyright 2025 The parloop authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![doc = include_str!("../README.md")]
#![forbid(missing_docs, unsafe_code)]

mod core;
mod error;
mod macros;

pub use crate::core::{
    CpuPinningPolicy, Event, EventMode, FifoCondvar, LoopDispatcher, LoopPartition, LoopRange,
    LoopTask, ThreadCount, ThreadPool, ThreadPoolBuilder,
};
pub use crate::error::{Error, Result};
