// Copyright 2025 The parloop authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Core engine: synchronization primitives, thread pool and loop dispatcher.

mod dispatch;
mod range;
mod sync;
mod thread_pool;

pub use dispatch::{LoopDispatcher, LoopTask};
pub use range::{LoopPartition, LoopRange};
pub use sync::{Event, EventMode, FifoCondvar};
pub use thread_pool::{CpuPinningPolicy, ThreadCount, ThreadPool, ThreadPoolBuilder};
