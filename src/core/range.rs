// Copyright 2025 The parloop authors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Strided iteration ranges and their partitioning into contiguous,
//! non-overlapping sub-ranges.

use crate::error::{Error, Result};

/// A half-open, strided iteration domain `[begin, end)` plus a partitioning
/// granularity hint.
///
/// The step is always strictly positive. Callers that want reverse iteration
/// encode it inside the task body (e.g. writing rows at `height - y`), never
/// as a negative step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopRange {
    begin: i64,
    end: i64,
    step: i64,
    min_iter_per_task: i64,
}

/// A contiguous, step-aligned sub-range of a [`LoopRange`], assigned to
/// exactly one task instance.
///
/// Partitions produced by [`LoopRange::partitions`] are non-overlapping and
/// their union, walked by `step`, reconstructs the original range exactly
/// once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopPartition {
    /// First index of the sub-range.
    pub begin: i64,
    /// Exclusive upper bound of the sub-range.
    pub end: i64,
    /// Stride between consecutive indices.
    pub step: i64,
}

impl LoopRange {
    /// Creates a new loop range.
    ///
    /// Returns [`Error::InvalidStep`] if `step` is not strictly positive, and
    /// [`Error::InvalidMinIterations`] if `min_iter_per_task` is not strictly
    /// positive. `end <= begin` is legal and denotes an empty range.
    pub fn new(begin: i64, end: i64, step: i64, min_iter_per_task: i64) -> Result<Self> {
        if step <= 0 {
            return Err(Error::InvalidStep(step));
        }
        if min_iter_per_task <= 0 {
            return Err(Error::InvalidMinIterations(min_iter_per_task));
        }
        Ok(Self {
            begin,
            end,
            step,
            min_iter_per_task,
        })
    }

    /// First index of the range.
    pub fn begin(&self) -> i64 {
        self.begin
    }

    /// Exclusive upper bound of the range.
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Stride between consecutive indices. Always positive.
    pub fn step(&self) -> i64 {
        self.step
    }

    /// Minimum number of iterations worth assigning to one partition.
    pub fn min_iter_per_task(&self) -> i64 {
        self.min_iter_per_task
    }

    /// Number of whole steps that fit in the range, used for partition
    /// sizing. The truncating division can undercount the walked indices by
    /// one when the range length isn't a multiple of the step; the last
    /// partition absorbs the difference.
    fn iteration_count(&self) -> i64 {
        if self.end <= self.begin {
            0
        } else {
            (self.end - self.begin) / self.step
        }
    }

    /// The exact exclusive boundary reached after walking the full range by
    /// `step`, independent of how many partitions were used.
    ///
    /// For a non-empty range this satisfies
    /// `ending_index() - step < end <= ending_index()`. An empty range
    /// reports `begin`.
    pub fn ending_index(&self) -> i64 {
        if self.end <= self.begin {
            return self.begin;
        }
        self.begin + ((self.end - self.begin + self.step - 1) / self.step) * self.step
    }

    /// Computes how many partitions a dispatch over this range should use,
    /// given the pool's thread count.
    ///
    /// Never exceeds `num_threads`, and never makes a partition smaller than
    /// the configured minimum granularity unless the whole range is smaller
    /// than that minimum (in which case exactly one partition is used).
    pub fn optimal_task_count(&self, num_threads: usize) -> usize {
        if num_threads == 1 {
            return 1;
        }
        let max_task_count = (self.iteration_count() / self.min_iter_per_task).max(1);
        num_threads.min(max_task_count as usize)
    }

    /// Splits the range into `count` contiguous, step-aligned partitions.
    ///
    /// Every partition gets `iteration_count / count` whole steps except the
    /// last one, which runs through `end` and absorbs the remainder.
    pub fn partitions(&self, count: usize) -> Vec<LoopPartition> {
        assert!(count >= 1, "partition count must be at least 1");
        let iter_per_task = self.iteration_count() / count as i64;

        let mut parts = Vec::with_capacity(count);
        let mut begin2 = self.begin;
        for i in 0..count {
            let end2 = if i == count - 1 {
                self.end
            } else {
                begin2 + iter_per_task * self.step
            };
            parts.push(LoopPartition {
                begin: begin2,
                end: end2,
                step: self.step,
            });
            begin2 = end2;
        }
        parts
    }
}
