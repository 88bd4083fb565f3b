#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Primitive types and utilities for the opseq block confirmation pipeline.

/// Engine API data model: payload statuses, attributes, envelopes and seal responses.
pub mod engine;

/// Structural checks run on a payload before it may become canonical.
pub mod payload;

/// Utility for summarizing objects into a string for logging purposes.
pub mod summary;

/// Utilities for tasks scoped to their caller.
pub mod task;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use alloy_rpc_types_engine::{ExecutionPayloadV3, ForkchoiceState, PayloadId};
