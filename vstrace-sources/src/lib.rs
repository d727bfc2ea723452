//! Per-vendor webhook validators and decoders.
//!
//! Each adapter module pairs a payload validator with a decoder producing
//! a [`vstrace_api::Event`]; `vstrace-server` wires one HTTP route per
//! adapter and hands the decoded event to `vstrace_sdk::pipeline::dispatch`.

pub mod customhttp;
pub mod github;
pub mod gitlab;
pub mod jenkins;
pub mod jiracloud;
pub mod parent_id;
pub mod validate;

pub use parent_id::find_parent_id;
