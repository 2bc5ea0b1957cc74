//! Content-refresh pipeline for the gift-ideas site.
//!
//! Ties together post selection, prompt composition, generation, and
//! validated publishing into a single run (see [`pipeline::run`]).

pub mod pipeline;
pub mod prompt;
pub mod publisher;
pub mod selector;
