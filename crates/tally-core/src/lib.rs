//! Core types and logic for Tally, the lab + lecture grade reconciler.
//!
//! Holds the domain types, the component normalizer, the overall-grade
//! aggregator, the [`store::GradeStore`] trait and the section ingest
//! pipeline. Deliberately free of database and runtime dependencies.

// Native `async fn` in traits with explicit `Send` futures, as in `store`.
#![allow(async_fn_in_trait)]

pub mod aggregate;
pub mod component;
pub mod error;
pub mod export;
pub mod grade;
pub mod ingest;
pub mod normalize;
pub mod section;
pub mod stats;
pub mod store;
pub mod student;
pub mod term;

pub use error::{Error, Result};
