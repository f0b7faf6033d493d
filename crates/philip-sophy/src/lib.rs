//! Core library for the Philip & Sophy reading-club program.
//!
//! The matching module holds everything that decides which profile-books a
//! participant sees on a given day: submission-window date math, the daily
//! question schedule, roster validation, the matching engine itself, and the
//! cohort unlock policy. Storage is abstracted behind [`matching::store::DocumentStore`]
//! so the whole pipeline can run against in-memory collaborators in tests.

pub mod config;
pub mod error;
pub mod matching;
pub mod telemetry;
