//! Failure diagnosis
//!
//! Heuristic, advisory classification of responses and rendered pages into
//! a [`Diagnosis`] with a recommended [`NextStep`].

mod classifier;
pub mod markers;

pub use classifier::{
    diagnose_fetch, diagnose_rendered_dom, diagnose_response, Diagnosis, DiagnosisLabel, NextStep,
    MIN_PLAUSIBLE_BODY,
};
