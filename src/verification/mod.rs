//! Verification module
//!
//! The staged citizen flow and the rule that turns its scores into a decision.

pub mod decision;
pub mod outcome;
pub mod pipeline;

pub use decision::Decision;
pub use outcome::{Amendment, Outcome};
pub use pipeline::{SessionView, VerificationPipeline, VerificationServices};
