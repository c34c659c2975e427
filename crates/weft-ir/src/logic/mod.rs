//! Typed edits applied to an emitted graph.

pub mod patch;
pub use patch::{PatchInstruction, PatchOutcome, apply_patches};
