//! Assembly error taxonomy.
//!
//! All variants are local to one build attempt. A failed build means "skip
//! this draw" for the caller, never a reason to abort the render session.
//! Contract violations (a processor using a capability it did not declare)
//! are debug-only assertions, not error values, and key instability is a
//! design invariant enforced by tests.

use thiserror::Error;

use crate::stage::Stage;

#[derive(Debug, Error)]
pub enum AssemblyError {
    /// The pipeline's accumulated texture count reached the per-stage
    /// maximum. Raised before any backend call; the caller should skip or
    /// degrade the draw.
    #[error("pipeline requires {required} texture units but the context supports at most {max}")]
    CapacityExceeded { required: usize, max: usize },

    /// The backend rejected a generated shader.
    #[error("{stage} shader failed to compile: {log}")]
    CompileFailure { stage: Stage, log: String },

    /// The backend rejected the linked program.
    #[error("program failed to link: {log}")]
    LinkFailure { log: String },
}
