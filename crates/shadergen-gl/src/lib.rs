//! OpenGL backend bridge for `shadergen-core`.
//!
//! [`GlBackend`] implements the compile/link/bind contract over the raw GL
//! bindings, and [`ProgramCache`] is the shared key→program store that
//! deduplicates compiled programs across builds.
//!
//! ### Warning
//!
//! This crate assumes the embedder keeps a valid OpenGL context current on
//! the calling thread for every backend call.

pub mod backend;
pub mod cache;

pub use backend::{apply_texture_swizzle, GlBackend};
pub use cache::{ProgramCache, DEFAULT_PROGRAM_BUDGET};
