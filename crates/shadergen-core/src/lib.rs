//! Runtime GLSL program assembly.
//!
//! This crate builds complete shader programs (vertex, optional geometry,
//! and fragment source text) from a declarative pipeline of pluggable
//! processors, manages the shared resource namespace across them without
//! name collisions, derives a structural cache key so functionally-identical
//! pipelines can reuse a compiled program, and hides platform differences
//! (uniform binding strategy, framebuffer fetch, fragment-coordinate origin)
//! behind one emission contract.
//!
//! # Overview
//!
//! - [`GlslCaps`] is the immutable capability snapshot a build consults.
//! - [`PipelineDesc`] describes what to assemble: one primitive processor,
//!   ordered color and coverage fragment processors, one transfer processor.
//! - [`ProgramBuilder`] runs the single forward pass and doubles as the
//!   emission context handed to every processor's `emit_code`.
//! - [`ProgramKey`] captures the program's code shape for deduplication.
//! - [`ProgramBackend`] is the compile/link/bind contract; [`finalize`]
//!   drives it and returns a [`CompiledProgram`] with resolved locations.
//! - [`effects`] has stock processors covering the common draw shapes.
//!
//! Backend implementations live elsewhere (see the `shadergen-gl` crate);
//! [`testing::RecordingBackend`] stands in for one in tests.

pub mod backend;
pub mod builder;
pub mod caps;
pub mod effects;
pub mod error;
pub mod factory;
pub mod glsl;
pub mod key;
pub mod pipeline;
pub mod processor;
pub mod resources;
pub mod stage;
pub mod testing;

// Re-export primary types at crate root for convenience.
pub use backend::{finalize, CompiledProgram, ProgramBackend, ProgramId, ShaderId};
pub use builder::{AssembledProgram, BuiltinHandles, DeclaredReads, Feature, ProgramBuilder};
pub use caps::{FbFetchType, GlslCaps, SurfaceOrigin};
pub use error::AssemblyError;
pub use glsl::{GlslGeneration, Precision, ShaderVar, SlType};
pub use key::{build_key, ProgramKey};
pub use pipeline::{DrawTarget, DstCopyDesc, PipelineDesc};
pub use processor::{
    CoordTransform, FragmentProcessor, PrimitiveProcessor, Processor, TextureAccess,
    TransferProcessor, TransformSource,
};
pub use resources::{PixelFormat, SamplerRef, UniformHandle, Visibility};
pub use stage::Stage;
