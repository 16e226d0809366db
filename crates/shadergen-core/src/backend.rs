//! The backend bridge contract and the finalize step that drives it.
//!
//! The assembler never touches the graphics API itself; [`finalize`] walks an
//! [`AssembledProgram`] through an object-safe [`ProgramBackend`]. Any
//! compile or link failure fails the whole attempt and every shader object
//! created during it is deleted; a partially-usable program is never
//! returned.

use tracing::{debug, error, trace};

use crate::builder::{
    AssembledProgram, BuiltinHandles, PRIMARY_COLOR_OUTPUT_NAME, SECONDARY_COLOR_OUTPUT_NAME,
};
use crate::caps::GlslCaps;
use crate::error::AssemblyError;
use crate::resources::UniformHandle;
use crate::stage::Stage;

/// Backend shader object handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);

/// Backend program object handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// The compile/link/bind surface a backend must provide. Error strings are
/// the backend's own diagnostics logs.
pub trait ProgramBackend {
    fn create_program(&mut self) -> Option<ProgramId>;

    fn compile_shader(&mut self, stage: Stage, source: &str) -> Result<ShaderId, String>;

    /// Pre-link explicit attribute binding.
    fn bind_attrib_location(&mut self, program: ProgramId, index: u32, name: &str);

    /// Pre-link explicit uniform binding. Only called when the capability
    /// snapshot reports support.
    fn bind_uniform_location(&mut self, program: ProgramId, location: i32, name: &str);

    /// Pre-link fragment output binding (`color_number`, dual-source
    /// `index`). Only called when the program declares custom outputs.
    fn bind_fragment_data_location(
        &mut self,
        program: ProgramId,
        color_number: u32,
        index: u32,
        name: &str,
    );

    fn link_program(&mut self, program: ProgramId, shaders: &[ShaderId]) -> Result<(), String>;

    /// Post-link location query by mangled name.
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<i32>;

    fn delete_shader(&mut self, shader: ShaderId);

    fn delete_program(&mut self, program: ProgramId);
}

/// A linked program with its resolved location table and builtin handles.
/// The only artifact, together with the key, that outlives an assembly pass.
#[derive(Debug)]
pub struct CompiledProgram {
    pub program: ProgramId,
    locations: Vec<i32>,
    pub builtin: BuiltinHandles,
}

impl CompiledProgram {
    /// Resolved location of a declared uniform; `-1` when the linker
    /// discarded it.
    pub fn uniform_location(&self, handle: UniformHandle) -> i32 {
        self.locations.get(handle.index()).copied().unwrap_or(-1)
    }
}

/// Compile, bind, link, and resolve locations for `assembled`.
pub fn finalize(
    assembled: &AssembledProgram,
    caps: &GlslCaps,
    backend: &mut dyn ProgramBackend,
) -> Result<CompiledProgram, AssemblyError> {
    let program = match backend.create_program() {
        Some(id) => id,
        None => {
            return Err(AssemblyError::LinkFailure {
                log: "could not create a program object".to_string(),
            })
        }
    };

    let mut shaders: Vec<ShaderId> = Vec::with_capacity(3);
    let mut stages: Vec<(Stage, &str)> = vec![(Stage::Vertex, assembled.vertex.as_str())];
    if let Some(geometry) = &assembled.geometry {
        stages.push((Stage::Geometry, geometry.as_str()));
    }
    stages.push((Stage::Fragment, assembled.fragment.as_str()));

    for (stage, source) in stages {
        match backend.compile_shader(stage, source) {
            Ok(id) => shaders.push(id),
            Err(log) => {
                error!(%stage, log = %log, "shader failed to compile");
                if cfg!(debug_assertions) {
                    debug!(%stage, source = %source, "rejected shader source");
                }
                cleanup(backend, program, &shaders);
                return Err(AssemblyError::CompileFailure { stage, log });
            }
        }
    }

    for (index, name) in assembled.attributes.iter().enumerate() {
        backend.bind_attrib_location(program, index as u32, name);
    }
    if caps.bind_uniform_location_support {
        for (index, uniform) in assembled.uniforms.iter().enumerate() {
            backend.bind_uniform_location(program, index as i32, &uniform.var.name);
        }
    }
    if assembled.has_custom_output {
        backend.bind_fragment_data_location(program, 0, 0, PRIMARY_COLOR_OUTPUT_NAME);
    }
    if assembled.has_secondary_output && caps.must_declare_fragment_output() {
        backend.bind_fragment_data_location(program, 0, 1, SECONDARY_COLOR_OUTPUT_NAME);
    }

    if let Err(log) = backend.link_program(program, &shaders) {
        error!(log = %log, "program failed to link");
        cleanup(backend, program, &shaders);
        return Err(AssemblyError::LinkFailure { log });
    }

    let locations: Vec<i32> = if caps.bind_uniform_location_support {
        (0..assembled.uniforms.len() as i32).collect()
    } else {
        assembled
            .uniforms
            .iter()
            .map(|u| backend.uniform_location(program, &u.var.name).unwrap_or(-1))
            .collect()
    };

    for shader in shaders {
        backend.delete_shader(shader);
    }
    trace!(program = program.0, "program finalized");

    Ok(CompiledProgram {
        program,
        locations,
        builtin: assembled.builtin.clone(),
    })
}

fn cleanup(backend: &mut dyn ProgramBackend, program: ProgramId, shaders: &[ShaderId]) {
    backend.delete_program(program);
    for shader in shaders {
        backend.delete_shader(*shader);
    }
}
