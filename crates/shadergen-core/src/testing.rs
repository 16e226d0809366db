//! A scripted [`ProgramBackend`] double, so assembly and finalize logic can
//! be exercised without a live graphics context.

use std::collections::BTreeMap;

use crate::backend::{ProgramBackend, ProgramId, ShaderId};
use crate::stage::Stage;

/// Records every bridge call and hands out deterministic handles. Configure
/// `fail_compile` / `fail_link` to script failures.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_shader: u32,
    next_program: u32,
    next_location: i32,
    locations: BTreeMap<String, i32>,

    /// Make compilation of the given stage fail with a canned log.
    pub fail_compile: Option<Stage>,
    /// Make linking fail with a canned log.
    pub fail_link: bool,

    pub compiled: Vec<(Stage, String)>,
    pub linked: Vec<(ProgramId, Vec<ShaderId>)>,
    pub bound_attribs: Vec<(u32, String)>,
    pub bound_uniforms: Vec<(i32, String)>,
    pub bound_frag_data: Vec<(u32, u32, String)>,
    pub queried_uniforms: Vec<String>,
    pub deleted_shaders: Vec<ShaderId>,
    pub deleted_programs: Vec<ProgramId>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shader ids handed out so far.
    pub fn shader_count(&self) -> u32 {
        self.next_shader
    }
}

impl ProgramBackend for RecordingBackend {
    fn create_program(&mut self) -> Option<ProgramId> {
        self.next_program += 1;
        Some(ProgramId(self.next_program))
    }

    fn compile_shader(&mut self, stage: Stage, source: &str) -> Result<ShaderId, String> {
        if self.fail_compile == Some(stage) {
            return Err(format!("scripted {stage} compile failure"));
        }
        self.next_shader += 1;
        self.compiled.push((stage, source.to_string()));
        Ok(ShaderId(self.next_shader))
    }

    fn bind_attrib_location(&mut self, _program: ProgramId, index: u32, name: &str) {
        self.bound_attribs.push((index, name.to_string()));
    }

    fn bind_uniform_location(&mut self, _program: ProgramId, location: i32, name: &str) {
        self.bound_uniforms.push((location, name.to_string()));
    }

    fn bind_fragment_data_location(
        &mut self,
        _program: ProgramId,
        color_number: u32,
        index: u32,
        name: &str,
    ) {
        self.bound_frag_data
            .push((color_number, index, name.to_string()));
    }

    fn link_program(&mut self, program: ProgramId, shaders: &[ShaderId]) -> Result<(), String> {
        if self.fail_link {
            return Err("scripted link failure".to_string());
        }
        self.linked.push((program, shaders.to_vec()));
        Ok(())
    }

    fn uniform_location(&mut self, _program: ProgramId, name: &str) -> Option<i32> {
        self.queried_uniforms.push(name.to_string());
        let next = &mut self.next_location;
        let location = *self.locations.entry(name.to_string()).or_insert_with(|| {
            let assigned = *next;
            *next += 1;
            assigned
        });
        Some(location)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.deleted_shaders.push(shader);
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.deleted_programs.push(program);
    }
}
