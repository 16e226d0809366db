//! Raw OpenGL implementation of the program backend.

use std::ffi::CString;

use gl::types::{GLchar, GLenum, GLint, GLuint};
use tracing::trace;

use shadergen_core::backend::{ProgramBackend, ProgramId, ShaderId};
use shadergen_core::caps::GlslCaps;
use shadergen_core::resources::{tex_param_swizzle, Channel, PixelFormat};
use shadergen_core::stage::Stage;

/// Program backend over the raw GL bindings.
///
/// Assumes the caller has made the correct OpenGL context current; all calls
/// happen synchronously on the calling thread. Pre-link uniform binding is
/// not available through core GL, so capability snapshots used with this
/// backend must leave `bind_uniform_location_support` off.
#[derive(Debug, Default)]
pub struct GlBackend;

impl GlBackend {
    pub fn new() -> Self {
        Self
    }
}

fn stage_target(stage: Stage) -> GLenum {
    match stage {
        Stage::Vertex => gl::VERTEX_SHADER,
        Stage::Geometry => gl::GEOMETRY_SHADER,
        Stage::Fragment => gl::FRAGMENT_SHADER,
    }
}

/// Fetch a shader's info log after a failed compile.
unsafe fn shader_info_log(shader: GLuint) -> String {
    let mut len: GLint = 0;
    gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len);
    if len <= 0 {
        return String::new();
    }
    let mut buf = vec![0u8; len as usize];
    let mut written: GLint = 0;
    gl::GetShaderInfoLog(shader, len, &mut written, buf.as_mut_ptr() as *mut GLchar);
    buf.truncate(written.max(0) as usize);
    String::from_utf8_lossy(&buf).into_owned()
}

/// Fetch a program's info log after a failed link.
unsafe fn program_info_log(program: GLuint) -> String {
    let mut len: GLint = 0;
    gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut len);
    if len <= 0 {
        return String::new();
    }
    let mut buf = vec![0u8; len as usize];
    let mut written: GLint = 0;
    gl::GetProgramInfoLog(program, len, &mut written, buf.as_mut_ptr() as *mut GLchar);
    buf.truncate(written.max(0) as usize);
    String::from_utf8_lossy(&buf).into_owned()
}

impl ProgramBackend for GlBackend {
    fn create_program(&mut self) -> Option<ProgramId> {
        let id = unsafe { gl::CreateProgram() };
        (id != 0).then_some(ProgramId(id))
    }

    fn compile_shader(&mut self, stage: Stage, source: &str) -> Result<ShaderId, String> {
        unsafe {
            let shader = gl::CreateShader(stage_target(stage));
            if shader == 0 {
                return Err("glCreateShader returned 0".to_string());
            }
            let ptr = source.as_ptr() as *const GLchar;
            let len = source.len() as GLint;
            gl::ShaderSource(shader, 1, &ptr, &len);
            gl::CompileShader(shader);

            let mut compiled: GLint = 0;
            gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut compiled);
            if compiled == 0 {
                let log = shader_info_log(shader);
                gl::DeleteShader(shader);
                return Err(log);
            }
            trace!(%stage, shader, "shader compiled");
            Ok(ShaderId(shader))
        }
    }

    fn bind_attrib_location(&mut self, program: ProgramId, index: u32, name: &str) {
        if let Ok(name) = CString::new(name) {
            unsafe {
                gl::BindAttribLocation(program.0, index, name.as_ptr());
            }
        }
    }

    fn bind_uniform_location(&mut self, _program: ProgramId, _location: i32, _name: &str) {
        // Explicit pre-link uniform binding is an extension core GL lacks;
        // snapshots used with this backend must not claim support for it.
        debug_assert!(false, "pre-link uniform binding is unavailable on the GL backend");
    }

    fn bind_fragment_data_location(
        &mut self,
        program: ProgramId,
        color_number: u32,
        index: u32,
        name: &str,
    ) {
        if let Ok(name) = CString::new(name) {
            unsafe {
                gl::BindFragDataLocationIndexed(program.0, color_number, index, name.as_ptr());
            }
        }
    }

    fn link_program(&mut self, program: ProgramId, shaders: &[ShaderId]) -> Result<(), String> {
        unsafe {
            for shader in shaders {
                gl::AttachShader(program.0, shader.0);
            }
            gl::LinkProgram(program.0);

            let mut linked: GLint = 0;
            gl::GetProgramiv(program.0, gl::LINK_STATUS, &mut linked);
            if linked == 0 {
                return Err(program_info_log(program.0));
            }
        }
        trace!(program = program.0, "program linked");
        Ok(())
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<i32> {
        let name = CString::new(name).ok()?;
        let location = unsafe { gl::GetUniformLocation(program.0, name.as_ptr()) };
        (location >= 0).then_some(location)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        unsafe {
            gl::DeleteShader(shader.0);
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        unsafe {
            gl::DeleteProgram(program.0);
        }
    }
}

fn channel_enum(channel: Channel) -> GLint {
    (match channel {
        Channel::R => gl::RED,
        Channel::G => gl::GREEN,
        Channel::B => gl::BLUE,
        Channel::A => gl::ALPHA,
    }) as GLint
}

/// Apply the tex-parameter swizzle for `format` to the currently bound 2D
/// texture, so alpha-only formats read back smeared without shader-side
/// remapping.
///
/// # Safety
///
/// Must be called with a valid OpenGL context current and a texture bound to
/// `GL_TEXTURE_2D`.
pub unsafe fn apply_texture_swizzle(format: PixelFormat, caps: &GlslCaps) {
    let swizzle = tex_param_swizzle(format, caps);
    let values: [GLint; 4] = [
        channel_enum(swizzle[0]),
        channel_enum(swizzle[1]),
        channel_enum(swizzle[2]),
        channel_enum(swizzle[3]),
    ];
    gl::TexParameteriv(
        gl::TEXTURE_2D,
        gl::TEXTURE_SWIZZLE_RGBA,
        values.as_ptr(),
    );
}
