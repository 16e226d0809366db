//! Capability snapshot consulted during assembly.
//!
//! Captured once at context initialization and treated as immutable from
//! then on; concurrent assembler instances may share one snapshot freely.
//! Probing the driver to fill it in is the embedder's job.

use crate::glsl::GlslGeneration;

/// Which flavor of framebuffer fetch the context exposes, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FbFetchType {
    None,
    /// `GL_EXT_shader_framebuffer_fetch`
    Ext,
    /// `GL_NV_shader_framebuffer_fetch`
    Nv,
}

/// Origin convention of a surface's device space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceOrigin {
    TopLeft,
    BottomLeft,
}

/// Snapshot of everything the assembler needs to know about the context.
#[derive(Debug, Clone)]
pub struct GlslCaps {
    pub generation: GlslGeneration,
    /// ES 2.0 context: version 100 shaders, mandatory precision qualifiers.
    pub es2: bool,
    /// Per-stage sampler budget; assembly is rejected when a pipeline's
    /// accumulated texture count reaches this.
    pub max_fragment_texture_units: usize,
    /// Whether uniform locations can be assigned explicitly before linking.
    pub bind_uniform_location_support: bool,
    pub fb_fetch: FbFetchType,
    /// `GL_ARB_fragment_coord_conventions` (or core equivalent) available.
    pub frag_coord_conventions_support: bool,
    pub shader_derivative_support: bool,
    pub geometry_shader_support: bool,
    /// Texture-unit swizzling via tex parameters. When absent, alpha-only
    /// formats are remapped in shader code instead.
    pub texture_swizzle_support: bool,
    /// R8 is a legal alpha-only storage format (reads smear `.r`).
    pub texture_red_support: bool,
}

impl GlslCaps {
    /// `gl_FragColor` is unavailable from 1.30 on; a fragment output variable
    /// must be declared instead.
    pub fn must_declare_fragment_output(&self) -> bool {
        self.generation >= GlslGeneration::V130
    }
}

impl Default for GlslCaps {
    /// A desktop GL 3.x-ish snapshot, the common case in tests and demos.
    fn default() -> Self {
        Self {
            generation: GlslGeneration::V140,
            es2: false,
            max_fragment_texture_units: 8,
            bind_uniform_location_support: false,
            fb_fetch: FbFetchType::None,
            frag_coord_conventions_support: true,
            shader_derivative_support: true,
            geometry_shader_support: true,
            texture_swizzle_support: true,
            texture_red_support: true,
        }
    }
}
