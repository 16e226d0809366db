//! Shader resource bookkeeping: visibility masks, append-only handles,
//! and texture channel-swizzle metadata.

use std::ops::{BitOr, BitOrAssign};

use crate::caps::GlslCaps;
use crate::glsl::{ShaderVar, SlType};

/// Bitmask of shader stages a resource is visible in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility(u8);

impl Visibility {
    pub const NONE: Visibility = Visibility(0);
    pub const VERTEX: Visibility = Visibility(0x1);
    pub const GEOMETRY: Visibility = Visibility(0x2);
    pub const FRAGMENT: Visibility = Visibility(0x4);

    pub fn intersects(self, other: Visibility) -> bool {
        self.0 & other.0 != 0
    }

    pub fn contains(self, other: Visibility) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Visibility {
    type Output = Visibility;
    fn bitor(self, rhs: Visibility) -> Visibility {
        Visibility(self.0 | rhs.0)
    }
}

impl BitOrAssign for Visibility {
    fn bitor_assign(&mut self, rhs: Visibility) {
        self.0 |= rhs.0;
    }
}

/// Append-only index into the program's uniform table. Handles are never
/// reused within one assembly pass and stay valid on the compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformHandle(pub(crate) usize);

impl UniformHandle {
    pub fn index(self) -> usize {
        self.0
    }

    /// Handle for the `index`-th entry of a program's uniform table. Useful
    /// when walking the resource table rather than holding on to handles
    /// from declaration time.
    pub fn from_index(index: usize) -> Self {
        UniformHandle(index)
    }
}

/// One declared uniform: its variable and the stages it is visible in.
#[derive(Debug, Clone)]
pub struct UniformInfo {
    pub var: ShaderVar,
    pub visibility: Visibility,
}

/// The generated producer/consumer names of a varying. With a geometry stage
/// active `fs_in` is the geometry-stage output, not the vertex output.
#[derive(Debug, Clone)]
pub struct VaryingNames {
    pub vs_out: String,
    pub fs_in: String,
}

/// Storage format of a sampled texture, as far as shading cares: whether the
/// format carries color channels or only alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
    Alpha8,
}

impl PixelFormat {
    pub fn is_alpha_only(self) -> bool {
        matches!(self, PixelFormat::Alpha8)
    }
}

/// A texture channel, for tex-parameter swizzles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    R,
    G,
    B,
    A,
}

/// The tex-parameter swizzle to apply when creating a texture of `format`.
/// Preferred over shader-side remapping because it keeps generated code (and
/// therefore cached programs) format-independent.
pub fn tex_param_swizzle(format: PixelFormat, caps: &GlslCaps) -> [Channel; 4] {
    if caps.texture_swizzle_support && format.is_alpha_only() {
        if caps.texture_red_support {
            [Channel::R, Channel::R, Channel::R, Channel::R]
        } else {
            [Channel::A, Channel::A, Channel::A, Channel::A]
        }
    } else {
        [Channel::R, Channel::G, Channel::B, Channel::A]
    }
}

/// Whether sampling `format` needs a shader-side channel remap, i.e. the
/// remap could not be pushed into tex parameters. Code shape depends on this,
/// so it participates in the program key.
pub fn swizzle_requires_alpha_remapping(format: PixelFormat, caps: &GlslCaps) -> bool {
    !caps.texture_swizzle_support && format.is_alpha_only()
}

/// The swizzle suffix lookups must apply for `format`. Alpha-only formats
/// smear their one channel across all four components.
pub fn shader_swizzle(format: PixelFormat, caps: &GlslCaps) -> &'static str {
    if swizzle_requires_alpha_remapping(format, caps) {
        if caps.texture_red_support {
            "rrrr"
        } else {
            "aaaa"
        }
    } else {
        "rgba"
    }
}

/// A declared sampler uniform plus the swizzle its lookups must apply.
#[derive(Debug, Clone)]
pub struct SamplerRef {
    pub uniform: UniformHandle,
    pub name: String,
    pub swizzle: &'static str,
}

/// Sampler entry in the assembled program's resource table; texture units are
/// assigned in declaration order.
#[derive(Debug, Clone)]
pub struct SamplerBinding {
    pub uniform: UniformHandle,
    pub format: PixelFormat,
}

/// One processor-owned vertex attribute, identified by the source attribute
/// index the caller's vertex layout uses.
#[derive(Debug, Clone)]
pub struct AttributePair {
    pub index: usize,
    pub name: String,
}

/// An attribute declaration owned by the primitive processor.
#[derive(Debug, Clone, Copy)]
pub struct Attribute {
    pub name: &'static str,
    pub ty: SlType,
}
