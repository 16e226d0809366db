//! The capability interface every pluggable processor implements.
//!
//! A processor contributes a bounded block of shader code, a key describing
//! that code's shape, and declarations of the framework capabilities it will
//! use while emitting (destination-color read, fragment-position read).
//! Processors must be immutable once built: everything `gen_key` and
//! `emit_code` consult has to be fixed at construction time, or the program
//! cache will hand back stale programs.

use crate::builder::ProgramBuilder;
use crate::caps::GlslCaps;
use crate::glsl::SlType;
use crate::key::KeyBuilder;
use crate::resources::{Attribute, PixelFormat, SamplerRef};

/// A texture the processor samples. The format feeds swizzle metadata and
/// the program key.
#[derive(Debug, Clone, Copy)]
pub struct TextureAccess {
    pub format: PixelFormat,
}

/// Where a coordinate transform reads its source coordinates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformSource {
    Position,
    LocalCoords,
}

/// A coordinate transform a fragment processor asks the primitive processor
/// to compute. Only the primitive processor sees the vertex attribute layout,
/// so transforms are gathered up front and handed to it in one flat list.
#[derive(Debug, Clone, Copy)]
pub struct CoordTransform {
    /// `Vec2` for affine transforms, `Vec3` when a perspective divide is
    /// needed in the fragment stage.
    pub ty: SlType,
    pub source: TransformSource,
}

/// A transformed coordinate the primitive processor produced: the
/// fragment-visible varying name plus its type.
#[derive(Debug, Clone)]
pub struct TransformedCoord {
    pub name: String,
    pub ty: SlType,
}

/// Per-fragment-processor transformed coordinates, in pipeline order
/// (color processors first, then coverage processors).
#[derive(Debug, Clone, Default)]
pub struct TransformedCoords(pub Vec<Vec<TransformedCoord>>);

/// Geometry-stage layout qualifiers, consulted only when the primitive
/// processor opts into a geometry shader.
#[derive(Debug, Clone, Copy)]
pub struct GeometryLayout {
    pub input: GeometryInput,
    pub output: GeometryOutput,
    pub max_vertices: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryInput {
    Points,
    Lines,
    Triangles,
}

impl GeometryInput {
    pub fn glsl_string(self) -> &'static str {
        match self {
            GeometryInput::Points => "points",
            GeometryInput::Lines => "lines",
            GeometryInput::Triangles => "triangles",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryOutput {
    Points,
    LineStrip,
    TriangleStrip,
}

impl GeometryOutput {
    pub fn glsl_string(self) -> &'static str {
        match self {
            GeometryOutput::Points => "points",
            GeometryOutput::LineStrip => "line_strip",
            GeometryOutput::TriangleStrip => "triangle_strip",
        }
    }
}

impl Default for GeometryLayout {
    fn default() -> Self {
        Self {
            input: GeometryInput::Triangles,
            output: GeometryOutput::TriangleStrip,
            max_vertices: 3,
        }
    }
}

/// Behavior common to every processor variant.
pub trait Processor {
    /// Identifies the processor in generated code comments and logs. Must be
    /// a legal GLSL identifier prefix.
    fn name(&self) -> &'static str;

    /// Distinguishes this processor type from every other in program keys.
    /// At most 16 bits.
    fn class_id(&self) -> u32;

    /// Write the configuration bits that change the shape of the emitted
    /// code. Values consumed purely as uniforms must stay out: two pipelines
    /// differing only in uniform values have to produce equal keys.
    fn gen_key(&self, caps: &GlslCaps, b: &mut KeyBuilder<'_>);

    /// Textures this processor samples, in sampler-index order.
    fn textures(&self) -> &[TextureAccess] {
        &[]
    }
}

/// Arguments handed to the primitive processor's `emit_code`.
pub struct PrimitiveEmitArgs<'a> {
    /// Fragment-stage variable to write the per-fragment color into.
    pub output_color: &'a str,
    /// Fragment-stage variable to write the per-fragment coverage into.
    pub output_coverage: &'a str,
    /// Declared samplers for this processor's textures.
    pub samplers: &'a [SamplerRef],
    /// Every coordinate transform requested by the pipeline's fragment
    /// processors, one entry per fragment processor in pipeline order.
    pub transforms: &'a [Vec<CoordTransform>],
}

/// The one-per-pipeline processor that owns the vertex attribute layout and
/// the vertex (and optional geometry) stages.
pub trait PrimitiveProcessor: Processor {
    /// Vertex attributes, in bind-location order.
    fn attributes(&self) -> Vec<Attribute>;

    fn will_use_geometry_shader(&self) -> bool {
        false
    }

    fn geometry_layout(&self) -> GeometryLayout {
        GeometryLayout::default()
    }

    fn will_read_fragment_position(&self) -> bool {
        false
    }

    /// True when the color this processor writes is statically opaque white,
    /// letting downstream processors drop the multiply entirely. The first
    /// color processor then receives `None` as its input expression.
    fn color_is_opaque_white(&self) -> bool {
        false
    }

    /// Like `color_is_opaque_white` for the coverage output.
    fn coverage_is_solid_white(&self) -> bool {
        false
    }

    /// Emit vertex/geometry/fragment code and return the transformed
    /// coordinates for each fragment processor, parallel to
    /// `args.transforms`.
    fn emit_code(
        &self,
        pb: &mut ProgramBuilder<'_>,
        args: &PrimitiveEmitArgs<'_>,
    ) -> TransformedCoords;
}

/// Arguments handed to a fragment processor's `emit_code`.
pub struct FragmentEmitArgs<'a> {
    /// Fragment-stage variable to write the result into.
    pub output: &'a str,
    /// Upstream expression to modulate, or `None` for an implicit opaque
    /// white input.
    pub input: Option<&'a str>,
    pub samplers: &'a [SamplerRef],
    /// Transformed coordinates this processor requested, in
    /// `coord_transforms()` order.
    pub coords: &'a [TransformedCoord],
}

/// A color or coverage stage in the fragment pipeline.
pub trait FragmentProcessor: Processor {
    /// Coordinate transforms to request from the primitive processor.
    fn coord_transforms(&self) -> Vec<CoordTransform> {
        Vec::new()
    }

    /// Vertex attributes this processor reads, as (source attribute index,
    /// type) pairs. Declared idempotently by the assembler.
    fn attributes(&self) -> Vec<(usize, SlType)> {
        Vec::new()
    }

    fn will_read_dst_color(&self) -> bool {
        false
    }

    fn will_read_fragment_position(&self) -> bool {
        false
    }

    fn emit_code(&self, pb: &mut ProgramBuilder<'_>, args: &FragmentEmitArgs<'_>);
}

/// Arguments handed to the transfer processor's `emit_code`.
pub struct TransferEmitArgs<'a> {
    /// Final color expression from the color chain.
    pub input_color: &'a str,
    /// Final coverage expression from the coverage chain.
    pub input_coverage: &'a str,
    /// Name of the primary fragment output to assign.
    pub primary_output: &'a str,
    /// Name of the secondary (dual-source) output, present only when the
    /// processor declared one.
    pub secondary_output: Option<&'a str>,
    pub samplers: &'a [SamplerRef],
}

/// The one-per-pipeline processor that folds color and coverage into the
/// framebuffer outputs.
pub trait TransferProcessor: Processor {
    fn will_read_dst_color(&self) -> bool {
        false
    }

    fn will_read_fragment_position(&self) -> bool {
        false
    }

    /// Declares a second fragment output for dual-source blend equations.
    fn has_secondary_output(&self) -> bool {
        false
    }

    fn emit_code(&self, pb: &mut ProgramBuilder<'_>, args: &TransferEmitArgs<'_>);
}
