//! Stock processors: a quad primitive processor, a texture-sampling color
//! processor, a coverage modulator, and two transfer processors. They cover
//! the common draw shapes and double as fixtures for the assembly tests.

use crate::builder::ProgramBuilder;
use crate::caps::GlslCaps;
use crate::factory::{
    COVERAGE_SCALE_CLASS_ID, DST_READ_BLEND_CLASS_ID, QUAD_PROCESSOR_CLASS_ID,
    SRC_OVER_TRANSFER_CLASS_ID, TEXTURE_COLOR_CLASS_ID,
};
use crate::glsl::{Precision, SlType};
use crate::key::KeyBuilder;
use crate::processor::{
    CoordTransform, FragmentEmitArgs, FragmentProcessor, PrimitiveEmitArgs, PrimitiveProcessor,
    Processor, TextureAccess, TransferEmitArgs, TransferProcessor, TransformSource,
    TransformedCoord, TransformedCoords,
};
use crate::resources::{Attribute, PixelFormat, VaryingNames, Visibility};

// ---------------------------------------------------------------------------
// QuadProcessor
// ---------------------------------------------------------------------------

/// Primitive processor for view-transformed quads. Owns the position (and
/// optionally local-coords and per-vertex color) attributes, services the
/// gathered coordinate transforms, and can thread its varyings through a
/// pass-through geometry stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadProcessor {
    pub explicit_local_coords: bool,
    pub per_vertex_color: bool,
    pub use_geometry_shader: bool,
}

impl QuadProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for QuadProcessor {
    fn name(&self) -> &'static str {
        "QuadProcessor"
    }

    fn class_id(&self) -> u32 {
        QUAD_PROCESSOR_CLASS_ID
    }

    fn gen_key(&self, _caps: &GlslCaps, b: &mut KeyBuilder<'_>) {
        b.add32(
            self.explicit_local_coords as u32
                | (self.per_vertex_color as u32) << 1
                | (self.use_geometry_shader as u32) << 2,
        );
    }
}

impl PrimitiveProcessor for QuadProcessor {
    fn attributes(&self) -> Vec<Attribute> {
        let mut attrs = vec![Attribute {
            name: "aPosition",
            ty: SlType::Vec2,
        }];
        if self.explicit_local_coords {
            attrs.push(Attribute {
                name: "aLocalCoords",
                ty: SlType::Vec2,
            });
        }
        if self.per_vertex_color {
            attrs.push(Attribute {
                name: "aColor",
                ty: SlType::Vec4,
            });
        }
        attrs
    }

    fn will_use_geometry_shader(&self) -> bool {
        self.use_geometry_shader
    }

    fn color_is_opaque_white(&self) -> bool {
        !self.per_vertex_color
    }

    fn coverage_is_solid_white(&self) -> bool {
        true
    }

    fn emit_code(
        &self,
        pb: &mut ProgramBuilder<'_>,
        args: &PrimitiveEmitArgs<'_>,
    ) -> TransformedCoords {
        let view = pb.add_uniform(
            Visibility::VERTEX,
            SlType::Mat33,
            Precision::Default,
            "ViewMatrix",
        );
        let view_name = pb.uniform_name(view).to_string();
        pb.vs_code(&format!("vec3 pos3 = {view_name} * vec3(aPosition, 1.0);\n"));
        pb.vs_code("gl_Position = vec4(pos3.xy, 0.0, 1.0);\n");

        let local_src = if self.explicit_local_coords {
            "aLocalCoords"
        } else {
            "aPosition"
        };

        // Varyings to replicate through the geometry stage, if one is active.
        let mut gs_varyings: Vec<VaryingNames> = Vec::new();

        let mut all_coords = Vec::with_capacity(args.transforms.len());
        for (i, transforms) in args.transforms.iter().enumerate() {
            let mut coords = Vec::with_capacity(transforms.len());
            for (j, transform) in transforms.iter().enumerate() {
                let matrix = pb.add_uniform(
                    Visibility::VERTEX,
                    SlType::Mat33,
                    Precision::Default,
                    &format!("CoordTransformMatrix{i}_{j}"),
                );
                let matrix_name = pb.uniform_name(matrix).to_string();
                let varying = pb.add_varying(
                    transform.ty,
                    &format!("TransformedCoords{i}_{j}"),
                    Precision::Default,
                );
                let src = match transform.source {
                    TransformSource::Position => "aPosition",
                    TransformSource::LocalCoords => local_src,
                };
                if transform.ty == SlType::Vec2 {
                    pb.vs_code(&format!(
                        "{} = ({matrix_name} * vec3({src}, 1.0)).xy;\n",
                        varying.vs_out
                    ));
                } else {
                    pb.vs_code(&format!(
                        "{} = {matrix_name} * vec3({src}, 1.0);\n",
                        varying.vs_out
                    ));
                }
                coords.push(TransformedCoord {
                    name: varying.fs_in.clone(),
                    ty: transform.ty,
                });
                gs_varyings.push(varying);
            }
            all_coords.push(coords);
        }

        if self.per_vertex_color {
            let color = pb.add_varying(SlType::Vec4, "Color", Precision::Default);
            pb.vs_code(&format!("{} = aColor;\n", color.vs_out));
            pb.fs_code(&format!("{} = {};\n", args.output_color, color.fs_in));
            gs_varyings.push(color);
        } else {
            pb.fs_code(&format!("{} = vec4(1.0);\n", args.output_color));
        }
        pb.fs_code(&format!("{} = vec4(1.0);\n", args.output_coverage));

        if self.use_geometry_shader && pb.caps().geometry_shader_support {
            pb.gs_code("for (int i = 0; i < 3; ++i) {\n");
            pb.gs_code("gl_Position = gl_in[i].gl_Position;\n");
            for varying in &gs_varyings {
                pb.gs_code(&format!("{} = {}[i];\n", varying.fs_in, varying.vs_out));
            }
            pb.gs_code("EmitVertex();\n");
            pb.gs_code("}\n");
            pb.gs_code("EndPrimitive();\n");
        }

        TransformedCoords(all_coords)
    }
}

// ---------------------------------------------------------------------------
// Fragment processors
// ---------------------------------------------------------------------------

/// Samples one texture at a transformed local coordinate and modulates the
/// incoming color with it.
#[derive(Debug, Clone, Copy)]
pub struct TextureColorProcessor {
    textures: [TextureAccess; 1],
}

impl TextureColorProcessor {
    pub fn new(format: PixelFormat) -> Self {
        Self {
            textures: [TextureAccess { format }],
        }
    }
}

impl Processor for TextureColorProcessor {
    fn name(&self) -> &'static str {
        "TextureColorProcessor"
    }

    fn class_id(&self) -> u32 {
        TEXTURE_COLOR_CLASS_ID
    }

    // Code shape varies only with the texture swizzle and the transform
    // shape, both of which the key composer records on its own.
    fn gen_key(&self, _caps: &GlslCaps, _b: &mut KeyBuilder<'_>) {}

    fn textures(&self) -> &[TextureAccess] {
        &self.textures
    }
}

impl FragmentProcessor for TextureColorProcessor {
    fn coord_transforms(&self) -> Vec<CoordTransform> {
        vec![CoordTransform {
            ty: SlType::Vec2,
            source: TransformSource::LocalCoords,
        }]
    }

    fn emit_code(&self, pb: &mut ProgramBuilder<'_>, args: &FragmentEmitArgs<'_>) {
        let Some(sampler) = args.samplers.first() else {
            debug_assert!(false, "assembler declared no sampler for our texture");
            return;
        };
        let coord = args
            .coords
            .first()
            .map(|c| c.name.as_str())
            .unwrap_or("vec2(0.0)");
        let expr = pb.texture_lookup_and_modulate_expr(args.input, sampler, coord);
        pb.fs_code(&format!("{} = {expr};\n", args.output));
    }
}

/// Multiplies coverage by a per-draw scalar uniform. `invert` changes the
/// emitted code and therefore the key; the scalar itself is a uniform value
/// and stays out of the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoverageScaleProcessor {
    pub invert: bool,
}

impl Processor for CoverageScaleProcessor {
    fn name(&self) -> &'static str {
        "CoverageScaleProcessor"
    }

    fn class_id(&self) -> u32 {
        COVERAGE_SCALE_CLASS_ID
    }

    fn gen_key(&self, _caps: &GlslCaps, b: &mut KeyBuilder<'_>) {
        b.add32(self.invert as u32);
    }
}

impl FragmentProcessor for CoverageScaleProcessor {
    fn emit_code(&self, pb: &mut ProgramBuilder<'_>, args: &FragmentEmitArgs<'_>) {
        let scale = pb.add_uniform(
            Visibility::FRAGMENT,
            SlType::Float,
            Precision::Medium,
            "CoverageScale",
        );
        let scale_name = pb.uniform_name(scale).to_string();
        let factor = if self.invert {
            format!("(1.0 - {scale_name})")
        } else {
            scale_name
        };
        match args.input {
            Some(input) => pb.fs_code(&format!("{} = {input} * {factor};\n", args.output)),
            None => pb.fs_code(&format!("{} = vec4({factor});\n", args.output)),
        }
    }
}

// ---------------------------------------------------------------------------
// Transfer processors
// ---------------------------------------------------------------------------

/// Plain src-over against fixed-function blending: writes coverage-modulated
/// color to the primary output. With dual-source coverage the coverage goes
/// to the secondary output instead, for `SRC1_COLOR`-style blend funcs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SrcOverTransfer {
    pub dual_source_coverage: bool,
}

impl Processor for SrcOverTransfer {
    fn name(&self) -> &'static str {
        "SrcOverTransfer"
    }

    fn class_id(&self) -> u32 {
        SRC_OVER_TRANSFER_CLASS_ID
    }

    fn gen_key(&self, _caps: &GlslCaps, b: &mut KeyBuilder<'_>) {
        b.add32(self.dual_source_coverage as u32);
    }
}

impl TransferProcessor for SrcOverTransfer {
    fn has_secondary_output(&self) -> bool {
        self.dual_source_coverage
    }

    fn emit_code(&self, pb: &mut ProgramBuilder<'_>, args: &TransferEmitArgs<'_>) {
        if let Some(secondary) = args.secondary_output {
            pb.fs_code(&format!("{secondary} = {};\n", args.input_coverage));
            pb.fs_code(&format!(
                "{} = {};\n",
                args.primary_output, args.input_color
            ));
        } else {
            pb.fs_code(&format!(
                "{} = {} * {};\n",
                args.primary_output, args.input_coverage, args.input_color
            ));
        }
    }
}

/// Blend equations the in-shader dst-read transfer supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    SrcOver,
    Multiply,
}

/// Applies a blend equation in shader code against the destination color,
/// then lerps by coverage. Declares the destination-color read.
#[derive(Debug, Clone, Copy)]
pub struct DstReadBlendTransfer {
    pub mode: BlendMode,
}

impl Processor for DstReadBlendTransfer {
    fn name(&self) -> &'static str {
        "DstReadBlendTransfer"
    }

    fn class_id(&self) -> u32 {
        DST_READ_BLEND_CLASS_ID
    }

    fn gen_key(&self, _caps: &GlslCaps, b: &mut KeyBuilder<'_>) {
        b.add32(self.mode as u32);
    }
}

impl TransferProcessor for DstReadBlendTransfer {
    fn will_read_dst_color(&self) -> bool {
        true
    }

    fn emit_code(&self, pb: &mut ProgramBuilder<'_>, args: &TransferEmitArgs<'_>) {
        let dst = pb.dst_color();
        let color = args.input_color;
        match self.mode {
            BlendMode::SrcOver => {
                pb.fs_code(&format!(
                    "vec4 blend = {color} + (1.0 - {color}.a) * {dst};\n"
                ));
            }
            BlendMode::Multiply => {
                pb.fs_code(&format!("vec4 blend = {color} * {dst};\n"));
            }
        }
        let coverage = args.input_coverage;
        pb.fs_code(&format!(
            "{} = {coverage} * blend + (vec4(1.0) - {coverage}) * {dst};\n",
            args.primary_output
        ));
    }
}
