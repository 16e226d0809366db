//! The program builder: one forward pass over a pipeline that produces
//! per-stage source text, the resource table, and the structural key.
//!
//! A builder instance is created per build request, populated during the
//! pass, and consumed by [`ProgramBuilder::assemble`]'s return value. It is
//! handed to each processor's `emit_code` as the emission context: everything
//! a processor may touch (stage buffers, resource declarations, the
//! dst-color / fragment-position helpers) goes through methods here, so the
//! current stage index and verification flags stay in one place.

use tracing::{debug, trace};

use crate::caps::GlslCaps;
use crate::error::AssemblyError;
use crate::factory::class_name;
use crate::glsl::{
    append_decls, ArrayCount, GlslGeneration, Precision, ShaderVar, SlType, TypeModifier,
};
use crate::key::{
    build_key, dst_read_strategy, frag_pos_strategy, DstReadStrategy, FragPosStrategy, ProgramKey,
};
use crate::pipeline::{DrawTarget, DstCopyDesc, PipelineDesc};
use crate::processor::{
    CoordTransform, FragmentEmitArgs, FragmentProcessor, GeometryLayout, PrimitiveEmitArgs,
    PrimitiveProcessor, TextureAccess, TransferEmitArgs, TransferProcessor, TransformedCoord,
    TransformedCoords,
};
use crate::resources::{
    shader_swizzle, AttributePair, PixelFormat, SamplerBinding, SamplerRef, UniformHandle,
    UniformInfo, VaryingNames, Visibility,
};
use crate::stage::StageBuffer;

/// Declared primary fragment output, used when `gl_FragColor` is gone.
pub const PRIMARY_COLOR_OUTPUT_NAME: &str = "fsColorOut";
/// Declared secondary output for dual-source blending.
pub const SECONDARY_COLOR_OUTPUT_NAME: &str = "fsSecondaryColorOut";

const DST_COLOR_NAME: &str = "_dstColor";
const DST_TEX_COORD_NAME: &str = "_dstTexCoord";
const FRAG_COORD_YDOWN_NAME: &str = "fragCoordYDown";
const FB_FETCH_COLOR_NAME: &str = "gl_LastFragData[0]";

/// Shader features that may need an `#extension` pragma. Each distinct
/// feature emits its pragma at most once per program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    StandardDerivatives,
    FragCoordConventions,
    FbFetchExt,
    FbFetchNv,
    BlendFuncExtended,
}

/// What a processor declared it will read while emitting.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredReads {
    pub dst_color: bool,
    pub fragment_position: bool,
}

/// Per-stage state: the index used for mangling plus the verification flags
/// cleared when the stage is entered.
#[derive(Debug)]
struct StageState {
    index: usize,
    declared: DeclaredReads,
    used_dst_color: bool,
    used_frag_position: bool,
}

/// Handles for the framework-owned uniforms a build may have declared.
#[derive(Debug, Clone, Default)]
pub struct BuiltinHandles {
    pub rt_height: Option<UniformHandle>,
    pub dst_copy_top_left: Option<UniformHandle>,
    pub dst_copy_scale: Option<UniformHandle>,
    pub dst_copy_sampler: Option<UniformHandle>,
}

/// Everything one assembly pass produces. Only this (and the compiled
/// program built from it) outlives the builder.
#[derive(Debug)]
pub struct AssembledProgram {
    pub key: ProgramKey,
    pub vertex: String,
    pub geometry: Option<String>,
    pub fragment: String,
    /// Uniform table in handle order: mangled name, type, visibility.
    pub uniforms: Vec<UniformInfo>,
    /// Vertex attribute names in bind-location order.
    pub attributes: Vec<String>,
    /// Fragment-processor attributes by source attribute index.
    pub processor_attributes: Vec<AttributePair>,
    /// Sampler uniforms in texture-unit order.
    pub samplers: Vec<SamplerBinding>,
    pub builtin: BuiltinHandles,
    /// The primary output is a declared variable rather than `gl_FragColor`.
    pub has_custom_output: bool,
    pub has_secondary_output: bool,
}

pub struct ProgramBuilder<'a> {
    caps: &'a GlslCaps,
    target: DrawTarget,
    dst_read: DstReadStrategy,
    frag_pos: FragPosStrategy,
    uses_gs: bool,
    gs_layout: GeometryLayout,

    next_stage: usize,
    current_stage: Option<StageState>,

    uniforms: Vec<UniformInfo>,
    samplers: Vec<SamplerBinding>,
    vs_attrs: Vec<ShaderVar>,
    vs_outputs: Vec<ShaderVar>,
    gs_inputs: Vec<ShaderVar>,
    gs_outputs: Vec<ShaderVar>,
    fs_inputs: Vec<ShaderVar>,
    fs_outputs: Vec<ShaderVar>,
    processor_attributes: Vec<AttributePair>,

    vs: StageBuffer,
    gs: StageBuffer,
    fs: StageBuffer,
    fs_functions: String,
    fs_extensions: String,
    features_added: u32,

    setup_frag_position: bool,
    dst_copy_setup: bool,
    custom_output: bool,
    secondary_output: bool,
    builtin: BuiltinHandles,
}

impl<'a> ProgramBuilder<'a> {
    /// Run the single forward pass over `pipeline` and return the assembled
    /// sources, resource table and key. No backend calls happen here; see
    /// [`crate::backend::finalize`].
    pub fn assemble(
        pipeline: &PipelineDesc,
        caps: &'a GlslCaps,
        target: &DrawTarget,
    ) -> Result<AssembledProgram, AssemblyError> {
        Self::check_texture_budget(pipeline, caps)?;

        let key = build_key(pipeline, caps, target);
        let mut pb = ProgramBuilder::new(pipeline, caps, target);
        trace!(key = %key.to_hex(), "assembling program");

        // Gather every coordinate transform up front; only the primitive
        // processor can see the vertex layout needed to honor them.
        let transforms: Vec<Vec<CoordTransform>> = pipeline
            .fragment_processors()
            .map(|fp| fp.coord_transforms())
            .collect();

        let (mut color_in, mut coverage_in, coords) =
            pb.emit_primitive(pipeline.primitive.as_ref(), &transforms);
        debug_assert_eq!(
            coords.0.len(),
            transforms.len(),
            "primitive processor must produce coords for every transform list"
        );

        let n_color = pipeline.color.len();
        for (i, fp) in pipeline.color.iter().enumerate() {
            let out = pb.emit_fragment(fp.as_ref(), color_in.take(), coord_slice(&coords, i));
            color_in = Some(out);
        }
        for (j, fp) in pipeline.coverage.iter().enumerate() {
            let out = pb.emit_fragment(
                fp.as_ref(),
                coverage_in.take(),
                coord_slice(&coords, n_color + j),
            );
            coverage_in = Some(out);
        }

        pb.emit_transfer(pipeline.transfer.as_ref(), color_in, coverage_in);

        Ok(pb.finish(key))
    }

    fn new(pipeline: &PipelineDesc, caps: &'a GlslCaps, target: &DrawTarget) -> Self {
        let dst_read = dst_read_strategy(pipeline, caps, target);
        let frag_pos = frag_pos_strategy(pipeline, caps, target, dst_read);
        let uses_gs =
            pipeline.primitive.will_use_geometry_shader() && caps.geometry_shader_support;
        Self {
            caps,
            target: *target,
            dst_read,
            frag_pos,
            uses_gs,
            gs_layout: pipeline.primitive.geometry_layout(),
            next_stage: 0,
            current_stage: None,
            uniforms: Vec::new(),
            samplers: Vec::new(),
            vs_attrs: Vec::new(),
            vs_outputs: Vec::new(),
            gs_inputs: Vec::new(),
            gs_outputs: Vec::new(),
            fs_inputs: Vec::new(),
            fs_outputs: Vec::new(),
            processor_attributes: Vec::new(),
            vs: StageBuffer::new(),
            gs: StageBuffer::new(),
            fs: StageBuffer::new(),
            fs_functions: String::new(),
            fs_extensions: String::new(),
            features_added: 0,
            setup_frag_position: false,
            dst_copy_setup: false,
            custom_output: false,
            secondary_output: false,
            builtin: BuiltinHandles::default(),
        }
    }

    /// Reject pipelines whose accumulated texture usage reaches the
    /// per-stage maximum. This is a build-time rejection, not a compile
    /// error; the caller should skip or degrade the draw. One unit is
    /// implicitly held back for the destination-copy sampler.
    fn check_texture_budget(
        pipeline: &PipelineDesc,
        caps: &GlslCaps,
    ) -> Result<(), AssemblyError> {
        let max = caps.max_fragment_texture_units;
        let mut total = pipeline.primitive.textures().len();
        for fp in pipeline.fragment_processors() {
            total += fp.textures().len();
            if total >= max {
                debug!(required = total, max, "pipeline would use too many texture units");
                return Err(AssemblyError::CapacityExceeded {
                    required: total,
                    max,
                });
            }
        }
        total += pipeline.transfer.textures().len();
        if total >= max {
            debug!(required = total, max, "pipeline would use too many texture units");
            return Err(AssemblyError::CapacityExceeded {
                required: total,
                max,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Emission API, used by processors
    // -----------------------------------------------------------------------

    pub fn caps(&self) -> &GlslCaps {
        self.caps
    }

    pub fn vs_code(&mut self, code: &str) {
        self.vs.append(code);
    }

    pub fn gs_code(&mut self, code: &str) {
        self.gs.append(code);
    }

    pub fn fs_code(&mut self, code: &str) {
        self.fs.append(code);
    }

    /// Generate a collision-free name from `base`. Inside stage code the
    /// result carries a `_Stage<N>` suffix; identifiers that would otherwise
    /// produce a reserved `__` sequence get an extra `x` first.
    pub fn name_variable(&self, prefix: Option<char>, base: &str) -> String {
        let mut out = String::new();
        if let Some(p) = prefix {
            out.push(p);
        }
        out.push_str(base);
        if let Some(stage) = &self.current_stage {
            if out.ends_with('_') {
                out.push('x');
            }
            out.push_str("_Stage");
            out.push_str(&stage.index.to_string());
        }
        out
    }

    /// Add a uniform visible in one or more stages. The name is mangled; the
    /// returned handle indexes the uniform table and, later, the resolved
    /// location table of the compiled program.
    pub fn add_uniform(
        &mut self,
        visibility: Visibility,
        ty: SlType,
        precision: Precision,
        name: &str,
    ) -> UniformHandle {
        self.add_uniform_inner(visibility, ty, precision, name, ArrayCount::NonArray)
    }

    /// Array variant of [`add_uniform`](Self::add_uniform).
    pub fn add_uniform_array(
        &mut self,
        visibility: Visibility,
        ty: SlType,
        precision: Precision,
        name: &str,
        count: usize,
    ) -> UniformHandle {
        self.add_uniform_inner(visibility, ty, precision, name, ArrayCount::Count(count))
    }

    fn add_uniform_inner(
        &mut self,
        visibility: Visibility,
        ty: SlType,
        precision: Precision,
        name: &str,
        array_count: ArrayCount,
    ) -> UniformHandle {
        debug_assert!(!name.is_empty());
        debug_assert!(!visibility.is_empty());
        debug_assert!(
            !visibility.intersects(Visibility::GEOMETRY),
            "geometry-stage uniforms are not supported"
        );
        let mut var = ShaderVar::new(
            self.name_variable(Some('u'), name),
            ty,
            TypeModifier::Uniform,
        )
        .with_precision(precision)
        .with_array_count(array_count);
        // Visible in both stages: the declarations must agree, so force the
        // shared precision to the fragment default.
        if visibility.contains(Visibility::VERTEX | Visibility::FRAGMENT) {
            var.precision = Precision::Medium;
        }
        let handle = UniformHandle(self.uniforms.len());
        self.uniforms.push(UniformInfo { var, visibility });
        handle
    }

    /// Final (mangled) name of a declared uniform.
    pub fn uniform_name(&self, handle: UniformHandle) -> &str {
        &self.uniforms[handle.0].var.name
    }

    /// Add a vertex attribute. Returns `false`, declaring nothing, when an
    /// identical attribute already exists.
    pub fn add_attribute(&mut self, ty: SlType, name: &str) -> bool {
        if let Some(existing) = self.vs_attrs.iter().find(|a| a.name == name) {
            debug_assert_eq!(
                existing.ty, ty,
                "attribute redeclared with a different type"
            );
            return false;
        }
        self.vs_attrs
            .push(ShaderVar::new(name, ty, TypeModifier::Attribute));
        true
    }

    /// Add a varying to carry a value into the fragment stage. With a
    /// geometry stage active the value is threaded through an intermediate
    /// in/out pair and the fragment-visible name is the geometry output.
    pub fn add_varying(&mut self, ty: SlType, name: &str, precision: Precision) -> VaryingNames {
        let vs_name = self.name_variable(Some('v'), name);
        self.vs_outputs.push(
            ShaderVar::new(vs_name.clone(), ty, TypeModifier::VaryingOut)
                .with_precision(precision),
        );
        let fs_in = if self.uses_gs {
            // Geometry inputs arrive as unsized arrays named after the
            // vertex outputs.
            self.gs_inputs.push(
                ShaderVar::new(vs_name.clone(), ty, TypeModifier::VaryingIn)
                    .with_precision(precision)
                    .with_array_count(ArrayCount::Unsized),
            );
            let gs_name = self.name_variable(Some('g'), name);
            self.gs_outputs.push(
                ShaderVar::new(gs_name.clone(), ty, TypeModifier::VaryingOut)
                    .with_precision(precision),
            );
            gs_name
        } else {
            vs_name.clone()
        };
        self.fs_inputs.push(
            ShaderVar::new(fs_in.clone(), ty, TypeModifier::VaryingIn).with_precision(precision),
        );
        VaryingNames {
            vs_out: vs_name,
            fs_in,
        }
    }

    /// Add a sampler uniform, recording the channel swizzle lookups through
    /// it must apply for `format`.
    pub fn add_sampler(
        &mut self,
        visibility: Visibility,
        ty: SlType,
        precision: Precision,
        name: &str,
        format: PixelFormat,
    ) -> SamplerRef {
        debug_assert_eq!(ty, SlType::Sampler2D);
        let handle = self.add_uniform_inner(visibility, ty, precision, name, ArrayCount::NonArray);
        self.samplers.push(SamplerBinding {
            uniform: handle,
            format,
        });
        SamplerRef {
            uniform: handle,
            name: self.uniforms[handle.0].var.name.clone(),
            swizzle: shader_swizzle(format, self.caps),
        }
    }

    /// Name a fragment processor's attribute by its source attribute index,
    /// if the assembler declared one.
    pub fn attribute_name(&self, source_index: usize) -> Option<&str> {
        self.processor_attributes
            .iter()
            .find(|a| a.index == source_index)
            .map(|a| a.name.as_str())
    }

    /// A 2D texture sample expression through `sampler`, swizzled per the
    /// sampler's format.
    pub fn texture_lookup_expr(&self, sampler: &SamplerRef, coord: &str) -> String {
        let mut expr = format!(
            "{}({}, {})",
            self.caps.generation.sample_fn(),
            sampler.name,
            coord
        );
        // Omit the no-op swizzle for shader prettiness.
        if sampler.swizzle != "rgba" {
            expr.push('.');
            expr.push_str(sampler.swizzle);
        }
        expr
    }

    /// Append a texture sample to the fragment stage.
    pub fn append_texture_lookup(&mut self, sampler: &SamplerRef, coord: &str) {
        let expr = self.texture_lookup_expr(sampler, coord);
        self.fs.append(&expr);
    }

    /// A texture sample modulated by `modulation`; with no modulation this is
    /// a plain lookup.
    pub fn texture_lookup_and_modulate_expr(
        &self,
        modulation: Option<&str>,
        sampler: &SamplerRef,
        coord: &str,
    ) -> String {
        let lookup = self.texture_lookup_expr(sampler, coord);
        match modulation {
            Some(m) if !m.is_empty() => format!("({lookup} * {m})"),
            _ => lookup,
        }
    }

    /// Request a shader feature, emitting its `#extension` pragma at most
    /// once. Returns `false` when the context cannot provide it.
    pub fn enable_feature(&mut self, feature: Feature) -> bool {
        match feature {
            Feature::StandardDerivatives => {
                if !self.caps.shader_derivative_support {
                    return false;
                }
                if self.caps.es2 {
                    self.add_fs_feature(feature, "GL_OES_standard_derivatives");
                }
                true
            }
            Feature::FragCoordConventions => {
                if !self.caps.frag_coord_conventions_support {
                    return false;
                }
                if self.caps.generation < GlslGeneration::V150 {
                    self.add_fs_feature(feature, "GL_ARB_fragment_coord_conventions");
                }
                true
            }
            Feature::FbFetchExt => {
                if self.caps.fb_fetch != crate::caps::FbFetchType::Ext {
                    return false;
                }
                self.add_fs_feature(feature, "GL_EXT_shader_framebuffer_fetch");
                true
            }
            Feature::FbFetchNv => {
                if self.caps.fb_fetch != crate::caps::FbFetchType::Nv {
                    return false;
                }
                self.add_fs_feature(feature, "GL_NV_shader_framebuffer_fetch");
                true
            }
            Feature::BlendFuncExtended => {
                if self.caps.generation < GlslGeneration::V130 {
                    self.add_fs_feature(feature, "GL_EXT_blend_func_extended");
                }
                true
            }
        }
    }

    fn add_fs_feature(&mut self, feature: Feature, extension: &str) {
        let bit = 1u32 << feature_bit(feature);
        if self.features_added & bit == 0 {
            self.fs_extensions.push_str("#extension ");
            self.fs_extensions.push_str(extension);
            self.fs_extensions.push_str(": require\n");
            self.features_added |= bit;
        }
    }

    /// A device-space fragment coordinate name, origin top-left with pixel
    /// centers at half-integers. The resolution order is native coordinate,
    /// origin-qualified redeclaration, synthesized height flip; the flip is
    /// defined once in the preamble no matter which processor asks first.
    pub fn fragment_position(&mut self) -> String {
        if let Some(stage) = &mut self.current_stage {
            if !stage.declared.fragment_position {
                debug_assert!(
                    false,
                    "processor read the fragment position without declaring it"
                );
                return String::new();
            }
            stage.used_frag_position = true;
        }
        match self.frag_pos {
            FragPosStrategy::TopLeftNative => "gl_FragCoord".to_string(),
            FragPosStrategy::OriginQualifier => {
                if !self.setup_frag_position {
                    let supported = self.enable_feature(Feature::FragCoordConventions);
                    debug_assert!(supported);
                    let mut var =
                        ShaderVar::new("gl_FragCoord", SlType::Vec4, TypeModifier::VaryingIn);
                    var.origin_upper_left = true;
                    self.fs_inputs.push(var);
                    self.setup_frag_position = true;
                }
                "gl_FragCoord".to_string()
            }
            FragPosStrategy::RtHeightFlip => {
                if !self.setup_frag_position {
                    let handle = self.out_of_stage(|pb| {
                        pb.add_uniform(
                            Visibility::FRAGMENT,
                            SlType::Float,
                            Precision::Default,
                            "RTHeight",
                        )
                    });
                    let height = self.uniform_name(handle).to_string();
                    self.fs.append_preamble(&format!(
                        "vec4 {FRAG_COORD_YDOWN_NAME} = vec4(gl_FragCoord.x, {height} - gl_FragCoord.y, gl_FragCoord.zw);\n"
                    ));
                    self.builtin.rt_height = Some(handle);
                    self.setup_frag_position = true;
                }
                FRAG_COORD_YDOWN_NAME.to_string()
            }
            FragPosStrategy::None => {
                debug_assert!(false, "fragment position read but no strategy was keyed");
                "gl_FragCoord".to_string()
            }
        }
    }

    /// An expression for the destination color at the current fragment.
    /// Resolution order: EXT fetch builtin, NV fetch builtin, a precomputed
    /// sample of the destination-copy texture. The issuing processor must
    /// have declared the read.
    pub fn dst_color(&mut self) -> String {
        if let Some(stage) = &mut self.current_stage {
            if !stage.declared.dst_color {
                debug_assert!(
                    false,
                    "processor read the destination color without declaring it"
                );
                return String::new();
            }
            stage.used_dst_color = true;
        }
        match self.dst_read {
            DstReadStrategy::FbFetchExt => {
                let supported = self.enable_feature(Feature::FbFetchExt);
                debug_assert!(supported);
                FB_FETCH_COLOR_NAME.to_string()
            }
            DstReadStrategy::FbFetchNv => {
                let supported = self.enable_feature(Feature::FbFetchNv);
                debug_assert!(supported);
                FB_FETCH_COLOR_NAME.to_string()
            }
            DstReadStrategy::CopyTexture {
                top_left_origin, ..
            } => {
                self.setup_dst_copy_read(top_left_origin);
                DST_COLOR_NAME.to_string()
            }
            DstReadStrategy::None => {
                debug_assert!(false, "destination color read but no strategy was keyed");
                String::new()
            }
        }
    }

    fn setup_dst_copy_read(&mut self, top_left_origin: bool) {
        if self.dst_copy_setup {
            return;
        }
        self.dst_copy_setup = true;
        let copy = self.target.dst_copy.unwrap_or(DstCopyDesc {
            origin: crate::caps::SurfaceOrigin::TopLeft,
            format: PixelFormat::Rgba8,
        });
        self.out_of_stage(|pb| {
            let sampler = pb.add_sampler(
                Visibility::FRAGMENT,
                SlType::Sampler2D,
                Precision::Default,
                "DstCopySampler",
                copy.format,
            );
            let top_left = pb.add_uniform(
                Visibility::FRAGMENT,
                SlType::Vec2,
                Precision::Default,
                "DstCopyUpperLeft",
            );
            let scale = pb.add_uniform(
                Visibility::FRAGMENT,
                SlType::Vec2,
                Precision::Default,
                "DstCopyCoordScale",
            );
            let frag_pos = pb.fragment_position();
            let top_left_name = pb.uniform_name(top_left).to_string();
            let scale_name = pb.uniform_name(scale).to_string();
            pb.fs
                .append_preamble("// Read color from copy of the destination.\n");
            pb.fs.append_preamble(&format!(
                "vec2 {DST_TEX_COORD_NAME} = ({frag_pos}.xy - {top_left_name}) * {scale_name};\n"
            ));
            if !top_left_origin {
                pb.fs.append_preamble(&format!(
                    "{DST_TEX_COORD_NAME}.y = 1.0 - {DST_TEX_COORD_NAME}.y;\n"
                ));
            }
            let lookup = pb.texture_lookup_expr(&sampler, DST_TEX_COORD_NAME);
            pb.fs
                .append_preamble(&format!("vec4 {DST_COLOR_NAME} = {lookup};\n"));
            pb.builtin.dst_copy_sampler = Some(sampler.uniform);
            pb.builtin.dst_copy_top_left = Some(top_left);
            pb.builtin.dst_copy_scale = Some(scale);
        });
    }

    /// Emit a helper function above `main()` in the fragment shader and
    /// return its mangled name.
    pub fn emit_function(
        &mut self,
        return_type: SlType,
        base_name: &str,
        args: &[ShaderVar],
        body: &str,
    ) -> String {
        let name = self.name_variable(None, base_name);
        self.fs_functions.push_str(return_type.glsl_string());
        self.fs_functions.push(' ');
        self.fs_functions.push_str(&name);
        self.fs_functions.push('(');
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.fs_functions.push_str(", ");
            }
            let mut decl = String::new();
            arg.append_decl(self.caps.generation, self.caps.es2, &mut decl);
            self.fs_functions.push_str(&decl);
        }
        self.fs_functions.push_str(") {\n");
        self.fs_functions.push_str(body);
        self.fs_functions.push_str("}\n\n");
        name
    }

    // -----------------------------------------------------------------------
    // The forward pass
    // -----------------------------------------------------------------------

    fn advance_stage(&mut self, declared: DeclaredReads) -> usize {
        let index = self.next_stage;
        self.next_stage += 1;
        self.current_stage = Some(StageState {
            index,
            declared,
            used_dst_color: false,
            used_frag_position: false,
        });
        index
    }

    fn exit_stage(&mut self) {
        self.current_stage = None;
    }

    /// Run `f` with the stage context suspended, so declarations made for
    /// framework helpers are named globally rather than per-stage.
    fn out_of_stage<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.current_stage.take();
        let result = f(self);
        self.current_stage = saved;
        result
    }

    fn verify_stage(&self, declared: DeclaredReads) {
        if let Some(stage) = &self.current_stage {
            debug_assert_eq!(
                stage.used_frag_position, declared.fragment_position,
                "fragment-position declaration does not match emitted code"
            );
            debug_assert_eq!(
                stage.used_dst_color, declared.dst_color,
                "dst-color declaration does not match emitted code"
            );
        }
    }

    fn emit_samplers(&mut self, textures: &[TextureAccess]) -> Vec<SamplerRef> {
        let mut out = Vec::with_capacity(textures.len());
        for (t, tex) in textures.iter().enumerate() {
            out.push(self.add_sampler(
                Visibility::FRAGMENT,
                SlType::Sampler2D,
                Precision::Default,
                &format!("Sampler{t}"),
                tex.format,
            ));
        }
        out
    }

    fn emit_primitive(
        &mut self,
        gp: &dyn PrimitiveProcessor,
        transforms: &[Vec<CoordTransform>],
    ) -> (Option<String>, Option<String>, TransformedCoords) {
        let declared = DeclaredReads {
            dst_color: false,
            fragment_position: gp.will_read_fragment_position(),
        };
        let stage = self.advance_stage(declared);
        debug!(
            stage,
            processor = class_name(gp.class_id()),
            "emitting primitive processor"
        );

        let out_color = self.name_variable(None, "outputColor");
        let out_coverage = self.name_variable(None, "outputCoverage");
        self.fs.append(&format!("vec4 {out_color};\n"));
        self.fs.append(&format!("vec4 {out_coverage};\n"));
        // Enclose the processor's code in a block so its locals need no
        // mangling; only names visible outside the block go through the
        // mangler.
        self.fs
            .append(&format!("{{ // Stage {stage}, {}\n", gp.name()));
        self.vs
            .append(&format!("// Primitive Processor {}\n", gp.name()));

        for attr in gp.attributes() {
            self.add_attribute(attr.ty, attr.name);
        }
        let samplers = self.emit_samplers(gp.textures());
        let args = PrimitiveEmitArgs {
            output_color: &out_color,
            output_coverage: &out_coverage,
            samplers: &samplers,
            transforms,
        };
        let coords = gp.emit_code(self, &args);

        self.verify_stage(declared);
        self.fs.append("}\n");
        self.exit_stage();

        let color = (!gp.color_is_opaque_white()).then_some(out_color);
        let coverage = (!gp.coverage_is_solid_white()).then_some(out_coverage);
        (color, coverage, coords)
    }

    fn emit_fragment(
        &mut self,
        fp: &dyn FragmentProcessor,
        input: Option<String>,
        coords: &[TransformedCoord],
    ) -> String {
        let declared = DeclaredReads {
            dst_color: fp.will_read_dst_color(),
            fragment_position: fp.will_read_fragment_position(),
        };
        let stage = self.advance_stage(declared);
        debug!(
            stage,
            processor = class_name(fp.class_id()),
            "emitting fragment processor"
        );

        let output = self.name_variable(None, "output");
        self.fs.append(&format!("vec4 {output};\n"));
        self.fs
            .append(&format!("{{ // Stage {stage}, {}\n", fp.name()));

        for (index, ty) in fp.attributes() {
            let name = format!("aAttr{index}");
            if self.add_attribute(ty, &name) {
                self.processor_attributes.push(AttributePair { index, name });
            }
        }
        let samplers = self.emit_samplers(fp.textures());
        let args = FragmentEmitArgs {
            output: &output,
            input: input.as_deref(),
            samplers: &samplers,
            coords,
        };
        fp.emit_code(self, &args);

        self.verify_stage(declared);
        self.fs.append("}\n");
        self.exit_stage();
        output
    }

    fn emit_transfer(
        &mut self,
        xp: &dyn TransferProcessor,
        color: Option<String>,
        coverage: Option<String>,
    ) {
        let declared = DeclaredReads {
            dst_color: xp.will_read_dst_color(),
            fragment_position: xp.will_read_fragment_position(),
        };
        let stage = self.advance_stage(declared);
        debug!(
            stage,
            processor = class_name(xp.class_id()),
            "emitting transfer processor"
        );

        if xp.has_secondary_output() {
            self.enable_secondary_output();
        }
        if self.caps.must_declare_fragment_output() {
            self.enable_custom_output();
        }

        self.fs.append(&format!(
            "{{ // Stage {stage}, Xfer Processor: {}\n",
            xp.name()
        ));
        let samplers = self.emit_samplers(xp.textures());
        let secondary = self
            .secondary_output
            .then(|| self.secondary_output_name());
        let args = TransferEmitArgs {
            input_color: color.as_deref().unwrap_or("vec4(1.0)"),
            input_coverage: coverage.as_deref().unwrap_or("vec4(1.0)"),
            primary_output: self.primary_output_name(),
            secondary_output: secondary,
            samplers: &samplers,
        };
        xp.emit_code(self, &args);

        self.verify_stage(declared);
        self.fs.append("}\n");
        self.exit_stage();
    }

    fn primary_output_name(&self) -> &'static str {
        if self.custom_output {
            PRIMARY_COLOR_OUTPUT_NAME
        } else {
            "gl_FragColor"
        }
    }

    fn secondary_output_name(&self) -> &'static str {
        if self.caps.must_declare_fragment_output() {
            SECONDARY_COLOR_OUTPUT_NAME
        } else {
            "gl_SecondaryFragColorEXT"
        }
    }

    fn enable_custom_output(&mut self) {
        if !self.custom_output {
            self.custom_output = true;
            self.fs_outputs.push(ShaderVar::new(
                PRIMARY_COLOR_OUTPUT_NAME,
                SlType::Vec4,
                TypeModifier::VaryingOut,
            ));
        }
    }

    fn enable_secondary_output(&mut self) {
        if !self.secondary_output {
            self.secondary_output = true;
            if self.caps.must_declare_fragment_output() {
                self.fs_outputs.push(ShaderVar::new(
                    SECONDARY_COLOR_OUTPUT_NAME,
                    SlType::Vec4,
                    TypeModifier::VaryingOut,
                ));
            } else {
                self.enable_feature(Feature::BlendFuncExtended);
            }
        }
    }

    fn append_uniform_decls(&self, visibility: Visibility, out: &mut String) {
        for uniform in &self.uniforms {
            if uniform.visibility.intersects(visibility) {
                uniform
                    .var
                    .append_decl(self.caps.generation, self.caps.es2, out);
                out.push_str(";\n");
            }
        }
    }

    fn finish(self, key: ProgramKey) -> AssembledProgram {
        let gen = self.caps.generation;
        let es2 = self.caps.es2;

        let mut vertex = String::from(gen.version_decl(es2));
        self.append_uniform_decls(Visibility::VERTEX, &mut vertex);
        append_decls(&self.vs_attrs, gen, es2, &mut vertex);
        append_decls(&self.vs_outputs, gen, es2, &mut vertex);
        self.vs.write_main(&mut vertex);

        let geometry = if self.uses_gs {
            let mut source = String::from(gen.version_decl(es2));
            source.push_str(&format!("layout({}) in;\n", self.gs_layout.input.glsl_string()));
            source.push_str(&format!(
                "layout({}, max_vertices = {}) out;\n",
                self.gs_layout.output.glsl_string(),
                self.gs_layout.max_vertices
            ));
            append_decls(&self.gs_inputs, gen, es2, &mut source);
            append_decls(&self.gs_outputs, gen, es2, &mut source);
            self.gs.write_main(&mut source);
            Some(source)
        } else {
            None
        };

        let mut fragment = String::from(gen.version_decl(es2));
        fragment.push_str(&self.fs_extensions);
        if es2 {
            fragment.push_str("precision mediump float;\n");
        }
        self.append_uniform_decls(Visibility::FRAGMENT, &mut fragment);
        append_decls(&self.fs_inputs, gen, es2, &mut fragment);
        append_decls(&self.fs_outputs, gen, es2, &mut fragment);
        fragment.push_str(&self.fs_functions);
        self.fs.write_main(&mut fragment);

        let attributes = self.vs_attrs.iter().map(|a| a.name.clone()).collect();
        AssembledProgram {
            key,
            vertex,
            geometry,
            fragment,
            uniforms: self.uniforms,
            attributes,
            processor_attributes: self.processor_attributes,
            samplers: self.samplers,
            builtin: self.builtin,
            has_custom_output: self.custom_output,
            has_secondary_output: self.secondary_output,
        }
    }
}

fn coord_slice(coords: &TransformedCoords, index: usize) -> &[TransformedCoord] {
    coords.0.get(index).map(Vec::as_slice).unwrap_or(&[])
}

fn feature_bit(feature: Feature) -> u32 {
    match feature {
        Feature::StandardDerivatives => 0,
        Feature::FragCoordConventions => 1,
        Feature::FbFetchExt => 2,
        Feature::FbFetchNv => 3,
        Feature::BlendFuncExtended => 4,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::caps::{FbFetchType, SurfaceOrigin};
    use crate::effects::{BlendMode, DstReadBlendTransfer, QuadProcessor, SrcOverTransfer};
    use crate::factory::FIRST_USER_CLASS_ID;
    use crate::key::KeyBuilder;

    fn pipeline_of(
        color: Vec<Box<dyn FragmentProcessor>>,
        coverage: Vec<Box<dyn FragmentProcessor>>,
        transfer: Box<dyn TransferProcessor>,
    ) -> PipelineDesc {
        PipelineDesc {
            primitive: Box::new(QuadProcessor::new()),
            color,
            coverage,
            transfer,
        }
    }

    fn simple_pipeline() -> PipelineDesc {
        pipeline_of(Vec::new(), Vec::new(), Box::new(SrcOverTransfer::default()))
    }

    /// Declares one uniform named "common" and forwards it.
    struct NamedUniformFp;

    impl crate::processor::Processor for NamedUniformFp {
        fn name(&self) -> &'static str {
            "NamedUniformFp"
        }
        fn class_id(&self) -> u32 {
            FIRST_USER_CLASS_ID
        }
        fn gen_key(&self, _caps: &GlslCaps, _b: &mut KeyBuilder<'_>) {}
    }

    impl FragmentProcessor for NamedUniformFp {
        fn emit_code(&self, pb: &mut ProgramBuilder<'_>, args: &FragmentEmitArgs<'_>) {
            let handle = pb.add_uniform(
                Visibility::FRAGMENT,
                SlType::Vec4,
                Precision::Default,
                "common",
            );
            let name = pb.uniform_name(handle).to_string();
            pb.fs_code(&format!("{} = {name};\n", args.output));
        }
    }

    /// Reads the fragment position, with the read declared.
    struct FragPosFp;

    impl crate::processor::Processor for FragPosFp {
        fn name(&self) -> &'static str {
            "FragPosFp"
        }
        fn class_id(&self) -> u32 {
            FIRST_USER_CLASS_ID + 1
        }
        fn gen_key(&self, _caps: &GlslCaps, _b: &mut KeyBuilder<'_>) {}
    }

    impl FragmentProcessor for FragPosFp {
        fn will_read_fragment_position(&self) -> bool {
            true
        }
        fn emit_code(&self, pb: &mut ProgramBuilder<'_>, args: &FragmentEmitArgs<'_>) {
            let pos = pb.fragment_position();
            pb.fs_code(&format!("{} = vec4({pos}.xy, 0.0, 1.0);\n", args.output));
        }
    }

    /// Reads the destination color without declaring the read.
    struct UndeclaredDstFp;

    impl crate::processor::Processor for UndeclaredDstFp {
        fn name(&self) -> &'static str {
            "UndeclaredDstFp"
        }
        fn class_id(&self) -> u32 {
            FIRST_USER_CLASS_ID + 2
        }
        fn gen_key(&self, _caps: &GlslCaps, _b: &mut KeyBuilder<'_>) {}
    }

    impl FragmentProcessor for UndeclaredDstFp {
        fn emit_code(&self, pb: &mut ProgramBuilder<'_>, args: &FragmentEmitArgs<'_>) {
            let dst = pb.dst_color();
            let dst = if dst.is_empty() { "vec4(0.0)".to_string() } else { dst };
            pb.fs_code(&format!("{} = {dst};\n", args.output));
        }
    }

    /// Requests the standard-derivatives feature twice.
    struct DerivativesFp;

    impl crate::processor::Processor for DerivativesFp {
        fn name(&self) -> &'static str {
            "DerivativesFp"
        }
        fn class_id(&self) -> u32 {
            FIRST_USER_CLASS_ID + 3
        }
        fn gen_key(&self, _caps: &GlslCaps, _b: &mut KeyBuilder<'_>) {}
    }

    impl FragmentProcessor for DerivativesFp {
        fn emit_code(&self, pb: &mut ProgramBuilder<'_>, args: &FragmentEmitArgs<'_>) {
            assert!(pb.enable_feature(Feature::StandardDerivatives));
            assert!(pb.enable_feature(Feature::StandardDerivatives));
            pb.fs_code(&format!("{} = vec4(1.0);\n", args.output));
        }
    }

    /// Passes color through while claiming a configurable texture count.
    struct MultiTexFp {
        textures: Vec<TextureAccess>,
    }

    impl MultiTexFp {
        fn with_texture_count(count: usize) -> Self {
            Self {
                textures: vec![
                    TextureAccess {
                        format: PixelFormat::Rgba8
                    };
                    count
                ],
            }
        }
    }

    impl crate::processor::Processor for MultiTexFp {
        fn name(&self) -> &'static str {
            "MultiTexFp"
        }
        fn class_id(&self) -> u32 {
            FIRST_USER_CLASS_ID + 4
        }
        fn gen_key(&self, _caps: &GlslCaps, _b: &mut KeyBuilder<'_>) {}
        fn textures(&self) -> &[TextureAccess] {
            &self.textures
        }
    }

    impl FragmentProcessor for MultiTexFp {
        fn emit_code(&self, pb: &mut ProgramBuilder<'_>, args: &FragmentEmitArgs<'_>) {
            let input = args.input.unwrap_or("vec4(1.0)");
            pb.fs_code(&format!("{} = {input};\n", args.output));
        }
    }

    /// Emits a helper function and routes the input through it.
    struct HelperFnFp;

    impl crate::processor::Processor for HelperFnFp {
        fn name(&self) -> &'static str {
            "HelperFnFp"
        }
        fn class_id(&self) -> u32 {
            FIRST_USER_CLASS_ID + 5
        }
        fn gen_key(&self, _caps: &GlslCaps, _b: &mut KeyBuilder<'_>) {}
    }

    impl FragmentProcessor for HelperFnFp {
        fn emit_code(&self, pb: &mut ProgramBuilder<'_>, args: &FragmentEmitArgs<'_>) {
            let tint = pb.emit_function(
                SlType::Vec4,
                "tint",
                &[ShaderVar::new("c", SlType::Vec4, TypeModifier::None)],
                "return 0.5 * c;\n",
            );
            let input = args.input.unwrap_or("vec4(1.0)");
            pb.fs_code(&format!("{} = {tint}({input});\n", args.output));
        }
    }

    /// Reads source attribute 2 through a varying.
    struct AttribFp;

    impl crate::processor::Processor for AttribFp {
        fn name(&self) -> &'static str {
            "AttribFp"
        }
        fn class_id(&self) -> u32 {
            FIRST_USER_CLASS_ID + 6
        }
        fn gen_key(&self, _caps: &GlslCaps, _b: &mut KeyBuilder<'_>) {}
    }

    impl FragmentProcessor for AttribFp {
        fn attributes(&self) -> Vec<(usize, SlType)> {
            vec![(2, SlType::Vec4)]
        }
        fn emit_code(&self, pb: &mut ProgramBuilder<'_>, args: &FragmentEmitArgs<'_>) {
            let attr = pb.attribute_name(2).unwrap().to_string();
            let varying = pb.add_varying(SlType::Vec4, "AttrValue", Precision::Default);
            pb.vs_code(&format!("{} = {attr};\n", varying.vs_out));
            pb.fs_code(&format!("{} = {};\n", args.output, varying.fs_in));
        }
    }

    #[test]
    fn helper_functions_land_above_main() {
        let caps = GlslCaps::default();
        let pipeline = pipeline_of(
            vec![Box::new(HelperFnFp)],
            Vec::new(),
            Box::new(SrcOverTransfer::default()),
        );
        let assembled =
            ProgramBuilder::assemble(&pipeline, &caps, &DrawTarget::top_left()).unwrap();
        let function = assembled.fragment.find("vec4 tint_Stage1(vec4 c) {").unwrap();
        let main = assembled.fragment.find("void main()").unwrap();
        assert!(function < main);
        assert!(assembled.fragment.contains("tint_Stage1("));
    }

    #[test]
    fn fragment_processor_attributes_declare_once_by_source_index() {
        let caps = GlslCaps::default();
        let pipeline = pipeline_of(
            vec![Box::new(AttribFp), Box::new(AttribFp)],
            Vec::new(),
            Box::new(SrcOverTransfer::default()),
        );
        let assembled =
            ProgramBuilder::assemble(&pipeline, &caps, &DrawTarget::top_left()).unwrap();
        let decls = assembled.vertex.matches("in vec4 aAttr2;").count();
        assert_eq!(decls, 1);
        let pairs: Vec<_> = assembled
            .processor_attributes
            .iter()
            .map(|a| (a.index, a.name.as_str()))
            .collect();
        assert_eq!(pairs, vec![(2, "aAttr2")]);
    }

    #[test]
    fn same_base_name_mangles_uniquely_per_stage() {
        let caps = GlslCaps::default();
        let pipeline = pipeline_of(
            vec![
                Box::new(NamedUniformFp),
                Box::new(NamedUniformFp),
                Box::new(NamedUniformFp),
            ],
            Vec::new(),
            Box::new(SrcOverTransfer::default()),
        );
        let assembled =
            ProgramBuilder::assemble(&pipeline, &caps, &DrawTarget::top_left()).unwrap();
        let names: Vec<&str> = assembled
            .uniforms
            .iter()
            .map(|u| u.var.name.as_str())
            .filter(|n| n.contains("common"))
            .collect();
        assert_eq!(names.len(), 3);
        let distinct: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(distinct.len(), 3);
        assert!(names.contains(&"ucommon_Stage1"));
        assert!(names.contains(&"ucommon_Stage3"));
    }

    #[test]
    fn trailing_underscore_gets_disambiguated() {
        let caps = GlslCaps::default();
        let target = DrawTarget::top_left();
        let pipeline = simple_pipeline();
        let mut pb = ProgramBuilder::new(&pipeline, &caps, &target);
        pb.advance_stage(DeclaredReads::default());
        assert_eq!(pb.name_variable(Some('u'), "coord_"), "ucoord_x_Stage0");
        assert_eq!(pb.name_variable(None, "plain"), "plain_Stage0");
        pb.exit_stage();
        assert_eq!(pb.name_variable(Some('u'), "coord_"), "ucoord_");
    }

    #[test]
    fn attribute_declaration_is_idempotent() {
        let caps = GlslCaps::default();
        let target = DrawTarget::top_left();
        let pipeline = simple_pipeline();
        let mut pb = ProgramBuilder::new(&pipeline, &caps, &target);
        assert!(pb.add_attribute(SlType::Vec2, "aPosition"));
        assert!(!pb.add_attribute(SlType::Vec2, "aPosition"));
        assert_eq!(pb.vs_attrs.len(), 1);
    }

    #[test]
    fn multi_stage_uniform_takes_shared_precision() {
        let caps = GlslCaps::default();
        let target = DrawTarget::top_left();
        let pipeline = simple_pipeline();
        let mut pb = ProgramBuilder::new(&pipeline, &caps, &target);
        let shared = pb.add_uniform(
            Visibility::VERTEX | Visibility::FRAGMENT,
            SlType::Vec4,
            Precision::High,
            "Shared",
        );
        assert_eq!(pb.uniforms[shared.index()].var.precision, Precision::Medium);
        let frag_only = pb.add_uniform(
            Visibility::FRAGMENT,
            SlType::Vec4,
            Precision::High,
            "FragOnly",
        );
        assert_eq!(pb.uniforms[frag_only.index()].var.precision, Precision::High);
    }

    #[test]
    fn varying_uses_vertex_name_without_geometry_stage() {
        let caps = GlslCaps::default();
        let pipeline = PipelineDesc {
            primitive: Box::new(QuadProcessor {
                per_vertex_color: true,
                ..QuadProcessor::default()
            }),
            color: Vec::new(),
            coverage: Vec::new(),
            transfer: Box::new(SrcOverTransfer::default()),
        };
        let assembled =
            ProgramBuilder::assemble(&pipeline, &caps, &DrawTarget::top_left()).unwrap();
        assert!(assembled.geometry.is_none());
        assert!(assembled.vertex.contains("out vec4 vColor_Stage0;"));
        assert!(assembled.fragment.contains("in vec4 vColor_Stage0;"));
    }

    #[test]
    fn varying_threads_through_geometry_stage() {
        let caps = GlslCaps {
            generation: GlslGeneration::V150,
            ..GlslCaps::default()
        };
        let pipeline = PipelineDesc {
            primitive: Box::new(QuadProcessor {
                per_vertex_color: true,
                use_geometry_shader: true,
                ..QuadProcessor::default()
            }),
            color: Vec::new(),
            coverage: Vec::new(),
            transfer: Box::new(SrcOverTransfer::default()),
        };
        let assembled =
            ProgramBuilder::assemble(&pipeline, &caps, &DrawTarget::top_left()).unwrap();
        let geometry = assembled.geometry.as_deref().unwrap();
        assert!(geometry.contains("in vec4 vColor_Stage0[];"));
        assert!(geometry.contains("out vec4 gColor_Stage0;"));
        assert!(geometry.contains("gColor_Stage0 = vColor_Stage0[i];"));
        // The fragment stage consumes the geometry output, not the vertex
        // output.
        assert!(assembled.fragment.contains("in vec4 gColor_Stage0;"));
        assert!(!assembled.fragment.contains("vColor_Stage0"));
    }

    #[test]
    fn native_frag_coord_on_top_left_target() {
        let caps = GlslCaps::default();
        let pipeline = pipeline_of(
            vec![Box::new(FragPosFp)],
            Vec::new(),
            Box::new(SrcOverTransfer::default()),
        );
        let assembled =
            ProgramBuilder::assemble(&pipeline, &caps, &DrawTarget::top_left()).unwrap();
        assert!(assembled.fragment.contains("gl_FragCoord"));
        assert!(!assembled.fragment.contains("uRTHeight"));
        assert!(!assembled.fragment.contains("origin_upper_left"));
    }

    #[test]
    fn origin_qualifier_when_conventions_supported() {
        let caps = GlslCaps::default();
        let pipeline = pipeline_of(
            vec![Box::new(FragPosFp)],
            Vec::new(),
            Box::new(SrcOverTransfer::default()),
        );
        let assembled =
            ProgramBuilder::assemble(&pipeline, &caps, &DrawTarget::bottom_left()).unwrap();
        assert!(assembled
            .fragment
            .contains("#extension GL_ARB_fragment_coord_conventions: require"));
        assert!(assembled
            .fragment
            .contains("layout(origin_upper_left) in vec4 gl_FragCoord;"));
        assert!(!assembled.fragment.contains("uRTHeight"));
    }

    #[test]
    fn rt_height_flip_lands_in_preamble() {
        let caps = GlslCaps {
            frag_coord_conventions_support: false,
            ..GlslCaps::default()
        };
        let pipeline = pipeline_of(
            vec![Box::new(FragPosFp)],
            Vec::new(),
            Box::new(SrcOverTransfer::default()),
        );
        let assembled =
            ProgramBuilder::assemble(&pipeline, &caps, &DrawTarget::bottom_left()).unwrap();
        assert!(assembled.fragment.contains("uniform float uRTHeight;"));
        let definition = assembled
            .fragment
            .find("vec4 fragCoordYDown = vec4(gl_FragCoord.x, uRTHeight - gl_FragCoord.y")
            .unwrap();
        // The flip was requested from stage 1, yet its definition precedes
        // every stage block.
        let first_stage_block = assembled.fragment.find("{ // Stage 0").unwrap();
        assert!(definition < first_stage_block);
        assert!(assembled.builtin.rt_height.is_some());
    }

    #[test]
    fn feature_pragma_is_emitted_once() {
        let caps = GlslCaps {
            generation: GlslGeneration::V110,
            es2: true,
            ..GlslCaps::default()
        };
        let pipeline = pipeline_of(
            vec![Box::new(DerivativesFp)],
            Vec::new(),
            Box::new(SrcOverTransfer::default()),
        );
        let assembled =
            ProgramBuilder::assemble(&pipeline, &caps, &DrawTarget::top_left()).unwrap();
        let pragmas = assembled
            .fragment
            .matches("GL_OES_standard_derivatives")
            .count();
        assert_eq!(pragmas, 1);
    }

    #[test]
    fn texture_budget_rejection() {
        let caps = GlslCaps {
            max_fragment_texture_units: 4,
            ..GlslCaps::default()
        };
        let pipeline = pipeline_of(
            vec![Box::new(MultiTexFp::with_texture_count(4))],
            Vec::new(),
            Box::new(SrcOverTransfer::default()),
        );
        let err = ProgramBuilder::assemble(&pipeline, &caps, &DrawTarget::top_left()).unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::CapacityExceeded { required: 4, max: 4 }
        ));

        let ok = pipeline_of(
            vec![Box::new(MultiTexFp::with_texture_count(3))],
            Vec::new(),
            Box::new(SrcOverTransfer::default()),
        );
        assert!(ProgramBuilder::assemble(&ok, &caps, &DrawTarget::top_left()).is_ok());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "without declaring it")]
    fn dst_color_without_declaration_panics_in_debug() {
        let caps = GlslCaps::default();
        let pipeline = pipeline_of(
            vec![Box::new(UndeclaredDstFp)],
            Vec::new(),
            Box::new(SrcOverTransfer::default()),
        );
        let _ = ProgramBuilder::assemble(&pipeline, &caps, &DrawTarget::top_left());
    }

    #[test]
    fn dst_copy_fallback_declares_two_uniforms_and_one_sampler() {
        let caps = GlslCaps::default();
        let target = DrawTarget::bottom_left().with_dst_copy(DstCopyDesc {
            origin: SurfaceOrigin::TopLeft,
            format: PixelFormat::Rgba8,
        });
        let pipeline = pipeline_of(
            Vec::new(),
            Vec::new(),
            Box::new(DstReadBlendTransfer {
                mode: BlendMode::SrcOver,
            }),
        );
        let assembled = ProgramBuilder::assemble(&pipeline, &caps, &target).unwrap();
        let names: Vec<&str> = assembled
            .uniforms
            .iter()
            .map(|u| u.var.name.as_str())
            .collect();
        assert!(names.contains(&"uDstCopySampler"));
        assert!(names.contains(&"uDstCopyUpperLeft"));
        assert!(names.contains(&"uDstCopyCoordScale"));
        assert_eq!(assembled.samplers.len(), 1);
        assert!(assembled
            .fragment
            .contains("vec4 _dstColor = texture(uDstCopySampler, _dstTexCoord);"));
        // The copy texture is stored top-left, so no V-flip.
        assert!(!assembled.fragment.contains("_dstTexCoord.y = 1.0 -"));
        assert!(assembled.builtin.dst_copy_sampler.is_some());
        assert!(assembled.builtin.dst_copy_top_left.is_some());
        assert!(assembled.builtin.dst_copy_scale.is_some());
    }

    #[test]
    fn dst_copy_flips_for_bottom_left_copy_texture() {
        let caps = GlslCaps::default();
        let target = DrawTarget::bottom_left().with_dst_copy(DstCopyDesc {
            origin: SurfaceOrigin::BottomLeft,
            format: PixelFormat::Rgba8,
        });
        let pipeline = pipeline_of(
            Vec::new(),
            Vec::new(),
            Box::new(DstReadBlendTransfer {
                mode: BlendMode::SrcOver,
            }),
        );
        let assembled = ProgramBuilder::assemble(&pipeline, &caps, &target).unwrap();
        assert!(assembled
            .fragment
            .contains("_dstTexCoord.y = 1.0 - _dstTexCoord.y;"));
    }

    #[test]
    fn fb_fetch_reads_builtin_without_extra_resources() {
        let caps = GlslCaps {
            fb_fetch: FbFetchType::Ext,
            ..GlslCaps::default()
        };
        let pipeline = pipeline_of(
            Vec::new(),
            Vec::new(),
            Box::new(DstReadBlendTransfer {
                mode: BlendMode::Multiply,
            }),
        );
        let assembled =
            ProgramBuilder::assemble(&pipeline, &caps, &DrawTarget::top_left()).unwrap();
        assert!(assembled.fragment.contains("gl_LastFragData[0]"));
        assert!(assembled
            .fragment
            .contains("#extension GL_EXT_shader_framebuffer_fetch: require"));
        assert!(!assembled
            .uniforms
            .iter()
            .any(|u| u.var.name.starts_with("uDstCopy")));
    }

    #[test]
    fn custom_output_declared_on_modern_glsl() {
        let caps = GlslCaps::default();
        let assembled =
            ProgramBuilder::assemble(&simple_pipeline(), &caps, &DrawTarget::top_left()).unwrap();
        assert!(assembled.has_custom_output);
        assert!(assembled.fragment.contains("out vec4 fsColorOut;"));
        assert!(assembled.fragment.contains("fsColorOut = "));
    }

    #[test]
    fn legacy_glsl_writes_gl_fragcolor() {
        let caps = GlslCaps {
            generation: GlslGeneration::V110,
            ..GlslCaps::default()
        };
        let assembled =
            ProgramBuilder::assemble(&simple_pipeline(), &caps, &DrawTarget::top_left()).unwrap();
        assert!(!assembled.has_custom_output);
        assert!(assembled.fragment.contains("gl_FragColor = "));
        assert!(!assembled.fragment.contains("fsColorOut"));
    }

    #[test]
    fn dual_source_secondary_output_is_declared() {
        let caps = GlslCaps::default();
        let pipeline = pipeline_of(
            Vec::new(),
            Vec::new(),
            Box::new(SrcOverTransfer {
                dual_source_coverage: true,
            }),
        );
        let assembled =
            ProgramBuilder::assemble(&pipeline, &caps, &DrawTarget::top_left()).unwrap();
        assert!(assembled.has_secondary_output);
        assert!(assembled.fragment.contains("out vec4 fsSecondaryColorOut;"));
        assert!(assembled.fragment.contains("fsSecondaryColorOut = "));
    }
}
