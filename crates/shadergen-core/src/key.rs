//! Structural program keys.
//!
//! A key is a pure function of the capability-derived feature bits and each
//! processor's own key contribution, in pipeline order. Two pipelines with
//! equal keys are interchangeable except for per-draw uniform values, so the
//! key is what the compiled-program cache indexes by.

use crate::caps::{FbFetchType, GlslCaps, SurfaceOrigin};
use crate::pipeline::{DrawTarget, PipelineDesc};
use crate::processor::{CoordTransform, Processor, TransformSource};
use crate::resources::swizzle_requires_alpha_remapping;
use crate::glsl::SlType;

/// How destination-color reads will be emitted for a pipeline, fixed before
/// emission starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstReadStrategy {
    /// No processor reads the destination color.
    None,
    /// `gl_LastFragData[0]` via `GL_EXT_shader_framebuffer_fetch`.
    FbFetchExt,
    /// `gl_LastFragData[0]` via `GL_NV_shader_framebuffer_fetch`.
    FbFetchNv,
    /// Sample a copy of the destination. Both fields change emitted code:
    /// `alpha_only` forces a shader-side swizzle, `top_left_origin` decides
    /// the V-flip.
    CopyTexture {
        alpha_only: bool,
        top_left_origin: bool,
    },
}

impl DstReadStrategy {
    pub fn key_bits(self) -> u32 {
        match self {
            DstReadStrategy::None => 0,
            DstReadStrategy::FbFetchExt => 0x1,
            DstReadStrategy::FbFetchNv => 0x2,
            DstReadStrategy::CopyTexture {
                alpha_only,
                top_left_origin,
            } => 0x3 | (alpha_only as u32) << 2 | (top_left_origin as u32) << 3,
        }
    }
}

/// How `fragment_position()` will be satisfied for a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragPosStrategy {
    /// Nothing in the pipeline reads the fragment position.
    None,
    /// `gl_FragCoord` already has the required origin.
    TopLeftNative,
    /// `gl_FragCoord` redeclared with `layout(origin_upper_left)`.
    OriginQualifier,
    /// Synthesized `renderTargetHeight - y` flip in the preamble.
    RtHeightFlip,
}

impl FragPosStrategy {
    pub fn key_bits(self) -> u32 {
        match self {
            FragPosStrategy::None => 0,
            FragPosStrategy::TopLeftNative => 1,
            FragPosStrategy::OriginQualifier => 2,
            FragPosStrategy::RtHeightFlip => 3,
        }
    }
}

/// Resolve the dst-read strategy for one build.
pub fn dst_read_strategy(
    pipeline: &PipelineDesc,
    caps: &GlslCaps,
    target: &DrawTarget,
) -> DstReadStrategy {
    if !pipeline.reads_dst_color() {
        return DstReadStrategy::None;
    }
    match caps.fb_fetch {
        FbFetchType::Ext => DstReadStrategy::FbFetchExt,
        FbFetchType::Nv => DstReadStrategy::FbFetchNv,
        FbFetchType::None => {
            // A dst-reading pipeline without framebuffer fetch needs the
            // caller to have staged a copy of the destination.
            debug_assert!(
                target.dst_copy.is_some(),
                "pipeline reads dst color but no destination copy was provided"
            );
            let copy = target.dst_copy.unwrap_or(crate::pipeline::DstCopyDesc {
                origin: SurfaceOrigin::TopLeft,
                format: crate::resources::PixelFormat::Rgba8,
            });
            DstReadStrategy::CopyTexture {
                alpha_only: swizzle_requires_alpha_remapping(copy.format, caps),
                top_left_origin: copy.origin == SurfaceOrigin::TopLeft,
            }
        }
    }
}

/// Resolve the fragment-position strategy for one build. The destination-copy
/// fallback reads the fragment position itself, so it forces a strategy even
/// when no processor declared the read.
pub fn frag_pos_strategy(
    pipeline: &PipelineDesc,
    caps: &GlslCaps,
    target: &DrawTarget,
    dst_read: DstReadStrategy,
) -> FragPosStrategy {
    let reads = pipeline.declares_fragment_position_read()
        || matches!(dst_read, DstReadStrategy::CopyTexture { .. });
    if !reads {
        return FragPosStrategy::None;
    }
    if target.origin == SurfaceOrigin::TopLeft {
        FragPosStrategy::TopLeftNative
    } else if caps.frag_coord_conventions_support {
        FragPosStrategy::OriginQualifier
    } else {
        FragPosStrategy::RtHeightFlip
    }
}

/// The byte sequence identifying a program's code shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    bytes: Vec<u8>,
}

impl ProgramKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.bytes.len() * 2);
        for b in &self.bytes {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }
}

/// Appends key words on behalf of one processor. Handed to `gen_key` so
/// processors never see the surrounding key layout.
pub struct KeyBuilder<'a> {
    bytes: &'a mut Vec<u8>,
}

impl<'a> KeyBuilder<'a> {
    pub fn new(bytes: &'a mut Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn add32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn add_bytes(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encodes the shape of a fragment processor's transform requests: count plus
/// two bits per transform (perspective type, source coords).
fn transform_key(transforms: &[CoordTransform]) -> u32 {
    debug_assert!(transforms.len() <= 12, "too many coord transforms for key");
    let mut bits = (transforms.len() as u32) << 24;
    for (i, t) in transforms.iter().enumerate() {
        let mut k = 0u32;
        if t.ty == SlType::Vec3 {
            k |= 0x1;
        }
        if t.source == TransformSource::Position {
            k |= 0x2;
        }
        bits |= k << (2 * i);
    }
    bits
}

/// One processor's contribution: its own `gen_key` words, a swizzle-remap
/// word per texture, then a self-delimiting meta word (class id in the high
/// half, contribution length in bytes in the low half) and the transform key.
fn add_processor_key<P: Processor + ?Sized>(
    bytes: &mut Vec<u8>,
    proc: &P,
    caps: &GlslCaps,
    transforms: u32,
) {
    let start = bytes.len();
    {
        let mut b = KeyBuilder::new(bytes);
        proc.gen_key(caps, &mut b);
        for tex in proc.textures() {
            b.add32(swizzle_requires_alpha_remapping(tex.format, caps) as u32);
        }
    }
    let len = bytes.len() - start;
    let class_id = proc.class_id();
    debug_assert!(class_id <= 0xFFFF, "processor class id does not fit the meta word");
    debug_assert!(len <= 0xFFFF, "processor key contribution too large");
    let mut b = KeyBuilder::new(bytes);
    b.add32((class_id << 16) | len as u32);
    b.add32(transforms);
}

/// Build the structural key for `pipeline` under `caps`/`target`.
///
/// Layout, in fixed order: dst-read strategy bits, fragment-position strategy
/// bits, color and coverage processor counts, then each processor's
/// contribution in pipeline order (primitive, colors, coverages, transfer).
pub fn build_key(pipeline: &PipelineDesc, caps: &GlslCaps, target: &DrawTarget) -> ProgramKey {
    let dst_read = dst_read_strategy(pipeline, caps, target);
    let frag_pos = frag_pos_strategy(pipeline, caps, target, dst_read);

    let mut bytes = Vec::new();
    {
        let mut b = KeyBuilder::new(&mut bytes);
        b.add32(dst_read.key_bits());
        b.add32(frag_pos.key_bits());
        b.add32(pipeline.color.len() as u32);
        b.add32(pipeline.coverage.len() as u32);
    }

    add_processor_key(&mut bytes, pipeline.primitive.as_ref(), caps, 0);
    for fp in pipeline.fragment_processors() {
        let tk = transform_key(&fp.coord_transforms());
        add_processor_key(&mut bytes, fp, caps, tk);
    }
    add_processor_key(&mut bytes, pipeline.transfer.as_ref(), caps, 0);

    ProgramKey { bytes }
}
