//! Assemble a representative pipeline offline and print the generated GLSL
//! plus the structural key. No GL context required; useful for eyeballing
//! what the assembler emits under different capability snapshots.
//!
//! Run with `RUST_LOG=shadergen_core=debug` to watch the pass.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use shadergen_core::builder::ProgramBuilder;
use shadergen_core::caps::{GlslCaps, SurfaceOrigin};
use shadergen_core::effects::{
    BlendMode, CoverageScaleProcessor, DstReadBlendTransfer, QuadProcessor, TextureColorProcessor,
};
use shadergen_core::factory;
use shadergen_core::pipeline::{DrawTarget, DstCopyDesc, PipelineDesc};
use shadergen_core::resources::PixelFormat;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("stock processor classes:");
    for (id, name) in factory::stock_classes() {
        println!("  {id:#06x} {name}");
    }
    println!();

    let pipeline = PipelineDesc {
        primitive: Box::new(QuadProcessor {
            explicit_local_coords: true,
            per_vertex_color: true,
            use_geometry_shader: false,
        }),
        color: vec![Box::new(TextureColorProcessor::new(PixelFormat::Rgba8))],
        coverage: vec![Box::new(CoverageScaleProcessor { invert: false })],
        transfer: Box::new(DstReadBlendTransfer {
            mode: BlendMode::SrcOver,
        }),
    };

    let caps = GlslCaps::default();
    let target = DrawTarget::bottom_left().with_dst_copy(DstCopyDesc {
        origin: SurfaceOrigin::TopLeft,
        format: PixelFormat::Rgba8,
    });

    let assembled = ProgramBuilder::assemble(&pipeline, &caps, &target)?;

    println!("key: {}", assembled.key.to_hex());
    println!();
    println!("// ---- vertex ----");
    println!("{}", assembled.vertex);
    if let Some(geometry) = &assembled.geometry {
        println!("// ---- geometry ----");
        println!("{geometry}");
    }
    println!("// ---- fragment ----");
    println!("{}", assembled.fragment);

    println!("// ---- resources ----");
    for (index, uniform) in assembled.uniforms.iter().enumerate() {
        println!(
            "// uniform[{index}] {} ({:?})",
            uniform.var.name, uniform.var.ty
        );
    }
    for (location, name) in assembled.attributes.iter().enumerate() {
        println!("// attribute[{location}] {name}");
    }

    Ok(())
}
