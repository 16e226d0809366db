//! The ordered pipeline descriptor handed to one assembly pass.

use crate::caps::SurfaceOrigin;
use crate::processor::{FragmentProcessor, PrimitiveProcessor, TransferProcessor};
use crate::resources::PixelFormat;

/// A complete shading pipeline: exactly one primitive processor, ordered
/// color and coverage fragment processors, exactly one transfer processor.
pub struct PipelineDesc {
    pub primitive: Box<dyn PrimitiveProcessor>,
    pub color: Vec<Box<dyn FragmentProcessor>>,
    pub coverage: Vec<Box<dyn FragmentProcessor>>,
    pub transfer: Box<dyn TransferProcessor>,
}

impl PipelineDesc {
    /// Color processors followed by coverage processors, the order transform
    /// lists and stage indices use.
    pub fn fragment_processors(&self) -> impl Iterator<Item = &dyn FragmentProcessor> {
        self.color
            .iter()
            .chain(self.coverage.iter())
            .map(|p| p.as_ref())
    }

    /// Whether any processor declared a destination-color read.
    pub fn reads_dst_color(&self) -> bool {
        self.fragment_processors().any(|p| p.will_read_dst_color())
            || self.transfer.will_read_dst_color()
    }

    /// Whether any processor declared a fragment-position read. The
    /// destination-copy fallback adds its own read on top of this; see
    /// `key::frag_pos_strategy`.
    pub fn declares_fragment_position_read(&self) -> bool {
        self.primitive.will_read_fragment_position()
            || self
                .fragment_processors()
                .any(|p| p.will_read_fragment_position())
            || self.transfer.will_read_fragment_position()
    }
}

/// The destination-copy texture available for emulated dst reads.
#[derive(Debug, Clone, Copy)]
pub struct DstCopyDesc {
    /// Storage origin of the copy texture itself. The emulated read V-flips
    /// when this is bottom-left, regardless of the render target's origin.
    pub origin: SurfaceOrigin,
    pub format: PixelFormat,
}

/// The render target this pipeline draws into.
#[derive(Debug, Clone, Copy)]
pub struct DrawTarget {
    pub origin: SurfaceOrigin,
    pub dst_copy: Option<DstCopyDesc>,
}

impl DrawTarget {
    pub fn top_left() -> Self {
        Self {
            origin: SurfaceOrigin::TopLeft,
            dst_copy: None,
        }
    }

    pub fn bottom_left() -> Self {
        Self {
            origin: SurfaceOrigin::BottomLeft,
            dst_copy: None,
        }
    }

    pub fn with_dst_copy(mut self, copy: DstCopyDesc) -> Self {
        self.dst_copy = Some(copy);
        self
    }
}
