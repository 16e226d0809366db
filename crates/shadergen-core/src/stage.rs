//! Per-stage source text buffers.

use std::fmt;

/// A shading stage with its own source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    Geometry,
    Fragment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Vertex => "vertex",
            Stage::Geometry => "geometry",
            Stage::Fragment => "fragment",
        };
        f.write_str(name)
    }
}

/// Append-only text for one stage's `main()`.
///
/// Two segments: `preamble` is written only by lazily-computed helpers whose
/// definitions must precede everything else (the synthesized fragment
/// position, the destination-copy read), `body` is written by processors in
/// emission order. The final text is preamble followed by body, so a helper
/// requested by the last processor still lands ahead of the first one's code.
#[derive(Debug, Default)]
pub struct StageBuffer {
    pub(crate) preamble: String,
    pub(crate) body: String,
}

impl StageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, code: &str) {
        self.body.push_str(code);
    }

    pub fn append_preamble(&mut self, code: &str) {
        self.preamble.push_str(code);
    }

    pub fn is_empty(&self) -> bool {
        self.preamble.is_empty() && self.body.is_empty()
    }

    /// Write `void main() { preamble body }` to `out`.
    pub fn write_main(&self, out: &mut String) {
        out.push_str("void main() {\n");
        out.push_str(&self.preamble);
        out.push_str(&self.body);
        out.push_str("}\n");
    }
}
