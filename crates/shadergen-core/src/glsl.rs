//! GLSL scalar/vector types, precision and storage qualifiers, and the
//! declaration text they produce at each language generation.

/// GLSL language generations the assembler can target.
///
/// Ordering matters: later generations are `>` earlier ones, which is how
/// callers decide between e.g. `texture2D` and `texture`, or `varying` and
/// `in`/`out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GlslGeneration {
    V110,
    V130,
    V140,
    V150,
}

impl GlslGeneration {
    /// The `#version` line for this generation. ES contexts always use 100.
    pub fn version_decl(self, es2: bool) -> &'static str {
        if es2 {
            return "#version 100\n";
        }
        match self {
            GlslGeneration::V110 => "#version 110\n",
            GlslGeneration::V130 => "#version 130\n",
            GlslGeneration::V140 => "#version 140\n",
            GlslGeneration::V150 => "#version 150\n",
        }
    }

    /// Name of the 2D texture sample function.
    pub fn sample_fn(self) -> &'static str {
        if self >= GlslGeneration::V130 {
            "texture"
        } else {
            "texture2D"
        }
    }
}

/// Types usable for shader resources and varyings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat33,
    Mat44,
    Sampler2D,
}

impl SlType {
    pub fn glsl_string(self) -> &'static str {
        match self {
            SlType::Float => "float",
            SlType::Vec2 => "vec2",
            SlType::Vec3 => "vec3",
            SlType::Vec4 => "vec4",
            SlType::Mat33 => "mat3",
            SlType::Mat44 => "mat4",
            SlType::Sampler2D => "sampler2D",
        }
    }

    /// Precision qualifiers only apply to floating point types.
    pub fn is_float_type(self) -> bool {
        !matches!(self, SlType::Sampler2D)
    }
}

/// Precision qualifier. Only emitted on ES, where it is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Default,
    Low,
    Medium,
    High,
}

impl Precision {
    pub fn qualifier(self) -> &'static str {
        match self {
            Precision::Default => "",
            Precision::Low => "lowp ",
            Precision::Medium => "mediump ",
            Precision::High => "highp ",
        }
    }
}

/// Storage qualifier of a declared variable. The emitted keyword depends on
/// the language generation (`attribute`/`varying` pre-130, `in`/`out` after).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeModifier {
    None,
    Attribute,
    VaryingIn,
    VaryingOut,
    Uniform,
}

impl TypeModifier {
    pub fn glsl_string(self, gen: GlslGeneration) -> &'static str {
        let modern = gen >= GlslGeneration::V130;
        match self {
            TypeModifier::None => "",
            TypeModifier::Attribute => {
                if modern {
                    "in "
                } else {
                    "attribute "
                }
            }
            TypeModifier::VaryingIn => {
                if modern {
                    "in "
                } else {
                    "varying "
                }
            }
            TypeModifier::VaryingOut => {
                if modern {
                    "out "
                } else {
                    "varying "
                }
            }
            TypeModifier::Uniform => "uniform ",
        }
    }
}

/// Array-ness of a declaration. `Unsized` is used for geometry shader inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayCount {
    NonArray,
    Unsized,
    Count(usize),
}

/// A single declared shader variable.
#[derive(Debug, Clone)]
pub struct ShaderVar {
    pub name: String,
    pub ty: SlType,
    pub modifier: TypeModifier,
    pub precision: Precision,
    pub array_count: ArrayCount,
    /// Emit a `layout(origin_upper_left)` qualifier (gl_FragCoord redecl).
    pub origin_upper_left: bool,
}

impl ShaderVar {
    pub fn new(name: impl Into<String>, ty: SlType, modifier: TypeModifier) -> Self {
        Self {
            name: name.into(),
            ty,
            modifier,
            precision: Precision::Default,
            array_count: ArrayCount::NonArray,
            origin_upper_left: false,
        }
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_array_count(mut self, count: ArrayCount) -> Self {
        self.array_count = count;
        self
    }

    /// Append this variable's declaration, without the trailing `;`.
    pub fn append_decl(&self, gen: GlslGeneration, es2: bool, out: &mut String) {
        if self.origin_upper_left {
            out.push_str("layout(origin_upper_left) ");
        }
        out.push_str(self.modifier.glsl_string(gen));
        if es2 && self.ty.is_float_type() {
            out.push_str(self.precision.qualifier());
        }
        out.push_str(self.ty.glsl_string());
        out.push(' ');
        out.push_str(&self.name);
        match self.array_count {
            ArrayCount::NonArray => {}
            ArrayCount::Unsized => out.push_str("[]"),
            ArrayCount::Count(n) => {
                out.push('[');
                out.push_str(&n.to_string());
                out.push(']');
            }
        }
    }
}

/// Append `vars` as a `;`-terminated declaration block.
pub fn append_decls(vars: &[ShaderVar], gen: GlslGeneration, es2: bool, out: &mut String) {
    for var in vars {
        var.append_decl(gen, es2, out);
        out.push_str(";\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_decl_matches_generation() {
        assert_eq!(GlslGeneration::V110.version_decl(false), "#version 110\n");
        assert_eq!(GlslGeneration::V150.version_decl(false), "#version 150\n");
        assert_eq!(GlslGeneration::V140.version_decl(true), "#version 100\n");
    }

    #[test]
    fn sample_fn_tracks_generation() {
        assert_eq!(GlslGeneration::V110.sample_fn(), "texture2D");
        assert_eq!(GlslGeneration::V130.sample_fn(), "texture");
    }

    #[test]
    fn varying_keyword_switches_at_130() {
        assert_eq!(
            TypeModifier::VaryingOut.glsl_string(GlslGeneration::V110),
            "varying "
        );
        assert_eq!(
            TypeModifier::VaryingOut.glsl_string(GlslGeneration::V150),
            "out "
        );
    }

    #[test]
    fn decl_includes_array_and_precision() {
        let var = ShaderVar::new("uColors", SlType::Vec4, TypeModifier::Uniform)
            .with_precision(Precision::Medium)
            .with_array_count(ArrayCount::Count(4));
        let mut out = String::new();
        var.append_decl(GlslGeneration::V110, true, &mut out);
        assert_eq!(out, "uniform mediump vec4 uColors[4]");

        let mut desktop = String::new();
        var.append_decl(GlslGeneration::V140, false, &mut desktop);
        assert_eq!(desktop, "uniform vec4 uColors[4]");
    }

    #[test]
    fn unsized_array_decl() {
        let var = ShaderVar::new("vCoord", SlType::Vec2, TypeModifier::VaryingIn)
            .with_array_count(ArrayCount::Unsized);
        let mut out = String::new();
        var.append_decl(GlslGeneration::V150, false, &mut out);
        assert_eq!(out, "in vec2 vCoord[]");
    }
}
