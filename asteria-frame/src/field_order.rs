/// Which half-raster of an interlaced frame was transmitted first.
///
/// Used only for display and metadata preservation (§3); it never
/// affects detection or calibration arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldOrder {
    Progressive,
    Interlaced,
    InterlacedTopFirst,
    InterlacedBottomFirst,
}

impl FieldOrder {
    /// Cosmetic `v4l2_field_name` string as written into PGM headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldOrder::Progressive => "progressive",
            FieldOrder::Interlaced => "interlaced",
            FieldOrder::InterlacedTopFirst => "interlaced-top-first",
            FieldOrder::InterlacedBottomFirst => "interlaced-bottom-first",
        }
    }

    /// Parse the `v4l2_field_name` header value. Unknown strings fall back to
    /// `Progressive` since the field is cosmetic only.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "interlaced" => FieldOrder::Interlaced,
            "interlaced-top-first" => FieldOrder::InterlacedTopFirst,
            "interlaced-bottom-first" => FieldOrder::InterlacedBottomFirst,
            _ => FieldOrder::Progressive,
        }
    }
}
