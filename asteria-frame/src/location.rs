/// Per-frame coarse localization diagnostic computed relative to the prior
/// frame (§3, §4.3).
///
/// When `success` is `false` only `epoch_us` is meaningful: the change-pixel
/// lists, bounding box, and centroid are left at their defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationMeasurement {
    pub epoch_us: i64,
    /// Linear pixel indices where `B[p] - A[p] > threshold`.
    pub positive_pixels: Vec<u32>,
    /// Linear pixel indices where `A[p] - B[p] > threshold`.
    pub negative_pixels: Vec<u32>,
    pub success: bool,
    pub bbox: Option<BoundingBox>,
    /// Sub-pixel flux-weighted centroid `(cx, cy)`.
    pub centroid: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub xmin: u32,
    pub xmax: u32,
    pub ymin: u32,
    pub ymax: u32,
}

impl BoundingBox {
    /// Constructs the box, asserting the `xmin <= xmax`, `ymin <= ymax`
    /// invariant from §3.
    pub fn new(xmin: u32, xmax: u32, ymin: u32, ymax: u32) -> Self {
        assert!(xmin <= xmax && ymin <= ymax);
        Self { xmin, xmax, ymin, ymax }
    }
}

impl LocationMeasurement {
    /// A measurement for a frame where no trigger occurred.
    pub fn no_trigger(epoch_us: i64) -> Self {
        Self {
            epoch_us,
            success: false,
            ..Default::default()
        }
    }
}
