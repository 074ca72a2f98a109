use crate::shared::pixel_format::FourCc;

/// A decoded image owned by the engine's buffer facility.
///
/// Buffers are shared as `Arc<dyn ImageBuffer>`: cloning the `Arc` retains,
/// dropping it releases. Implementations free their storage when the last
/// reference goes away.
pub trait ImageBuffer: Send + Sync {
    fn pixel_format(&self) -> FourCc;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Number of planes (1 for packed layouts, 2 for bi-planar).
    fn plane_count(&self) -> usize;

    /// Raw bytes of one plane, or `None` if `index` is out of range.
    fn plane(&self, index: usize) -> Option<&[u8]>;

    /// Row stride of one plane in bytes.
    fn stride(&self, index: usize) -> Option<usize>;
}
