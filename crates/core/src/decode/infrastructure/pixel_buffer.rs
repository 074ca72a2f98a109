use crate::decode::domain::image_buffer::ImageBuffer;
use crate::shared::pixel_format::{FourCc, PixelLayout};

/// Heap-backed image buffer produced by the software engines.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    format: FourCc,
    width: u32,
    height: u32,
    planes: Vec<Plane>,
}

#[derive(Clone, Debug, PartialEq)]
struct Plane {
    data: Vec<u8>,
    stride: usize,
}

impl PixelBuffer {
    /// Wraps already-laid-out planes. Each entry is `(bytes, stride)`.
    pub fn from_planes(format: FourCc, width: u32, height: u32, planes: Vec<(Vec<u8>, usize)>) -> Self {
        Self {
            format,
            width,
            height,
            planes: planes
                .into_iter()
                .map(|(data, stride)| Plane { data, stride })
                .collect(),
        }
    }

    /// A buffer in `layout` with every byte set to `value`.
    pub fn filled(layout: PixelLayout, width: u32, height: u32, value: u8) -> Self {
        let w = width as usize;
        let h = height as usize;
        let planes = match layout {
            PixelLayout::Uyvy422 => vec![(vec![value; w * h * 2], w * 2)],
            PixelLayout::Bgra => vec![(vec![value; w * h * 4], w * 4)],
            PixelLayout::Nv12 => {
                let chroma_w = w.div_ceil(2);
                let chroma_h = h.div_ceil(2);
                vec![
                    (vec![value; w * h], w),
                    (vec![value; chroma_w * 2 * chroma_h], chroma_w * 2),
                ]
            }
        };
        Self::from_planes(layout.fourcc(), width, height, planes)
    }

    /// Total bytes across all planes.
    pub fn byte_len(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }
}

impl ImageBuffer for PixelBuffer {
    fn pixel_format(&self) -> FourCc {
        self.format
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn plane_count(&self) -> usize {
        self.planes.len()
    }

    fn plane(&self, index: usize) -> Option<&[u8]> {
        self.planes.get(index).map(|p| p.data.as_slice())
    }

    fn stride(&self, index: usize) -> Option<usize> {
        self.planes.get(index).map(|p| p.stride)
    }
}
