// THEORY:
// A motion mask is a bitmap with the same shape as the frames it filters. Any pixel
// whose color triple sums to zero (pure black) is excluded from every comparison;
// every other pixel participates. The mask is loaded once, during first-frame setup,
// and is read-only from then on, so workers may share it freely.
//
// Decoding goes through the `image` crate, which means BMP, PNG and the other
// common formats all work. The decoded rows are copied into the frame's stride
// layout so a pixel's byte offset is identical in the mask and in the frame.

use std::path::Path;

use image::GenericImageView;

use crate::core_modules::frame::{ChannelOffsets, FrameShape};
use crate::core_modules::grid_manager::Cell;
use crate::core_modules::pixel::Rgb;
use crate::error::ConfigurationError;

#[derive(Debug, Clone)]
pub struct Mask {
    shape: FrameShape,
    channels: ChannelOffsets,
    data: Vec<u8>,
}

impl Mask {
    /// Decodes the bitmap at `path`. Its width, height and bytes per pixel must
    /// equal the frame's.
    pub fn load(path: &Path, shape: FrameShape) -> Result<Self, ConfigurationError> {
        let channels = shape.validate()?;
        let image = image::open(path).map_err(|source| ConfigurationError::MaskLoad {
            path: path.to_path_buf(),
            source,
        })?;

        let (mask_width, mask_height) = image.dimensions();
        let mask_bpp = image.color().bytes_per_pixel() as usize;
        if mask_width != shape.width
            || mask_height != shape.height
            || mask_bpp != shape.bytes_per_pixel
        {
            return Err(ConfigurationError::MaskMismatch {
                mask_width,
                mask_height,
                mask_bpp,
                frame_width: shape.width,
                frame_height: shape.height,
                frame_bpp: shape.bytes_per_pixel,
            });
        }

        let row_bytes = shape.row_bytes();
        let packed = image.as_bytes();
        let mut data = vec![0u8; shape.required_len()];
        if row_bytes > 0 {
            for (row, source) in packed.chunks_exact(row_bytes).enumerate() {
                let start = row * shape.stride;
                data[start..start + row_bytes].copy_from_slice(source);
            }
        }

        Ok(Self {
            shape,
            channels,
            data,
        })
    }

    /// Wraps a buffer that is already laid out like the frame.
    pub fn from_bytes(shape: FrameShape, data: Vec<u8>) -> Result<Self, ConfigurationError> {
        let channels = shape.validate()?;
        let expected = shape.required_len();
        if data.len() < expected {
            return Err(ConfigurationError::MaskBufferSize {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            shape,
            channels,
            data,
        })
    }

    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    /// True when the pixel starting at byte `offset` is masked out.
    #[inline]
    pub fn is_excluded(&self, offset: usize) -> bool {
        Rgb::read(&self.data, offset, self.channels).is_black()
    }

    /// Number of pixels in `cell` that take part in comparisons.
    pub fn included_pixels(&self, cell: &Cell) -> u64 {
        let mut included = 0;
        for y in cell.y..cell.bottom() {
            for x in cell.x..cell.right() {
                if !self.is_excluded(self.shape.pixel_offset(x, y)) {
                    included += 1;
                }
            }
        }
        included
    }
}
