// THEORY:
// The `frame` module is the data model that every other layer speaks. A frame is
// nothing more than a byte buffer plus the description needed to index into it:
// pixel layout, dimensions, row stride and bytes per pixel.
//
// Key architectural principles:
// 1.  **Borrowed input, owned retention**: frames arrive from the ingest side as a
//     `FrameView<'a>`. The engine never keeps a view past the call it was handed
//     in; when it must retain pixels (the baseline, the visualization scratch) it
//     copies them into an owned `Frame` that it overwrites in place afterwards.
// 2.  **Shape is a value**: `FrameShape` is `Copy` and comparable, so checking that
//     two frames may be compared is a single equality test.
// 3.  **Layout knowledge lives here**: which byte holds red, green or blue for a
//     given `PixelFormat` is answered once by `channel_offsets`, and the hot loops
//     only ever see the resulting `ChannelOffsets`.

use crate::error::ConfigurationError;

/// Pixel layouts an ingest pipeline may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    /// RGB with a padding byte.
    Rgb32,
    Rgba32,
    Bgra32,
    /// Single-channel luma. Reported by some pipelines, never analyzable here.
    Gray8,
    /// Planar YUV 4:2:0. Reported by some pipelines, never analyzable here.
    I420,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Rgb32 | PixelFormat::Rgba32 | PixelFormat::Bgra32 => 4,
            PixelFormat::Gray8 | PixelFormat::I420 => 1,
        }
    }

    /// Where the red, green and blue bytes sit inside one pixel, or `None` when
    /// the layout has no interleaved RGB triple.
    pub fn channel_offsets(self) -> Option<ChannelOffsets> {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Rgb32 | PixelFormat::Rgba32 => Some(ChannelOffsets {
                red: 0,
                green: 1,
                blue: 2,
            }),
            PixelFormat::Bgr24 | PixelFormat::Bgra32 => Some(ChannelOffsets {
                red: 2,
                green: 1,
                blue: 0,
            }),
            PixelFormat::Gray8 | PixelFormat::I420 => None,
        }
    }
}

/// Byte offsets of each color channel relative to the start of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOffsets {
    pub red: usize,
    pub green: usize,
    pub blue: usize,
}

/// Everything needed to address a pixel inside a raw buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    pub format: PixelFormat,
    /// Width of the frame in pixels.
    pub width: u32,
    /// Height of the frame in pixels.
    pub height: u32,
    /// Bytes between the starts of two consecutive rows. May exceed
    /// `width * bytes_per_pixel` when the producer pads rows.
    pub stride: usize,
    pub bytes_per_pixel: usize,
}

impl FrameShape {
    pub fn new(format: PixelFormat, width: u32, height: u32, stride: usize) -> Self {
        Self {
            format,
            width,
            height,
            stride,
            bytes_per_pixel: format.bytes_per_pixel(),
        }
    }

    /// A shape without row padding.
    pub fn packed(format: PixelFormat, width: u32, height: u32) -> Self {
        Self::new(format, width, height, width as usize * format.bytes_per_pixel())
    }

    /// Minimum buffer length for a complete frame of this shape.
    pub fn required_len(&self) -> usize {
        self.stride * self.height as usize
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    #[inline]
    pub fn pixel_offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride + x as usize * self.bytes_per_pixel
    }

    /// Checks the shape describes an analyzable RGB-family layout and returns
    /// its channel offsets.
    pub fn validate(&self) -> Result<ChannelOffsets, ConfigurationError> {
        let channels = self
            .format
            .channel_offsets()
            .ok_or(ConfigurationError::UnsupportedPixelFormat(self.format))?;

        let expected = self.format.bytes_per_pixel();
        if self.bytes_per_pixel != expected {
            return Err(ConfigurationError::BytesPerPixelMismatch {
                format: self.format,
                expected,
                got: self.bytes_per_pixel,
            });
        }

        if self.stride < self.row_bytes() {
            return Err(ConfigurationError::StrideTooShort {
                stride: self.stride,
                row_bytes: self.row_bytes(),
            });
        }

        Ok(channels)
    }
}

/// A borrowed frame, valid only for the call it is handed to.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub shape: FrameShape,
    pub data: &'a [u8],
}

impl<'a> FrameView<'a> {
    pub fn new(shape: FrameShape, data: &'a [u8]) -> Self {
        Self { shape, data }
    }

    pub fn is_complete(&self) -> bool {
        self.data.len() >= self.shape.required_len()
    }

    /// The bytes that belong to the frame, without any trailing slack.
    pub fn pixels(&self) -> &'a [u8] {
        &self.data[..self.shape.required_len().min(self.data.len())]
    }
}

/// An owned frame. Used for the retained baseline and for scratch output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub shape: FrameShape,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(shape: FrameShape, data: Vec<u8>) -> Self {
        Self { shape, data }
    }

    /// A frame with every byte set to `value`.
    pub fn filled(shape: FrameShape, value: u8) -> Self {
        Self {
            shape,
            data: vec![value; shape.required_len()],
        }
    }

    /// Copies the frame bytes out of a view.
    pub fn from_view(view: FrameView<'_>) -> Self {
        Self {
            shape: view.shape,
            data: view.pixels().to_vec(),
        }
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView::new(self.shape, &self.data)
    }

    /// Overwrites this frame with the contents of `view` without reallocating.
    /// Both must share a shape.
    pub fn overwrite_from(&mut self, view: FrameView<'_>) {
        debug_assert_eq!(self.shape, view.shape);
        let len = self.data.len();
        self.data.copy_from_slice(&view.data[..len]);
    }

    /// Writes an RGB triple at pixel (x, y) honouring the layout's channel order.
    #[inline]
    pub fn put_rgb(&mut self, x: u32, y: u32, channels: ChannelOffsets, rgb: [u8; 3]) {
        let index = self.shape.pixel_offset(x, y);
        self.data[index + channels.red] = rgb[0];
        self.data[index + channels.green] = rgb[1];
        self.data[index + channels.blue] = rgb[2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_shape_reports_required_length() {
        let shape = FrameShape::packed(PixelFormat::Rgb24, 640, 480);
        assert_eq!(shape.stride, 1920);
        assert_eq!(shape.required_len(), 1920 * 480);
        assert_eq!(shape.pixel_offset(1, 1), 1920 + 3);
    }

    #[test]
    fn padded_stride_is_accepted() {
        let shape = FrameShape::new(PixelFormat::Bgra32, 10, 4, 48);
        let channels = shape.validate().expect("padded stride is valid");
        assert_eq!(channels.red, 2);
        assert_eq!(channels.blue, 0);
    }

    #[test]
    fn planar_and_gray_formats_are_rejected() {
        for format in [PixelFormat::Gray8, PixelFormat::I420] {
            let shape = FrameShape::packed(format, 8, 8);
            assert!(matches!(
                shape.validate(),
                Err(ConfigurationError::UnsupportedPixelFormat(f)) if f == format
            ));
        }
    }

    #[test]
    fn inconsistent_bytes_per_pixel_is_rejected() {
        let mut shape = FrameShape::packed(PixelFormat::Rgb24, 8, 8);
        shape.bytes_per_pixel = 4;
        shape.stride = 32;
        assert!(matches!(
            shape.validate(),
            Err(ConfigurationError::BytesPerPixelMismatch { expected: 3, got: 4, .. })
        ));
    }

    #[test]
    fn short_stride_is_rejected() {
        let shape = FrameShape::new(PixelFormat::Rgb24, 8, 8, 20);
        assert!(matches!(
            shape.validate(),
            Err(ConfigurationError::StrideTooShort { stride: 20, row_bytes: 24 })
        ));
    }

    #[test]
    fn completeness_follows_stride_times_height() {
        let shape = FrameShape::packed(PixelFormat::Rgb24, 4, 4);
        let short = vec![0u8; shape.required_len() - 1];
        let long = vec![0u8; shape.required_len() + 7];
        assert!(!FrameView::new(shape, &short).is_complete());
        assert!(FrameView::new(shape, &long).is_complete());
        assert_eq!(FrameView::new(shape, &long).pixels().len(), shape.required_len());
    }

    #[test]
    fn overwrite_reuses_the_allocation() {
        let shape = FrameShape::packed(PixelFormat::Rgb24, 2, 2);
        let mut frame = Frame::filled(shape, 0);
        let before = frame.data.as_ptr();
        let source = vec![9u8; shape.required_len()];
        frame.overwrite_from(FrameView::new(shape, &source));
        assert_eq!(frame.data, source);
        assert_eq!(frame.data.as_ptr(), before);
    }

    #[test]
    fn put_rgb_respects_bgr_order() {
        let shape = FrameShape::packed(PixelFormat::Bgr24, 2, 1);
        let channels = shape.validate().unwrap();
        let mut frame = Frame::filled(shape, 0);
        frame.put_rgb(1, 0, channels, [10, 20, 30]);
        assert_eq!(&frame.data[3..6], &[30, 20, 10]);
    }
}
