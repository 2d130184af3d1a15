use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::{DynamicImage, ImageEncoder};

use crate::core_modules::frame::{Frame, FrameShape, FrameView, PixelFormat};
use crate::core_modules::pixel::Rgb;
use crate::error::Result;

/// Encodes a frame as an 8-bit RGB PNG, whatever its byte order or padding.
pub fn save_rgb(path: &Path, frame: FrameView<'_>) -> Result<()> {
    let channels = frame.shape.validate()?;
    let shape = frame.shape;

    let mut packed = Vec::with_capacity(shape.pixel_count() as usize * 3);
    for y in 0..shape.height {
        for x in 0..shape.width {
            let rgb = Rgb::read(frame.data, shape.pixel_offset(x, y), channels);
            packed.extend_from_slice(&[rgb.red, rgb.green, rgb.blue]);
        }
    }

    let output = BufWriter::new(File::create(path).map_err(image::ImageError::IoError)?);
    let encoder = image::codecs::png::PngEncoder::new(output);
    encoder.write_image(&packed, shape.width, shape.height, image::ExtendedColorType::Rgb8)?;

    Ok(())
}

/// Converts a decoded image into a packed RGB24 frame.
pub fn frame_from_image(image: &DynamicImage) -> Frame {
    let rgb = image.to_rgb8();
    let shape = FrameShape::packed(PixelFormat::Rgb24, rgb.width(), rgb.height());
    Frame::new(shape, rgb.into_raw())
}
