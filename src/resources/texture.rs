use anyhow::Context;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::level::{PixelElementSize, PixelStructure, TextureFormat};

/// Decoded pixels of one image, converted to the format the level asked for.
///
/// Rows run top to bottom as stored in the file. Multi-byte elements are in
/// native byte order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub size: [u32; 2],
    pub format: TextureFormat,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn from_bytes(bytes: &[u8], format: TextureFormat, file_name: &str) -> anyhow::Result<Self> {
        let img = image::load_from_memory(bytes)
            .with_context(|| format!("could not decode image {}", file_name))?;
        Ok(Self::from_image(&img, format))
    }

    pub fn from_image(img: &DynamicImage, format: TextureFormat) -> Self {
        let size = [img.width(), img.height()];
        let channels = format.structure.channels();
        let mut pixels = match format.element {
            PixelElementSize::Byte => bytes_u8(img, format.structure),
            PixelElementSize::Short => {
                let values = values_u16(img, format.structure);
                bytemuck::cast_slice(&values).to_vec()
            }
            PixelElementSize::Half => {
                let values: Vec<u16> = values_f32(img, format.structure)
                    .into_iter()
                    .map(f32_to_f16_bits)
                    .collect();
                bytemuck::cast_slice(&values).to_vec()
            }
            PixelElementSize::Float => {
                let values = values_f32(img, format.structure);
                bytemuck::cast_slice(&values).to_vec()
            }
        };
        if matches!(format.structure, PixelStructure::Bgr | PixelStructure::Bgra) {
            swap_red_blue(&mut pixels, channels, format.element.bytes());
        }
        Self { size, format, pixels }
    }
}

fn bytes_u8(img: &DynamicImage, structure: PixelStructure) -> Vec<u8> {
    match structure {
        PixelStructure::Grey => img.to_luma8().into_raw(),
        PixelStructure::GreyAlpha => img.to_luma_alpha8().into_raw(),
        PixelStructure::Rgb | PixelStructure::Bgr => img.to_rgb8().into_raw(),
        PixelStructure::Rgba | PixelStructure::Bgra => img.to_rgba8().into_raw(),
    }
}

fn values_u16(img: &DynamicImage, structure: PixelStructure) -> Vec<u16> {
    match structure {
        PixelStructure::Grey => img.to_luma16().into_raw(),
        PixelStructure::GreyAlpha => img.to_luma_alpha16().into_raw(),
        PixelStructure::Rgb | PixelStructure::Bgr => img.to_rgb16().into_raw(),
        PixelStructure::Rgba | PixelStructure::Bgra => img.to_rgba16().into_raw(),
    }
}

fn values_f32(img: &DynamicImage, structure: PixelStructure) -> Vec<f32> {
    match structure {
        PixelStructure::Grey | PixelStructure::GreyAlpha => {
            let with_alpha = structure == PixelStructure::GreyAlpha;
            img.to_rgba32f()
                .pixels()
                .flat_map(|p| {
                    let [r, g, b, a] = p.0;
                    let luma = 0.2126 * r + 0.7152 * g + 0.0722 * b;
                    if with_alpha { vec![luma, a] } else { vec![luma] }
                })
                .collect()
        }
        PixelStructure::Rgb | PixelStructure::Bgr => img.to_rgb32f().into_raw(),
        PixelStructure::Rgba | PixelStructure::Bgra => img.to_rgba32f().into_raw(),
    }
}

fn swap_red_blue(pixels: &mut [u8], channels: usize, element_bytes: usize) {
    let stride = channels * element_bytes;
    for pixel in pixels.chunks_exact_mut(stride) {
        for byte in 0..element_bytes {
            pixel.swap(byte, 2 * element_bytes + byte);
        }
    }
}

/// IEEE 754 binary16 bits of `value`, rounding to nearest even.
pub(crate) fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exponent == 0xff {
        // Inf stays inf, NaN stays a quiet NaN.
        let nan = if mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan;
    }
    let half_exponent = exponent - 127 + 15;
    if half_exponent >= 0x1f {
        return sign | 0x7c00;
    }
    if half_exponent <= 0 {
        if half_exponent < -10 {
            return sign;
        }
        let mantissa = mantissa | 0x0080_0000;
        let shift = (14 - half_exponent) as u32;
        let half_mantissa = mantissa >> shift;
        let remainder = mantissa & ((1 << shift) - 1);
        let halfway = 1 << (shift - 1);
        let round_up = remainder > halfway || (remainder == halfway && half_mantissa & 1 == 1);
        return sign | (half_mantissa + round_up as u32) as u16;
    }
    let half_mantissa = mantissa >> 13;
    let remainder = mantissa & 0x1fff;
    let round_up = remainder > 0x1000 || (remainder == 0x1000 && half_mantissa & 1 == 1);
    // A mantissa carry rolls over into the exponent.
    let half = ((half_exponent as u32) << 10 | half_mantissa) + round_up as u32;
    sign | half as u16
}
