use crate::{
    cache::CacheArtifact,
    level::{PixelElementSize, PixelStructure, TextureFormat},
    resources::texture::ImageData,
};

impl CacheArtifact for ImageData {
    type Params = TextureFormat;

    const KIND: &'static str = "image";
    const CACHE_VERSION: u32 = 1;

    fn params_tag(format: &TextureFormat) -> String {
        let element = match format.element {
            PixelElementSize::Byte => "u8",
            PixelElementSize::Short => "u16",
            PixelElementSize::Half => "f16",
            PixelElementSize::Float => "f32",
        };
        let structure = match format.structure {
            PixelStructure::Grey => "grey",
            PixelStructure::GreyAlpha => "grey_alpha",
            PixelStructure::Rgb => "rgb",
            PixelStructure::Rgba => "rgba",
            PixelStructure::Bgr => "bgr",
            PixelStructure::Bgra => "bgra",
        };
        format!("{}_{}", structure, element)
    }
}
