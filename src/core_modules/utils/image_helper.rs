pub mod image_helper {
    use crate::core_modules::frame_buffer::Image;
    use image::ImageEncoder;
    use std::path::Path;

    /// Writes a buffer as PNG: colour buffers are turned from sensor order (BGR)
    /// into RGB, 1-channel buffers are written as grayscale.
    pub fn save(path: impl AsRef<Path>, image: &Image) -> Result<(), image::error::ImageError> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(output);

        match image.channels() {
            1 => encoder.write_image(
                image.as_bytes(),
                image.width(),
                image.height(),
                image::ExtendedColorType::L8,
            )?,
            _ => {
                let rgb = image.to_rgb_image();
                encoder.write_image(
                    rgb.as_raw(),
                    image.width(),
                    image.height(),
                    image::ExtendedColorType::Rgb8,
                )?
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use crate::core_modules::frame_buffer::Image;

    fn temp_png(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("chroma_vision_{}_{}.png", std::process::id(), name))
    }

    #[test]
    fn save_colour_file_in_rgb_order() {
        let mut image = Image::new(40, 20, 3).unwrap();
        image.pixel_mut(3, 2).unwrap().copy_from_slice(&[255, 0, 0]);
        let name = temp_png("colour");

        save(&name, &image).expect("Error Saving File.");

        let loaded = image::open(&name).expect("Error Loading File.").to_rgb8();
        assert_eq!(loaded.dimensions(), (40, 20));
        assert_eq!(loaded.get_pixel(3, 2).0, [0, 0, 255]);
        let _ = std::fs::remove_file(name);
    }

    #[test]
    fn save_gradient_mask_file() {
        let mut image = Image::new(256, 4, 1).unwrap();
        for (i, v) in image.as_bytes_mut().iter_mut().enumerate() {
            *v = (i % 256) as u8;
        }
        let name = temp_png("gradient");

        save(&name, &image).expect("Error Saving File.");

        let loaded = image::open(&name).expect("Error Loading File.").to_luma8();
        assert_eq!(loaded.get_pixel(200, 3).0, [200]);
        let _ = std::fs::remove_file(name);
    }
}
