//! Ground mat colour sampling
//!
//! The mat is an RGBA image laid on the ground plane. Pixel (0, 0) is the
//! north-west corner of the mat, so north grows towards the top of the image
//! and east towards the right. `scale` is the pixel size in centimetres.

use crate::error::{Error, Result};
use image::RgbaImage;
use std::path::Path;

/// Colour source for downward-looking sensors
pub trait Ground: Send + Sync {
    /// RGB (0-255) seen at a ground position in centimetres
    fn color(&self, north: f64, east: f64) -> [f64; 3];
}

/// Ground backed by a mat image
pub struct ImageGround {
    pixels: RgbaImage,
    /// Centimetres per pixel
    scale: f64,
}

impl ImageGround {
    /// Load a mat image from disk
    pub fn load<P: AsRef<Path>>(path: P, scale: f64) -> Result<Self> {
        let path = path.as_ref();
        let pixels = image::open(path)?.into_rgba8();
        log::info!(
            "Loaded ground mat {}: {}x{} pixels, {} cm/px",
            path.display(),
            pixels.width(),
            pixels.height(),
            scale
        );
        Self::from_image(pixels, scale)
    }

    pub fn from_image(pixels: RgbaImage, scale: f64) -> Result<Self> {
        if scale.is_nan() || scale <= 0.0 {
            return Err(Error::Config(format!("ground scale must be positive, got {}", scale)));
        }
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(Error::Config("ground image is empty".to_string()));
        }
        Ok(Self { pixels, scale })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    fn rgb(&self, x: u32, y: u32) -> [f64; 3] {
        let p = self.pixels.get_pixel(x, y);
        [p[0] as f64, p[1] as f64, p[2] as f64]
    }
}

impl Ground for ImageGround {
    fn color(&self, north: f64, east: f64) -> [f64; 3] {
        let width = self.width() as f64;
        let height = self.height() as f64;
        let x = east / self.scale;
        let y = height - north / self.scale;

        if !(0.0..width).contains(&x) || !(0.0..height).contains(&y) {
            return [0.0; 3];
        }

        // Bilinear interpolation, neighbours clamped at the mat border
        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width() - 1);
        let y1 = (y0 + 1).min(self.height() - 1);
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let c00 = self.rgb(x0, y0);
        let c10 = self.rgb(x1, y0);
        let c01 = self.rgb(x0, y1);
        let c11 = self.rgb(x1, y1);

        let mut result = [0.0; 3];
        for (i, channel) in result.iter_mut().enumerate() {
            *channel = c00[i] * (1.0 - fx) * (1.0 - fy)
                + c10[i] * fx * (1.0 - fy)
                + c01[i] * (1.0 - fx) * fy
                + c11[i] * fx * fy;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgba;

    /// 4x4 mat: west half black, east half white, one red pixel
    fn mat() -> ImageGround {
        let mut pixels = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        for y in 0..4 {
            for x in 2..4 {
                pixels.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        pixels.put_pixel(0, 3, Rgba([255, 0, 0, 255]));
        ImageGround::from_image(pixels, 1.0).unwrap()
    }

    #[test]
    fn test_pixel_centres() {
        let ground = mat();
        // north = 1 maps to row 3
        assert_eq!(ground.color(1.0, 0.0), [255.0, 0.0, 0.0]);
        assert_eq!(ground.color(2.0, 3.0), [255.0, 255.0, 255.0]);
        assert_eq!(ground.color(2.0, 0.0), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_bilinear_between_columns() {
        let ground = mat();
        let c = ground.color(3.0, 1.5);
        assert_relative_eq!(c[0], 127.5);
        assert_relative_eq!(c[2], 127.5);
    }

    #[test]
    fn test_outside_mat_is_black() {
        let ground = mat();
        assert_eq!(ground.color(-1.0, 1.0), [0.0; 3]);
        assert_eq!(ground.color(1.0, 4.5), [0.0; 3]);
        assert_eq!(ground.color(5.0, 1.0), [0.0; 3]);
    }

    #[test]
    fn test_invalid_scale() {
        let pixels = RgbaImage::new(2, 2);
        assert!(ImageGround::from_image(pixels, 0.0).is_err());
    }

    #[test]
    fn test_load_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mat.png");
        RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();
        let ground = ImageGround::load(&path, 0.5).unwrap();
        assert_eq!(ground.width(), 3);
        assert_eq!(ground.color(0.5, 0.5), [10.0, 20.0, 30.0]);
    }
}
