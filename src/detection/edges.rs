use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::close;
use tracing::{debug, instrument};

use crate::config::DetectionConfig;

/// Builds a binary edge map from per-channel local gradients.
///
/// Grayscale edges miss borders whose luma matches the background, so each
/// channel is dilated on its own and compared with its raw values. The edge
/// strength of a pixel is the largest of the three channel differences, which
/// is zero inside any flat region whatever its hue.
#[derive(Debug, Clone)]
pub struct EdgeMapBuilder {
    pub dilate_radius: u8,
    pub threshold: u8,
    pub close_radius: u8,
}

impl EdgeMapBuilder {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            dilate_radius: config.channel_dilate_radius,
            threshold: config.gradient_threshold,
            close_radius: config.close_radius,
        }
    }

    /// Per-pixel `max over channels of (dilate(c) - c)`.
    pub fn gradient(&self, img: &RgbImage) -> GrayImage {
        let (width, height) = img.dimensions();
        let channels = split_channels(img);
        let dilated: Vec<GrayImage> = channels
            .iter()
            .map(|c| max_filter(c, self.dilate_radius as u32))
            .collect();

        GrayImage::from_fn(width, height, |x, y| {
            let spread = channels
                .iter()
                .zip(&dilated)
                .map(|(raw, grown)| grown.get_pixel(x, y)[0].saturating_sub(raw.get_pixel(x, y)[0]))
                .max()
                .unwrap_or(0);
            Luma([spread])
        })
    }

    #[instrument(skip_all, fields(width = img.width(), height = img.height()))]
    pub fn build(&self, img: &RgbImage) -> GrayImage {
        let gradient = self.gradient(img);
        let threshold = self.threshold;
        let mut edges = gradient;
        for p in edges.pixels_mut() {
            p[0] = if p[0] > threshold { 255 } else { 0 };
        }
        debug!(
            edge_pixels = edges.pixels().filter(|p| p[0] != 0).count(),
            "gradient thresholded"
        );
        if self.close_radius == 0 {
            return edges;
        }
        close(&edges, Norm::LInf, self.close_radius)
    }
}

fn split_channels(img: &RgbImage) -> [GrayImage; 3] {
    let (width, height) = img.dimensions();
    let channel = |c: usize| GrayImage::from_fn(width, height, |x, y| Luma([img.get_pixel(x, y)[c]]));
    [channel(0), channel(1), channel(2)]
}

/// Grey-level dilation with a `(2r+1)x(2r+1)` square, done as two 1-D passes.
fn max_filter(img: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return img.clone();
    }
    let (width, height) = img.dimensions();
    let r = radius as i64;

    let rows = GrayImage::from_fn(width, height, |x, y| {
        let lo = (x as i64 - r).max(0) as u32;
        let hi = (x as i64 + r).min(width as i64 - 1) as u32;
        Luma([(lo..=hi).map(|xx| img.get_pixel(xx, y)[0]).max().unwrap_or(0)])
    });
    GrayImage::from_fn(width, height, |x, y| {
        let lo = (y as i64 - r).max(0) as u32;
        let hi = (y as i64 + r).min(height as i64 - 1) as u32;
        Luma([(lo..=hi).map(|yy| rows.get_pixel(x, yy)[0]).max().unwrap_or(0)])
    })
}
