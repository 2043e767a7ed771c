use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::map::map_colors;
use imageproc::morphology::dilate;
use tracing::{debug, instrument};

use crate::config::DetectionConfig;

/// Detects near-saturated highlights and paints over them from their surroundings.
#[derive(Debug, Clone)]
pub struct GlareCorrector {
    pub threshold: u8,
    pub dilate_radius: u8,
    pub inpaint_radius: u32,
}

impl GlareCorrector {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            threshold: config.glare_threshold,
            dilate_radius: config.glare_dilate_radius,
            inpaint_radius: config.inpaint_radius,
        }
    }

    /// Binary mask (255 = glare) of bright pixels plus their halo.
    pub fn glare_mask(&self, img: &RgbImage) -> GrayImage {
        let gray = image::imageops::grayscale(img);
        let threshold = self.threshold;
        let hot = map_colors(&gray, |p: Luma<u8>| {
            Luma([if p[0] > threshold { 255u8 } else { 0 }])
        });
        if self.dilate_radius == 0 {
            return hot;
        }
        dilate(&hot, Norm::LInf, self.dilate_radius)
    }

    #[instrument(skip_all, fields(width = img.width(), height = img.height()))]
    pub fn correct(&self, img: &RgbImage) -> RgbImage {
        let mask = self.glare_mask(img);
        let masked = mask.pixels().filter(|p| p[0] != 0).count();
        debug!(masked, "glare mask built");
        if masked == 0 {
            return img.clone();
        }
        inpaint(img, &mask, self.inpaint_radius)
    }
}

/// Fills masked pixels layer by layer from the outside in.
///
/// Each pass fills every masked pixel that touches a known pixel with the
/// inverse-square-distance weighted mean of the known pixels within `radius`.
/// Pixels filled in one pass only become known for the next pass, so the
/// result does not depend on scan order.
pub fn inpaint(img: &RgbImage, mask: &GrayImage, radius: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut out = img.clone();
    let mut known: Vec<bool> = mask.pixels().map(|p| p[0] == 0).collect();
    if !known.iter().any(|&k| k) {
        return out;
    }

    let idx = |x: u32, y: u32| (y * width + x) as usize;
    let r = radius.max(1) as i64;
    let r2 = (r * r) as f64;

    loop {
        let mut frontier = Vec::new();
        for y in 0..height {
            for x in 0..width {
                if known[idx(x, y)] {
                    continue;
                }
                let touches_known = neighbours(x, y, width, height).any(|(nx, ny)| known[idx(nx, ny)]);
                if touches_known {
                    frontier.push((x, y));
                }
            }
        }
        if frontier.is_empty() {
            break;
        }

        let mut filled = Vec::with_capacity(frontier.len());
        for &(x, y) in &frontier {
            let mut acc = [0f64; 3];
            let mut total = 0f64;
            for dy in -r..=r {
                for dx in -r..=r {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let d2 = (dx * dx + dy * dy) as f64;
                    if d2 == 0.0 || d2 > r2 || !known[idx(nx as u32, ny as u32)] {
                        continue;
                    }
                    let w = 1.0 / d2;
                    let p = out.get_pixel(nx as u32, ny as u32);
                    for c in 0..3 {
                        acc[c] += w * p[c] as f64;
                    }
                    total += w;
                }
            }
            if total > 0.0 {
                let px = [
                    (acc[0] / total).round() as u8,
                    (acc[1] / total).round() as u8,
                    (acc[2] / total).round() as u8,
                ];
                filled.push((x, y, px));
            }
        }

        for (x, y, px) in filled {
            out.put_pixel(x, y, image::Rgb(px));
        }
        for (x, y) in frontier {
            known[idx(x, y)] = true;
        }
    }

    out
}

fn neighbours(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    const OFFSETS: [(i64, i64); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ];
    OFFSETS.iter().filter_map(move |&(dx, dy)| {
        let nx = x as i64 + dx;
        let ny = y as i64 + dy;
        (nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64).then_some((nx as u32, ny as u32))
    })
}
