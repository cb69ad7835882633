use eframe::egui;
use ndarray::{s, ArrayView2};

/// Sampled viridis, evenly spaced from 0 to 1.
const VIRIDIS: [[u8; 3]; 9] = [
    [68, 1, 84],
    [71, 44, 122],
    [59, 81, 139],
    [44, 113, 142],
    [33, 144, 141],
    [39, 173, 129],
    [92, 200, 99],
    [170, 220, 50],
    [253, 231, 37],
];

/// Mask slice blended over the image at `alpha`.
#[derive(Debug, Clone)]
pub struct Overlay<'a> {
    pub mask: ArrayView2<'a, f32>,
    pub alpha: f32,
}

/// Put a slice in display order: first axis runs left to right, second axis
/// bottom to top (row 0 of the result is the top of the image).
fn lower_left_origin(slice: ArrayView2<'_, f32>) -> ArrayView2<'_, f32> {
    slice.reversed_axes().slice_move(s![..;-1, ..])
}

fn normalize(val: f32, min: f32, max: f32) -> f32 {
    if val.is_nan() || max <= min {
        return 0.0;
    }
    ((val - min) / (max - min)).clamp(0.0, 1.0)
}

fn finite_range(slice: &ArrayView2<'_, f32>) -> (f32, f32) {
    slice
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

pub fn viridis(t: f32) -> [u8; 3] {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let pos = t * (VIRIDIS.len() - 1) as f32;
    let i = (pos.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = pos - i as f32;
    let (a, b) = (VIRIDIS[i], VIRIDIS[i + 1]);
    [0, 1, 2].map(|c| (a[c] as f32 + (b[c] as f32 - a[c] as f32) * frac).round() as u8)
}

fn blend(base: u8, top: u8, alpha: f32) -> u8 {
    (base as f32 * (1.0 - alpha) + top as f32 * alpha).round() as u8
}

/// Grayscale image of a slice normalized to the volume range `(min, max)`,
/// with the mask overlay (viridis, scaled to the mask slice's own range)
/// composited on top.
pub fn slice_to_color_image(
    slice: ArrayView2<'_, f32>,
    (min, max): (f32, f32),
    overlay: Option<Overlay<'_>>,
) -> egui::ColorImage {
    let slice = lower_left_origin(slice);
    let (h, w) = slice.dim();

    let overlay = overlay.map(|o| {
        let mask = lower_left_origin(o.mask);
        let range = finite_range(&mask);
        (mask, range, o.alpha.clamp(0.0, 1.0))
    });

    let mut pixels = Vec::with_capacity(h * w);
    for y in 0..h {
        for x in 0..w {
            let gray = (normalize(slice[[y, x]], min, max) * 255.0).round() as u8;
            let pixel = match &overlay {
                Some((mask, (lo, hi), alpha)) => {
                    let [r, g, b] = viridis(normalize(mask[[y, x]], *lo, *hi));
                    egui::Color32::from_rgb(
                        blend(gray, r, *alpha),
                        blend(gray, g, *alpha),
                        blend(gray, b, *alpha),
                    )
                }
                None => egui::Color32::from_gray(gray),
            };
            pixels.push(pixel);
        }
    }

    egui::ColorImage {
        size: [w, h],
        pixels,
        source_size: egui::Vec2::new(w as f32, h as f32),
    }
}

/// Display size for a slice that keeps its physical aspect ratio (voxel
/// counts times spacing) while fitting inside `max_w` x `max_h`.
pub fn fit_size(
    nvox_w: usize,
    nvox_h: usize,
    vox_w: f32,
    vox_h: f32,
    max_w: f32,
    max_h: f32,
) -> egui::Vec2 {
    let phys_w = nvox_w as f32 * vox_w;
    let phys_h = nvox_h as f32 * vox_h;
    if phys_w <= 0.0 || phys_h <= 0.0 {
        return egui::Vec2::ZERO;
    }
    let scale = (max_w / phys_w).min(max_h / phys_h);
    egui::vec2(phys_w * scale, phys_h * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn pixel(img: &egui::ColorImage, x: usize, y: usize) -> egui::Color32 {
        img.pixels[y * img.size[0] + x]
    }

    #[test]
    fn test_origin_is_lower_left() {
        // slice[[a, b]] = a * 10 + b, a horizontal, b vertical
        let slice = Array2::from_shape_fn((2, 3), |(a, b)| (a * 10 + b) as f32);
        let img = slice_to_color_image(slice.view(), (0.0, 255.0), None);
        assert_eq!(img.size, [2, 3]);
        assert_eq!(pixel(&img, 0, 0), egui::Color32::from_gray(2));
        assert_eq!(pixel(&img, 1, 0), egui::Color32::from_gray(12));
        assert_eq!(pixel(&img, 0, 2), egui::Color32::from_gray(0));
        assert_eq!(pixel(&img, 1, 2), egui::Color32::from_gray(10));
    }

    #[test]
    fn test_uses_given_range_not_slice_range() {
        let slice = Array2::from_elem((1, 1), 50.0f32);
        let img = slice_to_color_image(slice.view(), (0.0, 100.0), None);
        assert_eq!(pixel(&img, 0, 0), egui::Color32::from_gray(128));
        let img = slice_to_color_image(slice.view(), (0.0, 50.0), None);
        assert_eq!(pixel(&img, 0, 0), egui::Color32::from_gray(255));
    }

    #[test]
    fn test_flat_range_renders_black() {
        let slice = Array2::from_elem((2, 2), 7.0f32);
        let img = slice_to_color_image(slice.view(), (7.0, 7.0), None);
        assert!(img.pixels.iter().all(|&p| p == egui::Color32::BLACK));
    }

    #[test]
    fn test_opaque_overlay_shows_colormap() {
        let slice = Array2::from_elem((2, 1), 0.0f32);
        let mask = Array2::from_shape_vec((2, 1), vec![0.0f32, 1.0]).unwrap();
        let overlay = Overlay {
            mask: mask.view(),
            alpha: 1.0,
        };
        let img = slice_to_color_image(slice.view(), (0.0, 1.0), Some(overlay));
        assert_eq!(pixel(&img, 0, 0), egui::Color32::from_rgb(68, 1, 84));
        assert_eq!(pixel(&img, 1, 0), egui::Color32::from_rgb(253, 231, 37));
    }

    #[test]
    fn test_transparent_overlay_keeps_gray() {
        let slice = Array2::from_elem((1, 1), 1.0f32);
        let mask = Array2::from_elem((1, 1), 1.0f32);
        let overlay = Overlay {
            mask: mask.view(),
            alpha: 0.0,
        };
        let img = slice_to_color_image(slice.view(), (0.0, 1.0), Some(overlay));
        assert_eq!(pixel(&img, 0, 0), egui::Color32::from_rgb(255, 255, 255));
    }

    #[test]
    fn test_half_overlay_blends() {
        let slice = Array2::from_elem((1, 1), 0.0f32);
        let mask = Array2::from_elem((1, 1), 0.0f32);
        let overlay = Overlay {
            mask: mask.view(),
            alpha: 0.5,
        };
        let img = slice_to_color_image(slice.view(), (0.0, 1.0), Some(overlay));
        assert_eq!(pixel(&img, 0, 0), egui::Color32::from_rgb(34, 1, 42));
    }

    #[test]
    fn test_viridis_endpoints_and_midpoint() {
        assert_eq!(viridis(0.0), [68, 1, 84]);
        assert_eq!(viridis(1.0), [253, 231, 37]);
        assert_eq!(viridis(0.5), [33, 144, 141]);
        assert_eq!(viridis(f32::NAN), [68, 1, 84]);
    }

    #[test]
    fn test_fit_size_preserves_physical_aspect() {
        let size = fit_size(100, 50, 1.0, 2.0, 400.0, 400.0);
        assert_eq!(size, egui::vec2(400.0, 400.0));
        let size = fit_size(100, 50, 1.0, 1.0, 400.0, 400.0);
        assert_eq!(size, egui::vec2(400.0, 200.0));
        assert_eq!(fit_size(0, 10, 1.0, 1.0, 100.0, 100.0), egui::Vec2::ZERO);
    }
}
