use egui::Color32;

use crate::settings::Theme;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub window: Color32,
    pub panel: Color32,
    pub border: Color32,
    pub icon: Color32,
    pub track_active: Color32,
    pub track_inactive: Color32,
    pub thumb_fill: Color32,
    pub thumb_ring: Color32,
}

const LIGHT: Palette = Palette {
    window: Color32::from_rgb(0xEF, 0xEF, 0xEF),
    panel: Color32::from_rgb(0xF2, 0xF2, 0xF2),
    border: Color32::from_rgb(0xD7, 0xD7, 0xD7),
    icon: Color32::from_rgb(0x26, 0x26, 0x26),
    track_active: Color32::from_rgb(0x6D, 0x70, 0x30),
    track_inactive: Color32::from_rgb(0x9B, 0x9B, 0x9B),
    thumb_fill: Color32::from_rgb(0x6D, 0x70, 0x30),
    thumb_ring: Color32::from_rgb(0xF2, 0xF2, 0xF2),
};

const DARK: Palette = Palette {
    window: Color32::from_rgb(0x17, 0x17, 0x17),
    panel: Color32::from_rgb(0x1F, 0x1F, 0x1F),
    border: Color32::from_rgb(0x3A, 0x3A, 0x3A),
    icon: Color32::from_rgb(0xE8, 0xE8, 0xE8),
    track_active: Color32::from_rgb(0x8F, 0x9A, 0x47),
    track_inactive: Color32::from_rgb(0x62, 0x62, 0x62),
    thumb_fill: Color32::from_rgb(0x8F, 0x9A, 0x47),
    thumb_ring: Color32::from_rgb(0x1F, 0x1F, 0x1F),
};

pub fn palette(theme: Theme) -> &'static Palette {
    match theme {
        Theme::Light => &LIGHT,
        Theme::Dark => &DARK,
    }
}

/// Tray icon colour, independent of the popup theme.
pub const SUN: Color32 = Color32::from_rgb(0xFF, 0xC8, 0x3D);

/// Square sun glyph as premultiplied `0xAARRGGBB`, rows top-down.
///
/// A disc of radius `0.24 * size` with eight rays between `0.34` and
/// `0.48 * size`; pixel coverage is estimated on a 4x4 sub-grid.
pub fn sun_icon_argb(size: u32, color: Color32) -> Vec<u32> {
    const SUB: u32 = 4;
    let s = size as f32;
    let c = s / 2.0;
    let disc = 0.24 * s;
    let (ray_in, ray_out) = (0.34 * s, 0.48 * s);
    let ray_half_width = (0.045 * s).max(0.75);

    let inside = |x: f32, y: f32| {
        let (dx, dy) = (x - c, y - c);
        let r = (dx * dx + dy * dy).sqrt();
        if r <= disc {
            return true;
        }
        if !(ray_in..=ray_out).contains(&r) {
            return false;
        }
        (0..8).any(|k| {
            let a = k as f32 * std::f32::consts::FRAC_PI_4;
            let (ux, uy) = (a.cos(), a.sin());
            (dx * uy - dy * ux).abs() <= ray_half_width && dx * ux + dy * uy > 0.0
        })
    };

    let mut out = Vec::with_capacity((size * size) as usize);
    for py in 0..size {
        for px in 0..size {
            let mut hits = 0;
            for sy in 0..SUB {
                for sx in 0..SUB {
                    let x = px as f32 + (sx as f32 + 0.5) / SUB as f32;
                    let y = py as f32 + (sy as f32 + 0.5) / SUB as f32;
                    hits += u32::from(inside(x, y));
                }
            }
            let alpha = hits * 255 / (SUB * SUB);
            let premul = |ch: u8| u32::from(ch) * alpha / 255;
            out.push(
                (alpha << 24) | (premul(color.r()) << 16) | (premul(color.g()) << 8) | premul(color.b()),
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_blends_into_panel() {
        for theme in [Theme::Light, Theme::Dark] {
            let p = palette(theme);
            assert_eq!(p.thumb_ring, p.panel);
            assert_eq!(p.thumb_fill, p.track_active);
        }
        assert_ne!(palette(Theme::Light).panel, palette(Theme::Dark).panel);
    }

    #[test]
    fn sun_icon_shape() {
        let px = sun_icon_argb(16, SUN);
        assert_eq!(px.len(), 256);
        let at = |x: usize, y: usize| px[y * 16 + x];
        // Solid centre, empty corner.
        assert_eq!(at(8, 8), 0xFFFF_C83D);
        assert_eq!(at(0, 0) >> 24, 0);
        // A ray to the right of the disc, a gap between rays.
        assert!(at(13, 8) >> 24 > 0);
        assert_eq!(at(13, 4) >> 24, 0);
    }
}
