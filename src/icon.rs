//! Tray icons, drawn at startup and recoloured per activity state.

use std::sync::LazyLock;

use image::{Rgba, RgbaImage};
use quill_core::ActivityState;

const ICON_SIZE: u32 = 32;

const COLOR_IDLE: (u8, u8, u8) = (255, 255, 255);
const COLOR_WORKING: (u8, u8, u8) = (255, 204, 0);
const COLOR_FAILED: (u8, u8, u8) = (255, 59, 48);

static ICON_IDLE: LazyLock<tray_icon::Icon> = LazyLock::new(|| load_icon(COLOR_IDLE));
static ICON_WORKING: LazyLock<tray_icon::Icon> = LazyLock::new(|| load_icon(COLOR_WORKING));
static ICON_FAILED: LazyLock<tray_icon::Icon> = LazyLock::new(|| load_icon(COLOR_FAILED));

pub trait ActivityStateExt {
    fn icon(&self) -> tray_icon::Icon;
}

impl ActivityStateExt for ActivityState {
    fn icon(&self) -> tray_icon::Icon {
        match self {
            ActivityState::Idle => ICON_IDLE.clone(),
            ActivityState::Working => ICON_WORKING.clone(),
            ActivityState::Failed => ICON_FAILED.clone(),
        }
    }
}

/// A filled disc with a diagonal nib slit cut out of it.
fn draw_icon((r, g, b): (u8, u8, u8)) -> RgbaImage {
    let center = (ICON_SIZE as f32 - 1.0) / 2.0;
    let radius = ICON_SIZE as f32 / 2.0 - 1.0;

    RgbaImage::from_fn(ICON_SIZE, ICON_SIZE, |x, y| {
        let dx = x as f32 - center;
        let dy = y as f32 - center;
        let inside = dx * dx + dy * dy <= radius * radius;
        // distance from the top-left to bottom-right diagonal
        let slit = (dx - dy).abs() / std::f32::consts::SQRT_2 < 1.5 && dx + dy > -radius / 2.0;
        if inside && !slit {
            Rgba([r, g, b, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

fn load_icon(color: (u8, u8, u8)) -> tray_icon::Icon {
    let image = draw_icon(color);
    let (width, height) = image.dimensions();
    tray_icon::Icon::from_rgba(image.into_raw(), width, height).expect("Failed to build icon")
}
