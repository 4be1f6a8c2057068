//! Frame capture.
//!
//! Producer scripts raise bit 31 of the visibility word to request a PNG of
//! the composed frame; captures land in `hudcap/` under the working
//! directory, named by capture time so a burst of dumps sorts naturally.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use hud_core::Surface;

const DUMP_DIR: &str = "hudcap";

pub fn save_frame(surface: &Surface) -> Result<PathBuf> {
    std::fs::create_dir_all(DUMP_DIR).with_context(|| format!("creating {DUMP_DIR}/"))?;

    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let path = PathBuf::from(DUMP_DIR).join(format!("cap-{ms:010}.png"));

    let img = image::RgbImage::from_fn(surface.width(), surface.height(), |x, y| {
        let px = surface.pixel(x, y);
        image::Rgb([(px >> 16) as u8, (px >> 8) as u8, px as u8])
    });
    img.save(&path).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
