// Screen capture for the local display, plus the capture policy shared by every surface.
use async_trait::async_trait;

use crate::config::CaptureConfig;
use crate::errors::{GroundError, GroundResult};
use crate::perception::traits::Surface;
use crate::perception::types::{EncodedImage, SurfaceSize};

/// The primary monitor of the machine running the loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalScreen;

fn primary_monitor() -> GroundResult<xcap::Monitor> {
    let monitors = xcap::Monitor::all().map_err(|e| GroundError::Surface(format!("list monitors: {e}")))?;
    let mut fallback = None;
    for monitor in monitors {
        if monitor.is_primary() {
            return Ok(monitor);
        }
        fallback.get_or_insert(monitor);
    }
    fallback.ok_or_else(|| GroundError::Surface("no monitor found".into()))
}

#[async_trait]
impl Surface for LocalScreen {
    async fn screenshot(&self) -> GroundResult<EncodedImage> {
        tokio::task::spawn_blocking(|| {
            let monitor = primary_monitor()?;
            let shot = monitor
                .capture_image()
                .map_err(|e| GroundError::Surface(format!("capture: {e}")))?;
            let (w, h) = (shot.width(), shot.height());
            let rgba = image::RgbaImage::from_raw(w, h, shot.into_raw())
                .ok_or_else(|| GroundError::InvalidImage(format!("capture buffer does not match {w}×{h}")))?;
            EncodedImage::from_rgba(rgba)
        })
        .await
        .map_err(|e| GroundError::Surface(format!("join: {e}")))?
    }

    async fn size(&self) -> GroundResult<SurfaceSize> {
        tokio::task::spawn_blocking(|| {
            let monitor = primary_monitor()?;
            Ok(SurfaceSize::new(monitor.width(), monitor.height()))
        })
        .await
        .map_err(|e| GroundError::Surface(format!("join: {e}")))?
    }
}

/// Take a screenshot and apply the configured capture resolution, if any.
pub async fn capture(surface: &dyn Surface, cfg: &CaptureConfig) -> GroundResult<EncodedImage> {
    let shot = surface.screenshot().await?;
    match (cfg.width, cfg.height) {
        (Some(width), Some(height)) => {
            let target = SurfaceSize::new(width, height);
            if target != shot.size {
                tracing::debug!(from = %shot.size, to = %target, "resizing capture");
            }
            shot.resized(target)
        }
        _ => Ok(shot),
    }
}

/// Size input commands are compiled against: the configured override, else what the surface reports.
pub async fn destination_size(surface: &dyn Surface, cfg: &CaptureConfig) -> GroundResult<SurfaceSize> {
    let size = match (cfg.screen_width, cfg.screen_height) {
        (Some(width), Some(height)) => SurfaceSize::new(width, height),
        _ => surface.size().await?,
    };
    if size.is_degenerate() {
        return Err(GroundError::Surface(format!("destination surface is {size}")));
    }
    Ok(size)
}
