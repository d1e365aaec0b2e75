use async_trait::async_trait;

use crate::errors::GroundResult;
use crate::perception::types::{EncodedImage, SurfaceSize};

/// A screen the loop can look at: the local display or a remote sandbox.
#[async_trait]
pub trait Surface: Send + Sync {
    async fn screenshot(&self) -> GroundResult<EncodedImage>;

    /// Pixel size input commands are addressed in.
    async fn size(&self) -> GroundResult<SurfaceSize>;
}
