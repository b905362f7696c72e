//! Decoding images into textures.

use std::path::Path;

use log::{error, info};

use crate::{
    context::GlContext,
    texture::{PixelFormat, Texture, TextureError},
};

/// Decodes image files or buffers and uploads them into existing [`Texture`]s.
///
/// Decoding happens before any driver call, so a failed load leaves the texture exactly as it
/// was.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextureLoader;

impl TextureLoader {
    pub fn new() -> Self {
        Self
    }

    /// Loads the image at `path` into `texture`.
    pub fn load_file<G: GlContext>(
        &self,
        texture: &mut Texture<G>,
        path: impl AsRef<Path>,
    ) -> Result<PixelFormat, TextureError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| {
            error!("Unable to load {}: {source}", path.display());
            TextureError::Decode {
                origin: path.display().to_string(),
                source,
            }
        })?;

        let format = texture.upload(&image)?;
        info!(
            "loaded {} ({}x{}, {format:?})",
            path.display(),
            texture.width(),
            texture.height()
        );
        Ok(format)
    }

    /// Loads an encoded image held in memory into `texture`. The format is guessed from the data.
    pub fn load_memory<G: GlContext>(
        &self,
        texture: &mut Texture<G>,
        buffer: &[u8],
    ) -> Result<PixelFormat, TextureError> {
        let image = image::load_from_memory(buffer).map_err(|source| {
            error!("Unable to load texture from memory: {source}");
            TextureError::Decode {
                origin: "memory buffer".to_string(),
                source,
            }
        })?;

        let format = texture.upload(&image)?;
        info!(
            "loaded texture from memory ({}x{}, {format:?})",
            texture.width(),
            texture.height()
        );
        Ok(format)
    }
}
