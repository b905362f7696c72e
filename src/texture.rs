//! Structs and functions for handling textures.
//!
//! The module provides the [`Texture`] struct which is a CPU representation of a GPU texture.
//! Pixel data is uploaded through [`TextureLoader`](crate::loader::TextureLoader).

use std::sync::Arc;

use image::{DynamicImage, GenericImageView};
use log::debug;

use crate::context::GlContext;

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("unable to load {origin}: {source}")]
    Decode {
        origin: String,
        #[source]
        source: image::ImageError,
    },
    #[error("texture has been released")]
    Released,
    #[error("driver error: {0}")]
    Driver(String),
}

/// Pixel format of an uploaded texture, chosen from the decoded channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub fn from_channel_count(channels: u8) -> Self {
        if channels == 4 { Self::Rgba } else { Self::Rgb }
    }

    pub fn gl_enum(self) -> u32 {
        match self {
            Self::Rgb => glow::RGB,
            Self::Rgba => glow::RGBA,
        }
    }

    pub fn channels(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

/// Represents a texture stored on the GPU side.
pub struct Texture<G: GlContext = glow::Context> {
    gl: Arc<G>,
    id: Option<G::Texture>,
    width: u32,
    height: u32,
    format: Option<PixelFormat>,
}

impl<G: GlContext> Texture<G> {
    /// Creates an empty texture object. Its contents are undefined until something is uploaded.
    pub fn new(gl: &Arc<G>) -> Result<Self, TextureError> {
        let id = unsafe { gl.create_texture().map_err(TextureError::Driver)? };
        debug!("created texture {id:?}");
        Ok(Self {
            gl: Arc::clone(gl),
            id: Some(id),
            width: 0,
            height: 0,
            format: None,
        })
    }

    /// Creates a new texture from the given [`image::DynamicImage`].
    pub fn from_image(gl: &Arc<G>, image: &DynamicImage) -> Result<Self, TextureError> {
        let mut texture = Self::new(gl)?;
        texture.upload(image)?;
        Ok(texture)
    }

    /// Replaces the texture contents with the image, as RGBA when the image has four channels
    /// and as RGB otherwise.
    pub(crate) fn upload(&mut self, image: &DynamicImage) -> Result<PixelFormat, TextureError> {
        let id = self.id.ok_or(TextureError::Released)?;
        let (width, height) = image.dimensions();
        let format = PixelFormat::from_channel_count(image.color().channel_count());
        let data = match format {
            PixelFormat::Rgba => image.to_rgba8().into_raw(),
            PixelFormat::Rgb => image.to_rgb8().into_raw(),
        };

        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(id));
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::LINEAR as i32,
            );
            self.gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                glow::LINEAR as i32,
            );
            // RGB rows are not 4-byte aligned for most widths
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                format.gl_enum() as i32,
                width as i32,
                height as i32,
                0,
                format.gl_enum(),
                glow::UNSIGNED_BYTE,
                Some(data.as_slice()),
            );
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }

        self.width = width;
        self.height = height;
        self.format = Some(format);
        Ok(format)
    }

    /// The texture handle, or `None` once released.
    pub fn id(&self) -> Option<G::Texture> {
        self.id
    }

    /// Returns the width of the texture.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the texture.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Format of the last upload, if any.
    pub fn format(&self) -> Option<PixelFormat> {
        self.format
    }

    /// Binds the texture to the specified texture unit.
    pub fn bind(&self, unit: u32) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, self.id);
        }
    }

    /// Deletes the texture object. Calling it again is a no-op.
    pub fn release(&mut self) {
        if let Some(id) = self.id.take() {
            unsafe {
                self.gl.delete_texture(id);
            }
            debug!("released texture {id:?}");
        }
    }
}

impl<G: GlContext> Drop for Texture<G> {
    fn drop(&mut self) {
        self.release();
    }
}
