//! Thin, owned wrappers over OpenGL shader programs, textures and interleaved vertex buffers.
//!
//! Everything is generic over [`GlContext`], which `glow::Context` implements, so the same code
//! drives a real driver or a recording context in tests. Driver objects are released explicitly
//! with `release` or implicitly on drop.

pub mod buffer;
pub mod builtin;
pub mod config;
pub mod context;
pub mod loader;
pub mod logging;
pub mod shader;
pub mod texture;
pub mod vertex;

pub use buffer::{BufferError, RenderableBuffer, Topology, VertexBuffer, VertexCursor};
pub use config::{AttributeNames, ConfigError, GlConfig, UniformNames};
pub use context::GlContext;
pub use loader::TextureLoader;
pub use logging::{LoggingConfig, LoggingError};
pub use shader::{
    LayoutShader, PvmShader, Shader, ShaderError, ShaderProgram, ShaderStage, ShaderVariant,
    SkinnedShader, TextureShader, Uniform,
};
pub use texture::{PixelFormat, Texture, TextureError};
pub use vertex::{
    Attribute, AttributeKind, ColorVertex, ColoredTexturedVertex, SkinnedVertex, TexturedVertex,
    Vertex, VertexLayout,
};
