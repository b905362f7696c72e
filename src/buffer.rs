//! Vertex buffer management module.
//!
//! [`RenderableBuffer`] owns a vertex array and its array buffer and knows how to draw them,
//! either in one call or as a set of named sub-ranges ("faces"). [`VertexBuffer`] accumulates
//! vertices of one [`Vertex`] layout, uploads them as a single interleaved block, and lets the
//! matching [`LayoutShader`] configure the attribute pointers.

use std::{
    collections::BTreeMap,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use log::{debug, warn};

use crate::{
    context::GlContext,
    shader::LayoutShader,
    vertex::{HasBone, HasColor, HasNormal, HasTexcoord, Vertex},
};

#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("no vertices have been accumulated")]
    Empty,
    #[error("{0} bytes of vertex data do not fit in a single buffer")]
    TooLarge(usize),
    #[error("driver error: {0}")]
    Driver(String),
}

/// Primitive topology used by [`RenderableBuffer::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl Topology {
    pub fn gl_enum(self) -> u32 {
        match self {
            Self::Points => glow::POINTS,
            Self::Lines => glow::LINES,
            Self::LineStrip => glow::LINE_STRIP,
            Self::LineLoop => glow::LINE_LOOP,
            Self::Triangles => glow::TRIANGLES,
            Self::TriangleStrip => glow::TRIANGLE_STRIP,
            Self::TriangleFan => glow::TRIANGLE_FAN,
        }
    }
}

/// A vertex array plus its array buffer, drawable with `glDrawArrays`.
pub struct RenderableBuffer<G: GlContext = glow::Context> {
    gl: Arc<G>,
    vao: Option<G::VertexArray>,
    vbo: Option<G::Buffer>,
    vertex_count: usize,
    draw_mode: Topology,
    faces: BTreeMap<usize, usize>,
}

impl<G: GlContext> RenderableBuffer<G> {
    pub fn new(gl: &Arc<G>) -> Self {
        Self {
            gl: Arc::clone(gl),
            vao: None,
            vbo: None,
            vertex_count: 0,
            draw_mode: Topology::default(),
            faces: BTreeMap::new(),
        }
    }

    /// Replaces any existing driver objects with a fresh vertex array and buffer.
    fn allocate(&mut self) -> Result<(G::VertexArray, G::Buffer), BufferError> {
        self.release();
        unsafe {
            let vao = self
                .gl
                .create_vertex_array()
                .map_err(BufferError::Driver)?;
            let vbo = match self.gl.create_buffer() {
                Ok(vbo) => vbo,
                Err(e) => {
                    self.gl.delete_vertex_array(vao);
                    return Err(BufferError::Driver(e));
                }
            };
            self.vao = Some(vao);
            self.vbo = Some(vbo);
            Ok((vao, vbo))
        }
    }

    pub fn set_draw_mode(&mut self, mode: Topology) {
        self.draw_mode = mode;
    }

    pub fn draw_mode(&self) -> Topology {
        self.draw_mode
    }

    /// Declares a sub-range drawn as its own call. A start that is already declared keeps its
    /// first count.
    pub fn add_face(&mut self, start: usize, count: usize) {
        self.faces.entry(start).or_insert(count);
    }

    /// Declared faces as `(start, count)`, ordered by start.
    pub fn faces(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.faces.iter().map(|(start, count)| (*start, *count))
    }

    pub fn clear_faces(&mut self) {
        self.faces.clear();
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn is_built(&self) -> bool {
        self.vao.is_some()
    }

    /// Draws the whole buffer, or each declared face in start order.
    pub fn render(&self) {
        let Some(vao) = self.vao else {
            debug!("skipping render of a buffer that has not been set up");
            return;
        };

        let mode = self.draw_mode.gl_enum();
        unsafe {
            self.gl.bind_vertex_array(Some(vao));
            if self.faces.is_empty() {
                match i32::try_from(self.vertex_count) {
                    Ok(count) => self.gl.draw_arrays(mode, 0, count),
                    Err(_) => warn!("{} vertices cannot be drawn in one call", self.vertex_count),
                }
            } else {
                for (start, count) in &self.faces {
                    let (Ok(first), Ok(len)) = (i32::try_from(*start), i32::try_from(*count)) else {
                        warn!("skipping face ({start}, {count}): out of range for a draw call");
                        continue;
                    };
                    self.gl.draw_arrays(mode, first, len);
                }
            }
            self.gl.bind_vertex_array(None);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    /// Deletes the buffer and vertex array. Calling it again is a no-op.
    pub fn release(&mut self) {
        unsafe {
            if let Some(vbo) = self.vbo.take() {
                self.gl.delete_buffer(vbo);
            }
            if let Some(vao) = self.vao.take() {
                self.gl.delete_vertex_array(vao);
            }
        }
    }
}

impl<G: GlContext> Drop for RenderableBuffer<G> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Accumulates vertices of type `V` and uploads them for the shader they were laid out for.
///
/// Vertices are pushed directly with [`push`](Self::push) or through a [`VertexCursor`].
/// [`setup`](Self::setup) uploads everything in one block and empties the accumulation; to
/// rebuild, push the vertices again.
pub struct VertexBuffer<'s, V: Vertex, G: GlContext = glow::Context> {
    shader: &'s LayoutShader<V, G>,
    renderable: RenderableBuffer<G>,
    vertices: Vec<V>,
}

impl<'s, V: Vertex, G: GlContext> VertexBuffer<'s, V, G> {
    pub fn new(shader: &'s LayoutShader<V, G>) -> Self {
        Self {
            renderable: RenderableBuffer::new(shader.gl()),
            shader,
            vertices: Vec::new(),
        }
    }

    pub fn push(&mut self, vertex: V) -> &mut Self {
        self.vertices.push(vertex);
        self
    }

    pub fn vertices(&self) -> &[V] {
        &self.vertices
    }

    pub fn vertices_mut(&mut self) -> &mut Vec<V> {
        &mut self.vertices
    }

    /// Starts the fluent protocol. `defaults` supplies the value of every attribute until a
    /// setter on the cursor replaces it; its position is ignored.
    pub fn cursor(&mut self, defaults: V) -> VertexCursor<'_, V> {
        VertexCursor {
            vertices: &mut self.vertices,
            current: defaults,
        }
    }

    /// Uploads the accumulated vertices and configures the attribute pointers.
    ///
    /// Fails with [`BufferError::Empty`] when nothing has been accumulated, leaving any previous
    /// upload drawable. On success the accumulation is cleared.
    pub fn setup(&mut self) -> Result<(), BufferError> {
        if self.vertices.is_empty() {
            warn!("vertex buffer setup called without any vertices");
            return Err(BufferError::Empty);
        }

        let bytes: &[u8] = bytemuck::cast_slice(&self.vertices);
        let size = i32::try_from(bytes.len()).map_err(|_| BufferError::TooLarge(bytes.len()))?;
        let (vao, vbo) = self.renderable.allocate()?;
        let gl = &self.renderable.gl;

        unsafe {
            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));

            gl.buffer_data_size(glow::ARRAY_BUFFER, size, glow::STATIC_DRAW);
            gl.buffer_sub_data_u8_slice(glow::ARRAY_BUFFER, 0, bytes);

            self.shader.setup_attributes();

            gl.bind_vertex_array(None);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }

        debug!(
            "uploaded {} vertices ({} bytes, stride {}) to vertex array {vao:?}",
            self.vertices.len(),
            bytes.len(),
            V::LAYOUT.stride()
        );
        self.renderable.vertex_count = self.vertices.len();
        self.vertices.clear();
        Ok(())
    }
}

impl<V: Vertex, G: GlContext> Extend<V> for VertexBuffer<'_, V, G> {
    fn extend<I: IntoIterator<Item = V>>(&mut self, iter: I) {
        self.vertices.extend(iter);
    }
}

impl<V: Vertex, G: GlContext> Deref for VertexBuffer<'_, V, G> {
    type Target = RenderableBuffer<G>;

    fn deref(&self) -> &Self::Target {
        &self.renderable
    }
}

impl<V: Vertex, G: GlContext> DerefMut for VertexBuffer<'_, V, G> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.renderable
    }
}

/// Fluent vertex builder: set attribute values, then commit vertices at positions.
///
/// Each committed vertex takes the cursor's current attribute values, which start at the
/// explicitly supplied defaults.
pub struct VertexCursor<'b, V: Vertex> {
    vertices: &'b mut Vec<V>,
    current: V,
}

impl<V: Vertex> VertexCursor<'_, V> {
    /// Commits a vertex at `position` with the current attribute values.
    pub fn vertex(&mut self, position: impl Into<[f32; 3]>) -> &mut Self {
        let mut vertex = self.current;
        vertex.set_position(position.into());
        self.vertices.push(vertex);
        self
    }

    /// Commits a fully specified vertex without changing the current values.
    pub fn vertex_with(&mut self, vertex: V) -> &mut Self {
        self.vertices.push(vertex);
        self
    }

    pub fn current(&self) -> &V {
        &self.current
    }
}

impl<V: Vertex + HasColor> VertexCursor<'_, V> {
    pub fn color(&mut self, color: impl Into<[f32; 4]>) -> &mut Self {
        self.current.set_color(color.into());
        self
    }
}

impl<V: Vertex + HasNormal> VertexCursor<'_, V> {
    pub fn normal(&mut self, normal: impl Into<[f32; 3]>) -> &mut Self {
        self.current.set_normal(normal.into());
        self
    }
}

impl<V: Vertex + HasTexcoord> VertexCursor<'_, V> {
    pub fn texcoord(&mut self, texcoord: impl Into<[f32; 2]>) -> &mut Self {
        self.current.set_texcoord(texcoord.into());
        self
    }
}

impl<V: Vertex + HasBone> VertexCursor<'_, V> {
    pub fn bone(&mut self, bone: impl Into<[f32; 4]>) -> &mut Self {
        self.current.set_bone(bone.into());
        self
    }
}
