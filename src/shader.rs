//! OpenGL Shaders
//!
//! This module defines the [`Shader`] and [`ShaderProgram`] structs for compiling and linking
//! shaders, the [`Uniform`] trait for setting uniform variables, and the derived program
//! variants:
//!
//! - [`PvmShader`]: resolves the projection, view and model matrices.
//! - [`TextureShader`]: additionally binds the texture sampler to unit 0.
//! - [`SkinnedShader`]: additionally owns the uniform buffer backing the bone matrix block.
//! - [`LayoutShader`]: pairs one of the above with a [`Vertex`] layout and configures the
//!   attribute pointers for it.

use std::{
    cell::RefCell,
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    sync::Arc,
};

use fxhash::FxHashMap;
use glam::{IVec3, Mat4, Vec2, Vec3, Vec4};
use log::{debug, error, warn};

use crate::{
    builtin,
    config::{GlConfig, UniformNames},
    context::GlContext,
    vertex::Vertex,
};

/// Uniform buffer binding point the bone matrix block is attached to.
pub const BONES_BINDING: u32 = 0;

/// Bytes taken by one bone matrix in the uniform buffer.
const BONE_SIZE: usize = size_of::<f32>() * 16;

/// Preprocessor symbol holding the bone array length in the built-in skinned shader.
pub const MAX_BONES_DEFINE: &str = "MAX_BONES";

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("shader program failed to link: {log}")]
    Link { log: String },
    #[error("failed to read shader source {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no built-in shader named `{0}`")]
    UnknownBuiltin(String),
    #[error("{count} bone matrices exceed the maximum of {max}")]
    TooManyBones { count: usize, max: usize },
    #[error("shader program has been released")]
    Released,
    #[error("driver error: {0}")]
    Driver(String),
}

impl ShaderError {
    /// The driver's diagnostic text, for compile and link failures.
    pub fn info_log(&self) -> Option<&str> {
        match self {
            Self::Compile { log, .. } | Self::Link { log } => Some(log),
            _ => None,
        }
    }
}

fn non_empty(log: String) -> String {
    if log.trim().is_empty() {
        "driver returned an empty info log".to_string()
    } else {
        log
    }
}

fn read_source(path: &Path) -> Result<String, ShaderError> {
    std::fs::read_to_string(path).map_err(|source| ShaderError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn gl_enum(self) -> u32 {
        match self {
            Self::Vertex => glow::VERTEX_SHADER,
            Self::Fragment => glow::FRAGMENT_SHADER,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}

/// Represents an individual compiled shader stage.
pub struct Shader<G: GlContext = glow::Context> {
    gl: Arc<G>,
    id: G::Shader,
    stage: ShaderStage,
}

impl<G: GlContext> Shader<G> {
    /// Compiles a new shader from the given source code.
    pub fn new(gl: &Arc<G>, stage: ShaderStage, source: &str) -> Result<Self, ShaderError> {
        unsafe {
            let shader = gl
                .create_shader(stage.gl_enum())
                .map_err(ShaderError::Driver)?;
            gl.shader_source(shader, source);
            gl.compile_shader(shader);

            if !gl.get_shader_compile_status(shader) {
                let log = non_empty(gl.get_shader_info_log(shader));
                gl.delete_shader(shader);
                error!("{stage} shader failed to compile: {log}");
                return Err(ShaderError::Compile { stage, log });
            }

            Ok(Self {
                gl: Arc::clone(gl),
                id: shader,
                stage,
            })
        }
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

impl<G: GlContext> Drop for Shader<G> {
    fn drop(&mut self) {
        unsafe {
            self.gl.delete_shader(self.id);
        }
    }
}

/// Represents a uniform value that can be uploaded to a resolved location.
pub trait Uniform {
    fn apply<G: GlContext>(&self, gl: &G, location: &G::UniformLocation);
}

impl Uniform for bool {
    fn apply<G: GlContext>(&self, gl: &G, location: &G::UniformLocation) {
        unsafe { gl.uniform_1_i32(Some(location), *self as i32) }
    }
}

impl Uniform for i32 {
    fn apply<G: GlContext>(&self, gl: &G, location: &G::UniformLocation) {
        unsafe { gl.uniform_1_i32(Some(location), *self) }
    }
}

impl Uniform for f32 {
    fn apply<G: GlContext>(&self, gl: &G, location: &G::UniformLocation) {
        unsafe { gl.uniform_1_f32(Some(location), *self) }
    }
}

impl Uniform for Vec2 {
    fn apply<G: GlContext>(&self, gl: &G, location: &G::UniformLocation) {
        unsafe { gl.uniform_2_f32(Some(location), self.x, self.y) }
    }
}

impl Uniform for Vec3 {
    fn apply<G: GlContext>(&self, gl: &G, location: &G::UniformLocation) {
        unsafe { gl.uniform_3_f32(Some(location), self.x, self.y, self.z) }
    }
}

impl Uniform for IVec3 {
    fn apply<G: GlContext>(&self, gl: &G, location: &G::UniformLocation) {
        unsafe { gl.uniform_3_i32(Some(location), self.x, self.y, self.z) }
    }
}

impl Uniform for Vec4 {
    fn apply<G: GlContext>(&self, gl: &G, location: &G::UniformLocation) {
        unsafe { gl.uniform_4_f32(Some(location), self.x, self.y, self.z, self.w) }
    }
}

impl Uniform for Mat4 {
    fn apply<G: GlContext>(&self, gl: &G, location: &G::UniformLocation) {
        unsafe { gl.uniform_matrix_4_f32_slice(Some(location), false, &self.to_cols_array()) }
    }
}

impl<const N: usize> Uniform for [Vec3; N] {
    fn apply<G: GlContext>(&self, gl: &G, location: &G::UniformLocation) {
        let data: Vec<f32> = self.iter().flat_map(|v| v.to_array()).collect();
        unsafe { gl.uniform_3_f32_slice(Some(location), &data) }
    }
}

impl Uniform for [Mat4] {
    fn apply<G: GlContext>(&self, gl: &G, location: &G::UniformLocation) {
        let data: Vec<f32> = self.iter().flat_map(|m| m.to_cols_array()).collect();
        unsafe { gl.uniform_matrix_4_f32_slice(Some(location), false, &data) }
    }
}

impl<T: Uniform + ?Sized> Uniform for &T {
    fn apply<G: GlContext>(&self, gl: &G, location: &G::UniformLocation) {
        (**self).apply(gl, location);
    }
}

/// Represents a linked OpenGL shader program.
///
/// Uniform and attribute locations are resolved on first use and cached. A name the program
/// does not declare resolves to `None`, is reported once as a warning, and setting it is a no-op.
pub struct ShaderProgram<G: GlContext = glow::Context> {
    gl: Arc<G>,
    id: Option<G::Program>,
    uniforms: RefCell<FxHashMap<String, Option<G::UniformLocation>>>,
    attributes: RefCell<FxHashMap<String, Option<u32>>>,
}

impl<G: GlContext> ShaderProgram<G> {
    /// Links a new shader program from the given shaders.
    pub fn link(gl: &Arc<G>, shaders: &[&Shader<G>]) -> Result<Self, ShaderError> {
        unsafe {
            let program = gl.create_program().map_err(ShaderError::Driver)?;

            for shader in shaders {
                gl.attach_shader(program, shader.id);
            }

            gl.link_program(program);

            if !gl.get_program_link_status(program) {
                let log = non_empty(gl.get_program_info_log(program));
                gl.delete_program(program);
                error!("shader program failed to link: {log}");
                return Err(ShaderError::Link { log });
            }

            for shader in shaders {
                gl.detach_shader(program, shader.id);
            }

            debug!("linked shader program {program:?}");

            Ok(Self {
                gl: Arc::clone(gl),
                id: Some(program),
                uniforms: RefCell::new(FxHashMap::default()),
                attributes: RefCell::new(FxHashMap::default()),
            })
        }
    }

    /// Compiles the vertex and fragment sources and links them into a program.
    ///
    /// The intermediate stage objects are deleted on every path, including failures.
    pub fn compile(
        gl: &Arc<G>,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, ShaderError> {
        let vertex = Shader::new(gl, ShaderStage::Vertex, vertex_source)?;
        let fragment = Shader::new(gl, ShaderStage::Fragment, fragment_source)?;
        Self::link(gl, &[&vertex, &fragment])
    }

    /// Reads both source files whole and compiles them.
    pub fn compile_from_files(
        gl: &Arc<G>,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<Self, ShaderError> {
        let vertex_source = read_source(vertex_path.as_ref())?;
        let fragment_source = read_source(fragment_path.as_ref())?;
        Self::compile(gl, &vertex_source, &fragment_source)
    }

    pub fn gl(&self) -> &Arc<G> {
        &self.gl
    }

    /// The program handle, or `None` once released.
    pub fn id(&self) -> Option<G::Program> {
        self.id
    }

    /// Binds the shader program for use.
    pub fn use_program(&self) {
        unsafe {
            self.gl.use_program(self.id);
        }
    }

    pub fn uniform_location(&self, name: &str) -> Option<G::UniformLocation> {
        let program = self.id?;
        if let Some(location) = self.uniforms.borrow().get(name) {
            return location.clone();
        }

        let location = unsafe { self.gl.get_uniform_location(program, name) };
        if location.is_none() {
            warn!("uniform `{name}` is not active in shader program {program:?}");
        }
        self.uniforms
            .borrow_mut()
            .insert(name.to_string(), location.clone());
        location
    }

    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        let program = self.id?;
        if let Some(location) = self.attributes.borrow().get(name) {
            return *location;
        }

        let location = unsafe { self.gl.get_attrib_location(program, name) };
        if location.is_none() {
            warn!("attribute `{name}` is not active in shader program {program:?}");
        }
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), location);
        location
    }

    /// Sets a uniform variable by name. The program must be in use.
    pub fn set_uniform<T: Uniform>(&self, name: &str, value: T) {
        if let Some(location) = self.uniform_location(name) {
            value.apply(&*self.gl, &location);
        }
    }

    /// Sets a uniform at an already resolved location; `None` is ignored.
    pub fn set_uniform_at<T: Uniform>(&self, location: Option<&G::UniformLocation>, value: T) {
        if self.id.is_none() {
            return;
        }
        if let Some(location) = location {
            value.apply(&*self.gl, location);
        }
    }

    /// Deletes the program. Calling it again is a no-op.
    pub fn release(&mut self) {
        if let Some(program) = self.id.take() {
            unsafe {
                self.gl.delete_program(program);
            }
            self.uniforms.borrow_mut().clear();
            self.attributes.borrow_mut().clear();
            debug!("released shader program {program:?}");
        }
    }
}

impl<G: GlContext> Drop for ShaderProgram<G> {
    fn drop(&mut self) {
        self.release();
    }
}

/// A shader program with projection, view and model matrix uniforms.
pub struct PvmShader<G: GlContext = glow::Context> {
    program: ShaderProgram<G>,
    projection: Option<G::UniformLocation>,
    view: Option<G::UniformLocation>,
    model: Option<G::UniformLocation>,
}

impl<G: GlContext> PvmShader<G> {
    pub fn from_program(program: ShaderProgram<G>, names: &UniformNames) -> Self {
        Self {
            projection: program.uniform_location(&names.projection),
            view: program.uniform_location(&names.view),
            model: program.uniform_location(&names.model),
            program,
        }
    }

    pub fn compile(
        gl: &Arc<G>,
        vertex_source: &str,
        fragment_source: &str,
        names: &UniformNames,
    ) -> Result<Self, ShaderError> {
        let program = ShaderProgram::compile(gl, vertex_source, fragment_source)?;
        Ok(Self::from_program(program, names))
    }

    /// Binds the program and uploads all three matrices. Does nothing once the program is
    /// released.
    pub fn setup_matrices(&self, projection: &Mat4, view: &Mat4, model: &Mat4) {
        if self.program.id().is_none() {
            return;
        }
        self.program.use_program();
        self.program.set_uniform_at(self.projection.as_ref(), projection);
        self.program.set_uniform_at(self.view.as_ref(), view);
        self.program.set_uniform_at(self.model.as_ref(), model);
    }

    /// Binds the program and uploads a premultiplied projection-view matrix into the projection
    /// slot, plus the model matrix. The view uniform is left untouched.
    pub fn setup_matrices_combined(&self, projection_view: &Mat4, model: &Mat4) {
        if self.program.id().is_none() {
            return;
        }
        self.program.use_program();
        self.program
            .set_uniform_at(self.projection.as_ref(), projection_view);
        self.program.set_uniform_at(self.model.as_ref(), model);
    }
}

impl<G: GlContext> Deref for PvmShader<G> {
    type Target = ShaderProgram<G>;

    fn deref(&self) -> &Self::Target {
        &self.program
    }
}

impl<G: GlContext> DerefMut for PvmShader<G> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.program
    }
}

/// A [`PvmShader`] that samples a texture bound to unit 0.
pub struct TextureShader<G: GlContext = glow::Context> {
    pvm: PvmShader<G>,
    texture: Option<G::UniformLocation>,
}

impl<G: GlContext> TextureShader<G> {
    pub fn from_pvm(pvm: PvmShader<G>, names: &UniformNames) -> Self {
        let texture = pvm.uniform_location(&names.texture);
        pvm.use_program();
        pvm.set_uniform_at(texture.as_ref(), 0i32);
        Self { pvm, texture }
    }

    pub fn compile(
        gl: &Arc<G>,
        vertex_source: &str,
        fragment_source: &str,
        names: &UniformNames,
    ) -> Result<Self, ShaderError> {
        let pvm = PvmShader::compile(gl, vertex_source, fragment_source, names)?;
        Ok(Self::from_pvm(pvm, names))
    }

    pub fn texture_location(&self) -> Option<&G::UniformLocation> {
        self.texture.as_ref()
    }
}

impl<G: GlContext> Deref for TextureShader<G> {
    type Target = PvmShader<G>;

    fn deref(&self) -> &Self::Target {
        &self.pvm
    }
}

impl<G: GlContext> DerefMut for TextureShader<G> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.pvm
    }
}

/// A [`TextureShader`] for skinned meshes.
///
/// Owns a uniform buffer with room for `max_bone_count` matrices, attached to the bone block
/// at [`BONES_BINDING`].
pub struct SkinnedShader<G: GlContext = glow::Context> {
    textured: TextureShader<G>,
    bones_block: Option<u32>,
    bones_buffer: Option<G::Buffer>,
    bones_size: i32,
    max_bone_count: usize,
}

impl<G: GlContext> SkinnedShader<G> {
    pub fn from_textured(
        textured: TextureShader<G>,
        names: &UniformNames,
        max_bone_count: usize,
    ) -> Result<Self, ShaderError> {
        let program = textured.id().ok_or(ShaderError::Released)?;
        let gl = Arc::clone(textured.gl());
        let size = i32::try_from(max_bone_count * BONE_SIZE).map_err(|_| {
            ShaderError::Driver(format!("bone buffer for {max_bone_count} bones is too large"))
        })?;

        unsafe {
            let bones_block = gl.get_uniform_block_index(program, &names.bones);
            match bones_block {
                Some(index) => gl.uniform_block_binding(program, index, BONES_BINDING),
                None => warn!(
                    "uniform block `{}` is not active in shader program {program:?}",
                    names.bones
                ),
            }

            let buffer = gl.create_buffer().map_err(ShaderError::Driver)?;
            gl.bind_buffer(glow::UNIFORM_BUFFER, Some(buffer));
            gl.buffer_data_size(glow::UNIFORM_BUFFER, size, glow::STREAM_DRAW);
            gl.bind_buffer(glow::UNIFORM_BUFFER, None);

            Ok(Self {
                textured,
                bones_block,
                bones_buffer: Some(buffer),
                bones_size: size,
                max_bone_count,
            })
        }
    }

    pub fn compile(
        gl: &Arc<G>,
        vertex_source: &str,
        fragment_source: &str,
        names: &UniformNames,
        max_bone_count: usize,
    ) -> Result<Self, ShaderError> {
        let textured = TextureShader::compile(gl, vertex_source, fragment_source, names)?;
        Self::from_textured(textured, names, max_bone_count)
    }

    pub fn max_bone_count(&self) -> usize {
        self.max_bone_count
    }

    pub fn bones_block(&self) -> Option<u32> {
        self.bones_block
    }

    /// Binds the program and uploads the bone matrices to the start of the uniform buffer.
    ///
    /// The whole buffer stays bound to the block, so slots past `bones.len()` keep whatever was
    /// uploaded before.
    pub fn setup_bones(&self, bones: &[Mat4]) -> Result<(), ShaderError> {
        if bones.len() > self.max_bone_count {
            return Err(ShaderError::TooManyBones {
                count: bones.len(),
                max: self.max_bone_count,
            });
        }
        let buffer = self.bones_buffer.ok_or(ShaderError::Released)?;

        self.use_program();
        if bones.is_empty() {
            return Ok(());
        }

        let data: Vec<f32> = bones.iter().flat_map(|m| m.to_cols_array()).collect();
        let bytes: &[u8] = bytemuck::cast_slice(&data);
        let gl = self.gl();
        unsafe {
            gl.bind_buffer(glow::UNIFORM_BUFFER, Some(buffer));
            gl.buffer_sub_data_u8_slice(glow::UNIFORM_BUFFER, 0, bytes);
            gl.bind_buffer_range(
                glow::UNIFORM_BUFFER,
                BONES_BINDING,
                Some(buffer),
                0,
                self.bones_size,
            );
            gl.bind_buffer(glow::UNIFORM_BUFFER, None);
        }
        Ok(())
    }

    /// Deletes the bone buffer and the program. Calling it again is a no-op.
    pub fn release(&mut self) {
        if let Some(buffer) = self.bones_buffer.take() {
            unsafe {
                self.textured.gl().delete_buffer(buffer);
            }
        }
        self.textured.pvm.program.release();
    }
}

impl<G: GlContext> Drop for SkinnedShader<G> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<G: GlContext> Deref for SkinnedShader<G> {
    type Target = TextureShader<G>;

    fn deref(&self) -> &Self::Target {
        &self.textured
    }
}

/// A program variant that can be compiled from sources and a [`GlConfig`].
pub trait ShaderVariant<G: GlContext>: Sized {
    fn compile_with(
        gl: &Arc<G>,
        vertex_source: &str,
        fragment_source: &str,
        config: &GlConfig,
    ) -> Result<Self, ShaderError>;

    fn program(&self) -> &ShaderProgram<G>;

    /// Deletes every driver object the variant owns. Calling it again is a no-op.
    fn release(&mut self);
}

impl<G: GlContext> ShaderVariant<G> for PvmShader<G> {
    fn compile_with(
        gl: &Arc<G>,
        vertex_source: &str,
        fragment_source: &str,
        config: &GlConfig,
    ) -> Result<Self, ShaderError> {
        Self::compile(gl, vertex_source, fragment_source, &config.uniforms)
    }

    fn program(&self) -> &ShaderProgram<G> {
        &self.program
    }

    fn release(&mut self) {
        self.program.release();
    }
}

impl<G: GlContext> ShaderVariant<G> for TextureShader<G> {
    fn compile_with(
        gl: &Arc<G>,
        vertex_source: &str,
        fragment_source: &str,
        config: &GlConfig,
    ) -> Result<Self, ShaderError> {
        Self::compile(gl, vertex_source, fragment_source, &config.uniforms)
    }

    fn program(&self) -> &ShaderProgram<G> {
        &self.pvm.program
    }

    fn release(&mut self) {
        self.pvm.program.release();
    }
}

impl<G: GlContext> ShaderVariant<G> for SkinnedShader<G> {
    fn compile_with(
        gl: &Arc<G>,
        vertex_source: &str,
        fragment_source: &str,
        config: &GlConfig,
    ) -> Result<Self, ShaderError> {
        Self::compile(
            gl,
            vertex_source,
            fragment_source,
            &config.uniforms,
            config.max_bone_count,
        )
    }

    fn program(&self) -> &ShaderProgram<G> {
        &self.textured.pvm.program
    }

    fn release(&mut self) {
        SkinnedShader::release(self);
    }
}

/// A shader variant bound to the attribute layout of the vertex type `V`.
///
/// One attribute location per layout field is resolved right after linking, using the names in
/// [`GlConfig::attributes`].
pub struct LayoutShader<V: Vertex, G: GlContext = glow::Context> {
    shader: V::Shader<G>,
    locations: Vec<Option<u32>>,
    _vertex: PhantomData<fn() -> V>,
}

impl<V: Vertex, G: GlContext> LayoutShader<V, G> {
    pub fn compile(
        gl: &Arc<G>,
        vertex_source: &str,
        fragment_source: &str,
        config: &GlConfig,
    ) -> Result<Self, ShaderError> {
        let shader = <V::Shader<G> as ShaderVariant<G>>::compile_with(
            gl,
            vertex_source,
            fragment_source,
            config,
        )?;
        let locations = V::LAYOUT
            .attributes()
            .iter()
            .map(|attribute| {
                shader
                    .program()
                    .attribute_location(config.attributes.name(attribute.kind))
            })
            .collect();

        Ok(Self {
            shader,
            locations,
            _vertex: PhantomData,
        })
    }

    pub fn compile_from_files(
        gl: &Arc<G>,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
        config: &GlConfig,
    ) -> Result<Self, ShaderError> {
        let vertex_source = read_source(vertex_path.as_ref())?;
        let fragment_source = read_source(fragment_path.as_ref())?;
        Self::compile(gl, &vertex_source, &fragment_source, config)
    }

    /// Compiles the built-in shader written for `V`.
    ///
    /// The vertex stage gets [`MAX_BONES_DEFINE`] set to `config.max_bone_count`, so the bone
    /// block of the skinned shader is exactly as large as its uniform buffer.
    pub fn builtin(gl: &Arc<G>, config: &GlConfig) -> Result<Self, ShaderError> {
        let sources = builtin::sources(V::BUILTIN)
            .ok_or_else(|| ShaderError::UnknownBuiltin(V::BUILTIN.to_string()))?;
        let vertex = builtin::with_define(sources.vertex, MAX_BONES_DEFINE, config.max_bone_count);
        Self::compile(gl, &vertex, sources.fragment, config)
    }

    pub fn gl(&self) -> &Arc<G> {
        self.shader.program().gl()
    }

    /// Releases the underlying program and anything else the variant owns.
    pub fn release(&mut self) {
        self.shader.release();
    }

    /// Resolved attribute locations, in layout order.
    pub fn locations(&self) -> &[Option<u32>] {
        &self.locations
    }

    /// Enables and configures one float attribute pointer per layout field for the currently
    /// bound vertex array and array buffer. Fields without a location are skipped.
    pub fn setup_attributes(&self) {
        let gl = self.gl();
        for (pointer, location) in V::LAYOUT.pointers().zip(&self.locations) {
            let Some(location) = *location else {
                continue;
            };
            unsafe {
                gl.vertex_attrib_pointer_f32(
                    location,
                    pointer.attribute.components as i32,
                    glow::FLOAT,
                    false,
                    pointer.stride as i32,
                    pointer.offset as i32,
                );
                gl.enable_vertex_attrib_array(location);
            }
        }
    }
}

impl<V: Vertex, G: GlContext> Deref for LayoutShader<V, G> {
    type Target = V::Shader<G>;

    fn deref(&self) -> &Self::Target {
        &self.shader
    }
}

impl<V: Vertex, G: GlContext> DerefMut for LayoutShader<V, G> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.shader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        context::testing::{Call, RecordingContext},
        vertex::{ColorVertex, SkinnedVertex, TexturedVertex},
    };

    const VERT: &str = "\
#version 330 core
in vec3 vertex;
in vec4 color;
uniform mat4 u_projection;
uniform mat4 u_view;
uniform mat4 u_model;
out vec4 v_color;
void main() { v_color = color; gl_Position = u_projection * u_view * u_model * vec4(vertex, 1.0); }
";

    const FRAG: &str = "\
#version 330 core
in vec4 v_color;
out vec4 frag_color;
void main() { frag_color = v_color; }
";

    fn context() -> Arc<RecordingContext> {
        Arc::new(RecordingContext::new())
    }

    #[test]
    fn test_compiling_twice_gives_independent_programs() {
        let gl = context();
        let a = ShaderProgram::compile(&gl, VERT, FRAG).unwrap();
        let b = ShaderProgram::compile(&gl, VERT, FRAG).unwrap();
        assert!(a.id().is_some());
        assert!(b.id().is_some());
        assert_ne!(a.id(), b.id());

        drop(a);
        assert_eq!(gl.count(|c| matches!(c, Call::DeleteProgram(_))), 1);
        assert!(b.uniform_location("u_model").is_some());
    }

    #[test]
    fn test_malformed_source_fails_with_info_log() {
        let gl = context();
        let err = ShaderProgram::compile(&gl, "this is not glsl", FRAG)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ShaderError::Compile {
                stage: ShaderStage::Vertex,
                ..
            }
        ));
        assert!(!err.info_log().unwrap().is_empty());
        assert_eq!(gl.count(|c| matches!(c, Call::CreateProgram(_))), 0);
        assert_eq!(gl.count(|c| matches!(c, Call::DeleteShader(_))), 1);
    }

    #[test]
    fn test_fragment_failure_deletes_vertex_stage() {
        let gl = context();
        let err = ShaderProgram::compile(&gl, VERT, "out vec4 c;").err().unwrap();
        assert!(matches!(
            err,
            ShaderError::Compile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        assert_eq!(gl.count(|c| matches!(c, Call::DeleteShader(_))), 2);
    }

    #[test]
    fn test_link_failure_deletes_program() {
        let gl = context();
        let fragment = Shader::new(&gl, ShaderStage::Fragment, FRAG).unwrap();
        let err = ShaderProgram::link(&gl, &[&fragment]).err().unwrap();
        assert!(matches!(err, ShaderError::Link { .. }));
        assert!(!err.info_log().unwrap().is_empty());
        assert_eq!(gl.count(|c| matches!(c, Call::DeleteProgram(_))), 1);
    }

    #[test]
    fn test_missing_source_file() {
        let gl = context();
        let err = ShaderProgram::compile_from_files(&gl, "/no/such/vert.glsl", "/no/such/frag.glsl")
            .err()
            .unwrap();
        assert!(matches!(err, ShaderError::Io { .. }));
    }

    #[test]
    fn test_compile_from_files() {
        let gl = context();
        let dir = std::env::temp_dir().join(format!("gl-utilities-shader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("vert.glsl"), VERT).unwrap();
        std::fs::write(dir.join("frag.glsl"), FRAG).unwrap();

        let program =
            ShaderProgram::compile_from_files(&gl, dir.join("vert.glsl"), dir.join("frag.glsl"));
        std::fs::remove_dir_all(&dir).unwrap();
        assert!(program.unwrap().id().is_some());
    }

    #[test]
    fn test_uniform_locations_are_cached() {
        let gl = context();
        let program = ShaderProgram::compile(&gl, VERT, FRAG).unwrap();
        gl.clear_calls();

        let first = program.uniform_location("u_view");
        let second = program.uniform_location("u_view");
        assert_eq!(first, second);
        assert_eq!(gl.count(|c| matches!(c, Call::UniformLookup(_))), 1);
    }

    #[test]
    fn test_unknown_uniform_is_ignored() {
        let gl = context();
        let program = ShaderProgram::compile(&gl, VERT, FRAG).unwrap();
        gl.clear_calls();

        program.set_uniform("u_time", 1.5f32);
        program.set_uniform("u_time", 2.5f32);
        assert!(program.uniform_location("u_time").is_none());
        assert_eq!(gl.count(|c| matches!(c, Call::UniformF32(..))), 0);
        assert_eq!(gl.count(|c| matches!(c, Call::UniformLookup(_))), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let gl = context();
        let mut program = ShaderProgram::compile(&gl, VERT, FRAG).unwrap();
        program.release();
        program.release();
        assert!(program.id().is_none());
        assert!(program.uniform_location("u_view").is_none());
        drop(program);
        assert_eq!(gl.count(|c| matches!(c, Call::DeleteProgram(_))), 1);
    }

    #[test]
    fn test_pvm_setup_matrices() {
        let gl = context();
        let shader = PvmShader::compile(&gl, VERT, FRAG, &UniformNames::default()).unwrap();
        gl.clear_calls();

        shader.setup_matrices(&Mat4::IDENTITY, &Mat4::IDENTITY, &Mat4::from_scale(Vec3::splat(2.0)));
        let calls = gl.calls();
        assert_eq!(calls[0], Call::UseProgram(shader.id()));
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::UniformMatrix4(..))).count(), 3);
        assert!(calls.contains(&Call::UniformMatrix4(
            shader.uniform_location("u_model").unwrap(),
            Mat4::from_scale(Vec3::splat(2.0)).to_cols_array().to_vec(),
        )));

        gl.clear_calls();
        shader.setup_matrices_combined(&Mat4::IDENTITY, &Mat4::IDENTITY);
        assert_eq!(gl.count(|c| matches!(c, Call::UniformMatrix4(..))), 2);
    }

    #[test]
    fn test_setup_matrices_after_release_is_silent() {
        let gl = context();
        let mut shader = PvmShader::compile(&gl, VERT, FRAG, &UniformNames::default()).unwrap();
        shader.release();
        gl.clear_calls();

        shader.setup_matrices(&Mat4::IDENTITY, &Mat4::IDENTITY, &Mat4::IDENTITY);
        shader.setup_matrices_combined(&Mat4::IDENTITY, &Mat4::IDENTITY);
        assert!(gl.calls().is_empty());
    }

    #[test]
    fn test_uniform_values_reach_the_driver() {
        let gl = context();
        let program = ShaderProgram::compile(&gl, VERT, FRAG).unwrap();
        let loc = program.uniform_location("u_model").unwrap();
        gl.clear_calls();

        program.set_uniform("u_model", true);
        program.set_uniform("u_model", 7i32);
        program.set_uniform("u_model", Vec2::new(1.0, 2.0));
        program.set_uniform("u_model", Vec3::new(1.0, 2.0, 3.0));
        program.set_uniform("u_model", IVec3::new(4, 5, 6));
        program.set_uniform("u_model", Vec4::new(1.0, 2.0, 3.0, 4.0));
        program.set_uniform("u_model", [Vec3::X, Vec3::Y]);
        let bones = [Mat4::IDENTITY, Mat4::from_scale(Vec3::splat(2.0))];
        program.set_uniform("u_model", &bones[..]);

        let mut matrices = Mat4::IDENTITY.to_cols_array().to_vec();
        matrices.extend(Mat4::from_scale(Vec3::splat(2.0)).to_cols_array());
        assert_eq!(
            gl.calls(),
            vec![
                Call::UniformI32(loc, vec![1]),
                Call::UniformI32(loc, vec![7]),
                Call::UniformF32(loc, vec![1.0, 2.0]),
                Call::UniformF32(loc, vec![1.0, 2.0, 3.0]),
                Call::UniformI32(loc, vec![4, 5, 6]),
                Call::UniformF32(loc, vec![1.0, 2.0, 3.0, 4.0]),
                Call::UniformF32(loc, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
                Call::UniformMatrix4(loc, matrices),
            ]
        );
    }

    #[test]
    fn test_texture_shader_binds_sampler_to_unit_zero() {
        let gl = context();
        let sources = builtin::sources("textured").unwrap();
        let shader =
            TextureShader::compile(&gl, sources.vertex, sources.fragment, &UniformNames::default())
                .unwrap();
        let location = *shader.texture_location().unwrap();
        assert!(gl.calls().contains(&Call::UniformI32(location, vec![0])));
    }

    #[test]
    fn test_skinned_shader_bone_buffer() {
        let gl = context();
        let config = GlConfig {
            max_bone_count: 4,
            ..GlConfig::default()
        };
        let shader = LayoutShader::<SkinnedVertex, _>::builtin(&gl, &config).unwrap();
        assert_eq!(shader.bones_block(), Some(0));
        assert!(gl.calls().contains(&Call::BufferDataSize(
            glow::UNIFORM_BUFFER,
            4 * 64,
            glow::STREAM_DRAW
        )));
        let source = gl.program_source(shader.id().unwrap()).unwrap();
        assert!(source.contains("#define MAX_BONES 4\n"));

        // two matrices are uploaded but the whole block stays bound
        gl.clear_calls();
        shader.setup_bones(&[Mat4::IDENTITY, Mat4::IDENTITY]).unwrap();
        let calls = gl.calls();
        assert!(calls.iter().any(|c| matches!(
            c,
            Call::BufferSubData(glow::UNIFORM_BUFFER, 0, data) if data.len() == 128
        )));
        let ranges: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::BindBufferRange(glow::UNIFORM_BUFFER, BONES_BINDING, Some(_), offset, size) => {
                    Some((*offset, *size))
                }
                _ => None,
            })
            .collect();
        assert_eq!(ranges, vec![(0, 4 * 64)]);

        let err = shader.setup_bones(&[Mat4::IDENTITY; 5]).unwrap_err();
        assert!(matches!(err, ShaderError::TooManyBones { count: 5, max: 4 }));
    }

    #[test]
    fn test_default_bone_budget_sizes_block_and_buffer() {
        let gl = context();
        let shader = LayoutShader::<SkinnedVertex, _>::builtin(&gl, &GlConfig::default()).unwrap();
        let source = gl.program_source(shader.id().unwrap()).unwrap();
        assert!(source.starts_with("#version 330 core\n#define MAX_BONES 64\n"));

        shader.setup_bones(&[Mat4::IDENTITY; 2]).unwrap();
        assert!(gl.calls().iter().any(|c| matches!(
            c,
            Call::BindBufferRange(glow::UNIFORM_BUFFER, BONES_BINDING, Some(_), 0, 4096)
        )));
    }

    #[test]
    fn test_skinned_release_deletes_buffer_once() {
        let gl = context();
        let mut shader =
            SkinnedShader::compile(&gl, VERT, FRAG, &UniformNames::default(), 8).unwrap();
        shader.release();
        shader.release();
        assert!(matches!(shader.setup_bones(&[]), Err(ShaderError::Released)));
        drop(shader);
        assert_eq!(gl.count(|c| matches!(c, Call::DeleteBuffer(_))), 1);
        assert_eq!(gl.count(|c| matches!(c, Call::DeleteProgram(_))), 1);
    }

    #[test]
    fn test_layout_shader_resolves_attributes() {
        let gl = context();
        let shader = LayoutShader::<ColorVertex, _>::compile(&gl, VERT, FRAG, &GlConfig::default())
            .unwrap();
        assert!(shader.locations().iter().all(Option::is_some));

        gl.clear_calls();
        shader.setup_attributes();
        let pointers: Vec<_> = gl
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::VertexAttribPointer {
                    size,
                    stride,
                    offset,
                    ..
                } => Some((size, stride, offset)),
                _ => None,
            })
            .collect();
        assert_eq!(pointers, vec![(3, 28, 0), (4, 28, 12)]);
        assert_eq!(gl.count(|c| matches!(c, Call::EnableVertexAttribArray(_))), 2);
    }

    #[test]
    fn test_layout_shader_skips_missing_attributes() {
        let gl = context();
        // The color program declares no normal or texcoord inputs.
        let shader =
            LayoutShader::<TexturedVertex, _>::compile(&gl, VERT, FRAG, &GlConfig::default())
                .unwrap();
        assert_eq!(shader.locations().iter().filter(|l| l.is_some()).count(), 1);

        gl.clear_calls();
        shader.setup_attributes();
        assert_eq!(gl.count(|c| matches!(c, Call::VertexAttribPointer { .. })), 1);
    }

    #[test]
    fn test_layout_shader_release() {
        let gl = context();
        let mut textured =
            LayoutShader::<TexturedVertex, _>::builtin(&gl, &GlConfig::default()).unwrap();
        textured.release();
        textured.release();
        assert!(textured.id().is_none());

        let mut skinned =
            LayoutShader::<SkinnedVertex, _>::builtin(&gl, &GlConfig::default()).unwrap();
        skinned.release();
        assert!(matches!(skinned.setup_bones(&[]), Err(ShaderError::Released)));

        drop(textured);
        drop(skinned);
        assert_eq!(gl.count(|c| matches!(c, Call::DeleteProgram(_))), 2);
        assert_eq!(gl.count(|c| matches!(c, Call::DeleteBuffer(_))), 1);
    }

    #[test]
    fn test_layout_shader_from_files() {
        let gl = context();
        let dir = std::env::temp_dir().join(format!("gl-utilities-layout-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("vert.glsl"), VERT).unwrap();
        std::fs::write(dir.join("frag.glsl"), FRAG).unwrap();

        let shader = LayoutShader::<ColorVertex, _>::compile_from_files(
            &gl,
            dir.join("vert.glsl"),
            dir.join("frag.glsl"),
            &GlConfig::default(),
        );
        let missing = LayoutShader::<ColorVertex, _>::compile_from_files(
            &gl,
            dir.join("missing.glsl"),
            dir.join("frag.glsl"),
            &GlConfig::default(),
        );
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(shader.unwrap().locations(), &[Some(0), Some(1)]);
        assert!(matches!(missing.err().unwrap(), ShaderError::Io { .. }));
    }
}
