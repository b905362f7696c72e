//! Vertex formats.
//!
//! This module defines the closed set of vertex layouts the buffers can upload, together with
//! their declarative [`VertexLayout`] descriptors. A descriptor lists the attributes in the order
//! they are interleaved in memory; strides and byte offsets are derived from it, never written
//! out by hand.
//!
//! Every vertex struct is `#[repr(C)]` and made of plain `f32` arrays, so it has no padding and
//! its size equals the stride of its layout. This is checked at compile time below.

use bytemuck::{Pod, Zeroable};

use crate::{
    context::GlContext,
    shader::{PvmShader, ShaderVariant, SkinnedShader, TextureShader},
};

/// The kind of a per-vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Position,
    Normal,
    Texcoord,
    Color,
    Bone,
}

/// A single attribute of a vertex layout: its kind and how many floats it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    pub kind: AttributeKind,
    pub components: usize,
}

impl Attribute {
    pub const fn new(kind: AttributeKind, components: usize) -> Self {
        Self { kind, components }
    }

    /// Size of the attribute in bytes.
    pub const fn size(&self) -> usize {
        self.components * size_of::<f32>()
    }
}

/// Where an attribute lives inside an interleaved vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributePointer {
    pub attribute: Attribute,
    pub offset: usize,
    pub stride: usize,
}

/// Declarative description of an interleaved vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    attributes: &'static [Attribute],
}

impl VertexLayout {
    pub const fn new(attributes: &'static [Attribute]) -> Self {
        Self { attributes }
    }

    /// The attributes in their declared (memory) order.
    pub fn attributes(&self) -> &'static [Attribute] {
        self.attributes
    }

    /// Size of one vertex in bytes: the sum of all attribute sizes.
    pub const fn stride(&self) -> usize {
        let mut stride = 0;
        let mut i = 0;
        while i < self.attributes.len() {
            stride += self.attributes[i].size();
            i += 1;
        }
        stride
    }

    /// Byte offset of the given attribute, if the layout has it.
    pub fn offset_of(&self, kind: AttributeKind) -> Option<usize> {
        self.pointers()
            .find(|pointer| pointer.attribute.kind == kind)
            .map(|pointer| pointer.offset)
    }

    pub fn contains(&self, kind: AttributeKind) -> bool {
        self.attributes.iter().any(|a| a.kind == kind)
    }

    /// One pointer per attribute, offsets accumulated in declared order.
    pub fn pointers(&self) -> impl Iterator<Item = AttributePointer> + '_ {
        let stride = self.stride();
        self.attributes.iter().scan(0, move |offset, attribute| {
            let pointer = AttributePointer {
                attribute: *attribute,
                offset: *offset,
                stride,
            };
            *offset += attribute.size();
            Some(pointer)
        })
    }
}

/// A vertex that can be stored in a [`VertexBuffer`](crate::buffer::VertexBuffer).
pub trait Vertex: Pod {
    /// Memory layout of the vertex.
    const LAYOUT: VertexLayout;

    /// Name of the built-in shader written for this layout.
    const BUILTIN: &'static str;

    /// The shader variant whose uniforms this layout expects.
    type Shader<G: GlContext>: ShaderVariant<G>;

    fn position(&self) -> [f32; 3];

    fn set_position(&mut self, position: [f32; 3]);
}

pub trait HasNormal {
    fn set_normal(&mut self, normal: [f32; 3]);
}

pub trait HasTexcoord {
    fn set_texcoord(&mut self, texcoord: [f32; 2]);
}

pub trait HasColor {
    fn set_color(&mut self, color: [f32; 4]);
}

pub trait HasBone {
    fn set_bone(&mut self, bone: [f32; 4]);
}

const POSITION: Attribute = Attribute::new(AttributeKind::Position, 3);
const NORMAL: Attribute = Attribute::new(AttributeKind::Normal, 3);
const TEXCOORD: Attribute = Attribute::new(AttributeKind::Texcoord, 2);
const COLOR: Attribute = Attribute::new(AttributeKind::Color, 4);
const BONE: Attribute = Attribute::new(AttributeKind::Bone, 4);

/// Position and color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct ColorVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl ColorVertex {
    pub fn new(position: impl Into<[f32; 3]>, color: impl Into<[f32; 4]>) -> Self {
        Self {
            position: position.into(),
            color: color.into(),
        }
    }
}

impl Vertex for ColorVertex {
    const LAYOUT: VertexLayout = VertexLayout::new(&[POSITION, COLOR]);
    const BUILTIN: &'static str = "color";
    type Shader<G: GlContext> = PvmShader<G>;

    fn position(&self) -> [f32; 3] {
        self.position
    }

    fn set_position(&mut self, position: [f32; 3]) {
        self.position = position;
    }
}

impl HasColor for ColorVertex {
    fn set_color(&mut self, color: [f32; 4]) {
        self.color = color;
    }
}

/// Position, normal and texture coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct TexturedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
}

impl TexturedVertex {
    pub fn new(
        position: impl Into<[f32; 3]>,
        normal: impl Into<[f32; 3]>,
        texcoord: impl Into<[f32; 2]>,
    ) -> Self {
        Self {
            position: position.into(),
            normal: normal.into(),
            texcoord: texcoord.into(),
        }
    }
}

impl Vertex for TexturedVertex {
    const LAYOUT: VertexLayout = VertexLayout::new(&[POSITION, NORMAL, TEXCOORD]);
    const BUILTIN: &'static str = "textured";
    type Shader<G: GlContext> = TextureShader<G>;

    fn position(&self) -> [f32; 3] {
        self.position
    }

    fn set_position(&mut self, position: [f32; 3]) {
        self.position = position;
    }
}

impl HasNormal for TexturedVertex {
    fn set_normal(&mut self, normal: [f32; 3]) {
        self.normal = normal;
    }
}

impl HasTexcoord for TexturedVertex {
    fn set_texcoord(&mut self, texcoord: [f32; 2]) {
        self.texcoord = texcoord;
    }
}

/// Position, normal, texture coordinates and color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct ColoredTexturedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
    pub color: [f32; 4],
}

impl ColoredTexturedVertex {
    pub fn new(
        position: impl Into<[f32; 3]>,
        normal: impl Into<[f32; 3]>,
        texcoord: impl Into<[f32; 2]>,
        color: impl Into<[f32; 4]>,
    ) -> Self {
        Self {
            position: position.into(),
            normal: normal.into(),
            texcoord: texcoord.into(),
            color: color.into(),
        }
    }
}

impl Vertex for ColoredTexturedVertex {
    const LAYOUT: VertexLayout = VertexLayout::new(&[POSITION, NORMAL, TEXCOORD, COLOR]);
    const BUILTIN: &'static str = "colored_textured";
    type Shader<G: GlContext> = TextureShader<G>;

    fn position(&self) -> [f32; 3] {
        self.position
    }

    fn set_position(&mut self, position: [f32; 3]) {
        self.position = position;
    }
}

impl HasNormal for ColoredTexturedVertex {
    fn set_normal(&mut self, normal: [f32; 3]) {
        self.normal = normal;
    }
}

impl HasTexcoord for ColoredTexturedVertex {
    fn set_texcoord(&mut self, texcoord: [f32; 2]) {
        self.texcoord = texcoord;
    }
}

impl HasColor for ColoredTexturedVertex {
    fn set_color(&mut self, color: [f32; 4]) {
        self.color = color;
    }
}

/// Position, normal, texture coordinates, color and bone data for skinned meshes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct SkinnedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
    pub color: [f32; 4],
    pub bone: [f32; 4],
}

impl SkinnedVertex {
    pub fn new(
        position: impl Into<[f32; 3]>,
        normal: impl Into<[f32; 3]>,
        texcoord: impl Into<[f32; 2]>,
        color: impl Into<[f32; 4]>,
        bone: impl Into<[f32; 4]>,
    ) -> Self {
        Self {
            position: position.into(),
            normal: normal.into(),
            texcoord: texcoord.into(),
            color: color.into(),
            bone: bone.into(),
        }
    }
}

impl Vertex for SkinnedVertex {
    const LAYOUT: VertexLayout = VertexLayout::new(&[POSITION, NORMAL, TEXCOORD, COLOR, BONE]);
    const BUILTIN: &'static str = "skinned";
    type Shader<G: GlContext> = SkinnedShader<G>;

    fn position(&self) -> [f32; 3] {
        self.position
    }

    fn set_position(&mut self, position: [f32; 3]) {
        self.position = position;
    }
}

impl HasNormal for SkinnedVertex {
    fn set_normal(&mut self, normal: [f32; 3]) {
        self.normal = normal;
    }
}

impl HasTexcoord for SkinnedVertex {
    fn set_texcoord(&mut self, texcoord: [f32; 2]) {
        self.texcoord = texcoord;
    }
}

impl HasColor for SkinnedVertex {
    fn set_color(&mut self, color: [f32; 4]) {
        self.color = color;
    }
}

impl HasBone for SkinnedVertex {
    fn set_bone(&mut self, bone: [f32; 4]) {
        self.bone = bone;
    }
}

const _: () = {
    assert!(size_of::<ColorVertex>() == ColorVertex::LAYOUT.stride());
    assert!(size_of::<TexturedVertex>() == TexturedVertex::LAYOUT.stride());
    assert!(size_of::<ColoredTexturedVertex>() == ColoredTexturedVertex::LAYOUT.stride());
    assert!(size_of::<SkinnedVertex>() == SkinnedVertex::LAYOUT.stride());
};

#[cfg(test)]
mod tests {
    use super::*;

    use quickcheck_macros::quickcheck;

    #[test]
    fn test_color_layout_offsets() {
        let layout = ColorVertex::LAYOUT;
        assert_eq!(layout.stride(), 12 + 16);
        assert_eq!(layout.offset_of(AttributeKind::Position), Some(0));
        assert_eq!(layout.offset_of(AttributeKind::Color), Some(12));
        assert_eq!(layout.offset_of(AttributeKind::Normal), None);
    }

    #[test]
    fn test_skinned_layout_offsets() {
        let offsets: Vec<_> = SkinnedVertex::LAYOUT
            .pointers()
            .map(|p| (p.attribute.kind, p.offset, p.stride))
            .collect();
        assert_eq!(
            offsets,
            vec![
                (AttributeKind::Position, 0, 64),
                (AttributeKind::Normal, 12, 64),
                (AttributeKind::Texcoord, 24, 64),
                (AttributeKind::Color, 32, 64),
                (AttributeKind::Bone, 48, 64),
            ]
        );
    }

    #[test]
    fn test_struct_fields_match_layout_offsets() {
        let vertex = ColoredTexturedVertex::new(
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
            [7.0, 8.0],
            [9.0, 10.0, 11.0, 12.0],
        );
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&vertex));
        let color_at = ColoredTexturedVertex::LAYOUT
            .offset_of(AttributeKind::Color)
            .unwrap()
            / size_of::<f32>();
        assert_eq!(&floats[color_at..color_at + 4], &[9.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_glam_constructors() {
        let vertex = TexturedVertex::new(glam::Vec3::X, glam::Vec3::Y, glam::Vec2::ONE);
        assert_eq!(vertex.position(), [1.0, 0.0, 0.0]);
        assert_eq!(vertex.normal, [0.0, 1.0, 0.0]);
        assert_eq!(vertex.texcoord, [1.0, 1.0]);
    }

    #[quickcheck]
    fn prop_offsets_are_cumulative(components: Vec<u8>) -> bool {
        let attributes: Vec<Attribute> = components
            .iter()
            .map(|c| Attribute::new(AttributeKind::Color, (*c % 4) as usize + 1))
            .collect();
        let layout = VertexLayout::new(Box::leak(attributes.into_boxed_slice()));
        let mut expected = 0;
        layout.pointers().all(|pointer| {
            let ok = pointer.offset == expected && pointer.stride == layout.stride();
            expected += pointer.attribute.size();
            ok
        }) && expected == layout.stride()
    }
}
