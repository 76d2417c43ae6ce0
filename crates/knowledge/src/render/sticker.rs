//! Screen-space textured quads for the 2D overlay pass.

use crate::foundation::math::{Vec2, Vec3};
use crate::render::drawable::{Drawable2D, Node2};
use crate::render::material::{MaterialId, MaterialRegistry};
use crate::render::system::{RenderSystem, VertexMode};

/// A 2D element with a texture.
///
/// Position and dimensions come from the node: `scale` is the quad's
/// width and height in screen coordinates, `z` orders it against other
/// 2D drawables.
#[derive(Debug, Clone)]
pub struct Sticker {
    node: Node2,
    material: MaterialId,
}

impl Sticker {
    /// Create a sticker drawing `material`. Set its dimensions through
    /// the node's scale and its placement through the node's position.
    pub fn new(material: MaterialId) -> Self {
        Self {
            node: Node2::default(),
            material,
        }
    }

    /// The sticker material.
    pub fn material(&self) -> MaterialId {
        self.material
    }

    /// Replace the sticker material.
    pub fn set_material(&mut self, material: MaterialId) {
        self.material = material;
    }
}

impl Drawable2D for Sticker {
    fn node(&self) -> &Node2 {
        &self.node
    }

    fn node_mut(&mut self) -> &mut Node2 {
        &mut self.node
    }

    fn draw(&mut self, rs: &mut dyn RenderSystem, materials: &mut MaterialRegistry) {
        let saved = materials
            .get_mut(self.material)
            .map(|material| material.start(rs));

        let pos = self.node.position;
        let size = self.node.scale;

        // V is flipped: screen Y grows downward under the 2D projection.
        rs.start_vertices(VertexMode::Quads);
        rs.tex_coord(Vec2::new(0.0, 1.0));
        rs.vertex(Vec3::new(pos.x, pos.y, 0.0));
        rs.tex_coord(Vec2::new(1.0, 1.0));
        rs.vertex(Vec3::new(pos.x + size.x, pos.y, 0.0));
        rs.tex_coord(Vec2::new(1.0, 0.0));
        rs.vertex(Vec3::new(pos.x + size.x, pos.y + size.y, 0.0));
        rs.tex_coord(Vec2::new(0.0, 0.0));
        rs.vertex(Vec3::new(pos.x, pos.y + size.y, 0.0));
        rs.end_vertices();

        if let (Some(saved), Some(material)) = (saved, materials.get_mut(self.material)) {
            material.finish(rs, saved);
        }
    }
}
