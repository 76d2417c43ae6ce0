//! Camera-facing billboard quads.
//!
//! A sprite caches its billboard transform and only recomputes it when
//! invalidated. The renderer invalidates every sprite when the camera
//! moves or rotates; sprites invalidate themselves when repositioned.

use crate::foundation::math::{Mat3, Mat4, Vec2, Vec3};
use crate::render::material::{MaterialId, MaterialRegistry};
use crate::render::system::{MatrixMode, RenderSystem, VertexMode};

/// A billboard quad of a given radius.
#[derive(Debug, Clone)]
pub struct Sprite {
    material: MaterialId,
    radius: f32,
    position: Vec3,
    trans_pos: Mat4,
    invalid_trans_pos: bool,
}

impl Sprite {
    /// Create a sprite drawing `material` at the given radius.
    pub fn new(material: MaterialId, radius: f32) -> Self {
        Self {
            material,
            radius,
            position: Vec3::zeros(),
            trans_pos: Mat4::identity(),
            invalid_trans_pos: true,
        }
    }

    /// Move the sprite and drop the cached transform.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.invalidate();
    }

    /// World position of the sprite center.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Replace the sprite material.
    pub fn set_material(&mut self, material: MaterialId) {
        self.material = material;
    }

    /// The sprite material.
    pub fn material(&self) -> MaterialId {
        self.material
    }

    /// Set the sprite radius. A radius of zero hides the sprite.
    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
    }

    /// The sprite radius.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Mark the cached billboard transform as stale.
    pub fn invalidate(&mut self) {
        self.invalid_trans_pos = true;
    }

    /// Rebuild the cached orientation + translation so the quad faces
    /// the camera.
    fn calculate_trans_pos(&mut self, camera_position: Vec3) {
        let spr_z = (self.position - camera_position)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vec3::z);

        let spr_x = Vec3::y()
            .cross(&spr_z)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vec3::x);
        let spr_y = spr_z.cross(&spr_x);

        let rotation = Mat3::from_columns(&[spr_x, spr_y, spr_z]);
        self.trans_pos = Mat4::new_translation(&self.position) * rotation.to_homogeneous();
        self.invalid_trans_pos = false;
    }

    /// Draw the billboard. The modelview must already hold the camera
    /// view; the cached transform is multiplied on top of it.
    pub fn draw(
        &mut self,
        rs: &mut dyn RenderSystem,
        materials: &mut MaterialRegistry,
        camera_position: Vec3,
    ) {
        if self.radius == 0.0 {
            return;
        }

        if self.invalid_trans_pos {
            self.calculate_trans_pos(camera_position);
        }

        rs.set_matrix_mode(MatrixMode::Modelview);
        rs.mult_matrix(&self.trans_pos);

        let saved = materials
            .get_mut(self.material)
            .map(|material| material.start(rs));

        let r = self.radius;
        rs.start_vertices(VertexMode::Quads);
        rs.tex_coord(Vec2::new(0.0, 0.0));
        rs.vertex(Vec3::new(-r, -r, 0.0));
        rs.tex_coord(Vec2::new(1.0, 0.0));
        rs.vertex(Vec3::new(r, -r, 0.0));
        rs.tex_coord(Vec2::new(1.0, 1.0));
        rs.vertex(Vec3::new(r, r, 0.0));
        rs.tex_coord(Vec2::new(0.0, 1.0));
        rs.vertex(Vec3::new(-r, r, 0.0));
        rs.end_vertices();

        if let (Some(saved), Some(material)) = (saved, materials.get_mut(self.material)) {
            material.finish(rs, saved);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::immediate::ImmediateRenderSystem;
    use crate::render::material::Material;
    use approx::assert_relative_eq;

    fn booted() -> ImmediateRenderSystem {
        let mut rs = ImmediateRenderSystem::new();
        rs.initialize().unwrap();
        rs.configure().unwrap();
        rs.create_window(640, 480).unwrap();
        rs.frame_start();
        rs
    }

    fn registry_with_material() -> (MaterialRegistry, MaterialId) {
        let mut materials = MaterialRegistry::new();
        let id = materials.register("billboard", Material::default());
        (materials, id)
    }

    #[test]
    fn zero_radius_draws_nothing() {
        let mut rs = booted();
        let (mut materials, id) = registry_with_material();

        let mut sprite = Sprite::new(id, 0.0);
        sprite.draw(&mut rs, &mut materials, Vec3::zeros());
        assert_eq!(rs.frame_stats().batches, 0);
    }

    #[test]
    fn draw_emits_one_quad() {
        let mut rs = booted();
        let (mut materials, id) = registry_with_material();

        let mut sprite = Sprite::new(id, 2.0);
        sprite.set_position(Vec3::new(0.0, 0.0, -10.0));
        sprite.draw(&mut rs, &mut materials, Vec3::zeros());

        let batches = rs.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].mode, VertexMode::Quads);
        assert_eq!(batches[0].positions.len(), 4);
    }

    #[test]
    fn billboard_faces_the_camera() {
        let mut rs = booted();
        let (mut materials, id) = registry_with_material();

        let mut sprite = Sprite::new(id, 1.0);
        sprite.set_position(Vec3::new(0.0, 0.0, -10.0));
        sprite.draw(&mut rs, &mut materials, Vec3::zeros());

        // The quad's local Z axis points from the camera to the sprite:
        // here straight down world negative Z.
        let mv = rs.batches()[0].modelview;
        let local_z = mv.transform_vector(&Vec3::z());
        assert_relative_eq!(local_z, -Vec3::z(), epsilon = 1e-5);
    }
}
