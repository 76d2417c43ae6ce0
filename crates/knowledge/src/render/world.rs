//! World (level geometry) abstraction.

use crate::render::camera::Camera;
use crate::render::material::MaterialRegistry;
use crate::render::system::RenderSystem;

/// A level-sized structure the renderer draws from the camera's point
/// of view, before any individual 3D drawables. Implementations handle
/// their own visibility determination.
pub trait World {
    /// Draw everything visible from the viewer camera.
    fn draw(
        &mut self,
        rs: &mut dyn RenderSystem,
        materials: &mut MaterialRegistry,
        viewer: &Camera,
    );
}
