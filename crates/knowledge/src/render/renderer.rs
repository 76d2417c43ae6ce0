//! The frame pipeline.
//!
//! [`Renderer`] owns every registered drawable, sprite, light and
//! particle emitter and traverses them in a fixed per-frame order:
//! sky, world, 3D objects (frustum-culled, with up to eight hardware
//! lights assigned per object), sprites, particles, then the 2D overlay
//! pass under an orthographic projection. Render-to-texture reroutes
//! exactly one frame into a texture and restores the viewport after.

use log::warn;
use slotmap::{new_key_type, SlotMap};

use crate::foundation::math::{Quat, Vec2, Vec3};
use crate::foundation::time::Stopwatch;
use crate::render::camera::Camera;
use crate::render::drawable::{absolute_position, Arena2, Arena3, Drawable2D, Drawable3D, Object2Key, ObjectKey};
use crate::render::light::Light;
use crate::render::material::{MaterialId, MaterialRegistry};
use crate::render::particle::PointEmitter;
use crate::render::sprite::Sprite;
use crate::render::system::{CullMode, MatrixMode, RenderSystem, VertexMode, MAX_LIGHTS};
use crate::render::texture::TextureHandle;
use crate::render::world::World;

new_key_type! {
    /// Key of a registered sprite.
    pub struct SpriteKey;

    /// Key of a registered light.
    pub struct LightKey;

    /// Key of a registered particle emitter.
    pub struct EmitterKey;
}

/// Cube face indices within a skybox material's first stage.
pub mod cube_face {
    /// Face at negative Z.
    pub const FRONT: usize = 0;
    /// Face at positive Z.
    pub const BACK: usize = 1;
    /// Face at positive X.
    pub const LEFT: usize = 2;
    /// Face at negative X.
    pub const RIGHT: usize = 3;
    /// Face at positive Y.
    pub const UP: usize = 4;
    /// Face at negative Y.
    pub const DOWN: usize = 5;
}

/// Which sky the renderer draws. Setting one clears the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Sky {
    #[default]
    None,
    Boxed(MaterialId),
    Plane(MaterialId),
}

/// Snapshot of the camera placement, for sprite invalidation.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CameraPlacement {
    position: Vec3,
    orientation: Quat,
}

/// Owns the scene and runs the per-frame pipeline.
pub struct Renderer {
    objects_3d: Arena3,
    objects_2d: Arena2,
    order_2d: Vec<Object2Key>,
    sprites: SlotMap<SpriteKey, Sprite>,
    lights: SlotMap<LightKey, Light>,
    emitters: SlotMap<EmitterKey, PointEmitter>,

    camera: Option<Camera>,
    world: Option<Box<dyn World>>,
    sky: Sky,

    render_to_texture: bool,
    rtt_size: (u32, u32),

    last_camera: Option<CameraPlacement>,

    calculate_fps: bool,
    fps_count: u32,
    last_fps: u32,
    fps_timer: Stopwatch,
    frame_clock: Stopwatch,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    /// Create an empty renderer.
    pub fn new() -> Self {
        Self {
            objects_3d: Arena3::default(),
            objects_2d: Arena2::default(),
            order_2d: Vec::new(),
            sprites: SlotMap::with_key(),
            lights: SlotMap::with_key(),
            emitters: SlotMap::with_key(),
            camera: None,
            world: None,
            sky: Sky::None,
            render_to_texture: false,
            rtt_size: (0, 0),
            last_camera: None,
            calculate_fps: true,
            fps_count: 0,
            last_fps: 1,
            fps_timer: Stopwatch::start_new(),
            frame_clock: Stopwatch::start_new(),
        }
    }

    // Scene registration

    /// Register a 3D drawable.
    pub fn push_3d(&mut self, object: Box<dyn Drawable3D>) -> ObjectKey {
        self.objects_3d.insert(object)
    }

    /// Remove a 3D drawable.
    pub fn pop_3d(&mut self, key: ObjectKey) -> Option<Box<dyn Drawable3D>> {
        self.objects_3d.remove(key)
    }

    /// Borrow a registered 3D drawable.
    pub fn get_3d(&self, key: ObjectKey) -> Option<&dyn Drawable3D> {
        self.objects_3d.get(key).map(Box::as_ref)
    }

    /// Mutably borrow a registered 3D drawable.
    pub fn get_3d_mut(&mut self, key: ObjectKey) -> Option<&mut (dyn Drawable3D + 'static)> {
        self.objects_3d.get_mut(key).map(Box::as_mut)
    }

    /// Register a 2D drawable and re-sort the overlay order.
    pub fn push_2d(&mut self, object: Box<dyn Drawable2D>) -> Object2Key {
        let key = self.objects_2d.insert(object);
        self.order_2d.push(key);
        self.sort_2d();
        key
    }

    /// Remove a 2D drawable.
    pub fn pop_2d(&mut self, key: Object2Key) -> Option<Box<dyn Drawable2D>> {
        self.order_2d.retain(|k| *k != key);
        self.objects_2d.remove(key)
    }

    /// Mutably borrow a registered 2D drawable.
    pub fn get_2d_mut(&mut self, key: Object2Key) -> Option<&mut (dyn Drawable2D + 'static)> {
        self.objects_2d.get_mut(key).map(Box::as_mut)
    }

    /// Re-sort the 2D overlay by Z, ascending. The sort is stable:
    /// equal-Z drawables keep their registration order.
    pub fn sort_2d(&mut self) {
        let arena = &self.objects_2d;
        self.order_2d.sort_by(|a, b| {
            let za = arena.get(*a).map_or(0.0, |o| o.node().z);
            let zb = arena.get(*b).map_or(0.0, |o| o.node().z);
            za.partial_cmp(&zb).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Current 2D traversal order.
    pub fn order_2d(&self) -> &[Object2Key] {
        &self.order_2d
    }

    /// Create a sprite.
    pub fn create_sprite(&mut self, radius: f32, material: MaterialId) -> SpriteKey {
        self.sprites.insert(Sprite::new(material, radius))
    }

    /// Remove a sprite.
    pub fn remove_sprite(&mut self, key: SpriteKey) -> Option<Sprite> {
        self.sprites.remove(key)
    }

    /// Mutably borrow a sprite.
    pub fn sprite_mut(&mut self, key: SpriteKey) -> Option<&mut Sprite> {
        self.sprites.get_mut(key)
    }

    /// Create a light with default parameters.
    pub fn create_light(&mut self) -> LightKey {
        self.lights.insert(Light::new())
    }

    /// Remove a light.
    pub fn remove_light(&mut self, key: LightKey) -> Option<Light> {
        self.lights.remove(key)
    }

    /// Mutably borrow a light.
    pub fn light_mut(&mut self, key: LightKey) -> Option<&mut Light> {
        self.lights.get_mut(key)
    }

    /// Register a particle emitter.
    pub fn push_emitter(&mut self, emitter: PointEmitter) -> EmitterKey {
        self.emitters.insert(emitter)
    }

    /// Remove a particle emitter.
    pub fn remove_emitter(&mut self, key: EmitterKey) -> Option<PointEmitter> {
        self.emitters.remove(key)
    }

    /// Mutably borrow a particle emitter.
    pub fn emitter_mut(&mut self, key: EmitterKey) -> Option<&mut PointEmitter> {
        self.emitters.get_mut(key)
    }

    // Camera, world, sky

    /// Install the active camera.
    pub fn set_camera(&mut self, camera: Camera) {
        self.last_camera = Some(CameraPlacement {
            position: camera.position(),
            orientation: camera.orientation(),
        });
        self.camera = Some(camera);
    }

    /// The active camera.
    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    /// Mutably borrow the active camera.
    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        self.camera.as_mut()
    }

    /// Install the world.
    pub fn set_world(&mut self, world: Box<dyn World>) {
        self.world = Some(world);
    }

    /// Remove the world.
    pub fn clear_world(&mut self) {
        self.world = None;
    }

    /// Draw a skybox with the given cube material. Clears any skyplane.
    pub fn set_sky_box(&mut self, material: MaterialId) {
        self.sky = Sky::Boxed(material);
    }

    /// Draw a tiled skyplane with the given material. Clears any skybox.
    pub fn set_sky_plane(&mut self, material: MaterialId) {
        self.sky = Sky::Plane(material);
    }

    /// Remove the sky.
    pub fn clear_sky(&mut self) {
        self.sky = Sky::None;
    }

    // Render-to-texture

    /// Arm render-to-texture: the next [`Renderer::draw`] renders into
    /// `target` at `width` x `height` instead of presenting, then the
    /// flag auto-clears. A second call before that frame overwrites the
    /// pending target.
    pub fn prepare_rtt(
        &mut self,
        rs: &mut dyn RenderSystem,
        width: u32,
        height: u32,
        target: TextureHandle,
    ) {
        rs.set_rtt_size(width, height);
        rs.set_rtt_target(Some(target));
        self.rtt_size = (width, height);
        self.render_to_texture = true;
    }

    /// Whether the next frame renders into a texture.
    pub fn is_render_to_texture(&self) -> bool {
        self.render_to_texture
    }

    // FPS bookkeeping

    /// Enable or disable the frame counter.
    pub fn set_fps_counter(&mut self, enabled: bool) {
        self.calculate_fps = enabled;
    }

    /// Frames drawn in the current one-second window.
    pub fn fps(&self) -> u32 {
        self.fps_count
    }

    /// Frame count snapshotted at the end of the last full second.
    pub fn last_fps(&self) -> u32 {
        self.last_fps
    }

    // Frame pipeline

    /// Run one full frame.
    pub fn draw(&mut self, rs: &mut dyn RenderSystem, materials: &mut MaterialRegistry) {
        if self.render_to_texture {
            let (w, h) = self.rtt_size;
            rs.set_view_port(0, 0, w, h);
            rs.set_render_to_texture(true);
        }

        rs.frame_start();

        let delta_ms = self.frame_clock.elapsed_millis();
        self.frame_clock.restart();

        apply_perspective(self.camera.as_ref(), rs);

        match self.sky {
            Sky::None => {}
            Sky::Boxed(material) => self.draw_sky_box(rs, materials, material),
            Sky::Plane(material) => self.draw_sky_plane(rs, materials, material),
        }

        // Sky drawing mutates projection state.
        rs.set_depth_test(true);
        apply_perspective(self.camera.as_ref(), rs);

        self.invalidate_sprites_if_camera_moved();

        if let (Some(world), Some(camera)) = (self.world.as_mut(), self.camera.as_ref()) {
            camera.copy_view(rs);
            world.draw(rs, materials, camera);
        }

        self.draw_3d_objects(rs, materials);
        self.draw_sprites(rs, materials);
        self.draw_particles(rs, materials, delta_ms);

        if !self.render_to_texture {
            self.draw_2d_objects(rs, materials);
        }

        rs.frame_end();

        if self.render_to_texture {
            rs.set_view_port(0, 0, rs.screen_width(), rs.screen_height());
            self.render_to_texture = false;
        }

        if self.calculate_fps {
            self.fps_count += 1;
            if self.fps_timer.elapsed_millis() > 1000.0 {
                self.fps_timer.restart();
                self.last_fps = self.fps_count;
                self.fps_count = 0;
            }
        }
    }

    fn invalidate_sprites_if_camera_moved(&mut self) {
        let Some(camera) = self.camera.as_ref() else {
            return;
        };
        let placement = CameraPlacement {
            position: camera.position(),
            orientation: camera.orientation(),
        };
        if self.last_camera != Some(placement) {
            for sprite in self.sprites.values_mut() {
                sprite.invalidate();
            }
        }
        self.last_camera = Some(placement);
    }

    /// Draw every visible, in-frustum 3D object with its lights.
    /// Opaque objects draw before transparent ones.
    fn draw_3d_objects(&mut self, rs: &mut dyn RenderSystem, materials: &mut MaterialRegistry) {
        let mut keys: Vec<ObjectKey> = self.objects_3d.keys().collect();
        keys.sort_by_key(|key| !self.objects_3d[*key].is_opaque(materials));

        for key in keys {
            let (position, culled, draw_box, bounds) = {
                let Some(object) = self.objects_3d.get(key) else {
                    continue;
                };
                let node = object.node();
                if !node.visible {
                    continue;
                }
                let position = absolute_position(&self.objects_3d, node);
                let bounds = object.bounding_box().translated(position);
                let culled = self
                    .camera
                    .as_ref()
                    .is_some_and(|c| !c.is_box_inside_frustum(&bounds));
                (position, culled, node.draw_bounding_box, bounds)
            };
            if culled {
                continue;
            }

            let used_lights = assign_lights(&self.lights, &self.objects_3d, position, rs);

            copy_view(self.camera.as_ref(), rs);
            if let Some(object) = self.objects_3d.get_mut(key) {
                object.draw(rs, materials);
            }
            if draw_box {
                copy_view(self.camera.as_ref(), rs);
                rs.draw_line_box(&bounds);
            }

            release_lights(used_lights, rs);
        }
    }

    /// Draw sprites, culling on point containment.
    fn draw_sprites(&mut self, rs: &mut dyn RenderSystem, materials: &mut MaterialRegistry) {
        let camera_position = self.camera.as_ref().map_or(Vec3::zeros(), Camera::position);
        let keys: Vec<SpriteKey> = self.sprites.keys().collect();

        for key in keys {
            let position = match self.sprites.get(key) {
                Some(sprite) => sprite.position(),
                None => continue,
            };
            if let Some(camera) = self.camera.as_ref() {
                if !camera.is_point_inside_frustum(position) {
                    continue;
                }
            }

            let used_lights = assign_lights(&self.lights, &self.objects_3d, position, rs);

            copy_view(self.camera.as_ref(), rs);
            if let Some(sprite) = self.sprites.get_mut(key) {
                sprite.draw(rs, materials, camera_position);
            }

            release_lights(used_lights, rs);
        }
    }

    fn draw_particles(
        &mut self,
        rs: &mut dyn RenderSystem,
        materials: &mut MaterialRegistry,
        delta_ms: f32,
    ) {
        if self.emitters.is_empty() {
            return;
        }

        let fallback = Camera::new();
        let mut rng = rand::thread_rng();

        for emitter in self.emitters.values_mut() {
            emitter.feed(delta_ms, &mut rng);
            copy_view(self.camera.as_ref(), rs);
            emitter.draw(rs, materials, self.camera.as_ref().unwrap_or(&fallback));
        }
    }

    /// Draw the 2D overlay in ascending Z order.
    fn draw_2d_objects(&mut self, rs: &mut dyn RenderSystem, materials: &mut MaterialRegistry) {
        let width = rs.screen_width();
        let height = rs.screen_height();

        rs.set_matrix_mode(MatrixMode::Projection);
        rs.set_orthographic(0.0, width as f32, height as f32, 0.0, -128.0, 128.0);

        for key in self.order_2d.clone() {
            let Some(object) = self.objects_2d.get_mut(key) else {
                continue;
            };
            let node = object.node();
            if !node.visible {
                continue;
            }
            // Skip drawables fully outside the screen rectangle.
            if node.position.x >= width as f32
                || node.position.y >= height as f32
                || node.position.x + node.scale.x <= 0.0
                || node.position.y + node.scale.y <= 0.0
            {
                continue;
            }

            rs.set_matrix_mode(MatrixMode::Modelview);
            rs.identity_matrix();
            object.draw(rs, materials);
        }
    }

    fn draw_sky_box(
        &self,
        rs: &mut dyn RenderSystem,
        materials: &mut MaterialRegistry,
        material_id: MaterialId,
    ) {
        let Some(material) = materials.get_mut(material_id) else {
            warn!("skybox material is gone, skipping sky");
            return;
        };

        let faces: Vec<TextureHandle> = material.stages().first().map_or_else(Vec::new, |stage| {
            (0..stage.texture_count())
                .filter_map(|i| stage.texture(i))
                .collect()
        });
        if faces.len() != 6 {
            warn!("skybox material needs 6 cube faces, found {}", faces.len());
            return;
        }

        rs.set_matrix_mode(MatrixMode::Modelview);
        match self.camera.as_ref() {
            Some(camera) => rs.copy_matrix(camera.rot_inverse_transpose()),
            None => rs.identity_matrix(),
        }

        let saved = material.start(rs);
        rs.set_culling(CullMode::None);
        rs.set_depth_mask(false);

        // Quad per face, wound to face inward. The box is wider than it
        // is tall, matching the source art's aspect.
        const X: f32 = 400.0;
        const Y: f32 = 200.0;
        const Z: f32 = 400.0;

        let quads: [(usize, [(Vec2, Vec3); 4]); 6] = [
            (cube_face::FRONT, [
                (Vec2::new(0.0, 1.0), Vec3::new(X, -Y, -Z)),
                (Vec2::new(1.0, 1.0), Vec3::new(-X, -Y, -Z)),
                (Vec2::new(1.0, 0.0), Vec3::new(-X, Y, -Z)),
                (Vec2::new(0.0, 0.0), Vec3::new(X, Y, -Z)),
            ]),
            (cube_face::LEFT, [
                (Vec2::new(0.0, 1.0), Vec3::new(X, -Y, Z)),
                (Vec2::new(1.0, 1.0), Vec3::new(X, -Y, -Z)),
                (Vec2::new(1.0, 0.0), Vec3::new(X, Y, -Z)),
                (Vec2::new(0.0, 0.0), Vec3::new(X, Y, Z)),
            ]),
            (cube_face::BACK, [
                (Vec2::new(0.0, 1.0), Vec3::new(-X, -Y, Z)),
                (Vec2::new(1.0, 1.0), Vec3::new(X, -Y, Z)),
                (Vec2::new(1.0, 0.0), Vec3::new(X, Y, Z)),
                (Vec2::new(0.0, 0.0), Vec3::new(-X, Y, Z)),
            ]),
            (cube_face::RIGHT, [
                (Vec2::new(0.0, 1.0), Vec3::new(-X, -Y, -Z)),
                (Vec2::new(1.0, 1.0), Vec3::new(-X, -Y, Z)),
                (Vec2::new(1.0, 0.0), Vec3::new(-X, Y, Z)),
                (Vec2::new(0.0, 0.0), Vec3::new(-X, Y, -Z)),
            ]),
            (cube_face::UP, [
                (Vec2::new(1.0, 1.0), Vec3::new(-X, Y, -Z)),
                (Vec2::new(1.0, 0.0), Vec3::new(-X, Y, Z)),
                (Vec2::new(0.0, 0.0), Vec3::new(X, Y, Z)),
                (Vec2::new(0.0, 1.0), Vec3::new(X, Y, -Z)),
            ]),
            (cube_face::DOWN, [
                (Vec2::new(1.0, 0.0), Vec3::new(-X, -Y, -Z)),
                (Vec2::new(1.0, 1.0), Vec3::new(-X, -Y, Z)),
                (Vec2::new(0.0, 1.0), Vec3::new(X, -Y, Z)),
                (Vec2::new(0.0, 0.0), Vec3::new(X, -Y, -Z)),
            ]),
        ];

        for (face, corners) in quads {
            rs.bind_texture(faces[face], 0);
            draw_quad(rs, &corners);
        }

        material.finish(rs, saved);

        apply_perspective(self.camera.as_ref(), rs);
        rs.set_matrix_mode(MatrixMode::Modelview);
        rs.identity_matrix();
        rs.set_depth_mask(true);
    }

    fn draw_sky_plane(
        &self,
        rs: &mut dyn RenderSystem,
        materials: &mut MaterialRegistry,
        material_id: MaterialId,
    ) {
        let Some(material) = materials.get_mut(material_id) else {
            warn!("skyplane material is gone, skipping sky");
            return;
        };

        rs.set_matrix_mode(MatrixMode::Projection);
        rs.set_orthographic(0.0, 1.0, 0.0, 1.0, -1.0, 1.0);
        rs.set_matrix_mode(MatrixMode::Modelview);
        rs.identity_matrix();

        let saved = material.start(rs);

        // Independent of material settings.
        rs.set_depth_test(false);
        rs.set_depth_mask(false);
        rs.set_culling(CullMode::None);

        // Three panels tiled twice across, covering the view.
        let panels: [[(Vec2, Vec3); 4]; 3] = [
            [
                (Vec2::new(0.0, 2.0), Vec3::new(1.0, -1.0, -1.0)),
                (Vec2::new(2.0, 2.0), Vec3::new(-1.0, -1.0, -1.0)),
                (Vec2::new(2.0, 0.0), Vec3::new(-1.0, 1.0, -1.0)),
                (Vec2::new(0.0, 0.0), Vec3::new(1.0, 1.0, -1.0)),
            ],
            [
                (Vec2::new(0.0, 2.0), Vec3::new(1.0, -1.0, 1.0)),
                (Vec2::new(2.0, 2.0), Vec3::new(1.0, -1.0, -1.0)),
                (Vec2::new(2.0, 0.0), Vec3::new(1.0, 1.0, -1.0)),
                (Vec2::new(0.0, 0.0), Vec3::new(1.0, 1.0, 1.0)),
            ],
            [
                (Vec2::new(0.0, 2.0), Vec3::new(-1.0, -1.0, -1.0)),
                (Vec2::new(2.0, 2.0), Vec3::new(-1.0, -1.0, 1.0)),
                (Vec2::new(2.0, 0.0), Vec3::new(-1.0, 1.0, 1.0)),
                (Vec2::new(0.0, 0.0), Vec3::new(-1.0, 1.0, -1.0)),
            ],
        ];

        for corners in &panels {
            draw_quad(rs, corners);
        }

        material.finish(rs, saved);
        rs.set_depth_mask(true);
        rs.set_depth_test(true);

        rs.set_matrix_mode(MatrixMode::Projection);
        rs.identity_matrix();
        apply_perspective(self.camera.as_ref(), rs);
        rs.set_matrix_mode(MatrixMode::Modelview);
    }
}

/// Camera perspective, or the hardcoded fallback when no camera is set.
fn apply_perspective(camera: Option<&Camera>, rs: &mut dyn RenderSystem) {
    match camera {
        Some(camera) => camera.apply_perspective(rs),
        None => {
            rs.set_matrix_mode(MatrixMode::Projection);
            rs.identity_matrix();
            rs.set_perspective(90.0, 1.33, 0.1, 1000.0);
        }
    }
}

/// Camera view into the modelview, or identity when no camera is set.
fn copy_view(camera: Option<&Camera>, rs: &mut dyn RenderSystem) {
    match camera {
        Some(camera) => camera.copy_view(rs),
        None => {
            rs.set_matrix_mode(MatrixMode::Modelview);
            rs.identity_matrix();
        }
    }
}

/// Copy the parameters of enabled in-range lights into consecutive
/// hardware slots starting at zero. The slot count is hard-bounded at
/// [`MAX_LIGHTS`]; surplus lights are dropped in list order.
fn assign_lights(
    lights: &SlotMap<LightKey, Light>,
    arena: &Arena3,
    object_position: Vec3,
    rs: &mut dyn RenderSystem,
) -> usize {
    let mut used = 0;

    for light in lights.values() {
        if used == MAX_LIGHTS {
            break;
        }
        if !light.enabled() || !light.is_in_range(arena, object_position) {
            continue;
        }

        rs.set_light_position(used, light.position(arena), false);
        rs.set_light_ambient(used, light.ambient());
        rs.set_light_diffuse(used, light.diffuse());
        rs.set_light_specular(used, light.specular());
        rs.set_light_attenuation(used, light.attenuation());
        rs.set_light(used, true);
        used += 1;
    }

    if used > 0 {
        rs.set_lighting(true);
    }
    used
}

/// Disable the slots used by [`assign_lights`].
fn release_lights(used: usize, rs: &mut dyn RenderSystem) {
    if used == 0 {
        return;
    }
    for slot in 0..used {
        rs.set_light(slot, false);
    }
    rs.set_lighting(false);
}

fn draw_quad(rs: &mut dyn RenderSystem, corners: &[(Vec2, Vec3); 4]) {
    rs.start_vertices(VertexMode::Quads);
    for (uv, vertex) in corners {
        rs.tex_coord(*uv);
        rs.vertex(*vertex);
    }
    rs.end_vertices();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::immediate::ImmediateRenderSystem;
    use crate::render::drawable::{BoundingBox, Node2, Node3};
    use crate::render::material::Material;
    use std::cell::Cell;
    use std::rc::Rc;

    fn booted() -> ImmediateRenderSystem {
        let mut rs = ImmediateRenderSystem::new();
        rs.initialize().unwrap();
        rs.configure().unwrap();
        rs.create_window(640, 480).unwrap();
        rs
    }

    struct Cube {
        node: Node3,
        draws: Rc<Cell<u32>>,
        max_light_slot_seen: Rc<Cell<i32>>,
    }

    impl Cube {
        fn new(position: Vec3, draws: Rc<Cell<u32>>) -> Self {
            let mut node = Node3::default();
            node.position = position;
            Self {
                node,
                draws,
                max_light_slot_seen: Rc::new(Cell::new(-1)),
            }
        }
    }

    impl Drawable3D for Cube {
        fn node(&self) -> &Node3 {
            &self.node
        }

        fn node_mut(&mut self) -> &mut Node3 {
            &mut self.node
        }

        fn draw(&mut self, rs: &mut dyn RenderSystem, _materials: &mut MaterialRegistry) {
            self.draws.set(self.draws.get() + 1);
            self.max_light_slot_seen
                .set(rs.enabled_light_count() as i32 - 1);
        }

        fn is_opaque(&self, _materials: &MaterialRegistry) -> bool {
            true
        }

        fn aa_bounding_box(&self) -> BoundingBox {
            BoundingBox::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0))
        }
    }

    struct Flat {
        node: Node2,
        log: Rc<std::cell::RefCell<Vec<f32>>>,
    }

    impl Flat {
        fn new(z: f32, log: Rc<std::cell::RefCell<Vec<f32>>>) -> Self {
            let mut node = Node2::default();
            node.z = z;
            node.scale = crate::foundation::math::Vec2::new(10.0, 10.0);
            Self { node, log }
        }
    }

    impl Drawable2D for Flat {
        fn node(&self) -> &Node2 {
            &self.node
        }

        fn node_mut(&mut self) -> &mut Node2 {
            &mut self.node
        }

        fn draw(&mut self, _rs: &mut dyn RenderSystem, _materials: &mut MaterialRegistry) {
            self.log.borrow_mut().push(self.node.z);
        }
    }

    fn frustum_camera() -> Camera {
        let mut camera = Camera::new();
        camera.set_perspective(90.0, 1.33, 1.0, 100.0);
        camera
    }

    #[test]
    fn culled_objects_do_not_draw() {
        let mut rs = booted();
        let mut materials = MaterialRegistry::new();
        let mut renderer = Renderer::new();
        renderer.set_camera(frustum_camera());

        let visible = Rc::new(Cell::new(0));
        let hidden = Rc::new(Cell::new(0));
        renderer.push_3d(Box::new(Cube::new(Vec3::new(0.0, 0.0, -50.0), visible.clone())));
        renderer.push_3d(Box::new(Cube::new(Vec3::new(0.0, 0.0, 500.0), hidden.clone())));

        renderer.draw(&mut rs, &mut materials);

        assert_eq!(visible.get(), 1);
        assert_eq!(hidden.get(), 0);
    }

    #[test]
    fn invisible_objects_are_skipped() {
        let mut rs = booted();
        let mut materials = MaterialRegistry::new();
        let mut renderer = Renderer::new();
        renderer.set_camera(frustum_camera());

        let draws = Rc::new(Cell::new(0));
        let key = renderer.push_3d(Box::new(Cube::new(Vec3::new(0.0, 0.0, -50.0), draws.clone())));
        renderer.get_3d_mut(key).unwrap().node_mut().visible = false;

        renderer.draw(&mut rs, &mut materials);
        assert_eq!(draws.get(), 0);
    }

    #[test]
    fn at_most_eight_lights_assigned_per_object() {
        let mut rs = booted();
        let mut materials = MaterialRegistry::new();
        let mut renderer = Renderer::new();
        renderer.set_camera(frustum_camera());

        // Twelve in-range lights; only the first eight slots may be used.
        for _ in 0..12 {
            let key = renderer.create_light();
            renderer.light_mut(key).unwrap().set_position(Vec3::new(0.0, 0.0, -50.0));
        }

        let draws = Rc::new(Cell::new(0));
        let cube = Cube::new(Vec3::new(0.0, 0.0, -50.0), draws.clone());
        let seen = cube.max_light_slot_seen.clone();
        renderer.push_3d(Box::new(cube));

        renderer.draw(&mut rs, &mut materials);

        assert_eq!(draws.get(), 1);
        assert_eq!(seen.get(), MAX_LIGHTS as i32 - 1);
        // All slots released after the pass.
        assert_eq!(rs.enabled_light_count(), 0);
    }

    #[test]
    fn overlay_draws_in_ascending_z_order() {
        let mut rs = booted();
        let mut materials = MaterialRegistry::new();
        let mut renderer = Renderer::new();

        let log = Rc::new(std::cell::RefCell::new(Vec::new()));
        renderer.push_2d(Box::new(Flat::new(3.0, log.clone())));
        renderer.push_2d(Box::new(Flat::new(1.0, log.clone())));
        renderer.push_2d(Box::new(Flat::new(2.0, log.clone())));

        renderer.draw(&mut rs, &mut materials);
        assert_eq!(*log.borrow(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn resort_after_z_change_is_stable() {
        let mut renderer = Renderer::new();
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));

        let a = renderer.push_2d(Box::new(Flat::new(5.0, log.clone())));
        let b = renderer.push_2d(Box::new(Flat::new(5.0, log.clone())));
        let c = renderer.push_2d(Box::new(Flat::new(1.0, log)));
        assert_eq!(renderer.order_2d(), &[c, a, b]);

        renderer.get_2d_mut(c).unwrap().node_mut().z = 9.0;
        renderer.sort_2d();
        // Equal-Z entries keep their relative order.
        assert_eq!(renderer.order_2d(), &[a, b, c]);
    }

    #[test]
    fn rtt_frame_is_single_shot() {
        let mut rs = booted();
        let mut materials = MaterialRegistry::new();
        let mut renderer = Renderer::new();
        renderer.set_camera(frustum_camera());

        let target = rs.gen_texture(128, 128);
        renderer.prepare_rtt(&mut rs, 128, 128, target);
        assert!(renderer.is_render_to_texture());

        renderer.draw(&mut rs, &mut materials);
        assert!(!renderer.is_render_to_texture());
        assert_eq!(rs.frames_copied(), 1);
        assert_eq!(rs.viewport(), (0, 0, 640, 480));

        // Without re-arming, the next frame presents normally.
        renderer.draw(&mut rs, &mut materials);
        assert_eq!(rs.frames_copied(), 1);
        assert_eq!(rs.frames_presented(), 1);
    }

    #[test]
    fn sky_box_and_plane_are_mutually_exclusive() {
        let mut materials = MaterialRegistry::new();
        let box_mat = materials.register("skybox", Material::default());
        let plane_mat = materials.register("skyplane", Material::default());

        let mut renderer = Renderer::new();
        renderer.set_sky_box(box_mat);
        renderer.set_sky_plane(plane_mat);
        assert_eq!(renderer.sky, Sky::Plane(plane_mat));

        renderer.set_sky_box(box_mat);
        assert_eq!(renderer.sky, Sky::Boxed(box_mat));
    }

    #[test]
    fn skyplane_draws_three_panels() {
        let mut rs = booted();
        let mut materials = MaterialRegistry::new();

        let mut plane = Material::default();
        let mut stage = crate::render::material::MaterialStage::new(0);
        stage.push_texture(rs.gen_texture(64, 64));
        plane.push_stage(stage);
        let plane_mat = materials.register("skyplane", plane);

        let mut renderer = Renderer::new();
        renderer.set_sky_plane(plane_mat);
        renderer.draw(&mut rs, &mut materials);

        // frame_start clears the record, so only this frame's panels
        // are counted.
        let quads = rs
            .batches()
            .iter()
            .filter(|b| b.mode == VertexMode::Quads)
            .count();
        assert_eq!(quads, 3);
    }
}
