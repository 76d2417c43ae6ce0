//! Materials and their texture stages.
//!
//! A [`Material`] describes per-surface draw state and exclusively owns an
//! ordered list of [`MaterialStage`]s (texture layers). Drawing follows a
//! strict `start()`/`finish()` bracket: `start` pushes the material state
//! and draws each stage in order, `finish` reverses it in the same order.
//! The bracket must be paired and is not reentrant.

use bitflags::bitflags;
use log::warn;
use slotmap::{new_key_type, SlotMap};
use std::collections::HashMap;

use crate::foundation::color::Color;
use crate::foundation::math::{Mat4, Vec2, Vec3};
use crate::foundation::time::Stopwatch;
use crate::render::system::{
    BlendFactor, CullMode, MatrixMode, RenderSystem, TexEnv, MAX_TEXTURE_UNITS,
};
use crate::render::texture::TextureHandle;

new_key_type! {
    /// Key of a registered material.
    pub struct MaterialId;
}

bitflags! {
    /// Content classification flags carried by a material.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ContentFlags: u32 {
        /// Solid surface.
        const SOLID = 1 << 0;
        /// Water volume.
        const WATER = 1 << 1;
        /// Lava volume.
        const LAVA = 1 << 2;
        /// Player clip volume.
        const PLAYER_CLIP = 1 << 3;
    }
}

bitflags! {
    /// Rendering effect flags carried by a material.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EffectFlags: u32 {
        /// Surface emits no light interaction.
        const FULL_BRIGHT = 1 << 0;
        /// Surface is never drawn.
        const NO_DRAW = 1 << 1;
        /// Surface skips depth writes.
        const NO_DEPTH_WRITE = 1 << 2;
    }
}

/// How a stage generates texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TexCoordType {
    /// Use the submitted UV channel.
    #[default]
    UvMap,
    /// Derive coordinates from the view-space normal (environment map).
    SphereMap,
}

/// Light state saved by [`Material::start`] when a non-light-receiving
/// material suspends lighting, and consumed by [`Material::finish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavedLightState {
    /// Whether lighting was enabled before `start`.
    pub was_lit: bool,
    /// How many light slots were enabled before `start`.
    pub count: u32,
}

/// One texture layer within a material.
#[derive(Debug)]
pub struct MaterialStage {
    unit: usize,
    textures: Vec<TextureHandle>,
    coord_type: TexCoordType,
    tex_env: TexEnv,
    blend: Option<(BlendFactor, BlendFactor)>,

    scroll: Vec2,
    scrolled: Vec2,
    rotate: f32,
    angle: f32,
    scale: Vec2,

    frame_rate: f32,
    current_frame: f32,

    clock: Stopwatch,
    last_feed_ms: f32,
}

impl MaterialStage {
    /// Create a stage bound to a hardware texture unit.
    ///
    /// # Panics
    ///
    /// Panics if `unit` is not a valid hardware texture unit.
    pub fn new(unit: usize) -> Self {
        assert!(unit < MAX_TEXTURE_UNITS, "texture unit {unit} out of range");
        Self {
            unit,
            textures: Vec::new(),
            coord_type: TexCoordType::UvMap,
            tex_env: TexEnv::Modulate,
            blend: None,
            scroll: Vec2::zeros(),
            scrolled: Vec2::zeros(),
            rotate: 0.0,
            angle: 0.0,
            scale: Vec2::new(1.0, 1.0),
            frame_rate: 0.0,
            current_frame: 0.0,
            clock: Stopwatch::start_new(),
            last_feed_ms: 0.0,
        }
    }

    /// The hardware unit this stage binds.
    pub fn unit(&self) -> usize {
        self.unit
    }

    /// Append a texture frame. Frames beyond the hardware slot count
    /// are dropped with a warning.
    pub fn push_texture(&mut self, texture: TextureHandle) {
        if self.textures.len() >= MAX_TEXTURE_UNITS {
            warn!("stage on unit {} already holds {MAX_TEXTURE_UNITS} textures, dropping extra", self.unit);
            return;
        }
        self.textures.push(texture);
    }

    /// Number of texture frames.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Texture for a specific frame index.
    pub fn texture(&self, frame: usize) -> Option<TextureHandle> {
        self.textures.get(frame).copied()
    }

    /// Set the coordinate generation mode.
    pub fn set_coord_type(&mut self, coord_type: TexCoordType) {
        self.coord_type = coord_type;
    }

    /// Coordinate generation mode.
    pub fn coord_type(&self) -> TexCoordType {
        self.coord_type
    }

    /// Set the texture environment mode.
    pub fn set_tex_env(&mut self, env: TexEnv) {
        self.tex_env = env;
    }

    /// Set the blend factor pair, marking the stage translucent.
    pub fn set_blend(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.blend = Some((src, dst));
    }

    /// True when the stage draws without blending.
    pub fn is_opaque(&self) -> bool {
        self.blend.is_none()
    }

    /// Set the UV scroll speed in texture units per second.
    pub fn set_scroll(&mut self, scroll: Vec2) {
        self.scroll = scroll;
    }

    /// Set the rotation speed in degrees per second.
    pub fn set_rotate(&mut self, degrees_per_sec: f32) {
        self.rotate = degrees_per_sec;
    }

    /// Set the UV scale.
    pub fn set_scale(&mut self, scale: Vec2) {
        self.scale = scale;
    }

    /// Set the frame animation rate in frames per second.
    pub fn set_frame_rate(&mut self, frames_per_sec: f32) {
        self.frame_rate = frames_per_sec;
    }

    /// Accumulated scroll offset.
    pub fn scrolled(&self) -> Vec2 {
        self.scrolled
    }

    /// Accumulated rotation angle in degrees.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Index of the frame the next draw binds.
    pub fn current_frame(&self) -> usize {
        if self.textures.is_empty() {
            0
        } else {
            (self.current_frame as usize) % self.textures.len()
        }
    }

    /// Advance scroll, rotation and frame animation by the wall-clock
    /// time elapsed since the last feed.
    pub fn feed_anims(&mut self) {
        let now_ms = self.clock.elapsed_millis();
        let dt = (now_ms - self.last_feed_ms) / 1000.0;
        self.last_feed_ms = now_ms;

        self.scrolled += self.scroll * dt;
        self.angle += self.rotate * dt;

        if self.frame_rate > 0.0 && !self.textures.is_empty() {
            self.current_frame =
                (self.current_frame + self.frame_rate * dt) % self.textures.len() as f32;
        }
    }

    /// Bind this stage's texture and combiner state.
    pub fn draw(&self, rs: &mut dyn RenderSystem) {
        let Some(texture) = self.texture(self.current_frame()) else {
            return;
        };

        rs.bind_texture(texture, self.unit);
        rs.set_tex_env(self.unit, self.tex_env);

        if let Some((src, dst)) = self.blend {
            rs.set_blend(true);
            rs.set_blend_mode(src, dst);
        }

        if self.scrolled != Vec2::zeros() || self.angle != 0.0 || self.scale != Vec2::new(1.0, 1.0)
        {
            rs.set_matrix_mode(MatrixMode::Texture);
            rs.push_matrix();
            rs.identity_matrix();
            rs.translate_scene(self.scrolled.x, self.scrolled.y, 0.0);
            rs.rotate_scene(self.angle, 0.0, 0.0, 1.0);
            rs.scale_scene(self.scale.x, self.scale.y, 1.0);
            rs.set_matrix_mode(MatrixMode::Modelview);
        }
    }

    /// Undo this stage's bindings.
    pub fn finish(&self, rs: &mut dyn RenderSystem) {
        if self.texture(self.current_frame()).is_none() {
            return;
        }

        if self.scrolled != Vec2::zeros() || self.angle != 0.0 || self.scale != Vec2::new(1.0, 1.0)
        {
            rs.set_matrix_mode(MatrixMode::Texture);
            rs.pop_matrix();
            rs.set_matrix_mode(MatrixMode::Modelview);
        }

        if self.blend.is_some() {
            rs.set_blend(false);
        }

        rs.unbind_texture(self.unit);
    }
}

/// Per-surface draw state plus owned texture stages.
#[derive(Debug)]
pub struct Material {
    /// Ambient reflectance.
    pub ambient: Color,
    /// Diffuse reflectance.
    pub diffuse: Color,
    /// Specular reflectance.
    pub specular: Color,
    /// Face culling mode.
    pub cull: CullMode,
    /// Depth testing.
    pub depth_test: bool,
    /// Depth writes.
    pub depth_write: bool,
    /// Suppress drawing entirely.
    pub no_draw: bool,
    /// Whether the surface interacts with lights.
    pub receive_light: bool,
    /// Content classification.
    pub content_flags: ContentFlags,
    /// Effect flags.
    pub effect_flags: EffectFlags,

    stages: Vec<MaterialStage>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: Color::grey(0.2),
            diffuse: Color::grey(0.8),
            specular: Color::BLACK,
            cull: CullMode::Front,
            depth_test: true,
            depth_write: true,
            no_draw: false,
            receive_light: true,
            content_flags: ContentFlags::SOLID,
            effect_flags: EffectFlags::empty(),
            stages: Vec::new(),
        }
    }
}

impl Material {
    /// Create a material with default state and no stages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a single-stage material over one texture.
    pub fn with_single_texture(texture: TextureHandle) -> Self {
        let mut mat = Self::new();
        let mut stage = MaterialStage::new(0);
        stage.push_texture(texture);
        mat.push_stage(stage);
        mat
    }

    /// Append a stage. Stage order is draw order.
    pub fn push_stage(&mut self, stage: MaterialStage) {
        self.stages.push(stage);
    }

    /// Owned stages in draw order.
    pub fn stages(&self) -> &[MaterialStage] {
        &self.stages
    }

    /// Mutable access to the stages.
    pub fn stages_mut(&mut self) -> &mut [MaterialStage] {
        &mut self.stages
    }

    /// True when no stage uses blending.
    pub fn is_opaque(&self) -> bool {
        self.stages.iter().all(MaterialStage::is_opaque)
    }

    /// Bind this material's full state and draw each stage in order.
    ///
    /// Returns the light state to hand back to [`Material::finish`].
    /// When the material does not receive light and lighting is active,
    /// all enabled lights are suspended for the bracket.
    pub fn start(&mut self, rs: &mut dyn RenderSystem) -> SavedLightState {
        if self.no_draw || self.effect_flags.contains(EffectFlags::NO_DRAW) {
            return SavedLightState::default();
        }

        let saved = if !self.receive_light && rs.is_light_on() {
            let count = rs.enabled_light_count();
            for slot in 0..count as usize {
                rs.set_light(slot, false);
            }
            rs.set_lighting(false);
            SavedLightState { was_lit: true, count }
        } else {
            SavedLightState::default()
        };

        rs.set_material_ambient(self.ambient);
        rs.set_material_diffuse(self.diffuse);
        rs.set_material_specular(self.specular);
        rs.set_culling(self.cull);
        rs.set_depth_test(self.depth_test);
        rs.set_depth_mask(self.depth_write && !self.effect_flags.contains(EffectFlags::NO_DEPTH_WRITE));

        let stage_count = self.stages.len() as u32;
        rs.set_texture_units(stage_count);
        rs.set_texture_generations(stage_count);
        rs.set_color_channels(u32::from(stage_count > 0));

        for stage in &mut self.stages {
            stage.feed_anims();
            stage.draw(rs);
        }

        saved
    }

    /// Reverse [`Material::start`], restoring suspended lights.
    pub fn finish(&mut self, rs: &mut dyn RenderSystem, saved: SavedLightState) {
        if self.no_draw || self.effect_flags.contains(EffectFlags::NO_DRAW) {
            return;
        }

        for stage in &self.stages {
            stage.finish(rs);
        }

        if saved.was_lit {
            for slot in 0..saved.count as usize {
                rs.set_light(slot, true);
            }
            rs.set_lighting(true);
        }
    }

    /// Normal matrix helper for backends wanting the inverse-transpose
    /// of a modelview (used by sphere-mapped stages).
    pub fn inverse_transpose(modelview: &Mat4) -> Mat4 {
        modelview
            .try_inverse()
            .map_or_else(Mat4::identity, |inv| inv.transpose())
    }
}

/// Name-keyed registry owning every material.
#[derive(Default)]
pub struct MaterialRegistry {
    materials: SlotMap<MaterialId, Material>,
    names: HashMap<String, MaterialId>,
}

impl MaterialRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a material under a name, replacing (and warning about)
    /// any previous holder of that name.
    pub fn register(&mut self, name: &str, material: Material) -> MaterialId {
        let id = self.materials.insert(material);
        if let Some(old) = self.names.insert(name.to_owned(), id) {
            warn!("material {name:?} re-registered, dropping previous definition");
            self.materials.remove(old);
        }
        id
    }

    /// Look up a material id by name.
    pub fn find(&self, name: &str) -> Option<MaterialId> {
        self.names.get(name).copied()
    }

    /// Borrow a material.
    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    /// Borrow a material mutably.
    pub fn get_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id)
    }

    /// Remove a material by id.
    pub fn remove(&mut self, id: MaterialId) -> Option<Material> {
        self.names.retain(|_, v| *v != id);
        self.materials.remove(id)
    }

    /// Number of registered materials.
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// True when the registry holds no materials.
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Helper binding a vec3 into a color with full alpha.
    pub fn color_from_rgb(rgb: Vec3) -> Color {
        Color::new(rgb.x, rgb.y, rgb.z, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_opacity_follows_stage_blending() {
        let mut mat = Material::new();
        assert!(mat.is_opaque());

        let mut stage = MaterialStage::new(0);
        stage.set_blend(BlendFactor::SrcAlpha, BlendFactor::InvSrcAlpha);
        mat.push_stage(stage);
        assert!(!mat.is_opaque());
    }

    #[test]
    fn registry_replaces_same_name() {
        let mut reg = MaterialRegistry::new();
        let first = reg.register("sky", Material::new());
        let second = reg.register("sky", Material::new());
        assert_ne!(first, second);
        assert_eq!(reg.find("sky"), Some(second));
        assert!(reg.get(first).is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn stage_rejects_excess_textures() {
        let mut stage = MaterialStage::new(0);
        let mut store = crate::render::texture::TextureStore::new();
        for _ in 0..MAX_TEXTURE_UNITS + 2 {
            stage.push_texture(store.generate(4, 4));
        }
        assert_eq!(stage.texture_count(), MAX_TEXTURE_UNITS);
    }

    #[test]
    fn inverse_transpose_of_identity_is_identity() {
        assert_eq!(Material::inverse_transpose(&Mat4::identity()), Mat4::identity());
    }

    #[test]
    fn unlit_material_suspends_and_restores_lights() {
        use crate::render::backends::immediate::ImmediateRenderSystem;

        let mut rs = ImmediateRenderSystem::new();
        rs.initialize().unwrap();
        rs.configure().unwrap();
        rs.create_window(64, 64).unwrap();

        rs.set_lighting(true);
        for slot in 0..3 {
            rs.set_light(slot, true);
        }
        assert_eq!(rs.enabled_light_count(), 3);

        let mut mat = Material::new();
        mat.receive_light = false;

        let saved = mat.start(&mut rs);
        assert!(saved.was_lit);
        assert_eq!(saved.count, 3);
        assert!(!rs.is_light_on());
        assert_eq!(rs.enabled_light_count(), 0);

        mat.finish(&mut rs, saved);
        assert!(rs.is_light_on());
        assert_eq!(rs.enabled_light_count(), 3);
    }

    #[test]
    fn lit_material_leaves_lights_untouched() {
        use crate::render::backends::immediate::ImmediateRenderSystem;

        let mut rs = ImmediateRenderSystem::new();
        rs.initialize().unwrap();
        rs.configure().unwrap();
        rs.create_window(64, 64).unwrap();

        rs.set_lighting(true);
        rs.set_light(0, true);

        let mut mat = Material::new();
        let saved = mat.start(&mut rs);
        assert!(!saved.was_lit);
        assert_eq!(rs.enabled_light_count(), 1);
        mat.finish(&mut rs, saved);
        assert_eq!(rs.enabled_light_count(), 1);
    }
}
