//! Desktop-style backend: immediate/array submission over a hardware
//! matrix stack and direct state registers.

use std::path::Path;

use log::{debug, info, warn};

use crate::foundation::color::Color;
use crate::foundation::math::{Mat4, Mat4Ext, Vec2, Vec3};
use crate::render::backends::{
    batch_from_arrays, DrawBatch, Framebuffer, FrameStats, LightBank, PendingVertices,
};
use crate::render::system::{
    ArrayDesc, BlendFactor, CullMode, MatrixMode, RenderError, RenderSystem, ShadeModel, TexEnv,
    VertexMode, MAX_TEXTURE_UNITS,
};
use crate::render::texture::{TextureHandle, TextureStore};

/// Hardware matrix stack depth, matching desktop GL minimums for the
/// modelview stack.
const MATRIX_STACK_DEPTH: usize = 32;

/// A hardware matrix unit: current matrix plus a push/pop stack.
#[derive(Debug)]
struct MatrixUnit {
    current: Mat4,
    stack: Vec<Mat4>,
}

impl Default for MatrixUnit {
    fn default() -> Self {
        Self {
            current: Mat4::identity(),
            stack: Vec::new(),
        }
    }
}

impl MatrixUnit {
    fn push(&mut self) {
        if self.stack.len() >= MATRIX_STACK_DEPTH {
            debug!("matrix stack overflow, push dropped");
            return;
        }
        self.stack.push(self.current);
    }

    fn pop(&mut self) {
        match self.stack.pop() {
            Some(m) => self.current = m,
            None => debug!("matrix stack underflow, pop ignored"),
        }
    }
}

/// The desktop-style render system.
///
/// State registers, the framebuffer pair and every submitted batch are
/// kept in-process; [`ImmediateRenderSystem::batches`] and
/// [`ImmediateRenderSystem::frame_stats`] expose the submission record
/// for inspection.
pub struct ImmediateRenderSystem {
    initialized: bool,
    window: Option<(u32, u32)>,
    title: String,
    cursor_visible: bool,

    clear_color: Color,
    clear_depth: f32,
    viewport: (i32, i32, u32, u32),

    matrix_mode: MatrixMode,
    projection: MatrixUnit,
    modelview: MatrixUnit,
    texture_matrix: MatrixUnit,
    inverse_transpose_mv: Mat4,

    depth_test: bool,
    depth_mask: bool,
    cull: CullMode,
    shade: ShadeModel,
    blend_enabled: bool,
    blend: (BlendFactor, BlendFactor),
    wireframe: bool,

    material_ambient: Color,
    material_diffuse: Color,
    material_specular: Color,
    texture_units: u32,
    texture_generations: u32,
    color_channels: u32,

    lights: LightBank,

    textures: TextureStore,
    bound: [Option<TextureHandle>; MAX_TEXTURE_UNITS],
    tex_env: [TexEnv; MAX_TEXTURE_UNITS],

    point_sprite: bool,
    point_sprite_size: f32,
    point_sprite_attenuation: Vec3,

    rtt_target: Option<TextureHandle>,
    rtt_size: (u32, u32),
    rtt_armed: bool,

    front: Option<Framebuffer>,
    back: Option<Framebuffer>,

    pending: PendingVertices,
    batches: Vec<DrawBatch>,
    frames_presented: u64,
    frames_copied: u64,
}

impl Default for ImmediateRenderSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ImmediateRenderSystem {
    /// Create an uninitialized render system.
    pub fn new() -> Self {
        Self {
            initialized: false,
            window: None,
            title: String::new(),
            cursor_visible: true,
            clear_color: Color::BLACK,
            clear_depth: 1.0,
            viewport: (0, 0, 0, 0),
            matrix_mode: MatrixMode::Modelview,
            projection: MatrixUnit::default(),
            modelview: MatrixUnit::default(),
            texture_matrix: MatrixUnit::default(),
            inverse_transpose_mv: Mat4::identity(),
            depth_test: true,
            depth_mask: true,
            cull: CullMode::None,
            shade: ShadeModel::Smooth,
            blend_enabled: false,
            blend: (BlendFactor::One, BlendFactor::Zero),
            wireframe: false,
            material_ambient: Color::grey(0.2),
            material_diffuse: Color::grey(0.8),
            material_specular: Color::BLACK,
            texture_units: 0,
            texture_generations: 0,
            color_channels: 0,
            lights: LightBank::default(),
            textures: TextureStore::new(),
            bound: [None; MAX_TEXTURE_UNITS],
            tex_env: [TexEnv::Modulate; MAX_TEXTURE_UNITS],
            point_sprite: false,
            point_sprite_size: 1.0,
            point_sprite_attenuation: Vec3::new(1.0, 0.0, 0.0),
            rtt_target: None,
            rtt_size: (0, 0),
            rtt_armed: false,
            front: None,
            back: None,
            pending: PendingVertices::default(),
            batches: Vec::new(),
            frames_presented: 0,
            frames_copied: 0,
        }
    }

    /// Batches submitted since the last `frame_start`.
    pub fn batches(&self) -> &[DrawBatch] {
        &self.batches
    }

    /// Submission statistics for the current frame.
    pub fn frame_stats(&self) -> FrameStats {
        FrameStats {
            batches: self.batches.len(),
            vertices: self.batches.iter().map(|b| b.positions.len()).sum(),
        }
    }

    /// Frames presented (swapped) so far.
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Frames copied into a render-to-texture target so far.
    pub fn frames_copied(&self) -> u64 {
        self.frames_copied
    }

    /// Current viewport rectangle.
    pub fn viewport(&self) -> (i32, i32, u32, u32) {
        self.viewport
    }

    fn unit_mut(&mut self) -> &mut MatrixUnit {
        match self.matrix_mode {
            MatrixMode::Projection => &mut self.projection,
            MatrixMode::Modelview => &mut self.modelview,
            MatrixMode::Texture => &mut self.texture_matrix,
        }
    }

    fn record(&mut self, batch: DrawBatch) {
        self.batches.push(batch);
    }
}

impl RenderSystem for ImmediateRenderSystem {
    fn initialize(&mut self) -> Result<(), RenderError> {
        info!("initializing immediate render system");
        self.initialized = true;
        Ok(())
    }

    fn deinitialize(&mut self) -> Result<(), RenderError> {
        self.destroy_window();
        self.initialized = false;
        Ok(())
    }

    fn configure(&mut self) -> Result<(), RenderError> {
        if !self.initialized {
            return Err(RenderError::Initialization(
                "configure called before initialize".into(),
            ));
        }

        // Baseline state after context acquisition.
        self.clear_color = Color::BLACK;
        self.clear_depth = 1.0;
        self.depth_test = true;
        self.depth_mask = true;
        self.shade = ShadeModel::Smooth;
        self.cull = CullMode::None;
        Ok(())
    }

    fn create_window(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::WindowCreation(format!(
                "invalid window dimensions {width}x{height}"
            )));
        }
        info!("creating {width}x{height} window");
        self.window = Some((width, height));
        self.front = Some(Framebuffer::new(width, height));
        self.back = Some(Framebuffer::new(width, height));
        self.viewport = (0, 0, width, height);
        Ok(())
    }

    fn destroy_window(&mut self) {
        self.window = None;
        self.front = None;
        self.back = None;
    }

    fn set_window_title(&mut self, title: &str) {
        self.title = title.to_owned();
    }

    fn show_cursor(&mut self, show: bool) {
        self.cursor_visible = show;
    }

    fn screen_width(&self) -> u32 {
        self.window.map_or(0, |(w, _)| w)
    }

    fn screen_height(&self) -> u32 {
        self.window.map_or(0, |(_, h)| h)
    }

    fn frame_start(&mut self) {
        if let Some(back) = &mut self.back {
            back.clear(self.clear_color);
        }
        self.batches.clear();
        self.pending = PendingVertices::default();
    }

    fn frame_end(&mut self) {
        if self.rtt_armed {
            let (w, h) = self.rtt_size;
            if let Some(target) = self.rtt_target {
                self.copy_to_texture(w, h, target);
            } else {
                warn!("render-to-texture armed without a target, dropping frame");
            }
            self.rtt_armed = false;
            self.frames_copied += 1;
        } else {
            std::mem::swap(&mut self.front, &mut self.back);
            self.frames_presented += 1;
        }
    }

    fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    fn set_clear_depth(&mut self, depth: f32) {
        self.clear_depth = depth;
    }

    fn set_matrix_mode(&mut self, mode: MatrixMode) {
        self.matrix_mode = mode;
    }

    fn push_matrix(&mut self) {
        self.unit_mut().push();
    }

    fn pop_matrix(&mut self) {
        self.unit_mut().pop();
    }

    fn identity_matrix(&mut self) {
        self.unit_mut().current = Mat4::identity();
    }

    fn copy_matrix(&mut self, mat: &Mat4) {
        self.unit_mut().current = *mat;
    }

    fn mult_matrix(&mut self, mat: &Mat4) {
        let unit = self.unit_mut();
        unit.current *= *mat;
    }

    fn translate_scene(&mut self, x: f32, y: f32, z: f32) {
        self.mult_matrix(&Mat4::new_translation(&Vec3::new(x, y, z)));
    }

    fn rotate_scene(&mut self, angle_deg: f32, x: f32, y: f32, z: f32) {
        self.mult_matrix(&Mat4::rotation_deg(angle_deg, Vec3::new(x, y, z)));
    }

    fn scale_scene(&mut self, x: f32, y: f32, z: f32) {
        self.mult_matrix(&Mat4::new_nonuniform_scaling(&Vec3::new(x, y, z)));
    }

    fn get_model_view(&self) -> Mat4 {
        self.modelview.current
    }

    fn set_inverse_transpose_modelview(&mut self, mat: &Mat4) {
        self.inverse_transpose_mv = *mat;
    }

    fn set_perspective(&mut self, fov_deg: f32, aspect: f32, near: f32, far: f32) {
        let perspective = Mat4::perspective_deg(fov_deg, aspect, near, far);
        self.mult_matrix(&perspective);
    }

    fn set_orthographic(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        let ortho = Mat4::orthographic(left, right, bottom, top, near, far);
        self.copy_matrix(&ortho);
    }

    fn set_view_port(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = (x, y, width, height);
    }

    fn set_depth_test(&mut self, enable: bool) {
        self.depth_test = enable;
    }

    fn set_depth_mask(&mut self, enable: bool) {
        self.depth_mask = enable;
    }

    fn set_culling(&mut self, mode: CullMode) {
        self.cull = mode;
    }

    fn set_shade_model(&mut self, model: ShadeModel) {
        self.shade = model;
    }

    fn set_blend(&mut self, enable: bool) {
        self.blend_enabled = enable;
    }

    fn set_blend_mode(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.blend = (src, dst);
    }

    fn set_wireframe(&mut self, enable: bool) {
        self.wireframe = enable;
    }

    fn start_vertices(&mut self, mode: VertexMode) {
        self.pending.begin(mode);
    }

    fn vertex(&mut self, v: Vec3) {
        self.pending.push_vertex(v);
    }

    fn normal(&mut self, n: Vec3) {
        self.pending.set_normal(n);
    }

    fn vcolor(&mut self, c: Color) {
        self.pending.set_color(c);
    }

    fn tex_coord(&mut self, uv: Vec2) {
        self.pending.set_uv(uv);
    }

    fn end_vertices(&mut self) {
        let modelview = self.modelview.current;
        if let Some(batch) = self.pending.take_batch(modelview, self.bound) {
            self.record(batch);
        }
    }

    fn draw_arrays(&mut self, desc: &ArrayDesc<'_>) {
        let batch = batch_from_arrays(desc, self.modelview.current, self.bound);
        self.record(batch);
    }

    fn gen_texture(&mut self, width: u32, height: u32) -> TextureHandle {
        self.textures.generate(width, height)
    }

    fn bind_texture(&mut self, texture: TextureHandle, unit: usize) {
        assert!(unit < MAX_TEXTURE_UNITS, "texture unit {unit} out of range");
        self.bound[unit] = Some(texture);
    }

    fn unbind_texture(&mut self, unit: usize) {
        assert!(unit < MAX_TEXTURE_UNITS, "texture unit {unit} out of range");
        self.bound[unit] = None;
    }

    fn set_tex_env(&mut self, unit: usize, env: TexEnv) {
        assert!(unit < MAX_TEXTURE_UNITS, "texture unit {unit} out of range");
        self.tex_env[unit] = env;
    }

    fn copy_to_texture(&mut self, width: u32, height: u32, texture: TextureHandle) {
        let Some(back) = &self.back else {
            warn!("copyToTexture without a framebuffer");
            return;
        };
        let pixels = back.read_region(width, height);
        let w = width.min(back.width);
        let h = height.min(back.height);
        if let Some(obj) = self.textures.get_mut(texture) {
            obj.upload(w, h, pixels);
        } else {
            warn!("copyToTexture into a dead texture handle");
        }
    }

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(texture).map(|t| (t.width(), t.height()))
    }

    fn screenshot(&self, path: &Path) -> Result<(), RenderError> {
        let front = self.front.as_ref().ok_or(RenderError::NoWindow)?;
        let img = image::RgbaImage::from_raw(front.width, front.height, front.pixels.clone())
            .ok_or_else(|| RenderError::Screenshot("framebuffer size mismatch".into()))?;
        img.save(path)
            .map_err(|e| RenderError::Screenshot(e.to_string()))
    }

    fn set_material_ambient(&mut self, color: Color) {
        self.material_ambient = color;
    }

    fn set_material_diffuse(&mut self, color: Color) {
        self.material_diffuse = color;
    }

    fn set_material_specular(&mut self, color: Color) {
        self.material_specular = color;
    }

    fn set_texture_units(&mut self, count: u32) {
        self.texture_units = count;
    }

    fn set_texture_generations(&mut self, count: u32) {
        self.texture_generations = count;
    }

    fn set_color_channels(&mut self, count: u32) {
        self.color_channels = count;
    }

    fn set_lighting(&mut self, enable: bool) {
        self.lights.lighting = enable;
    }

    fn is_light_on(&self) -> bool {
        self.lights.any_enabled()
    }

    fn enabled_light_count(&self) -> u32 {
        self.lights.enabled_count()
    }

    fn set_light(&mut self, slot: usize, on: bool) {
        self.lights.slot_mut(slot).enabled = on;
    }

    fn set_light_position(&mut self, slot: usize, position: Vec3, directional: bool) {
        let light = self.lights.slot_mut(slot);
        light.position = position;
        light.directional = directional;
    }

    fn set_light_ambient(&mut self, slot: usize, color: Color) {
        self.lights.slot_mut(slot).ambient = color;
    }

    fn set_light_diffuse(&mut self, slot: usize, color: Color) {
        self.lights.slot_mut(slot).diffuse = color;
    }

    fn set_light_specular(&mut self, slot: usize, color: Color) {
        self.lights.slot_mut(slot).specular = color;
    }

    fn set_light_attenuation(&mut self, slot: usize, attenuation: Vec3) {
        self.lights.slot_mut(slot).attenuation = attenuation;
    }

    fn point_sprite_support(&self) -> bool {
        true
    }

    fn set_point_sprite(&mut self, enable: bool) {
        self.point_sprite = enable;
    }

    fn set_point_sprite_size(&mut self, size: f32) {
        // Point size scales with the vertical resolution, so sprites keep
        // their apparent size across window sizes.
        self.point_sprite_size = size * self.screen_height() as f32;
    }

    fn set_point_sprite_attenuation(&mut self, attenuation: Vec3) {
        self.point_sprite_attenuation = attenuation;
    }

    fn draw_point_sprites(&mut self, positions: &[Vec3]) {
        if positions.is_empty() {
            return;
        }
        let batch = DrawBatch {
            mode: VertexMode::Points,
            positions: positions.to_vec(),
            normals: Vec::new(),
            colors: Vec::new(),
            tex_coords: Vec::new(),
            modelview: self.modelview.current,
            textures: self.bound,
        };
        self.record(batch);
    }

    fn set_rtt_target(&mut self, target: Option<TextureHandle>) {
        self.rtt_target = target;
    }

    fn set_rtt_size(&mut self, width: u32, height: u32) {
        self.rtt_size = (width, height);
    }

    fn set_render_to_texture(&mut self, enable: bool) {
        self.rtt_armed = enable;
    }

    fn is_render_to_texture(&self) -> bool {
        self.rtt_armed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::system::MAX_LIGHTS;
    use approx::assert_relative_eq;

    fn booted() -> ImmediateRenderSystem {
        let mut rs = ImmediateRenderSystem::new();
        rs.initialize().unwrap();
        rs.configure().unwrap();
        rs.create_window(640, 480).unwrap();
        rs
    }

    #[test]
    fn rotation_is_right_multiplied_in_degrees() {
        let mut rs = booted();
        rs.set_matrix_mode(MatrixMode::Modelview);
        rs.identity_matrix();
        rs.translate_scene(1.0, 0.0, 0.0);
        rs.rotate_scene(90.0, 0.0, 1.0, 0.0);

        let mv = rs.get_model_view();
        let v = mv.transform_point(&crate::foundation::math::Point3::new(1.0, 0.0, 0.0));
        // Rotation applies before the point, translation after.
        assert_relative_eq!(v.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(v.z, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn push_pop_restores_modelview() {
        let mut rs = booted();
        rs.set_matrix_mode(MatrixMode::Modelview);
        rs.identity_matrix();
        rs.translate_scene(3.0, 4.0, 5.0);
        let saved = rs.get_model_view();

        rs.push_matrix();
        rs.identity_matrix();
        rs.pop_matrix();
        assert_eq!(rs.get_model_view(), saved);
    }

    #[test]
    fn frame_end_swaps_unless_rtt_armed() {
        let mut rs = booted();
        rs.frame_start();
        rs.frame_end();
        assert_eq!(rs.frames_presented(), 1);
        assert_eq!(rs.frames_copied(), 0);

        let tex = rs.gen_texture(128, 128);
        rs.set_rtt_size(128, 128);
        rs.set_rtt_target(Some(tex));
        rs.set_render_to_texture(true);
        rs.frame_start();
        rs.frame_end();
        assert_eq!(rs.frames_presented(), 1);
        assert_eq!(rs.frames_copied(), 1);
        assert!(!rs.is_render_to_texture());
        assert_eq!(rs.texture_size(tex), Some((128, 128)));
    }

    #[test]
    fn immediate_and_array_paths_record_equivalent_geometry() {
        let mut rs = booted();
        rs.frame_start();

        let positions = [
            Vec3::zeros(),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];

        rs.start_vertices(VertexMode::Triangles);
        for p in positions {
            rs.vertex(p);
        }
        rs.end_vertices();

        let mut desc = ArrayDesc::new(VertexMode::Triangles);
        desc.set_vertex_array(&positions);
        desc.set_vertex_count(3);
        rs.draw_arrays(&desc);

        let batches = rs.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].positions, batches[1].positions);
        assert_eq!(batches[0].mode, batches[1].mode);
    }

    #[test]
    #[should_panic(expected = "light slot")]
    fn out_of_range_light_slot_asserts() {
        let mut rs = booted();
        rs.set_light(MAX_LIGHTS, true);
    }

    #[test]
    fn enabled_light_count_tracks_slots() {
        let mut rs = booted();
        rs.set_light(0, true);
        rs.set_light(3, true);
        assert!(rs.is_light_on());
        assert_eq!(rs.enabled_light_count(), 2);
        rs.set_light(0, false);
        assert_eq!(rs.enabled_light_count(), 1);
    }
}
