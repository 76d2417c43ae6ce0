//! Console-style fixed-function backend.
//!
//! The modeled hardware has no matrix stack: push/pop run against
//! bounded software stacks (32 deep for modelview and texture, 16 for
//! projection). It also has no persistent vertex-array binding model,
//! so immediate submission collects vertices into a generic mesh buffer
//! flushed as a single draw per `end_vertices`. Texture combining goes
//! through typed TEV programs (see [`tev`]).

pub mod tev;

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

use self::tev::TevLibrary;

/// Software stack depth for the modelview and texture matrices.
pub const MODELVIEW_STACK_DEPTH: usize = 32;

/// Software stack depth for the projection matrix.
pub const PROJECTION_STACK_DEPTH: usize = 16;

/// A bounded software matrix stack.
///
/// `position` counts down from the capacity; a push beyond capacity is
/// silently dropped and a pop of an empty stack is silently ignored.
/// Entries move by plain memory copy, so a push/pop round trip restores
/// the matrix bit-for-bit.
#[derive(Debug)]
struct BoundedStack<const N: usize> {
    stack: [Mat4; N],
    position: usize,
}

impl<const N: usize> BoundedStack<N> {
    fn new() -> Self {
        Self {
            stack: [Mat4::identity(); N],
            position: N,
        }
    }

    fn push(&mut self, mat: &Mat4) {
        if self.position == 0 {
            debug!("matrix stack full, push dropped");
            return;
        }
        self.position -= 1;
        self.stack[self.position] = *mat;
    }

    fn pop(&mut self) -> Option<Mat4> {
        if self.position >= N {
            debug!("matrix stack empty, pop ignored");
            return None;
        }
        let mat = self.stack[self.position];
        self.position += 1;
        Some(mat)
    }

    fn depth(&self) -> usize {
        N - self.position
    }
}

/// Per-unit texture combiner selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Combiner {
    /// One of the standard fixed-function environment modes.
    Standard(TexEnv),
    /// A named TEV program from the library.
    Program(String),
}

/// The console-style render system.
pub struct FlipperRenderSystem {
    initialized: bool,
    window: Option<(u32, u32)>,
    title: String,
    cursor_visible: bool,

    clear_color: Color,
    clear_depth: f32,
    viewport: (i32, i32, u32, u32),

    matrix_mode: MatrixMode,
    projection: Mat4,
    modelview: Mat4,
    texture_matrix: Mat4,
    inverse_transpose_mv: Mat4,
    modelview_stack: BoundedStack<MODELVIEW_STACK_DEPTH>,
    projection_stack: BoundedStack<PROJECTION_STACK_DEPTH>,
    texture_stack: BoundedStack<MODELVIEW_STACK_DEPTH>,

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
    combiners: [Combiner; MAX_TEXTURE_UNITS],
    tev_library: TevLibrary,

    rtt_target: Option<TextureHandle>,
    rtt_size: (u32, u32),
    rtt_armed: bool,

    front: Option<Framebuffer>,
    back: Option<Framebuffer>,

    pending: PendingVertices,
    batches: Vec<DrawBatch>,
    cache_invalidations: u64,
    frames_presented: u64,
    frames_copied: u64,
}

impl Default for FlipperRenderSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FlipperRenderSystem {
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
            projection: Mat4::identity(),
            modelview: Mat4::identity(),
            texture_matrix: Mat4::identity(),
            inverse_transpose_mv: Mat4::identity(),
            modelview_stack: BoundedStack::new(),
            projection_stack: BoundedStack::new(),
            texture_stack: BoundedStack::new(),
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
            combiners: std::array::from_fn(|_| Combiner::Standard(TexEnv::Modulate)),
            tev_library: TevLibrary::new(),
            rtt_target: None,
            rtt_size: (0, 0),
            rtt_armed: false,
            front: None,
            back: None,
            pending: PendingVertices::default(),
            batches: Vec::new(),
            cache_invalidations: 0,
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

    /// Vertex/texture cache invalidations issued so far.
    pub fn cache_invalidations(&self) -> u64 {
        self.cache_invalidations
    }

    /// Current depth of the modelview software stack.
    pub fn modelview_stack_depth(&self) -> usize {
        self.modelview_stack.depth()
    }

    /// Current depth of the projection software stack.
    pub fn projection_stack_depth(&self) -> usize {
        self.projection_stack.depth()
    }

    /// Current viewport rectangle.
    pub fn viewport(&self) -> (i32, i32, u32, u32) {
        self.viewport
    }

    /// Mutable access to the TEV program library.
    pub fn tev_library_mut(&mut self) -> &mut TevLibrary {
        &mut self.tev_library
    }

    /// The TEV program library.
    pub fn tev_library(&self) -> &TevLibrary {
        &self.tev_library
    }

    /// Select a named TEV program as the combiner for a unit.
    /// Falls back to modulate when the program does not exist.
    pub fn set_tev_program(&mut self, unit: usize, name: &str) {
        assert!(unit < MAX_TEXTURE_UNITS, "texture unit {unit} out of range");
        if self.tev_library.get(name).is_some() {
            self.combiners[unit] = Combiner::Program(name.to_owned());
        } else {
            warn!("tev program {name:?} not found, using modulate");
            self.combiners[unit] = Combiner::Standard(TexEnv::Modulate);
        }
    }

    /// Combiner currently selected for a unit.
    pub fn combiner(&self, unit: usize) -> &Combiner {
        &self.combiners[unit]
    }

    fn current_mut(&mut self) -> &mut Mat4 {
        match self.matrix_mode {
            MatrixMode::Projection => &mut self.projection,
            MatrixMode::Modelview => &mut self.modelview,
            MatrixMode::Texture => &mut self.texture_matrix,
        }
    }

    /// Flush the generic mesh buffer as one hardware draw.
    fn flush(&mut self) {
        let modelview = self.modelview;
        if let Some(batch) = self.pending.take_batch(modelview, self.bound) {
            self.batches.push(batch);
        }
    }
}

impl RenderSystem for FlipperRenderSystem {
    fn initialize(&mut self) -> Result<(), RenderError> {
        info!("initializing flipper render system");
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
                "invalid framebuffer dimensions {width}x{height}"
            )));
        }
        info!("allocating {width}x{height} framebuffer pair");
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
        // The hardware caches vertices and texture lookups across frames.
        self.cache_invalidations += 1;
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
        match self.matrix_mode {
            MatrixMode::Modelview => {
                let m = self.modelview;
                self.modelview_stack.push(&m);
            }
            MatrixMode::Projection => {
                let m = self.projection;
                self.projection_stack.push(&m);
            }
            MatrixMode::Texture => {
                let m = self.texture_matrix;
                self.texture_stack.push(&m);
            }
        }
    }

    fn pop_matrix(&mut self) {
        match self.matrix_mode {
            MatrixMode::Modelview => {
                if let Some(m) = self.modelview_stack.pop() {
                    self.modelview = m;
                }
            }
            MatrixMode::Projection => {
                if let Some(m) = self.projection_stack.pop() {
                    self.projection = m;
                }
            }
            MatrixMode::Texture => {
                if let Some(m) = self.texture_stack.pop() {
                    self.texture_matrix = m;
                }
            }
        }
    }

    fn identity_matrix(&mut self) {
        *self.current_mut() = Mat4::identity();
    }

    fn copy_matrix(&mut self, mat: &Mat4) {
        *self.current_mut() = *mat;
    }

    fn mult_matrix(&mut self, mat: &Mat4) {
        let current = self.current_mut();
        *current *= *mat;
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
        self.modelview
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
        // The hardware has no fill-mode switch; draw lines instead.
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
        self.flush();
    }

    fn draw_arrays(&mut self, desc: &ArrayDesc<'_>) {
        let batch = batch_from_arrays(desc, self.modelview, self.bound);
        self.batches.push(batch);
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
        self.combiners[unit] = Combiner::Standard(env);
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
        false
    }

    fn set_point_sprite(&mut self, _enable: bool) {}

    fn set_point_sprite_size(&mut self, _size: f32) {}

    fn set_point_sprite_attenuation(&mut self, _attenuation: Vec3) {}

    fn draw_point_sprites(&mut self, _positions: &[Vec3]) {
        warn!("point sprites are not supported on this hardware");
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

    fn booted() -> FlipperRenderSystem {
        let mut rs = FlipperRenderSystem::new();
        rs.initialize().unwrap();
        rs.configure().unwrap();
        rs.create_window(640, 480).unwrap();
        rs
    }

    #[test]
    fn software_stack_round_trips_bit_for_bit() {
        let mut rs = booted();
        rs.set_matrix_mode(MatrixMode::Modelview);
        rs.translate_scene(1.5, -2.25, 0.125);
        rs.rotate_scene(33.0, 0.0, 1.0, 0.0);
        let saved = rs.get_model_view();

        rs.push_matrix();
        rs.identity_matrix();
        rs.pop_matrix();

        // Pure memory copy: every bit must survive the round trip.
        let restored = rs.get_model_view();
        assert_eq!(saved.as_slice(), restored.as_slice());
    }

    #[test]
    fn push_beyond_capacity_is_dropped_without_corruption() {
        let mut rs = booted();
        rs.set_matrix_mode(MatrixMode::Modelview);

        // Fill the stack with distinct matrices.
        for i in 0..MODELVIEW_STACK_DEPTH {
            rs.identity_matrix();
            rs.translate_scene(i as f32, 0.0, 0.0);
            rs.push_matrix();
        }
        assert_eq!(rs.modelview_stack_depth(), MODELVIEW_STACK_DEPTH);

        // The 33rd push must be a no-op.
        rs.identity_matrix();
        rs.translate_scene(999.0, 999.0, 999.0);
        rs.push_matrix();
        assert_eq!(rs.modelview_stack_depth(), MODELVIEW_STACK_DEPTH);

        // Pops come back in LIFO order, untouched by the dropped push.
        rs.pop_matrix();
        let top = rs.get_model_view();
        assert_eq!(top[(0, 3)], (MODELVIEW_STACK_DEPTH - 1) as f32);
    }

    #[test]
    fn pop_of_empty_stack_is_ignored() {
        let mut rs = booted();
        rs.set_matrix_mode(MatrixMode::Projection);
        rs.translate_scene(7.0, 0.0, 0.0);
        let before = rs.projection_stack_depth();
        rs.pop_matrix();
        assert_eq!(rs.projection_stack_depth(), before);
        // Current matrix untouched by the ignored pop.
        assert_eq!(rs.projection[(0, 3)], 7.0);
    }

    #[test]
    fn immediate_submission_flushes_one_batch_per_end() {
        let mut rs = booted();
        rs.frame_start();

        rs.start_vertices(VertexMode::Quads);
        for i in 0..4 {
            rs.tex_coord(Vec2::new(0.0, 0.0));
            rs.vertex(Vec3::new(i as f32, 0.0, 0.0));
        }
        rs.end_vertices();

        assert_eq!(rs.frame_stats().batches, 1);
        assert_eq!(rs.frame_stats().vertices, 4);
        assert_eq!(rs.batches()[0].mode, VertexMode::Quads);
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
    fn frame_start_invalidates_caches() {
        let mut rs = booted();
        let before = rs.cache_invalidations();
        rs.frame_start();
        rs.frame_end();
        rs.frame_start();
        assert_eq!(rs.cache_invalidations(), before + 2);
    }

    #[test]
    fn missing_tev_program_falls_back_to_modulate() {
        let mut rs = booted();
        rs.set_tev_program(0, "does-not-exist");
        assert_eq!(*rs.combiner(0), Combiner::Standard(TexEnv::Modulate));

        rs.tev_library_mut().parse_script("tev glow { tevColorOp add zero 1 true linear regPrev }");
        rs.set_tev_program(0, "glow");
        assert_eq!(*rs.combiner(0), Combiner::Program("glow".into()));
    }

    #[test]
    fn point_sprites_report_unsupported() {
        let rs = FlipperRenderSystem::new();
        assert!(!rs.point_sprite_support());
    }
}
