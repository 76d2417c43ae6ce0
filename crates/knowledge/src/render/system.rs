//! The polymorphic GPU abstraction.
//!
//! [`RenderSystem`] is the single surface the rest of the engine talks to.
//! It captures every state transition a fixed-function pipeline needs:
//! matrix stacks, culling, blending, lighting, vertex submission, texture
//! binding and render-to-texture. Two backends implement it (see
//! [`crate::render::backends`]) with radically different hardware models;
//! the contract is kept coarse-grained so both can satisfy it without
//! leaking backend concepts upward.

use std::path::Path;

use thiserror::Error;

use crate::foundation::color::Color;
use crate::foundation::math::{Mat4, Vec2, Vec3};
use crate::render::drawable::BoundingBox;
use crate::render::texture::TextureHandle;

/// Number of hardware texture units both backends expose.
pub const MAX_TEXTURE_UNITS: usize = 8;

/// Number of hardware light slots both backends expose.
pub const MAX_LIGHTS: usize = 8;

/// Errors surfaced by fallible render system operations.
///
/// Per-frame operations are infallible; only lifecycle, window and
/// image output paths return these.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The backend could not be initialized.
    #[error("render system initialization failed: {0}")]
    Initialization(String),

    /// Window (and framebuffer pair) creation failed.
    #[error("window creation failed: {0}")]
    WindowCreation(String),

    /// A window is required for the requested operation.
    #[error("no window has been created")]
    NoWindow,

    /// Screenshot encoding or writing failed.
    #[error("screenshot failed: {0}")]
    Screenshot(String),
}

/// Which logical matrix subsequent matrix operations act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixMode {
    /// Projection matrix.
    Projection,
    /// Modelview matrix.
    Modelview,
    /// Texture coordinate matrix (stage animation).
    Texture,
}

/// Primitive assembly mode for vertex submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexMode {
    /// Independent triangles.
    Triangles,
    /// Triangle strip.
    TriStrip,
    /// Independent quads.
    Quads,
    /// Independent line segments.
    Lines,
    /// Points.
    Points,
}

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// No culling.
    #[default]
    None,
    /// Cull back faces.
    Back,
    /// Cull front faces.
    Front,
    /// Cull both faces.
    Both,
}

/// Polygon shading model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadeModel {
    /// Flat shading.
    Flat,
    /// Smooth (per-vertex interpolated) shading.
    #[default]
    Smooth,
}

/// Blend equation factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// Factor of zero.
    Zero,
    /// Factor of one.
    One,
    /// Source color.
    SrcColor,
    /// One minus source color.
    InvSrcColor,
    /// Source alpha.
    SrcAlpha,
    /// One minus source alpha.
    InvSrcAlpha,
    /// Destination color.
    DstColor,
    /// One minus destination color.
    InvDstColor,
    /// Destination alpha.
    DstAlpha,
    /// One minus destination alpha.
    InvDstAlpha,
}

/// Fixed-function texture environment (combiner) mode for a texture unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TexEnv {
    /// Texture replaces fragment color.
    Replace,
    /// Texture modulates fragment color.
    #[default]
    Modulate,
    /// Blend with the environment color.
    Blend,
    /// Decal over fragment color.
    Decal,
    /// Additive combine.
    Add,
}

/// A batched-geometry submission descriptor.
///
/// Borrows the caller's arrays for the duration of the draw call; the
/// borrow checker enforces the validity the contract demands. Counts are
/// explicit and must be set before [`RenderSystem::draw_arrays`].
#[derive(Debug, Clone, Default)]
pub struct ArrayDesc<'a> {
    mode: Option<VertexMode>,
    positions: Option<&'a [Vec3]>,
    normals: Option<&'a [Vec3]>,
    colors: Option<&'a [Color]>,
    tex_coords: [Option<&'a [Vec2]>; MAX_TEXTURE_UNITS],
    indices: Option<&'a [u32]>,
    vertex_count: u32,
    index_count: u32,
}

impl<'a> ArrayDesc<'a> {
    /// Create an empty descriptor for the given assembly mode.
    pub fn new(mode: VertexMode) -> Self {
        Self {
            mode: Some(mode),
            ..Self::default()
        }
    }

    /// Set the vertex position array.
    pub fn set_vertex_array(&mut self, positions: &'a [Vec3]) {
        self.positions = Some(positions);
    }

    /// Set the vertex normal array.
    pub fn set_normal_array(&mut self, normals: &'a [Vec3]) {
        self.normals = Some(normals);
    }

    /// Set the per-vertex color array.
    pub fn set_color_array(&mut self, colors: &'a [Color]) {
        self.colors = Some(colors);
    }

    /// Set the texture coordinate array for one unit.
    ///
    /// # Panics
    ///
    /// Panics if `unit` is not a valid hardware texture unit.
    pub fn set_tex_coord_array(&mut self, unit: usize, coords: &'a [Vec2]) {
        assert!(unit < MAX_TEXTURE_UNITS, "texture unit {unit} out of range");
        self.tex_coords[unit] = Some(coords);
    }

    /// Set the vertex index array.
    pub fn set_vertex_index(&mut self, indices: &'a [u32]) {
        self.indices = Some(indices);
    }

    /// Set the number of vertices to draw.
    pub fn set_vertex_count(&mut self, count: u32) {
        self.vertex_count = count;
    }

    /// Set the number of indices to draw.
    pub fn set_index_count(&mut self, count: u32) {
        self.index_count = count;
    }

    /// The assembly mode, if one was set.
    pub fn mode(&self) -> Option<VertexMode> {
        self.mode
    }

    /// Position array.
    pub fn positions(&self) -> Option<&'a [Vec3]> {
        self.positions
    }

    /// Normal array.
    pub fn normals(&self) -> Option<&'a [Vec3]> {
        self.normals
    }

    /// Color array.
    pub fn colors(&self) -> Option<&'a [Color]> {
        self.colors
    }

    /// Texture coordinate array for one unit.
    pub fn tex_coords(&self, unit: usize) -> Option<&'a [Vec2]> {
        self.tex_coords.get(unit).copied().flatten()
    }

    /// Index array.
    pub fn indices(&self) -> Option<&'a [u32]> {
        self.indices
    }

    /// Vertex count.
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Index count.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Validate the descriptor ahead of a draw.
    ///
    /// # Panics
    ///
    /// Panics on a zero vertex count, a missing position array, or count
    /// fields exceeding the bound arrays. These are caller contract
    /// violations, not runtime-recoverable conditions.
    pub fn validate(&self) {
        assert!(self.vertex_count > 0, "drawArrays with zero vertex count");
        let positions = self
            .positions
            .unwrap_or_else(|| panic!("drawArrays without a vertex array"));
        assert!(
            positions.len() >= self.vertex_count as usize,
            "vertex count exceeds bound position array"
        );
        if let Some(indices) = self.indices {
            assert!(self.index_count > 0, "index array bound with zero index count");
            assert!(
                indices.len() >= self.index_count as usize,
                "index count exceeds bound index array"
            );
        }
    }
}

/// The abstract render system contract.
///
/// All per-frame operations are infallible; invariant violations (out of
/// range light slot, zero-count draw) are programmer errors and assert.
/// Call sequences must come from a single thread; implementations keep
/// "active material" style state in single global slots.
pub trait RenderSystem {
    // Lifecycle

    /// Acquire the graphics context.
    fn initialize(&mut self) -> Result<(), RenderError>;

    /// Release the graphics context and all owned resources.
    fn deinitialize(&mut self) -> Result<(), RenderError>;

    /// Apply baseline state: clear color/depth, depth function,
    /// default culling and shading model.
    fn configure(&mut self) -> Result<(), RenderError>;

    // Window

    /// Create the output window and allocate the front/back framebuffer
    /// pair sized exactly `width` x `height`.
    fn create_window(&mut self, width: u32, height: u32) -> Result<(), RenderError>;

    /// Destroy the window and framebuffers.
    fn destroy_window(&mut self);

    /// Set the window title.
    fn set_window_title(&mut self, title: &str);

    /// Show or hide the system cursor over the window.
    fn show_cursor(&mut self, show: bool);

    /// Current framebuffer width. Zero before `create_window`.
    fn screen_width(&self) -> u32;

    /// Current framebuffer height. Zero before `create_window`.
    fn screen_height(&self) -> u32;

    // Frame bracket

    /// Begin a frame: clear color and depth, invalidate backend caches.
    fn frame_start(&mut self);

    /// End a frame: present (swap buffers), or if render-to-texture is
    /// armed copy the rendered image into the target texture and clear
    /// the mode flag. Exactly one of the two happens per `frame_start`.
    fn frame_end(&mut self);

    /// Set the color buffer clear value.
    fn set_clear_color(&mut self, color: Color);

    /// Set the depth buffer clear value.
    fn set_clear_depth(&mut self, depth: f32);

    // Matrix operations

    /// Select which logical matrix subsequent matrix calls operate on.
    fn set_matrix_mode(&mut self, mode: MatrixMode);

    /// Push the current matrix onto the active stack.
    fn push_matrix(&mut self);

    /// Pop the active stack into the current matrix.
    fn pop_matrix(&mut self);

    /// Replace the current matrix with identity.
    fn identity_matrix(&mut self);

    /// Replace the current matrix with `mat`.
    fn copy_matrix(&mut self, mat: &Mat4);

    /// Right-multiply the current matrix by `mat`.
    fn mult_matrix(&mut self, mat: &Mat4);

    /// Right-multiply the current matrix by a translation.
    fn translate_scene(&mut self, x: f32, y: f32, z: f32);

    /// Right-multiply the current matrix by a rotation of `angle_deg`
    /// degrees around the given axis.
    fn rotate_scene(&mut self, angle_deg: f32, x: f32, y: f32, z: f32);

    /// Right-multiply the current matrix by a scale.
    fn scale_scene(&mut self, x: f32, y: f32, z: f32);

    /// Read back the current modelview matrix.
    fn get_model_view(&self) -> Mat4;

    /// Provide the inverse-transpose of the modelview for normal
    /// transformation on backends that want it precomputed.
    fn set_inverse_transpose_modelview(&mut self, mat: &Mat4);

    // Projection

    /// Load a perspective projection into the current matrix.
    /// `fov_deg` is the vertical field of view in degrees.
    fn set_perspective(&mut self, fov_deg: f32, aspect: f32, near: f32, far: f32);

    /// Load an orthographic projection into the current matrix.
    fn set_orthographic(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32);

    /// Set the viewport rectangle.
    fn set_view_port(&mut self, x: i32, y: i32, width: u32, height: u32);

    // Fixed-function state

    /// Enable or disable depth testing.
    fn set_depth_test(&mut self, enable: bool);

    /// Enable or disable depth writes.
    fn set_depth_mask(&mut self, enable: bool);

    /// Set the face culling mode.
    fn set_culling(&mut self, mode: CullMode);

    /// Set the shading model.
    fn set_shade_model(&mut self, model: ShadeModel);

    /// Enable or disable blending.
    fn set_blend(&mut self, enable: bool);

    /// Set the blend equation factors.
    fn set_blend_mode(&mut self, src: BlendFactor, dst: BlendFactor);

    /// Enable or disable wireframe rasterization.
    fn set_wireframe(&mut self, enable: bool);

    // Immediate-mode submission

    /// Begin immediate-mode submission of primitives.
    fn start_vertices(&mut self, mode: VertexMode);

    /// Submit one vertex position.
    fn vertex(&mut self, v: Vec3);

    /// Set the normal applied to subsequent vertices.
    fn normal(&mut self, n: Vec3);

    /// Set the color applied to subsequent vertices.
    fn vcolor(&mut self, c: Color);

    /// Set the texture coordinate applied to the next vertex on unit 0.
    fn tex_coord(&mut self, uv: Vec2);

    /// Finish immediate-mode submission and draw.
    fn end_vertices(&mut self);

    // Array submission

    /// Draw batched geometry described by `desc`.
    ///
    /// Must produce output equivalent to submitting the same logical
    /// geometry through the immediate path.
    fn draw_arrays(&mut self, desc: &ArrayDesc<'_>);

    // Textures

    /// Allocate a texture object of the given size and return its handle.
    fn gen_texture(&mut self, width: u32, height: u32) -> TextureHandle;

    /// Bind a texture to a hardware unit.
    ///
    /// # Panics
    ///
    /// Panics if `unit` is not a valid hardware texture unit.
    fn bind_texture(&mut self, texture: TextureHandle, unit: usize);

    /// Unbind whatever texture is bound to `unit`.
    fn unbind_texture(&mut self, unit: usize);

    /// Set the texture environment mode for a unit.
    fn set_tex_env(&mut self, unit: usize, env: TexEnv);

    /// Copy the current framebuffer contents into `texture`,
    /// resizing it to `width` x `height`.
    fn copy_to_texture(&mut self, width: u32, height: u32, texture: TextureHandle);

    /// Dimensions of a texture object, if it exists.
    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)>;

    /// Capture the last presented frame to an image file.
    fn screenshot(&self, path: &Path) -> Result<(), RenderError>;

    // Material colors

    /// Set the active material's ambient reflectance.
    fn set_material_ambient(&mut self, color: Color);

    /// Set the active material's diffuse reflectance.
    fn set_material_diffuse(&mut self, color: Color);

    /// Set the active material's specular reflectance.
    fn set_material_specular(&mut self, color: Color);

    // Fixed-function stage plumbing

    /// Number of active texture units for subsequent draws.
    fn set_texture_units(&mut self, count: u32);

    /// Number of active texture coordinate generations.
    fn set_texture_generations(&mut self, count: u32);

    /// Number of active color channels.
    fn set_color_channels(&mut self, count: u32);

    // Lighting

    /// Enable or disable lighting as a whole.
    fn set_lighting(&mut self, enable: bool);

    /// True if any light slot is currently enabled.
    fn is_light_on(&self) -> bool;

    /// Number of currently enabled light slots.
    fn enabled_light_count(&self) -> u32;

    /// Enable or disable a hardware light slot.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= MAX_LIGHTS`.
    fn set_light(&mut self, slot: usize, on: bool);

    /// Set a light's position. `directional` selects a directional
    /// rather than positional light.
    fn set_light_position(&mut self, slot: usize, position: Vec3, directional: bool);

    /// Set a light's ambient color.
    fn set_light_ambient(&mut self, slot: usize, color: Color);

    /// Set a light's diffuse color.
    fn set_light_diffuse(&mut self, slot: usize, color: Color);

    /// Set a light's specular color.
    fn set_light_specular(&mut self, slot: usize, color: Color);

    /// Set a light's constant/linear/quadratic attenuation.
    fn set_light_attenuation(&mut self, slot: usize, attenuation: Vec3);

    // Point sprites

    /// Whether the hardware can rasterize point sprites.
    fn point_sprite_support(&self) -> bool;

    /// Enable or disable point sprite rasterization.
    fn set_point_sprite(&mut self, enable: bool);

    /// Set the point sprite size in world units.
    fn set_point_sprite_size(&mut self, size: f32);

    /// Set the point sprite distance attenuation coefficients.
    fn set_point_sprite_attenuation(&mut self, attenuation: Vec3);

    /// Draw one point sprite per position.
    fn draw_point_sprites(&mut self, positions: &[Vec3]);

    // Render-to-texture

    /// Set the texture receiving the next RTT frame.
    fn set_rtt_target(&mut self, target: Option<TextureHandle>);

    /// Set the dimensions of the next RTT frame.
    fn set_rtt_size(&mut self, width: u32, height: u32);

    /// Arm or disarm render-to-texture mode for the next `frame_end`.
    fn set_render_to_texture(&mut self, enable: bool);

    /// Whether render-to-texture mode is currently armed.
    fn is_render_to_texture(&self) -> bool;

    // Composed helpers

    /// Draw a single 3D line segment with the current state.
    fn draw_3d_line(&mut self, start: Vec3, end: Vec3) {
        self.start_vertices(VertexMode::Lines);
        self.vertex(start);
        self.vertex(end);
        self.end_vertices();
    }

    /// Draw the twelve edges of an axis-aligned box.
    fn draw_line_box(&mut self, bounds: &BoundingBox) {
        let corners = bounds.corners();

        // Bottom face, top face, then the four vertical edges.
        const EDGES: [(usize, usize); 12] = [
            (0, 1), (1, 3), (3, 2), (2, 0),
            (4, 5), (5, 7), (7, 6), (6, 4),
            (0, 4), (1, 5), (2, 6), (3, 7),
        ];

        self.start_vertices(VertexMode::Lines);
        for (a, b) in EDGES {
            self.vertex(corners[a]);
            self.vertex(corners[b]);
        }
        self.end_vertices();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_desc_tracks_streams_and_counts() {
        let positions = [Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
        let uvs = [Vec2::zeros(), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)];

        let mut desc = ArrayDesc::new(VertexMode::Triangles);
        desc.set_vertex_array(&positions);
        desc.set_tex_coord_array(0, &uvs);
        desc.set_vertex_count(3);
        desc.validate();

        assert_eq!(desc.mode(), Some(VertexMode::Triangles));
        assert_eq!(desc.vertex_count(), 3);
        assert!(desc.tex_coords(0).is_some());
        assert!(desc.tex_coords(1).is_none());
    }

    #[test]
    #[should_panic(expected = "zero vertex count")]
    fn zero_vertex_count_asserts() {
        let positions = [Vec3::zeros()];
        let mut desc = ArrayDesc::new(VertexMode::Points);
        desc.set_vertex_array(&positions);
        desc.validate();
    }

    #[test]
    #[should_panic(expected = "texture unit")]
    fn out_of_range_tex_coord_unit_asserts() {
        let uvs = [Vec2::zeros()];
        let mut desc = ArrayDesc::new(VertexMode::Points);
        desc.set_tex_coord_array(MAX_TEXTURE_UNITS, &uvs);
    }
}
