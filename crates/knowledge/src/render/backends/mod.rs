//! The two concrete render system backends.
//!
//! [`immediate::ImmediateRenderSystem`] models a desktop-style GPU with a
//! hardware matrix stack and direct state registers.
//! [`flipper::FlipperRenderSystem`] models a console-style fixed-function
//! GPU with no matrix stack and a register-combiner texture environment.
//!
//! Both backends are in-process hardware-state models: register files,
//! matrix stacks, an owned front/back framebuffer pair and a per-frame
//! record of submitted geometry. Everything the contract promises is
//! observable through the recorded state.

pub mod flipper;
pub mod immediate;

use log::warn;

use crate::foundation::color::Color;
use crate::foundation::math::{Mat4, Vec2, Vec3};
use crate::render::system::{VertexMode, MAX_LIGHTS, MAX_TEXTURE_UNITS};
use crate::render::texture::TextureHandle;

/// One recorded geometry submission.
#[derive(Debug, Clone)]
pub struct DrawBatch {
    /// Primitive assembly mode.
    pub mode: VertexMode,
    /// Vertex positions, index-expanded when the source was indexed.
    pub positions: Vec<Vec3>,
    /// Per-vertex normals (empty when none were submitted).
    pub normals: Vec<Vec3>,
    /// Per-vertex colors (empty when none were submitted).
    pub colors: Vec<Color>,
    /// Per-vertex unit-0 texture coordinates (empty when none).
    pub tex_coords: Vec<Vec2>,
    /// Modelview matrix at submission time.
    pub modelview: Mat4,
    /// Textures bound per unit at submission time.
    pub textures: [Option<TextureHandle>; MAX_TEXTURE_UNITS],
}

/// Per-frame submission statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Batches submitted since `frame_start`.
    pub batches: usize,
    /// Vertices submitted since `frame_start`.
    pub vertices: usize,
}

/// An owned RGBA8 color buffer.
#[derive(Debug, Clone)]
pub(crate) struct Framebuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize) * 4],
        }
    }

    /// Fill every pixel with the clear color.
    pub fn clear(&mut self, color: Color) {
        let rgba = color.to_rgba_bytes();
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
    }

    /// Copy out a region clipped to the buffer bounds.
    pub fn read_region(&self, width: u32, height: u32) -> Vec<u8> {
        let w = width.min(self.width) as usize;
        let h = height.min(self.height) as usize;
        let mut out = vec![0; w * h * 4];
        for row in 0..h {
            let src = row * self.width as usize * 4;
            let dst = row * w * 4;
            out[dst..dst + w * 4].copy_from_slice(&self.pixels[src..src + w * 4]);
        }
        out
    }
}

/// One hardware light slot.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LightSlot {
    pub enabled: bool,
    pub position: Vec3,
    pub directional: bool,
    pub ambient: Color,
    pub diffuse: Color,
    pub specular: Color,
    pub attenuation: Vec3,
}

impl Default for LightSlot {
    fn default() -> Self {
        Self {
            enabled: false,
            position: Vec3::zeros(),
            directional: false,
            ambient: Color::BLACK,
            diffuse: Color::WHITE,
            specular: Color::BLACK,
            attenuation: Vec3::new(1.0, 0.0, 0.0),
        }
    }
}

/// The eight hardware light slots plus the master lighting toggle.
#[derive(Debug, Default)]
pub(crate) struct LightBank {
    pub lighting: bool,
    pub slots: [LightSlot; MAX_LIGHTS],
}

impl LightBank {
    pub fn slot_mut(&mut self, slot: usize) -> &mut LightSlot {
        assert!(slot < MAX_LIGHTS, "light slot {slot} out of range");
        &mut self.slots[slot]
    }

    pub fn any_enabled(&self) -> bool {
        self.slots.iter().any(|s| s.enabled)
    }

    pub fn enabled_count(&self) -> u32 {
        self.slots.iter().filter(|s| s.enabled).count() as u32
    }
}

/// Accumulator for immediate-mode vertex submission.
#[derive(Debug, Default)]
pub(crate) struct PendingVertices {
    pub mode: Option<VertexMode>,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub colors: Vec<Color>,
    pub tex_coords: Vec<Vec2>,
    current_normal: Option<Vec3>,
    current_color: Option<Color>,
    current_uv: Option<Vec2>,
}

impl PendingVertices {
    pub fn begin(&mut self, mode: VertexMode) {
        if self.mode.is_some() {
            warn!("startVertices while a submission is open, dropping previous geometry");
        }
        *self = Self::default();
        self.mode = Some(mode);
    }

    pub fn set_normal(&mut self, n: Vec3) {
        self.current_normal = Some(n);
    }

    pub fn set_color(&mut self, c: Color) {
        self.current_color = Some(c);
    }

    pub fn set_uv(&mut self, uv: Vec2) {
        self.current_uv = Some(uv);
    }

    pub fn push_vertex(&mut self, v: Vec3) {
        self.positions.push(v);
        if let Some(n) = self.current_normal {
            self.normals.push(n);
        }
        if let Some(c) = self.current_color {
            self.colors.push(c);
        }
        if let Some(uv) = self.current_uv {
            self.tex_coords.push(uv);
        }
    }

    /// Close the submission and produce a batch snapshot.
    pub fn take_batch(
        &mut self,
        modelview: Mat4,
        textures: [Option<TextureHandle>; MAX_TEXTURE_UNITS],
    ) -> Option<DrawBatch> {
        let mode = self.mode.take()?;
        let batch = DrawBatch {
            mode,
            positions: std::mem::take(&mut self.positions),
            normals: std::mem::take(&mut self.normals),
            colors: std::mem::take(&mut self.colors),
            tex_coords: std::mem::take(&mut self.tex_coords),
            modelview,
            textures,
        };
        self.current_normal = None;
        self.current_color = None;
        self.current_uv = None;
        Some(batch)
    }
}

/// Expand an array descriptor into flat per-vertex streams.
pub(crate) fn batch_from_arrays(
    desc: &crate::render::system::ArrayDesc<'_>,
    modelview: Mat4,
    textures: [Option<TextureHandle>; MAX_TEXTURE_UNITS],
) -> DrawBatch {
    desc.validate();

    let mode = desc.mode().unwrap_or(VertexMode::Triangles);
    let positions = desc.positions().unwrap_or(&[]);
    let normals = desc.normals().unwrap_or(&[]);
    let colors = desc.colors().unwrap_or(&[]);
    let uvs = desc.tex_coords(0).unwrap_or(&[]);

    let gather = |indices: &[u32]| -> DrawBatch {
        let pick = |i: u32| positions[i as usize];
        DrawBatch {
            mode,
            positions: indices.iter().map(|&i| pick(i)).collect(),
            normals: indices
                .iter()
                .filter_map(|&i| normals.get(i as usize).copied())
                .collect(),
            colors: indices
                .iter()
                .filter_map(|&i| colors.get(i as usize).copied())
                .collect(),
            tex_coords: indices
                .iter()
                .filter_map(|&i| uvs.get(i as usize).copied())
                .collect(),
            modelview,
            textures,
        }
    };

    if let Some(indices) = desc.indices() {
        gather(&indices[..desc.index_count() as usize])
    } else {
        let count = desc.vertex_count() as usize;
        DrawBatch {
            mode,
            positions: positions[..count].to_vec(),
            normals: normals.get(..count).map(<[Vec3]>::to_vec).unwrap_or_default(),
            colors: colors.get(..count).map(<[Color]>::to_vec).unwrap_or_default(),
            tex_coords: uvs.get(..count).map(<[Vec2]>::to_vec).unwrap_or_default(),
            modelview,
            textures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::system::ArrayDesc;

    #[test]
    fn pending_vertices_latch_attributes() {
        let mut pending = PendingVertices::default();
        pending.begin(VertexMode::Triangles);
        pending.set_uv(Vec2::new(0.5, 0.5));
        pending.push_vertex(Vec3::zeros());
        pending.push_vertex(Vec3::new(1.0, 0.0, 0.0));

        let batch = pending.take_batch(Mat4::identity(), [None; MAX_TEXTURE_UNITS]).unwrap();
        assert_eq!(batch.positions.len(), 2);
        assert_eq!(batch.tex_coords, vec![Vec2::new(0.5, 0.5); 2]);
        assert!(pending.mode.is_none());
    }

    #[test]
    fn indexed_arrays_expand_positions() {
        let positions = [
            Vec3::zeros(),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let indices = [0u32, 1, 2, 2, 1, 0];

        let mut desc = ArrayDesc::new(VertexMode::Triangles);
        desc.set_vertex_array(&positions);
        desc.set_vertex_index(&indices);
        desc.set_vertex_count(3);
        desc.set_index_count(6);

        let batch = batch_from_arrays(&desc, Mat4::identity(), [None; MAX_TEXTURE_UNITS]);
        assert_eq!(batch.positions.len(), 6);
        assert_eq!(batch.positions[3], Vec3::new(0.0, 1.0, 0.0));
    }
}
