//! Drawable base types: transform nodes, bounding boxes and the
//! 2D/3D drawable traits the renderer traverses.
//!
//! Attachment between drawables is expressed as an arena key rather than
//! a borrowed parent, so chains cannot dangle. Absolute transforms are
//! resolved recursively at query time and never cached.

use log::error;
use slotmap::{new_key_type, SlotMap};

use crate::foundation::math::{Quat, Vec2, Vec3};
use crate::render::material::MaterialRegistry;
use crate::render::system::RenderSystem;

new_key_type! {
    /// Key of a registered 3D drawable.
    pub struct ObjectKey;

    /// Key of a registered 2D drawable.
    pub struct Object2Key;
}

/// Arena of registered 3D drawables, owned by the renderer.
pub type Arena3 = SlotMap<ObjectKey, Box<dyn Drawable3D>>;

/// Arena of registered 2D drawables, owned by the renderer.
pub type Arena2 = SlotMap<Object2Key, Box<dyn Drawable2D>>;

/// Maximum attach-chain depth walked when resolving absolute transforms.
/// A chain deeper than this is treated as a cycle.
pub const MAX_ATTACH_DEPTH: usize = 64;

/// Transform state shared by every 3D drawable.
#[derive(Debug, Clone)]
pub struct Node3 {
    /// Position relative to the parent (or world, when detached).
    pub position: Vec3,
    /// Orientation relative to the parent.
    pub orientation: Quat,
    /// Scale factors.
    pub scale: Vec3,
    /// Whether the pipeline draws this object.
    pub visible: bool,
    /// Whether the pipeline draws the bounding box edges.
    pub draw_bounding_box: bool,
    /// Parent this drawable is attached to.
    pub parent: Option<ObjectKey>,
}

impl Default for Node3 {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            orientation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            visible: true,
            draw_bounding_box: false,
            parent: None,
        }
    }
}

impl Node3 {
    /// Position independent of any parent.
    pub fn relative_position(&self) -> Vec3 {
        self.position
    }

    /// Orientation independent of any parent.
    pub fn relative_orientation(&self) -> Quat {
        self.orientation
    }
}

/// Transform state shared by every 2D drawable.
#[derive(Debug, Clone)]
pub struct Node2 {
    /// Position in screen coordinates relative to the parent.
    pub position: Vec2,
    /// Rotation in degrees relative to the parent.
    pub rotation: f32,
    /// Width x height in screen coordinates.
    pub scale: Vec2,
    /// Z ordering factor; higher Z draws later.
    pub z: f32,
    /// Whether the pipeline draws this object.
    pub visible: bool,
    /// Parent this drawable is attached to.
    pub parent: Option<Object2Key>,
}

impl Default for Node2 {
    fn default() -> Self {
        Self {
            position: Vec2::zeros(),
            rotation: 0.0,
            scale: Vec2::zeros(),
            z: 0.0,
            visible: true,
            parent: None,
        }
    }
}

/// Resolve a 3D node's absolute position by walking its attach chain.
///
/// Chains deeper than [`MAX_ATTACH_DEPTH`] are treated as cycles: an
/// error is logged and resolution stops with the partial result.
pub fn absolute_position(arena: &Arena3, node: &Node3) -> Vec3 {
    let mut position = node.position;
    let mut parent = node.parent;
    let mut depth = 0;

    while let Some(key) = parent {
        if depth >= MAX_ATTACH_DEPTH {
            error!("attach chain exceeds depth {MAX_ATTACH_DEPTH}, assuming a cycle");
            break;
        }
        let Some(obj) = arena.get(key) else { break };
        position += obj.node().position;
        parent = obj.node().parent;
        depth += 1;
    }

    position
}

/// Resolve a 3D node's absolute orientation by walking its attach chain.
pub fn absolute_orientation(arena: &Arena3, node: &Node3) -> Quat {
    let mut orientation = node.orientation;
    let mut parent = node.parent;
    let mut depth = 0;

    while let Some(key) = parent {
        if depth >= MAX_ATTACH_DEPTH {
            error!("attach chain exceeds depth {MAX_ATTACH_DEPTH}, assuming a cycle");
            break;
        }
        let Some(obj) = arena.get(key) else { break };
        orientation = obj.node().orientation * orientation;
        parent = obj.node().parent;
        depth += 1;
    }

    orientation
}

/// Resolve a 2D node's absolute position and rotation.
pub fn absolute_placement_2d(arena: &Arena2, node: &Node2) -> (Vec2, f32) {
    let mut position = node.position;
    let mut rotation = node.rotation;
    let mut parent = node.parent;
    let mut depth = 0;

    while let Some(key) = parent {
        if depth >= MAX_ATTACH_DEPTH {
            error!("attach chain exceeds depth {MAX_ATTACH_DEPTH}, assuming a cycle");
            break;
        }
        let Some(obj) = arena.get(key) else { break };
        position += obj.node().position;
        rotation += obj.node().rotation;
        parent = obj.node().parent;
        depth += 1;
    }

    (position, rotation)
}

/// An axis-aligned box in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    mins: Vec3,
    maxs: Vec3,
}

impl BoundingBox {
    /// Create a box from explicit corners.
    pub fn new(mins: Vec3, maxs: Vec3) -> Self {
        Self { mins, maxs }
    }

    /// Minimum corner.
    pub fn mins(&self) -> Vec3 {
        self.mins
    }

    /// Maximum corner.
    pub fn maxs(&self) -> Vec3 {
        self.maxs
    }

    /// Set the minimum corner.
    pub fn set_mins(&mut self, mins: Vec3) {
        self.mins = mins;
    }

    /// Set the maximum corner.
    pub fn set_maxs(&mut self, maxs: Vec3) {
        self.maxs = maxs;
    }

    /// Lower the minimum corner per-component if `point` is below it.
    pub fn set_test_mins(&mut self, point: Vec3) {
        self.mins = self.mins.inf(&point);
    }

    /// Raise the maximum corner per-component if `point` is above it.
    pub fn set_test_maxs(&mut self, point: Vec3) {
        self.maxs = self.maxs.sup(&point);
    }

    /// Grow the box to contain `point`.
    pub fn set_test(&mut self, point: Vec3) {
        self.set_test_mins(point);
        self.set_test_maxs(point);
    }

    /// Grow the box to contain another box.
    pub fn merge(&mut self, other: &BoundingBox) {
        self.set_test_mins(other.mins);
        self.set_test_maxs(other.maxs);
    }

    /// Return the box translated by `offset`.
    pub fn translated(&self, offset: Vec3) -> Self {
        Self::new(self.mins + offset, self.maxs + offset)
    }

    /// The eight corners, indexed by axis bits (bit 0 = x at max,
    /// bit 1 = y at max, bit 2 = z at max).
    pub fn corners(&self) -> [Vec3; 8] {
        let mut corners = [Vec3::zeros(); 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            corner.x = if i & 1 == 0 { self.mins.x } else { self.maxs.x };
            corner.y = if i & 2 == 0 { self.mins.y } else { self.maxs.y };
            corner.z = if i & 4 == 0 { self.mins.z } else { self.maxs.z };
        }
        corners
    }

    /// Center of the box.
    pub fn center(&self) -> Vec3 {
        (self.mins + self.maxs) * 0.5
    }
}

/// Anything the renderer can place and draw in the 3D pass.
pub trait Drawable3D {
    /// Transform node.
    fn node(&self) -> &Node3;

    /// Mutable transform node.
    fn node_mut(&mut self) -> &mut Node3;

    /// Issue the draw calls for this object. The modelview already
    /// carries the camera; implementations must not reset it.
    fn draw(&mut self, rs: &mut dyn RenderSystem, materials: &mut MaterialRegistry);

    /// True when the object's materials carry no transparency.
    fn is_opaque(&self, materials: &MaterialRegistry) -> bool;

    /// Axis-aligned bounding box in local space.
    fn aa_bounding_box(&self) -> BoundingBox;

    /// Bounding box in local space (identical to the AABB for
    /// drawables that do not track an oriented box).
    fn bounding_box(&self) -> BoundingBox {
        self.aa_bounding_box()
    }
}

/// Anything the renderer can place and draw in the 2D overlay pass.
pub trait Drawable2D {
    /// Transform node.
    fn node(&self) -> &Node2;

    /// Mutable transform node.
    fn node_mut(&mut self) -> &mut Node2;

    /// Issue the draw calls for this object under the orthographic
    /// screen projection.
    fn draw(&mut self, rs: &mut dyn RenderSystem, materials: &mut MaterialRegistry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_grows_to_contain_points() {
        let mut bb = BoundingBox::default();
        bb.set_test(Vec3::new(-1.0, 2.0, 0.0));
        bb.set_test(Vec3::new(3.0, -4.0, 5.0));
        assert_eq!(bb.mins(), Vec3::new(-1.0, -4.0, 0.0));
        assert_eq!(bb.maxs(), Vec3::new(3.0, 2.0, 5.0));
    }

    #[test]
    fn corners_follow_axis_bit_layout() {
        let bb = BoundingBox::new(Vec3::zeros(), Vec3::new(1.0, 2.0, 3.0));
        let corners = bb.corners();
        assert_eq!(corners[0], Vec3::zeros());
        assert_eq!(corners[1], Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(corners[2], Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(corners[7], Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn merge_combines_boxes() {
        let mut a = BoundingBox::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let b = BoundingBox::new(Vec3::new(0.0, -2.0, 0.0), Vec3::new(2.0, 0.0, 0.5));
        a.merge(&b);
        assert_eq!(a.mins(), Vec3::new(-1.0, -2.0, -1.0));
        assert_eq!(a.maxs(), Vec3::new(2.0, 1.0, 1.0));
    }
}
