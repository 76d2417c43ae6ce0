//! View and projection state, frustum culling and screen-to-world rays.
//!
//! The camera recomputes its view matrix and the six frustum planes
//! eagerly on every setter. Camera updates happen at most once per
//! frame, so the redundant recomputation is cheaper than tracking
//! dirtiness.

use log::warn;

use crate::foundation::math::{Mat3, Mat4, Quat, Vec3};
use crate::render::drawable::BoundingBox;
use crate::render::system::{MatrixMode, RenderSystem};

/// A world-space ray with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Ray starting point.
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
}

/// One frustum plane as a {normal, signed offset} pair.
///
/// A point is on the visible side when `normal.dot(p) + d >= 0`.
#[derive(Debug, Clone, Copy, Default)]
struct FrustumPlane {
    normal: Vec3,
    d: f32,
}

const PLANE_COUNT: usize = 6;

/// The scene camera.
///
/// Defaults: fov 90 degrees, aspect 1.33 (4:3), near 0.1, far 1000.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    orientation: Quat,

    fov_deg: f32,
    aspect: f32,
    near: f32,
    far: f32,

    /// Cached orientation + translation matrix.
    view: Mat4,
    /// Inverse-transpose of the view rotation, for normals and the skybox.
    rot_inverse_transpose: Mat4,
    planes: [FrustumPlane; PLANE_COUNT],
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    /// Create a camera at the origin looking down negative Z.
    pub fn new() -> Self {
        let mut camera = Self {
            position: Vec3::zeros(),
            orientation: Quat::identity(),
            fov_deg: 90.0,
            aspect: 1.33,
            near: 0.1,
            far: 1000.0,
            view: Mat4::identity(),
            rot_inverse_transpose: Mat4::identity(),
            planes: [FrustumPlane::default(); PLANE_COUNT],
        };
        camera.set_view();
        camera
    }

    /// Set the vertical field of view in degrees.
    pub fn set_fov(&mut self, fov_deg: f32) {
        if fov_deg == 0.0 {
            warn!("setting camera fov to 0");
        }
        self.fov_deg = fov_deg;
        self.set_view();
    }

    /// Set the projection aspect ratio.
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.set_view();
    }

    /// Set the near and far clip distances.
    pub fn set_planes(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        self.set_view();
    }

    /// Set all projection parameters at once.
    pub fn set_perspective(&mut self, fov_deg: f32, aspect: f32, near: f32, far: f32) {
        if fov_deg == 0.0 {
            warn!("setting camera fov to 0");
        }
        self.fov_deg = fov_deg;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
        self.set_view();
    }

    /// Move the camera.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.set_view();
    }

    /// Camera position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Rotate the camera.
    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation;
        self.set_view();
    }

    /// Camera orientation.
    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    /// Vertical field of view in degrees.
    pub fn fov(&self) -> f32 {
        self.fov_deg
    }

    /// Projection aspect ratio.
    pub fn aspect_ratio(&self) -> f32 {
        self.aspect
    }

    /// Near clip distance.
    pub fn near_plane(&self) -> f32 {
        self.near
    }

    /// Far clip distance.
    pub fn far_plane(&self) -> f32 {
        self.far
    }

    /// Orient the camera to face a target point.
    pub fn look_at(&mut self, target: Vec3) {
        // The view Z axis points away from the target.
        let dir_z = (self.position - target)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vec3::z);

        let dir_x = Vec3::y()
            .cross(&dir_z)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vec3::x);
        let dir_y = dir_z.cross(&dir_x);

        let basis = Mat3::from_columns(&[dir_x, dir_y, dir_z]);
        self.orientation = Quat::from_matrix(&basis);
        self.set_view();
    }

    /// Forward direction in world space.
    pub fn direction(&self) -> Vec3 {
        Vec3::new(-self.view[(0, 2)], -self.view[(1, 2)], -self.view[(2, 2)])
    }

    /// Up direction in world space.
    pub fn up(&self) -> Vec3 {
        Vec3::new(self.view[(0, 1)], self.view[(1, 1)], self.view[(2, 1)])
    }

    /// Right direction in world space.
    pub fn right(&self) -> Vec3 {
        Vec3::new(self.view[(0, 0)], self.view[(1, 0)], self.view[(2, 0)])
    }

    /// The cached view matrix.
    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    /// Inverse-transpose of the view rotation block.
    pub fn rot_inverse_transpose(&self) -> &Mat4 {
        &self.rot_inverse_transpose
    }

    /// Recompute the view matrix, its inverse-transpose and the
    /// frustum planes from the current position and orientation.
    fn set_view(&mut self) {
        let rotation = self.orientation.to_homogeneous();
        let translation = Mat4::new_translation(&(-self.position));
        self.view = translation * rotation;

        self.rot_inverse_transpose = rotation
            .try_inverse()
            .map_or(Mat4::identity(), |inv| inv.transpose());

        let direction = self.direction();
        let up = self.up();
        let right = self.right();

        let half_fov = (self.fov_deg.to_radians() / 2.0).tan();
        let h_far = 2.0 * half_fov * self.far;
        let w_far = h_far * self.aspect;

        let far_center = self.position + direction * self.far;
        let near_center = self.position + direction * self.near;

        let far_top = up * (h_far / 2.0);
        let far_right = right * (w_far / 2.0);

        let far_top_left = far_center + far_top - far_right;
        let far_top_right = far_center + far_top + far_right;
        let far_bottom_right = far_center - far_top + far_right;

        self.planes = [
            // Near
            FrustumPlane {
                normal: direction,
                d: -direction.dot(&near_center),
            },
            // Far
            FrustumPlane {
                normal: -direction,
                d: direction.dot(&far_center),
            },
            // Right
            FrustumPlane {
                normal: -right,
                d: right.dot(&far_top_right),
            },
            // Left
            FrustumPlane {
                normal: right,
                d: -right.dot(&far_top_left),
            },
            // Top
            FrustumPlane {
                normal: -up,
                d: up.dot(&far_top_right),
            },
            // Bottom
            FrustumPlane {
                normal: up,
                d: -up.dot(&far_bottom_right),
            },
        ];
    }

    /// Test a point against all six frustum planes.
    pub fn is_point_inside_frustum(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|p| p.normal.dot(&point) + p.d >= 0.0)
    }

    /// Test a sphere against all six frustum planes.
    pub fn is_sphere_inside_frustum(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|p| p.normal.dot(&center) + p.d >= -radius)
    }

    /// Test an axis-aligned box against the frustum.
    ///
    /// The box counts as inside when any of its eight corners passes the
    /// point test. This is an approximation: a box that intersects the
    /// frustum without a corner inside it is reported as outside.
    pub fn is_box_inside_frustum(&self, bounds: &BoundingBox) -> bool {
        bounds
            .corners()
            .iter()
            .any(|&corner| self.is_point_inside_frustum(corner))
    }

    /// Cast a ray through a point on the near plane.
    ///
    /// `screen` is in normalized coordinates, (0, 0) top-left to (1, 1)
    /// bottom-right. The vertical half-angle term carries the aspect
    /// division, not the horizontal one.
    pub fn project_ray_from_2d(&self, screen_x: f32, screen_y: f32) -> Ray {
        let half_fov = (self.fov_deg.to_radians() / 2.0).tan();

        let dx = (2.0 * screen_x - 1.0) * half_fov;
        let dy = (1.0 - 2.0 * screen_y) * half_fov / self.aspect;

        let direction = (self.direction() + self.right() * dx + self.up() * dy)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| self.direction());

        Ray {
            origin: self.position,
            direction,
        }
    }

    /// Load this camera's projection into the render system.
    pub fn apply_perspective(&self, rs: &mut dyn RenderSystem) {
        rs.set_matrix_mode(MatrixMode::Projection);
        rs.identity_matrix();
        rs.set_perspective(self.fov_deg, self.aspect, self.near, self.far);
    }

    /// Load this camera's view into the modelview matrix. Must be called
    /// before drawing each object.
    pub fn copy_view(&self, rs: &mut dyn RenderSystem) {
        rs.set_matrix_mode(MatrixMode::Modelview);
        rs.copy_matrix(&self.view);
        rs.set_inverse_transpose_modelview(&self.rot_inverse_transpose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn origin_camera() -> Camera {
        let mut camera = Camera::new();
        camera.set_perspective(90.0, 1.33, 1.0, 100.0);
        camera
    }

    #[test]
    fn default_camera_looks_down_negative_z() {
        let camera = Camera::new();
        assert_relative_eq!(camera.direction(), -Vec3::z(), epsilon = 1e-6);
        assert_relative_eq!(camera.up(), Vec3::y(), epsilon = 1e-6);
        assert_relative_eq!(camera.right(), Vec3::x(), epsilon = 1e-6);
    }

    #[test]
    fn known_points_against_frustum() {
        let camera = origin_camera();
        assert!(camera.is_point_inside_frustum(Vec3::new(0.0, 0.0, -50.0)));
        // Behind the camera.
        assert!(!camera.is_point_inside_frustum(Vec3::new(0.0, 0.0, 50.0)));
        // Beyond the far plane.
        assert!(!camera.is_point_inside_frustum(Vec3::new(0.0, 0.0, -200.0)));
    }

    #[test]
    fn sphere_straddling_near_plane_is_inside() {
        let camera = origin_camera();
        // Center just behind the near plane, radius reaches across it.
        assert!(camera.is_sphere_inside_frustum(Vec3::new(0.0, 0.0, -0.5), 1.0));
        assert!(!camera.is_sphere_inside_frustum(Vec3::new(0.0, 0.0, 10.0), 1.0));
    }

    #[test]
    fn look_at_faces_the_target() {
        let mut camera = Camera::new();
        camera.set_position(Vec3::new(10.0, 0.0, 0.0));
        camera.look_at(Vec3::zeros());
        assert_relative_eq!(camera.direction(), -Vec3::x(), epsilon = 1e-5);
    }

    #[test]
    fn center_ray_matches_forward_direction() {
        let mut camera = Camera::new();
        camera.set_perspective(90.0, 1.33, 0.1, 1000.0);
        camera.set_position(Vec3::new(3.0, 2.0, 1.0));
        camera.look_at(Vec3::new(0.0, 0.0, -10.0));

        let ray = camera.project_ray_from_2d(0.5, 0.5);
        assert_relative_eq!(ray.origin, camera.position(), epsilon = 1e-6);
        assert_relative_eq!(ray.direction, camera.direction(), epsilon = 1e-5);
    }

    #[test]
    fn off_center_ray_deviates_toward_screen_edge() {
        let camera = origin_camera();
        let ray = camera.project_ray_from_2d(1.0, 0.5);
        assert!(ray.direction.x > 0.0);
        assert_relative_eq!(ray.direction.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn box_containing_frustum_reports_outside() {
        let camera = origin_camera();
        // All eight corners lie outside, so the corner test misses the
        // overlap. Preserved on purpose.
        let huge = BoundingBox::new(
            Vec3::new(-10_000.0, -10_000.0, -10_000.0),
            Vec3::new(10_000.0, 10_000.0, 10_000.0),
        );
        assert!(!camera.is_box_inside_frustum(&huge));

        let visible = BoundingBox::new(
            Vec3::new(-1.0, -1.0, -51.0),
            Vec3::new(1.0, 1.0, -49.0),
        );
        assert!(camera.is_box_inside_frustum(&visible));
    }
}
