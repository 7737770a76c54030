//! Arc-ball orbit camera producing the inverse matrices the ray generator needs.

use std::f32::consts::PI;

use glam::{Mat4, Quat, UVec3, Vec3};
use thiserror::Error;

/// Vertical field of view.
pub const FOV_Y: f32 = PI / 4.0;

const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 10_000.0;

/// Largest allowed alignment between the view direction and up.
const PITCH_LIMIT: f32 = 0.99;

/// Shortest usable distance between position and target.
const MIN_DISTANCE: f32 = 1e-4;

/// Smallest sine between view direction and up that still yields a right axis.
const MIN_TILT: f32 = 1e-4;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera at {position} has no usable distance to its target {target}")]
    NoDistance { position: Vec3, target: Vec3 },

    #[error("camera at {position} looks along the up axis at {target}")]
    AlongUp { position: Vec3, target: Vec3 },
}

/// Orbit camera around a fixed target.
///
/// The inverse matrices are recomputed after every mutation, so they always
/// describe the current position.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    width: u32,
    height: u32,

    inv_view: Mat4,
    inv_centered_view: Mat4,
    inv_projection: Mat4,
}

impl Camera {
    /// Creates a camera at `position` orbiting `target`.
    ///
    /// Both points must be finite and at least `MIN_DISTANCE` apart, and the
    /// direction between them must not be parallel to the up axis; otherwise
    /// there is no view basis to orbit in.
    pub fn new(
        position: Vec3,
        target: Vec3,
        width: u32,
        height: u32,
    ) -> Result<Self, CameraError> {
        let offset = position - target;
        if !offset.is_finite() || offset.length() < MIN_DISTANCE {
            return Err(CameraError::NoDistance { position, target });
        }
        if offset.normalize().cross(Vec3::Y).length() < MIN_TILT {
            return Err(CameraError::AlongUp { position, target });
        }

        let mut camera = Self {
            position,
            target,
            up: Vec3::Y,
            width: width.max(1),
            height: height.max(1),
            inv_view: Mat4::IDENTITY,
            inv_centered_view: Mat4::IDENTITY,
            inv_projection: Mat4::IDENTITY,
        };
        camera.update_view();
        camera.update_projection();
        Ok(camera)
    }

    /// Places the camera outside one corner of a volume, looking at its center.
    ///
    /// Fails only for an empty volume.
    pub fn framing(size: UVec3, width: u32, height: u32) -> Result<Self, CameraError> {
        let size = size.as_vec3();
        Self::new(Vec3::new(-1.0, 0.5, -1.0) * size, size * 0.5, width, height)
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Camera-to-world transform.
    pub fn inv_view(&self) -> Mat4 {
        self.inv_view
    }

    /// Camera-to-world rotation without translation, for ray directions.
    pub fn inv_centered_view(&self) -> Mat4 {
        self.inv_centered_view
    }

    /// Clip-to-camera transform.
    pub fn inv_projection(&self) -> Mat4 {
        self.inv_projection
    }

    /// Orbits around the target by a pointer delta in pixels.
    ///
    /// A full viewport width turns the camera once around the up axis, a full
    /// height tilts it by half a turn around its right axis. Pitch stops at
    /// `PITCH_LIMIT` from either pole, so a large delta lands where a series
    /// of small ones would. Returns whether the camera moved; a zero delta
    /// leaves every field untouched.
    pub fn rotate(&mut self, dx: f32, dy: f32, viewport_width: u32, viewport_height: u32) -> bool {
        if dx == 0.0 && dy == 0.0 {
            return false;
        }

        let yaw = dx * (2.0 * PI / viewport_width.max(1) as f32);
        let pitch = dy * (PI / viewport_height.max(1) as f32);

        // Yaw keeps the elevation, so the pitch margin can be taken up front.
        let offset = Quat::from_axis_angle(self.up, yaw) * (self.position - self.target);
        let direction = offset.normalize_or_zero();

        // Positive pitch lowers the elevation.
        let limit = PITCH_LIMIT.asin();
        let elevation = direction.dot(self.up).clamp(-1.0, 1.0).asin();
        let mut pitch = pitch.clamp((elevation - limit).min(0.0), (elevation + limit).max(0.0));

        let right = (-direction).cross(self.up).normalize_or_zero();
        if right == Vec3::ZERO {
            pitch = 0.0;
        }

        if yaw == 0.0 && pitch == 0.0 {
            return false;
        }

        self.position = self.target + Quat::from_axis_angle(right, pitch) * offset;
        self.update_view();
        true
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.update_projection();
    }

    fn update_view(&mut self) {
        let view = Mat4::look_at_rh(self.position, self.target, self.up);
        self.inv_view = view.inverse();

        let centered = Mat4::look_at_rh(Vec3::ZERO, self.target - self.position, self.up);
        self.inv_centered_view = centered.inverse();
    }

    fn update_projection(&mut self) {
        let aspect = self.width as f32 / self.height as f32;
        self.inv_projection = Mat4::perspective_rh(FOV_Y, aspect, Z_NEAR, Z_FAR).inverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> Camera {
        Camera::framing(UVec3::new(64, 32, 64), 1920, 1010).unwrap()
    }

    #[test]
    fn zero_delta_is_bit_identical() {
        let mut cam = camera();
        let before = cam.clone();

        assert!(!cam.rotate(0.0, 0.0, 1920, 1010));
        assert_eq!(cam, before);
        assert_eq!(
            cam.inv_view().to_cols_array().map(f32::to_bits),
            before.inv_view().to_cols_array().map(f32::to_bits)
        );
    }

    #[test]
    fn inverse_matrices_invert_their_forward_counterparts() {
        let mut cam = camera();
        cam.rotate(37.0, -12.0, 1920, 1010);

        let view = Mat4::look_at_rh(cam.position(), cam.target(), cam.up());
        assert!((view * cam.inv_view()).abs_diff_eq(Mat4::IDENTITY, 1e-3));

        let proj = Mat4::perspective_rh(FOV_Y, 1920.0 / 1010.0, Z_NEAR, Z_FAR);
        assert!((proj * cam.inv_projection()).abs_diff_eq(Mat4::IDENTITY, 1e-3));
    }

    #[test]
    fn inv_view_places_the_eye_at_the_position() {
        let cam = camera();
        let eye = cam.inv_view().transform_point3(Vec3::ZERO);
        assert!(eye.abs_diff_eq(cam.position(), 1e-3));
    }

    #[test]
    fn centered_view_has_no_translation_and_looks_at_target() {
        let cam = camera();
        let origin = cam.inv_centered_view().transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::ZERO, 1e-4));

        let forward = cam.inv_centered_view().transform_vector3(Vec3::NEG_Z);
        let expected = (cam.target() - cam.position()).normalize();
        assert!(forward.abs_diff_eq(expected, 1e-4));
    }

    #[test]
    fn rotation_keeps_distance_to_target() {
        let mut cam = camera();
        let distance = cam.position().distance(cam.target());

        assert!(cam.rotate(120.0, 45.0, 1920, 1010));
        assert_relative_eq!(cam.position().distance(cam.target()), distance, epsilon = 1e-2);
    }

    #[test]
    fn successive_yaw_deltas_compose() {
        let mut split = camera();
        split.rotate(30.0, 0.0, 1920, 1010);
        split.rotate(50.0, 0.0, 1920, 1010);

        let mut whole = camera();
        whole.rotate(80.0, 0.0, 1920, 1010);

        assert!(split.position().abs_diff_eq(whole.position(), 1e-2));
        assert!(split.inv_view().abs_diff_eq(whole.inv_view(), 1e-2));
    }

    #[test]
    fn full_width_drag_is_one_revolution() {
        let mut cam = camera();
        let start = cam.position();
        cam.rotate(1920.0, 0.0, 1920, 1010);
        assert!(cam.position().abs_diff_eq(start, 1e-2));
    }

    #[test]
    fn pitch_is_suppressed_near_the_pole() {
        // Looking almost straight down from above.
        let mut cam = Camera::new(Vec3::new(0.0, 100.0, 0.5), Vec3::ZERO, 800, 600).unwrap();
        let before = cam.position();

        // Negative pitch would raise it further past the limit.
        assert!(!cam.rotate(0.0, -10.0, 800, 600));
        assert_eq!(cam.position(), before);

        // Pitching away from the pole still works.
        assert!(cam.rotate(0.0, 10.0, 800, 600));
        assert!(cam.position().y < before.y);
    }

    #[test]
    fn yaw_is_invertible() {
        let mut cam = camera();
        let start = cam.position();

        assert!(cam.rotate(145.0, 0.0, 1920, 1010));
        assert!(cam.rotate(-145.0, 0.0, 1920, 1010));
        assert!(cam.position().abs_diff_eq(start, 1e-2));
    }

    #[test]
    fn pitch_is_invertible_away_from_the_pole() {
        let mut cam = camera();
        let start = cam.position();

        assert!(cam.rotate(0.0, 40.0, 1920, 1010));
        assert!(cam.position().y < start.y);
        assert!(cam.rotate(0.0, -40.0, 1920, 1010));
        assert!(cam.position().abs_diff_eq(start, 1e-2));
    }

    #[test]
    fn successive_pitch_deltas_compose() {
        let mut split = camera();
        split.rotate(0.0, 30.0, 1920, 1010);
        split.rotate(0.0, 50.0, 1920, 1010);

        let mut whole = camera();
        whole.rotate(0.0, 80.0, 1920, 1010);

        assert!(split.position().abs_diff_eq(whole.position(), 1e-2));
    }

    fn near_top_pole() -> Camera {
        // 0.2 rad from straight down, inside the pitch limit.
        let position = Vec3::new(0.0, 0.2f32.cos(), 0.2f32.sin()) * 10.0;
        Camera::new(position, Vec3::ZERO, 1000, 1000).unwrap()
    }

    #[test]
    fn large_pitch_stops_at_the_pole_limit() {
        let mut cam = near_top_pole();

        // Half a turn upward; the old all-or-nothing guard let this cross the pole.
        assert!(cam.rotate(0.0, -500.0, 1000, 1000));

        let direction = (cam.position() - cam.target()).normalize();
        assert!(direction.dot(cam.up()) <= PITCH_LIMIT + 1e-4);
        assert!(cam.position().z > 0.0);
        assert_relative_eq!(cam.position().length(), 10.0, epsilon = 1e-3);
    }

    #[test]
    fn split_and_whole_drags_agree_near_the_pole() {
        let mut split = near_top_pole();
        for _ in 0..100 {
            split.rotate(0.0, -1.0, 1000, 1000);
        }

        let mut whole = near_top_pole();
        whole.rotate(0.0, -100.0, 1000, 1000);

        assert!(split.position().abs_diff_eq(whole.position(), 1e-2));
    }

    #[test]
    fn degenerate_placements_are_rejected() {
        assert!(matches!(
            Camera::new(Vec3::ONE, Vec3::ONE, 800, 600),
            Err(CameraError::NoDistance { .. })
        ));
        assert!(matches!(
            Camera::new(Vec3::new(f32::NAN, 0.0, 1.0), Vec3::ZERO, 800, 600),
            Err(CameraError::NoDistance { .. })
        ));
        assert!(matches!(
            Camera::new(Vec3::new(2.0, 9.0, 3.0), Vec3::new(2.0, 1.0, 3.0), 800, 600),
            Err(CameraError::AlongUp { .. })
        ));
        assert!(Camera::framing(UVec3::ZERO, 800, 600).is_err());
    }

    #[test]
    fn set_viewport_updates_projection_only() {
        let mut cam = camera();
        let view = cam.inv_view();
        let proj = cam.inv_projection();

        cam.set_viewport(800, 800);
        assert_eq!(cam.inv_view(), view);
        assert_ne!(cam.inv_projection(), proj);
        assert_eq!(cam.viewport(), (800, 800));
    }
}
