//! Stereo camera rig controller.
//!
//! Owns per-eye camera configuration, distortion parameters and meshes,
//! and drives their regeneration. Engine lifecycle hooks are replaced by an
//! explicit contract: `initialize` -> `activate` -> `on_frame`, with
//! `on_parameters_changed` as the dirty-recompute hook. Head pose and
//! device calibration come in through the [`HeadTracker`] and
//! [`CalibrationSource`] traits; the rig never talks to a driver directly.

use glam::{Mat4, Quat, Vec3, Vec4};
use log::{debug, info, warn};

use crate::calibration::{CalibrationError, DeviceCalibration};
use crate::lens::{self, Eye};
use crate::mesh::{self, DistortionMesh, MeshConfig};
use crate::warp::DistortionParameters;

/// One head-tracker sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeadPose {
    pub orientation: Quat,
    /// Sample time in seconds, tracker epoch.
    pub timestamp: f64,
}

impl Default for HeadPose {
    fn default() -> Self {
        Self {
            orientation: Quat::IDENTITY,
            timestamp: 0.0,
        }
    }
}

/// Per-frame head pose supplier (an IMU fusion loop, a test stub, ...).
pub trait HeadTracker {
    fn head_pose(&mut self) -> HeadPose;
}

/// One-shot calibration supplier, read on activation.
pub trait CalibrationSource {
    fn device_calibration(&self) -> DeviceCalibration;
}

/// Rig lifecycle. Transitions are linear; `on_frame` only runs in `Active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RigState {
    Uninitialized,
    Initialized,
    Active,
}

/// Camera geometry for one eye, recomputed on dirty state only.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EyeCameraConfig {
    /// Vertical field of view in degrees.
    pub vertical_fov: f32,
    pub aspect_ratio: f32,
    pub near_clip: f32,
    pub far_clip: f32,
    /// Neck-to-eye offset; x is mirrored per eye (±ipd/2).
    pub eye_offset: Vec3,
    /// Root-to-neck offset (translation only).
    pub neck_position: Vec3,
    /// Rig root in world space.
    pub root_position: Vec3,
    /// Horizontal lens offset in normalized screen space.
    pub lens_offset: f32,
    pub portrait: bool,
}

impl EyeCameraConfig {
    /// World-space eye position under the neck model: the eye offset
    /// rotates with the head, the neck pivot does not.
    pub fn eye_position(&self, orientation: Quat) -> Vec3 {
        self.root_position + self.neck_position + orientation * self.eye_offset
    }

    /// View matrix for the given head orientation.
    pub fn view_matrix(&self, orientation: Quat) -> Mat4 {
        Mat4::from_rotation_translation(orientation, self.eye_position(orientation)).inverse()
    }

    /// Asymmetric perspective projection with the frustum shifted
    /// horizontally by the lens offset, so the projection center lines up
    /// with the physical lens center. Portrait mode rolls the projection
    /// by -90 degrees.
    pub fn projection_matrix(&self) -> Mat4 {
        let near = self.near_clip;
        let far = self.far_clip;
        let fov_y = self.vertical_fov.to_radians();

        let top = near * (fov_y / 2.0).tan();
        let bottom = -top;
        let half_width = top * self.aspect_ratio;
        // Shift the frustum so the projection center lands at the lens
        // offset in NDC (x_offset works out to exactly `lens_offset`).
        let shift_near = -self.lens_offset * half_width;

        let left = -half_width - shift_near;
        let right = half_width - shift_near;

        let x_scale = 2.0 * near / (right - left);
        let y_scale = 2.0 * near / (top - bottom);
        let x_offset = (right + left) / (right - left);
        let y_offset = (top + bottom) / (top - bottom);
        let z_scale = far / (near - far);
        let z_offset = near * far / (near - far);

        let proj = Mat4::from_cols(
            Vec4::new(x_scale, 0.0, 0.0, 0.0),
            Vec4::new(0.0, y_scale, 0.0, 0.0),
            Vec4::new(x_offset, y_offset, z_scale, -1.0),
            Vec4::new(0.0, 0.0, z_offset, 0.0),
        );

        if self.portrait {
            Mat4::from_rotation_z(-std::f32::consts::FRAC_PI_2) * proj
        } else {
            proj
        }
    }
}

/// Everything one eye owns: camera geometry, warp parameters, mesh.
/// Left and right never alias.
#[derive(Clone, Debug)]
struct EyeState {
    camera: EyeCameraConfig,
    params: DistortionParameters,
    mesh: DistortionMesh,
}

/// The rig itself.
pub struct StereoRig {
    state: RigState,
    calibration: DeviceCalibration,
    mesh_config: MeshConfig,

    // Rig geometry; the defaults match a standing player at 1m root height.
    root_position: Vec3,
    neck_position: Vec3,
    eye_center: Vec3,
    near_clip: f32,
    far_clip: f32,
    portrait: bool,

    /// Fixed world-orientation applied on top of the tracker quaternion.
    orientation_offset: Quat,

    dirty: bool,
    pose: HeadPose,
    eyes: [EyeState; 2],
}

impl StereoRig {
    pub fn new(mesh_config: MeshConfig) -> Self {
        let params = DistortionParameters::default();
        let eye = EyeState {
            camera: EyeCameraConfig {
                vertical_fov: 90.0,
                aspect_ratio: 1.0,
                near_clip: 0.15,
                far_clip: 1000.0,
                eye_offset: Vec3::ZERO,
                neck_position: Vec3::ZERO,
                root_position: Vec3::ZERO,
                lens_offset: 0.0,
                portrait: false,
            },
            params,
            mesh: mesh::generate(&params, &mesh_config),
        };

        Self {
            state: RigState::Uninitialized,
            calibration: DeviceCalibration::default(),
            mesh_config,
            root_position: Vec3::new(0.0, 1.0, 0.0),
            neck_position: Vec3::new(0.0, 0.7, 0.0),
            eye_center: Vec3::new(0.0, 0.15, 0.09),
            near_clip: 0.15,
            far_clip: 1000.0,
            portrait: false,
            orientation_offset: Quat::IDENTITY,
            dirty: false,
            pose: HeadPose::default(),
            eyes: [eye.clone(), eye],
        }
    }

    pub fn state(&self) -> RigState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Uninitialized -> Initialized.
    pub fn initialize(&mut self) {
        if self.state != RigState::Uninitialized {
            warn!("rig already initialized, ignoring");
            return;
        }
        self.state = RigState::Initialized;
        info!("rig initialized");
    }

    /// Initialized -> Active. Pulls calibration from the source exactly
    /// once, validates it, and schedules the first recompute.
    pub fn activate(&mut self, source: &dyn CalibrationSource) -> Result<(), CalibrationError> {
        if self.state == RigState::Uninitialized {
            debug!("activate called before initialize, initializing now");
            self.initialize();
        }

        let calibration = source.device_calibration();
        calibration.validate()?;
        self.calibration = calibration;
        self.state = RigState::Active;
        self.dirty = true;
        info!(
            "rig active: ipd={:.4}m fov={:.1}deg aspect={:.3}",
            self.calibration.ipd, self.calibration.vertical_fov, self.calibration.aspect_ratio
        );
        Ok(())
    }

    /// Per-frame entry point. Stores the pose and, only when configuration
    /// changed since the last frame, recomputes eye state.
    pub fn on_frame(&mut self, pose: HeadPose) -> Result<(), CalibrationError> {
        if self.state != RigState::Active {
            debug!("on_frame ignored in state {:?}", self.state);
            return Ok(());
        }
        self.pose = pose;
        if self.dirty {
            self.on_parameters_changed()?;
        }
        Ok(())
    }

    /// Recomputes both eyes' camera config, warp parameters and meshes.
    /// Synchronous; each mesh is fully rebuilt before it can be sampled.
    pub fn on_parameters_changed(&mut self) -> Result<(), CalibrationError> {
        for eye in Eye::BOTH {
            let mirror = match eye {
                Eye::Left => -1.0,
                Eye::Right => 1.0,
            };
            let mut eye_offset = self.eye_center;
            eye_offset.x = mirror * self.calibration.ipd * 0.5;

            let camera = EyeCameraConfig {
                vertical_fov: self.calibration.vertical_fov,
                aspect_ratio: self.calibration.aspect_ratio,
                near_clip: self.near_clip,
                far_clip: self.far_clip,
                eye_offset,
                neck_position: self.neck_position,
                root_position: self.root_position,
                lens_offset: self.calibration.lens_offsets[eye.index()],
                portrait: self.portrait,
            };

            let params = lens::compute_parameters(eye, &self.calibration)?;
            let slot = &mut self.eyes[eye.index()];
            slot.camera = camera;
            slot.params = params;
            slot.mesh = mesh::generate(&params, &self.mesh_config);
        }
        self.dirty = false;
        debug!(
            "eye state recomputed: {} verts, {} tris per eye",
            self.eyes[0].mesh.vertex_count(),
            self.eyes[0].mesh.triangle_count()
        );
        Ok(())
    }

    // -- configuration setters; each flags the rig dirty instead of
    //    recomputing immediately --

    pub fn set_ipd(&mut self, ipd: f32) {
        self.calibration.ipd = ipd;
        self.dirty = true;
    }

    pub fn set_vertical_fov(&mut self, fov: f32) {
        self.calibration.vertical_fov = fov;
        self.dirty = true;
    }

    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        self.calibration.aspect_ratio = aspect;
        self.dirty = true;
    }

    pub fn set_distortion_coeffs(&mut self, coeffs: [f32; 4]) {
        self.calibration.distortion_coeffs = coeffs;
        self.dirty = true;
    }

    pub fn set_lens_offsets(&mut self, offsets: [f32; 2]) {
        self.calibration.lens_offsets = offsets;
        self.dirty = true;
    }

    pub fn set_portrait(&mut self, portrait: bool) {
        self.portrait = portrait;
        self.dirty = true;
    }

    pub fn set_neck_position(&mut self, neck: Vec3) {
        self.neck_position = neck;
        self.dirty = true;
    }

    pub fn set_eye_center_position(&mut self, eye_center: Vec3) {
        self.eye_center = eye_center;
        self.dirty = true;
    }

    pub fn set_root_position(&mut self, root: Vec3) {
        self.root_position = root;
        self.dirty = true;
    }

    pub fn set_clip_planes(&mut self, near: f32, far: f32) {
        self.near_clip = near;
        self.far_clip = far;
        self.dirty = true;
    }

    /// Orientation offset applies per frame, no regeneration needed.
    pub fn set_orientation_offset(&mut self, offset: Quat) {
        self.orientation_offset = offset;
    }

    /// Overrides one eye's warp parameters directly, bypassing the mapper
    /// (external calibration tooling). Regenerates only that eye's mesh.
    pub fn set_eye_parameters(&mut self, eye: Eye, params: DistortionParameters) {
        let slot = &mut self.eyes[eye.index()];
        slot.params = params;
        slot.mesh = mesh::generate(&params, &self.mesh_config);
    }

    // -- accessors --

    pub fn calibration(&self) -> &DeviceCalibration {
        &self.calibration
    }

    pub fn eye_camera(&self, eye: Eye) -> &EyeCameraConfig {
        &self.eyes[eye.index()].camera
    }

    pub fn eye_parameters(&self, eye: Eye) -> &DistortionParameters {
        &self.eyes[eye.index()].params
    }

    pub fn eye_mesh(&self, eye: Eye) -> &DistortionMesh {
        &self.eyes[eye.index()].mesh
    }

    /// Latest tracker orientation with the rig offset applied.
    pub fn head_orientation(&self) -> Quat {
        self.orientation_offset * self.pose.orientation
    }

    pub fn eye_view_matrix(&self, eye: Eye) -> Mat4 {
        self.eyes[eye.index()].camera.view_matrix(self.head_orientation())
    }

    pub fn eye_view_proj(&self, eye: Eye) -> Mat4 {
        let cam = &self.eyes[eye.index()].camera;
        cam.projection_matrix() * cam.view_matrix(self.head_orientation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedCalibration(DeviceCalibration);

    impl CalibrationSource for FixedCalibration {
        fn device_calibration(&self) -> DeviceCalibration {
            self.0
        }
    }

    fn active_rig() -> StereoRig {
        let mut rig = StereoRig::new(MeshConfig::default());
        rig.initialize();
        rig.activate(&FixedCalibration(DeviceCalibration::default()))
            .unwrap();
        rig
    }

    #[test]
    fn lifecycle_transitions() {
        let mut rig = StereoRig::new(MeshConfig::default());
        assert_eq!(rig.state(), RigState::Uninitialized);
        rig.initialize();
        assert_eq!(rig.state(), RigState::Initialized);
        rig.activate(&FixedCalibration(DeviceCalibration::default()))
            .unwrap();
        assert_eq!(rig.state(), RigState::Active);
    }

    #[test]
    fn invalid_calibration_blocks_activation() {
        let mut rig = StereoRig::new(MeshConfig::default());
        rig.initialize();
        let bad = DeviceCalibration {
            aspect_ratio: f32::NAN,
            ..DeviceCalibration::default()
        };
        assert!(rig.activate(&FixedCalibration(bad)).is_err());
        assert_eq!(rig.state(), RigState::Initialized);
    }

    #[test]
    fn frames_before_activation_are_ignored() {
        let mut rig = StereoRig::new(MeshConfig::default());
        rig.on_frame(HeadPose::default()).unwrap();
        assert_eq!(rig.state(), RigState::Uninitialized);
    }

    #[test]
    fn dirty_flag_gates_recomputation() {
        let mut rig = active_rig();
        assert!(rig.is_dirty());

        rig.on_frame(HeadPose::default()).unwrap();
        assert!(!rig.is_dirty());

        // A plain frame with no config change must not re-flag.
        rig.on_frame(HeadPose::default()).unwrap();
        assert!(!rig.is_dirty());

        rig.set_ipd(0.070);
        assert!(rig.is_dirty());
        rig.on_frame(HeadPose::default()).unwrap();
        assert!(!rig.is_dirty());
    }

    #[test]
    fn eye_offsets_mirror_ipd() {
        let mut rig = active_rig();
        rig.on_frame(HeadPose::default()).unwrap();

        let left = rig.eye_camera(Eye::Left).eye_offset;
        let right = rig.eye_camera(Eye::Right).eye_offset;
        assert!((left.x + 0.032).abs() < 1e-6);
        assert!((right.x - 0.032).abs() < 1e-6);
        assert_eq!(left.y, right.y);
        assert_eq!(left.z, right.z);
    }

    #[test]
    fn per_eye_state_is_independent() {
        let mut rig = active_rig();
        rig.on_frame(HeadPose::default()).unwrap();

        let right_params = *rig.eye_parameters(Eye::Right);
        let right_mesh_bytes = rig.eye_mesh(Eye::Right).vertex_bytes().to_vec();

        let mutated = DistortionParameters {
            warp_coeffs: [1.0, 0.9, 0.0, 0.0],
            ..*rig.eye_parameters(Eye::Left)
        };
        rig.set_eye_parameters(Eye::Left, mutated);

        assert_eq!(*rig.eye_parameters(Eye::Right), right_params);
        assert_eq!(rig.eye_mesh(Eye::Right).vertex_bytes(), &right_mesh_bytes[..]);
        assert_eq!(*rig.eye_parameters(Eye::Left), mutated);
    }

    #[test]
    fn symmetric_projection_without_lens_offset() {
        let rig = active_rig();
        let proj = rig.eye_camera(Eye::Left).projection_matrix();
        // No lens offset: off-center terms vanish.
        assert!(proj.z_axis.x.abs() < 1e-6);
        assert!(proj.z_axis.y.abs() < 1e-6);
        assert_eq!(proj.z_axis.w, -1.0);
    }

    #[test]
    fn lens_offset_skews_projection() {
        let mut rig = active_rig();
        rig.set_lens_offsets([0.15, -0.15]);
        rig.on_frame(HeadPose::default()).unwrap();

        let left = rig.eye_camera(Eye::Left).projection_matrix();
        let right = rig.eye_camera(Eye::Right).projection_matrix();
        assert!(left.z_axis.x > 0.0);
        assert!(right.z_axis.x < 0.0);
        assert!((left.z_axis.x + right.z_axis.x).abs() < 1e-6);
    }

    #[test]
    fn portrait_mode_rolls_projection() {
        let mut rig = active_rig();
        rig.set_portrait(true);
        rig.on_frame(HeadPose::default()).unwrap();

        let proj = rig.eye_camera(Eye::Left).projection_matrix();
        // X scale moved into the Y row by the -90 degree roll.
        assert!(proj.x_axis.x.abs() < 1e-6);
        assert!(proj.x_axis.y.abs() > 0.0);
    }

    #[test]
    fn head_pose_feeds_eye_position() {
        let mut rig = active_rig();
        rig.on_frame(HeadPose::default()).unwrap();
        let forward = rig.eye_camera(Eye::Left).eye_position(rig.head_orientation());

        // Yaw 180 degrees: the eye x/z offsets swing around the neck pivot.
        let yawed = HeadPose {
            orientation: Quat::from_rotation_y(std::f32::consts::PI),
            timestamp: 0.016,
        };
        rig.on_frame(yawed).unwrap();
        let turned = rig.eye_camera(Eye::Left).eye_position(rig.head_orientation());

        assert!((forward.x + turned.x).abs() < 1e-5);
        assert!((forward.z + turned.z).abs() < 1e-5);
        assert!((forward.y - turned.y).abs() < 1e-6);
    }
}
