//! Lens/camera parameter mapping.
//!
//! Converts physical device calibration into the warp parameters consumed
//! by the mesh generator and the pixel shader path. Runs only when the rig
//! flags its state dirty, never per frame.

use glam::Vec2;

use crate::calibration::{CalibrationError, DeviceCalibration};
use crate::warp::DistortionParameters;

/// Eye selector; indexes the per-eye arrays in calibration and rig state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/// Maps device calibration to distortion parameters for one eye.
///
/// The camera renders each eye into a normalized [0,1]² buffer, so the
/// input scale maps that to lens space ([-1,1], aspect-corrected) and the
/// output scale is normalized by the warp factor at the maximum radius the
/// screen must cover. The distortion center shifts horizontally by half the
/// physical lens offset.
pub fn compute_parameters(
    eye: Eye,
    calib: &DeviceCalibration,
) -> Result<DistortionParameters, CalibrationError> {
    calib.validate()?;

    let aspect = calib.aspect_ratio;
    let lens_offset = calib.lens_offsets[eye.index()];

    let mut params = DistortionParameters {
        center: Vec2::new(0.5 + lens_offset * 0.5, 0.5),
        scale_in: Vec2::new(2.0, 2.0 / aspect),
        scale: Vec2::ONE,
        warp_coeffs: calib.distortion_coeffs,
    };

    let r_sq = calib.max_warp_radius * calib.max_warp_radius;
    let distortion_scale = params.warp_factor(r_sq);
    if distortion_scale <= 0.0 || !distortion_scale.is_finite() {
        return Err(CalibrationError::NonPositive {
            field: "distortion_scale",
            value: distortion_scale,
        });
    }
    params.scale = Vec2::new(0.5 / distortion_scale, 0.5 * aspect / distortion_scale);

    Ok(params)
}
