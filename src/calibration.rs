//! Device calibration values and their validation.
//!
//! Calibration is externally supplied by a tracking/HMD driver; this module
//! only defines the shape of the data and the gate that keeps bad numbers
//! out of the distortion pipeline.

use thiserror::Error;

/// Physical device parameters pulled once from a [`CalibrationSource`] when
/// the rig activates.
///
/// [`CalibrationSource`]: crate::rig::CalibrationSource
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceCalibration {
    /// Interpupillary distance in meters.
    pub ipd: f32,
    /// Vertical field of view in degrees.
    pub vertical_fov: f32,
    /// Per-eye render aspect ratio (width / height).
    pub aspect_ratio: f32,
    /// Per-eye horizontal lens offset in normalized screen space,
    /// left then right.
    pub lens_offsets: [f32; 2],
    /// Radial distortion polynomial coefficients k0..k3.
    pub distortion_coeffs: [f32; 4],
    /// Radius (in lens space) out to which the warp must cover the screen;
    /// normalizes the output scale of the distortion.
    pub max_warp_radius: f32,
}

impl Default for DeviceCalibration {
    fn default() -> Self {
        Self {
            ipd: 0.064,
            vertical_fov: 90.0,
            aspect_ratio: 1.0,
            lens_offsets: [0.0, 0.0],
            distortion_coeffs: [1.0, 0.22, 0.24, 0.0],
            max_warp_radius: 1.0,
        }
    }
}

/// Rejection reasons for calibration input.
///
/// The driver interface performs no validation of its own, so a NaN or
/// infinity here would otherwise propagate silently into every generated
/// vertex. Policy: reject before the parameter mapper runs, never clamp.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("non-finite calibration value in {field}")]
    NonFinite { field: &'static str },

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f32 },
}

impl DeviceCalibration {
    /// Checks every field for finiteness and the positivity invariants.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let finite = [
            ("ipd", self.ipd),
            ("vertical_fov", self.vertical_fov),
            ("aspect_ratio", self.aspect_ratio),
            ("lens_offsets", self.lens_offsets[0]),
            ("lens_offsets", self.lens_offsets[1]),
            ("max_warp_radius", self.max_warp_radius),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                return Err(CalibrationError::NonFinite { field });
            }
        }
        if self.distortion_coeffs.iter().any(|k| !k.is_finite()) {
            return Err(CalibrationError::NonFinite {
                field: "distortion_coeffs",
            });
        }

        let positive = [
            ("ipd", self.ipd),
            ("vertical_fov", self.vertical_fov),
            ("aspect_ratio", self.aspect_ratio),
            ("max_warp_radius", self.max_warp_radius),
        ];
        for (field, value) in positive {
            if value <= 0.0 {
                return Err(CalibrationError::NonPositive { field, value });
            }
        }
        Ok(())
    }
}

/// Derives the per-eye lens offsets from physical screen geometry.
///
/// The lens centers sit `lens_separation` apart on a screen of width
/// `h_screen_size` (both in meters); each half-screen's view center is
/// offset from its lens center by the same physical distance, expressed
/// here in normalized half-screen units. Left eye shifts positive, right
/// eye negative.
pub fn lens_offsets_from_screen(h_screen_size: f32, lens_separation: f32) -> [f32; 2] {
    let physical_shift = h_screen_size * 0.25 - lens_separation * 0.5;
    let shift = 4.0 * physical_shift / h_screen_size;
    [shift, -shift]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_calibration_is_valid() {
        assert_eq!(DeviceCalibration::default().validate(), Ok(()));
    }

    #[test]
    fn nan_coefficient_is_rejected() {
        let calib = DeviceCalibration {
            distortion_coeffs: [1.0, f32::NAN, 0.0, 0.0],
            ..DeviceCalibration::default()
        };
        assert_eq!(
            calib.validate(),
            Err(CalibrationError::NonFinite {
                field: "distortion_coeffs"
            })
        );
    }

    #[test]
    fn infinite_fov_is_rejected() {
        let calib = DeviceCalibration {
            vertical_fov: f32::INFINITY,
            ..DeviceCalibration::default()
        };
        assert!(matches!(
            calib.validate(),
            Err(CalibrationError::NonFinite {
                field: "vertical_fov"
            })
        ));
    }

    #[test]
    fn zero_aspect_ratio_is_rejected() {
        let calib = DeviceCalibration {
            aspect_ratio: 0.0,
            ..DeviceCalibration::default()
        };
        assert!(matches!(
            calib.validate(),
            Err(CalibrationError::NonPositive {
                field: "aspect_ratio",
                ..
            })
        ));
    }

    #[test]
    fn centered_lenses_have_no_offset() {
        // Lens separation of exactly half the screen puts each lens at the
        // center of its half.
        let offsets = lens_offsets_from_screen(0.15, 0.075);
        assert_eq!(offsets, [0.0, 0.0]);
    }

    #[test]
    fn narrow_lens_separation_shifts_eyes_inward() {
        // DK1-like geometry: 0.14976m screen, 0.0635m lens separation.
        let [left, right] = lens_offsets_from_screen(0.14976, 0.0635);
        assert!(left > 0.0);
        assert!((left + right).abs() < 1e-6);
    }
}
