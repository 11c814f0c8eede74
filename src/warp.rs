//! Radial distortion warp math.
//!
//! The same 3rd-order even polynomial is evaluated on the CPU (per vertex,
//! by the mesh generator) and on the GPU (per pixel, by the fallback
//! shader), so both distortion paths produce matching output for the same
//! parameters.

use glam::Vec2;

/// Warp parameters consumed by the mesh generator and the pixel shader path.
///
/// `scale_in` maps texture coordinates around `center` to roughly [-1, 1];
/// `scale` maps the warped vector back into texture space, compensating for
/// the growth of the polynomial so the full screen stays covered.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistortionParameters {
    /// Distortion center in [0,1] texture space.
    pub center: Vec2,
    /// Input scale, maps [0,1] coordinates to lens space.
    pub scale_in: Vec2,
    /// Output scale, maps warped lens space back to texture space.
    pub scale: Vec2,
    /// Polynomial coefficients k0..k3 over r².
    pub warp_coeffs: [f32; 4],
}

impl Default for DistortionParameters {
    fn default() -> Self {
        Self {
            center: Vec2::new(0.5, 0.5),
            scale_in: Vec2::new(2.0, 2.0),
            scale: Vec2::new(0.5, 0.5),
            warp_coeffs: [1.0, 0.22, 0.24, 0.0],
        }
    }
}

impl DistortionParameters {
    /// Evaluates the radial polynomial at a squared radius.
    pub fn warp_factor(&self, r_sq: f32) -> f32 {
        let [k0, k1, k2, k3] = self.warp_coeffs;
        k0 + k1 * r_sq + k2 * r_sq * r_sq + k3 * r_sq * r_sq * r_sq
    }

    /// Maps a point in [0,1]² texture space through the distortion model.
    ///
    /// Pure and total over finite inputs; the caller clamps the result if it
    /// needs to stay inside the texture.
    pub fn warp(&self, p: Vec2) -> Vec2 {
        let v = (p - self.center) * self.scale_in;
        let r_sq = v.x * v.x + v.y * v.y;
        self.center + self.scale * (v * self.warp_factor(r_sq))
    }

    /// True when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.center.is_finite()
            && self.scale_in.is_finite()
            && self.scale.is_finite()
            && self.warp_coeffs.iter().all(|k| k.is_finite())
    }
}
