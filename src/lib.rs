//! vr_warp - lens distortion core for a stereoscopic HMD
//!
//! Pre-distorts the rendered image so it looks correct through the HMD
//! lenses. The crate covers the warp math, the per-eye pre-distorted mesh
//! generator (Morton-ordered for cache locality), the mapping from device
//! calibration to warp parameters, the stereo camera rig that orchestrates
//! regeneration, and a wgpu renderer that draws either the mesh path or a
//! per-pixel shader fallback.
//!
//! The rig is engine-agnostic: a host loop calls `initialize` /
//! `activate` / `on_frame` and supplies head poses and calibration through
//! the [`rig::HeadTracker`] and [`rig::CalibrationSource`] traits.

pub mod calibration;
pub mod lens;
pub mod mesh;
pub mod renderer;
pub mod rig;
pub mod tracker;
pub mod warp;

pub use calibration::{CalibrationError, DeviceCalibration};
pub use lens::Eye;
pub use mesh::{DistortionMesh, DistortionVertex, MeshConfig};
pub use renderer::{DistortionRenderer, EyePass, RenderContext};
pub use rig::{CalibrationSource, EyeCameraConfig, HeadPose, HeadTracker, RigState, StereoRig};
pub use tracker::{RecenteringTracker, SimulatedTracker};
pub use warp::DistortionParameters;
