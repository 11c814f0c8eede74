//! Head tracker inputs.
//!
//! Real pose data comes from an IMU fusion loop outside this crate; what
//! lives here is the simulated fallback used when no sensor is available,
//! plus a recentering wrapper. Both speak [`HeadTracker`].

use glam::{EulerRot, Quat};
use log::info;

use crate::rig::{HeadPose, HeadTracker};

/// Fallback tracker: gentle breathing and sway motion so the view does not
/// feel frozen when no sensor is present.
pub struct SimulatedTracker {
    time: f64,
}

impl SimulatedTracker {
    pub fn new() -> Self {
        Self { time: 0.0 }
    }

    /// Advances the simulation clock by one frame delta, in seconds.
    pub fn advance(&mut self, dt: f32) {
        self.time += dt as f64;
    }
}

impl Default for SimulatedTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadTracker for SimulatedTracker {
    fn head_pose(&mut self) -> HeadPose {
        let t = self.time as f32;
        let breathing = (t * 0.5).sin() * 0.01;
        let sway = (t * 0.3).sin() * 0.005;
        HeadPose {
            orientation: Quat::from_euler(EulerRot::YXZ, 0.0, breathing, sway),
            timestamp: self.time,
        }
    }
}

/// Wraps any tracker and subtracts a captured reference yaw, so the user
/// can re-zero "forward" without touching the underlying sensor.
pub struct RecenteringTracker<T: HeadTracker> {
    inner: T,
    reference: Quat,
}

impl<T: HeadTracker> RecenteringTracker<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            reference: Quat::IDENTITY,
        }
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Captures the current orientation as the new forward direction.
    pub fn recenter(&mut self) {
        self.reference = self.inner.head_pose().orientation.inverse();
        info!("tracker recentered");
    }
}

impl<T: HeadTracker> HeadTracker for RecenteringTracker<T> {
    fn head_pose(&mut self) -> HeadPose {
        let pose = self.inner.head_pose();
        HeadPose {
            orientation: self.reference * pose.orientation,
            timestamp: pose.timestamp,
        }
    }
}
