//! Rigid-body poses in the north-east-down frame.
//!
//! Positions are in centimetres, angles in radians unless a name says
//! otherwise. Rotations follow the extrinsic X-Y-Z (roll, pitch, yaw)
//! convention, so a positive yaw turns the robot from north towards east.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use serde::Serialize;

/// Below this rotation angle the exponential map uses its series expansion
const SMALL_ANGLE: f64 = 1e-9;

/// Position and orientation of a rigid body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// (north, east, down) in centimetres
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

/// Body-frame velocity integrated over one time step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Twist {
    pub linear: Vector3<f64>,
    pub angular: Vector3<f64>,
}

impl Twist {
    pub fn new(vx: f64, vy: f64, vz: f64, wx: f64, wy: f64, wz: f64) -> Self {
        Self {
            linear: Vector3::new(vx, vy, vz),
            angular: Vector3::new(wx, wy, wz),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Build a pose from a position and roll/pitch/yaw in radians
    pub fn new(north: f64, east: f64, down: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            translation: Vector3::new(north, east, down),
            rotation: UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        }
    }

    #[inline]
    pub fn north(&self) -> f64 {
        self.translation.x
    }

    #[inline]
    pub fn east(&self) -> f64 {
        self.translation.y
    }

    #[inline]
    pub fn down(&self) -> f64 {
        self.translation.z
    }

    /// (roll, pitch, yaw) in radians
    pub fn euler(&self) -> (f64, f64, f64) {
        self.rotation.euler_angles()
    }

    /// (roll, pitch, yaw) in degrees folded into (-180, 180]
    pub fn euler_degrees(&self) -> (f64, f64, f64) {
        let (roll, pitch, yaw) = self.euler();
        (fold_degrees(roll), fold_degrees(pitch), fold_degrees(yaw))
    }

    /// Express `local`, given in this pose's frame, in the parent frame
    pub fn compose(&self, local: &Pose) -> Pose {
        Pose {
            translation: self.translation + self.rotation * local.translation,
            rotation: self.rotation * local.rotation,
        }
    }

    /// Express this pose in the frame of `reference`
    pub fn relative_to(&self, reference: &Pose) -> Pose {
        let inverse = reference.rotation.inverse();
        Pose {
            translation: inverse * (self.translation - reference.translation),
            rotation: inverse * self.rotation,
        }
    }

    /// Straight-line distance between two poses
    pub fn distance(&self, other: &Pose) -> f64 {
        (self.translation - other.translation).norm()
    }

    /// Unit vector of the body X axis in the parent frame
    pub fn heading(&self) -> Vector3<f64> {
        self.rotation * Vector3::x()
    }

    /// Move along a body-frame twist using the SE(3) exponential map
    pub fn exp(&self, twist: &Twist) -> Pose {
        let omega = twist.angular;
        let theta = omega.norm();
        let w = omega.cross_matrix();
        let w2 = w * w;

        let (b, c) = if theta < SMALL_ANGLE {
            (0.5, 1.0 / 6.0)
        } else {
            let t2 = theta * theta;
            ((1.0 - theta.cos()) / t2, (theta - theta.sin()) / (t2 * theta))
        };
        let v = Matrix3::identity() + w * b + w2 * c;

        let step = Pose {
            translation: v * twist.linear,
            rotation: UnitQuaternion::from_scaled_axis(omega),
        };
        self.compose(&step)
    }
}

impl Serialize for Pose {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let (roll, pitch, yaw) = self.euler_degrees();
        let mut s = serializer.serialize_struct("Pose", 6)?;
        s.serialize_field("north", &self.north())?;
        s.serialize_field("east", &self.east())?;
        s.serialize_field("down", &self.down())?;
        s.serialize_field("roll", &roll)?;
        s.serialize_field("pitch", &pitch)?;
        s.serialize_field("yaw", &yaw)?;
        s.end()
    }
}

/// Convert radians to degrees folded into (-180, 180]
pub fn fold_degrees(radians: f64) -> f64 {
    let mut degrees = radians.to_degrees();
    while degrees > 180.0 {
        degrees -= 360.0;
    }
    while degrees <= -180.0 {
        degrees += 360.0;
    }
    degrees
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_fold_degrees() {
        assert_relative_eq!(fold_degrees(PI), 180.0);
        assert_relative_eq!(fold_degrees(-PI), 180.0);
        assert_relative_eq!(fold_degrees(3.0 * PI / 2.0), -90.0, epsilon = 1e-9);
        assert_relative_eq!(fold_degrees(4.5 * PI), 90.0, epsilon = 1e-9);
        assert_relative_eq!(fold_degrees(0.0), 0.0);
    }

    #[test]
    fn test_compose_then_relative_is_identity() {
        let center = Pose::new(10.0, -4.0, -2.5, 0.0, 0.0, 0.7);
        let part = Pose::new(2.0, 3.0, -1.0, 0.3, -0.2, 0.1);

        let absolute = center.compose(&part);
        let back = absolute.relative_to(&center);

        assert_relative_eq!(back.translation.x, part.translation.x, epsilon = 1e-12);
        assert_relative_eq!(back.translation.y, part.translation.y, epsilon = 1e-12);
        assert_relative_eq!(back.translation.z, part.translation.z, epsilon = 1e-12);
        assert_relative_eq!(back.rotation.angle_to(&part.rotation), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_exp_straight_line() {
        let pose = Pose::new(0.0, 0.0, -2.5, 0.0, 0.0, FRAC_PI_2);
        let moved = pose.exp(&Twist::new(10.0, 0.0, 0.0, 0.0, 0.0, 0.0));

        // Facing east, forward motion increases east only
        assert_relative_eq!(moved.north(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(moved.east(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(moved.down(), -2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_exp_quarter_arc() {
        // Driving a quarter circle of radius r turning right
        let r = 20.0;
        let angle = FRAC_PI_2;
        let twist = Twist::new(r * angle, 0.0, 0.0, 0.0, 0.0, angle);
        let moved = Pose::identity().exp(&twist);

        assert_relative_eq!(moved.north(), r, epsilon = 1e-9);
        assert_relative_eq!(moved.east(), r, epsilon = 1e-9);
        let (_, _, yaw) = moved.euler_degrees();
        assert_relative_eq!(yaw, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_heading_follows_yaw() {
        let pose = Pose::new(0.0, 0.0, 0.0, 0.0, -FRAC_PI_2, 0.0);
        let heading = pose.heading();
        // Pitched down by a quarter turn, the X axis points to the ground
        assert_relative_eq!(heading.z, 1.0, epsilon = 1e-12);
    }
}
