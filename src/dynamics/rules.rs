//! Motion rules shared by motor and pair commands.
//!
//! These are pure functions over command percentages and angles so the
//! direction conventions can be checked without running the engine.

use crate::core::Direction;
use std::f64::consts::PI;

/// Completion tolerance for angle (rad), distance (cm) and time (s) targets
pub const EPSILON: f64 = 1e-5;

/// Left and right motor commands for a steering value
///
/// Proportional in between, with pure spin turns at exactly ±100.
pub fn steering_speeds(steering: f64, speed: f64) -> (f64, f64) {
    if steering == 100.0 {
        return (speed, -speed);
    }
    if steering == -100.0 {
        return (-speed, speed);
    }
    let left = if steering < 0.0 {
        (speed * (100.0 + steering) / 100.0).trunc()
    } else {
        speed.trunc()
    };
    let right = if steering > 0.0 {
        (speed * (100.0 - steering) / 100.0).trunc()
    } else {
        speed.trunc()
    };
    (left, right)
}

/// Signed command and signed angle (rad) for a relative rotation
///
/// The direction is the sign of `speed * degrees`, so two negative operands
/// still rotate forward. A zero product counts as positive.
pub fn signed_rotation(speed: f64, degrees: f64) -> (f64, f64) {
    let sign = if speed * degrees < 0.0 { -1.0 } else { 1.0 };
    (speed.abs() * sign, degrees.abs() * PI / 180.0 * sign)
}

/// Command and relative angle (degrees) reaching an absolute position
///
/// Both candidate deltas are normalised to [0, 360). Under
/// [`Direction::ShortestPath`] a tie goes counterclockwise.
pub fn position_delta(current: f64, target: f64, speed: f64, direction: Direction) -> (f64, f64) {
    let clockwise = (target - current).rem_euclid(360.0);
    let counterclockwise = (current - target).rem_euclid(360.0);
    match direction {
        Direction::Clockwise => (speed.abs(), clockwise),
        Direction::Counterclockwise => (-speed.abs(), counterclockwise),
        Direction::ShortestPath => {
            if clockwise < counterclockwise {
                (speed.abs(), clockwise)
            } else {
                (-speed.abs(), counterclockwise)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_steering_straight_and_proportional() {
        assert_eq!(steering_speeds(0.0, 50.0), (50.0, 50.0));
        assert_eq!(steering_speeds(-50.0, 50.0), (25.0, 50.0));
        assert_eq!(steering_speeds(50.0, 50.0), (50.0, 25.0));
        // Truncation towards zero
        assert_eq!(steering_speeds(30.0, 33.0), (33.0, 23.0));
        assert_eq!(steering_speeds(30.0, -33.0), (-33.0, -23.0));
    }

    #[test]
    fn test_steering_discontinuity_at_bounds() {
        assert_eq!(steering_speeds(99.0, 50.0), (50.0, 0.0));
        assert_eq!(steering_speeds(100.0, 50.0), (50.0, -50.0));
        assert_eq!(steering_speeds(-99.0, 50.0), (0.0, 50.0));
        assert_eq!(steering_speeds(-100.0, 50.0), (-50.0, 50.0));
        assert_eq!(steering_speeds(100.0, -40.0), (-40.0, 40.0));
    }

    #[test]
    fn test_signed_rotation_combines_signs() {
        let (speed, angle) = signed_rotation(30.0, 90.0);
        assert_eq!(speed, 30.0);
        assert_relative_eq!(angle, PI / 2.0);

        let (speed, angle) = signed_rotation(-30.0, 90.0);
        assert_eq!(speed, -30.0);
        assert_relative_eq!(angle, -PI / 2.0);

        let (speed, angle) = signed_rotation(30.0, -90.0);
        assert_eq!(speed, -30.0);
        assert_relative_eq!(angle, -PI / 2.0);

        let (speed, angle) = signed_rotation(-30.0, -90.0);
        assert_eq!(speed, 30.0);
        assert_relative_eq!(angle, PI / 2.0);
    }

    #[test]
    fn test_position_delta_directions() {
        assert_eq!(position_delta(10.0, 100.0, 40.0, Direction::Clockwise), (40.0, 90.0));
        assert_eq!(
            position_delta(10.0, 100.0, 40.0, Direction::Counterclockwise),
            (-40.0, 270.0)
        );
        assert_eq!(
            position_delta(10.0, 100.0, -40.0, Direction::ShortestPath),
            (40.0, 90.0)
        );
        assert_eq!(
            position_delta(100.0, 10.0, 40.0, Direction::ShortestPath),
            (-40.0, 90.0)
        );
    }

    #[test]
    fn test_shortest_path_never_exceeds_half_turn() {
        for current in (-720..720).step_by(37) {
            for target in (0..360).step_by(13) {
                let (_, delta) =
                    position_delta(current as f64, target as f64, 50.0, Direction::ShortestPath);
                assert!(delta <= 180.0, "{} -> {} gave {}", current, target, delta);
            }
        }
    }

    #[test]
    fn test_shortest_path_tie_goes_counterclockwise() {
        assert_eq!(
            position_delta(0.0, 180.0, 50.0, Direction::ShortestPath),
            (-50.0, 180.0)
        );
        assert_eq!(
            position_delta(90.0, 270.0, 50.0, Direction::ShortestPath),
            (-50.0, 180.0)
        );
    }
}
