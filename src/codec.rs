//! Sensor/actuator codec.
//!
//! Sensing maps a walker pose onto the controller's four inputs; actuation
//! maps the six controller outputs onto directional motor commands.

use crate::controller::{OUTPUT_COUNT, SENSOR_COUNT};
use crate::error::{Result, SimError};
use crate::limiter::{JointKind, LimiterFlags, relative_angle_deg};

/// Segment angles (radians, world frame) needed for sensing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PoseAngles {
    pub torso: f32,
    pub thigh: f32,
    pub shin: f32,
    pub foot: f32,
}

/// `(torso angle in radians, thigh/360, shin/360, foot/360)`, all joint
/// angles measured against the torso.
pub fn encode_sensors(angles: &PoseAngles) -> [f32; SENSOR_COUNT] {
    [
        angles.torso,
        relative_angle_deg(angles.thigh, angles.torso) / 360.0,
        relative_angle_deg(angles.shin, angles.torso) / 360.0,
        relative_angle_deg(angles.foot, angles.torso) / 360.0,
    ]
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotorCommand {
    pub joint: JointKind,
    pub rate: f32,
}

/// Output index → (joint, direction).
const COMMAND_TABLE: [(JointKind, f32); OUTPUT_COUNT] = [
    (JointKind::Thigh, 1.0),
    (JointKind::Thigh, -1.0),
    (JointKind::Shin, 1.0),
    (JointKind::Shin, -1.0),
    (JointKind::Foot, 1.0),
    (JointKind::Foot, -1.0),
];

/// Decodes a controller output into motor commands, in output index order.
///
/// The output must have exactly six finite values; anything else is a
/// controller fault.
pub fn decode_outputs(output: &[f32], threshold: f32, speed: f32) -> Result<Vec<MotorCommand>> {
    if output.len() != OUTPUT_COUNT {
        return Err(SimError::MalformedOutput(format!(
            "expected {OUTPUT_COUNT} outputs, got {}",
            output.len()
        )));
    }
    if let Some(index) = output.iter().position(|value| !value.is_finite()) {
        return Err(SimError::MalformedOutput(format!(
            "output {index} is not finite ({})",
            output[index]
        )));
    }

    Ok(output
        .iter()
        .zip(COMMAND_TABLE)
        .filter(|(value, _)| **value > threshold)
        .map(|(_, (joint, direction))| MotorCommand {
            joint,
            rate: direction * speed,
        })
        .collect())
}

/// Drops commands for joints flagged by the previous tick's limiter pass.
pub fn gate_commands(commands: Vec<MotorCommand>, flags: &LimiterFlags) -> Vec<MotorCommand> {
    commands
        .into_iter()
        .filter(|command| !flags.get(command.joint))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_pose_senses_zero_signals() {
        let sensed = encode_sensors(&PoseAngles::default());
        assert_eq!(sensed, [0.0; SENSOR_COUNT]);

        let tilted = encode_sensors(&PoseAngles {
            torso: 0.3,
            thigh: 0.3,
            shin: 0.3,
            foot: 0.3,
        });
        assert!((tilted[0] - 0.3).abs() < 1e-6);
        assert!(tilted[1..].iter().all(|value| value.abs() < 1e-5));
    }

    #[test]
    fn joint_signals_are_degrees_over_360_against_torso() {
        let sensed = encode_sensors(&PoseAngles {
            torso: 0.0,
            thigh: 90f32.to_radians(),
            shin: -45f32.to_radians(),
            foot: 180f32.to_radians(),
        });
        assert!((sensed[1] - 0.25).abs() < 1e-5);
        assert!((sensed[2] + 0.125).abs() < 1e-5);
        assert!((sensed[3] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn threshold_is_strict() {
        let commands = decode_outputs(&[0.9, 0.91, 0.0, 0.0, 0.0, 0.0], 0.9, 3.0).unwrap();
        assert_eq!(
            commands,
            vec![MotorCommand {
                joint: JointKind::Thigh,
                rate: -3.0
            }]
        );
    }

    #[test]
    fn index_mapping_covers_all_six_directions() {
        let commands = decode_outputs(&[1.0; OUTPUT_COUNT], 0.9, 3.0).unwrap();
        let pairs: Vec<_> = commands.iter().map(|c| (c.joint, c.rate)).collect();
        assert_eq!(
            pairs,
            vec![
                (JointKind::Thigh, 3.0),
                (JointKind::Thigh, -3.0),
                (JointKind::Shin, 3.0),
                (JointKind::Shin, -3.0),
                (JointKind::Foot, 3.0),
                (JointKind::Foot, -3.0),
            ]
        );
    }

    #[test]
    fn malformed_outputs_are_rejected() {
        assert!(matches!(
            decode_outputs(&[1.0; 5], 0.9, 3.0),
            Err(SimError::MalformedOutput(_))
        ));
        assert!(decode_outputs(&[0.0, f32::NAN, 0.0, 0.0, 0.0, 0.0], 0.9, 3.0).is_err());
        assert!(decode_outputs(&[f32::INFINITY; 6], 0.9, 3.0).is_err());
    }

    #[test]
    fn flagged_joint_refuses_both_directions() {
        let mut flags = LimiterFlags::default();
        flags.set(JointKind::Thigh, true);
        let commands = decode_outputs(&[1.0, 1.0, 1.0, 0.0, 0.0, 0.0], 0.9, 3.0).unwrap();
        let gated = gate_commands(commands, &flags);
        assert_eq!(
            gated,
            vec![MotorCommand {
                joint: JointKind::Shin,
                rate: 3.0
            }]
        );
    }
}
