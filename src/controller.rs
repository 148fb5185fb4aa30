//! Controller contract between a walker and its neural network.

/// Number of sensed values fed to a controller each tick.
pub const SENSOR_COUNT: usize = 4;
/// Number of outputs a controller must produce each tick.
pub const OUTPUT_COUNT: usize = 6;

/// A feed-forward decision function. Called once per tick per live walker;
/// implementations must not depend on call history within a tick.
pub trait Controller {
    fn activate(&self, inputs: &[f32; SENSOR_COUNT]) -> Vec<f32>;
}

impl<F> Controller for F
where
    F: Fn(&[f32; SENSOR_COUNT]) -> Vec<f32>,
{
    fn activate(&self, inputs: &[f32; SENSOR_COUNT]) -> Vec<f32> {
        self(inputs)
    }
}

/// Emits the same output vector regardless of input.
#[derive(Clone, Debug)]
pub struct ConstantController(pub Vec<f32>);

impl ConstantController {
    pub fn idle() -> Self {
        Self(vec![0.0; OUTPUT_COUNT])
    }

    /// Drives a single output index fully on.
    pub fn single(index: usize) -> Self {
        let mut output = vec![0.0; OUTPUT_COUNT];
        if let Some(slot) = output.get_mut(index) {
            *slot = 1.0;
        }
        Self(output)
    }
}

impl Controller for ConstantController {
    fn activate(&self, _inputs: &[f32; SENSOR_COUNT]) -> Vec<f32> {
        self.0.clone()
    }
}
