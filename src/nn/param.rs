//! Trainable parameter: a tensor paired with an optional gradient

use ndarray::ArrayD;

/// A trainable tensor with an accumulated gradient.
///
/// The gradient is `None` until a backward pass touches the parameter;
/// optimizers skip parameters without gradients.
#[derive(Debug, Clone)]
pub struct Param {
    data: ArrayD<f32>,
    grad: Option<ArrayD<f32>>,
}

impl Param {
    /// Create a parameter from initial data with no gradient
    pub fn new(data: ArrayD<f32>) -> Self {
        Self { data, grad: None }
    }

    /// Immutable view of the parameter data
    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    /// Mutable view of the parameter data
    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    /// Replace the parameter data, keeping any gradient
    pub fn set_data(&mut self, data: ArrayD<f32>) {
        self.data = data;
    }

    /// Current gradient, if a backward pass has produced one
    pub fn grad(&self) -> Option<&ArrayD<f32>> {
        self.grad.as_ref()
    }

    /// Accumulate a gradient contribution (sum with any existing gradient)
    pub fn add_grad(&mut self, grad: ArrayD<f32>) {
        match &mut self.grad {
            Some(g) => *g += &grad,
            None => self.grad = Some(grad),
        }
    }

    /// Clear the gradient
    pub fn zero_grad(&mut self) {
        self.grad = None;
    }

    /// Shape of the parameter data
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Number of elements
    pub fn numel(&self) -> usize {
        self.data.len()
    }
}
