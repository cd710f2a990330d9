//! Learnable parameter blocks shared with an external optimizer.
//!
//! A `Parameter` holds a dense row-major `[rows, cols]` block of `f32` values,
//! a gradient buffer of the same shape, and a device tag. Components that own
//! parameters hand out `ParamHandle`s; the training loop collects them into
//! named `ParamGroups` and drives the update rule.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use nalgebra::Vector6;

use crate::core::Device;

/// Shared handle to a parameter block.
pub type ParamHandle = Rc<RefCell<Parameter>>;

/// Named groups of parameters, as consumed by an optimizer.
pub type ParamGroups = BTreeMap<String, Vec<ParamHandle>>;

#[derive(Clone, Debug)]
pub struct Parameter {
    name: String,
    rows: usize,
    cols: usize,
    data: Vec<f32>,
    grad: Vec<f32>,
    device: Device,
}

impl Parameter {
    /// Allocate a zero-initialized `[rows, cols]` block.
    pub fn zeros(name: impl Into<String>, rows: usize, cols: usize, device: Device) -> Self {
        Self {
            name: name.into(),
            rows,
            cols,
            data: vec![0.0; rows * cols],
            grad: vec![0.0; rows * cols],
            device,
        }
    }

    pub fn into_handle(self) -> ParamHandle {
        Rc::new(RefCell::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn to_device(&mut self, device: Device) {
        self.device = device;
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    pub fn grad_mut(&mut self) -> &mut [f32] {
        &mut self.grad
    }

    /// Split borrow for optimizers that read the gradient while writing values.
    pub fn data_and_grad_mut(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.data, &self.grad)
    }

    pub fn zero_grad(&mut self) {
        self.grad.iter_mut().for_each(|g| *g = 0.0);
    }
}

/// Row access for 6-column blocks (pose tangents).
impl Parameter {
    pub fn row6(&self, row: usize) -> Vector6<f32> {
        debug_assert_eq!(self.cols, 6);
        Vector6::from_column_slice(&self.data[row * 6..row * 6 + 6])
    }

    pub fn set_row6(&mut self, row: usize, value: &Vector6<f32>) {
        debug_assert_eq!(self.cols, 6);
        self.data[row * 6..row * 6 + 6].copy_from_slice(value.as_slice());
    }

    pub fn rows6(&self) -> Vec<Vector6<f32>> {
        (0..self.rows).map(|r| self.row6(r)).collect()
    }

    pub fn grad_row6(&self, row: usize) -> Vector6<f32> {
        debug_assert_eq!(self.cols, 6);
        Vector6::from_column_slice(&self.grad[row * 6..row * 6 + 6])
    }

    pub fn accumulate_grad_row6(&mut self, row: usize, grad: &Vector6<f32>) {
        debug_assert_eq!(self.cols, 6);
        for (g, d) in self.grad[row * 6..row * 6 + 6].iter_mut().zip(grad.iter()) {
            *g += *d;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_shape() {
        let p = Parameter::zeros("pose", 3, 6, Device::Cpu);
        assert_eq!(p.shape(), (3, 6));
        assert_eq!(p.len(), 18);
        assert!(p.data().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_row_roundtrip_and_grad_accumulation() {
        let mut p = Parameter::zeros("pose", 2, 6, Device::Cpu);
        let v = Vector6::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
        p.set_row6(1, &v);
        assert_eq!(p.row6(1), v);
        assert_eq!(p.row6(0), Vector6::zeros());

        p.accumulate_grad_row6(1, &v);
        p.accumulate_grad_row6(1, &v);
        assert_eq!(p.grad_row6(1), v * 2.0);

        p.zero_grad();
        assert_eq!(p.grad_row6(1), Vector6::zeros());
    }
}
