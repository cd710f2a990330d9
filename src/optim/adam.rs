//! Adam over shared parameter handles.
//!
//! The camera optimizer only contributes parameters; this is the update rule a
//! training loop runs over a parameter group (e.g. `camera_opt`).

use std::collections::HashMap;
use std::rc::Rc;

use super::params::ParamHandle;

struct Moments {
    m: Vec<f32>,
    v: Vec<f32>,
}

pub struct Adam {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    t: u32,
    params: Vec<ParamHandle>,
    state: HashMap<usize, Moments>,
}

impl Adam {
    pub fn new(params: Vec<ParamHandle>, lr: f32, beta1: f32, beta2: f32, eps: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            eps,
            t: 0,
            params,
            state: HashMap::new(),
        }
    }

    /// Adam with the usual betas (0.9, 0.999) and eps 1e-8. Camera
    /// corrections are typically trained with eps around 1e-15.
    pub fn with_lr(params: Vec<ParamHandle>, lr: f32) -> Self {
        Self::new(params, lr, 0.9, 0.999, 1e-8)
    }

    pub fn timestep(&self) -> u32 {
        self.t
    }

    /// Apply one update from the accumulated gradients.
    pub fn step(&mut self) {
        self.t += 1;
        let t = self.t as f32;
        let b1 = self.beta1;
        let b2 = self.beta2;

        let bias1 = 1.0 - b1.powf(t);
        let bias2 = 1.0 - b2.powf(t);

        for handle in &self.params {
            let key = Rc::as_ptr(handle) as usize;
            let mut param = handle.borrow_mut();
            let len = param.len();
            let moments = self.state.entry(key).or_insert_with(|| Moments {
                m: vec![0.0; len],
                v: vec![0.0; len],
            });
            if moments.m.len() != len {
                moments.m.resize(len, 0.0);
                moments.v.resize(len, 0.0);
            }

            let (values, grads) = param.data_and_grad_mut();
            for i in 0..values.len() {
                let g = grads[i];
                moments.m[i] = moments.m[i] * b1 + g * (1.0 - b1);
                moments.v[i] = moments.v[i] * b2 + g * g * (1.0 - b2);

                let m_hat = moments.m[i] / bias1;
                let v_hat = moments.v[i] / bias2;

                values[i] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
            }
        }
    }

    pub fn zero_grad(&self) {
        for handle in &self.params {
            handle.borrow_mut().zero_grad();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Device;
    use crate::optim::params::Parameter;

    #[test]
    fn test_adam_moves_against_gradient() {
        let handle = Parameter::zeros("p", 1, 6, Device::Cpu).into_handle();
        handle.borrow_mut().grad_mut()[0] = 1.0;
        handle.borrow_mut().grad_mut()[3] = -1.0;

        let mut opt = Adam::with_lr(vec![handle.clone()], 0.01);
        opt.step();

        let p = handle.borrow();
        assert!(p.data()[0] < 0.0);
        assert!(p.data()[3] > 0.0);
        assert_eq!(p.data()[1], 0.0);
        assert_eq!(opt.timestep(), 1);
    }

    #[test]
    fn test_zero_grad_clears_all_params() {
        let a = Parameter::zeros("a", 1, 6, Device::Cpu).into_handle();
        let b = Parameter::zeros("b", 2, 6, Device::Cpu).into_handle();
        a.borrow_mut().grad_mut()[2] = 3.0;
        b.borrow_mut().grad_mut()[7] = -1.0;

        let opt = Adam::with_lr(vec![a.clone(), b.clone()], 0.1);
        opt.zero_grad();
        assert!(a.borrow().grad().iter().all(|g| *g == 0.0));
        assert!(b.borrow().grad().iter().all(|g| *g == 0.0));
    }
}
