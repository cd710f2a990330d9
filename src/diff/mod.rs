//! Backward passes for every forward op that touches correction parameters.
//!
//! Each function takes the forward inputs plus an upstream gradient and
//! returns the gradient with respect to its inputs. The camera optimizer
//! chains them to accumulate into its parameter block.

pub mod compose_grad;
pub mod lie_grad;
