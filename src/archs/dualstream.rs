//! Two-stage pointwise network producing clean and reflection streams

use crate::error::{Error, Result};
use crate::nn::{ops, Param, StateDict};
use crate::archs::ReflectionNet;
use ndarray::{Array1, Array2, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Activations retained by `forward_train` for the backward pass
struct ForwardCache {
    input: Array4<f32>,
    pre_act: Array4<f32>,
    hidden: Array4<f32>,
    output: Array4<f32>,
}

/// A small two-stage network: a pointwise feature expansion with ReLU
/// followed by a pointwise projection with sigmoid. The projection emits
/// `3 + num_refl` channels so the last stage splits into a clean image
/// and a reflection image.
pub struct DualStreamNet {
    num_feat: usize,
    num_refl: usize,
    w0: Param,
    b0: Param,
    w1: Param,
    b1: Param,
    cache: Option<ForwardCache>,
}

fn init_weight(rng: &mut StdRng, out_c: usize, in_c: usize) -> Param {
    let bound = 1.0 / (in_c as f32).sqrt();
    let data = Array2::from_shape_fn((out_c, in_c), |_| rng.gen_range(-bound..bound));
    Param::new(data.into_dyn())
}

fn init_bias(rng: &mut StdRng, out_c: usize, in_c: usize) -> Param {
    let bound = 1.0 / (in_c as f32).sqrt();
    let data = Array1::from_shape_fn(out_c, |_| rng.gen_range(-bound..bound));
    Param::new(data.into_dyn())
}

impl DualStreamNet {
    pub fn new(num_feat: usize, num_refl: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let out_c = 3 + num_refl;
        Self {
            num_feat,
            num_refl,
            w0: init_weight(&mut rng, num_feat, 3),
            b0: init_bias(&mut rng, num_feat, 3),
            w1: init_weight(&mut rng, out_c, num_feat),
            b1: init_bias(&mut rng, out_c, num_feat),
            cache: None,
        }
    }

    pub fn num_feat(&self) -> usize {
        self.num_feat
    }

    pub fn num_refl(&self) -> usize {
        self.num_refl
    }

    fn run(&self, input: &Array4<f32>) -> Result<(Array4<f32>, Array4<f32>, Array4<f32>)> {
        let pre_act = ops::conv1x1_forward(input, self.w0.data(), self.b0.data())?;
        let hidden = ops::relu(&pre_act);
        let projected = ops::conv1x1_forward(&hidden, self.w1.data(), self.b1.data())?;
        let output = ops::sigmoid(&projected);
        Ok((pre_act, hidden, output))
    }
}

impl ReflectionNet for DualStreamNet {
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<Array4<f32>>> {
        let (_, hidden, output) = self.run(input)?;
        Ok(vec![hidden, output])
    }

    fn forward_train(&mut self, input: &Array4<f32>) -> Result<Vec<Array4<f32>>> {
        let (pre_act, hidden, output) = self.run(input)?;
        self.cache = Some(ForwardCache {
            input: input.clone(),
            pre_act,
            hidden: hidden.clone(),
            output: output.clone(),
        });
        Ok(vec![hidden, output])
    }

    fn backward(&mut self, d_last: &Array4<f32>) -> Result<()> {
        let cache = self.cache.take().ok_or_else(|| {
            Error::InvalidArgument("backward called without a cached forward pass".to_string())
        })?;

        let d_proj = ops::sigmoid_backward(&cache.output, d_last);
        let g1 = ops::conv1x1_backward(&cache.hidden, self.w1.data(), &d_proj)?;
        self.w1.add_grad(g1.d_weight);
        self.b1.add_grad(g1.d_bias);

        let d_hidden = ops::relu_backward(&cache.pre_act, &g1.d_input);
        let g0 = ops::conv1x1_backward(&cache.input, self.w0.data(), &d_hidden)?;
        self.w0.add_grad(g0.d_weight);
        self.b0.add_grad(g0.d_bias);
        Ok(())
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.w0, &mut self.b0, &mut self.w1, &mut self.b1]
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        state.insert("stage0.weight".to_string(), self.w0.data().clone());
        state.insert("stage0.bias".to_string(), self.b0.data().clone());
        state.insert("stage1.weight".to_string(), self.w1.data().clone());
        state.insert("stage1.bias".to_string(), self.b1.data().clone());
        state
    }

    fn apply_state(&mut self, state: &StateDict) -> Result<()> {
        for (name, tensor) in state {
            let param = match name.as_str() {
                "stage0.weight" => &mut self.w0,
                "stage0.bias" => &mut self.b0,
                "stage1.weight" => &mut self.w1,
                "stage1.bias" => &mut self.b1,
                other => {
                    return Err(Error::StateDictMismatch(format!(
                        "no parameter named {other}"
                    )))
                }
            };
            if param.shape() != tensor.shape() {
                return Err(Error::ShapeMismatch {
                    expected: param.shape().to_vec(),
                    got: tensor.shape().to_vec(),
                });
            }
            param.set_data(tensor.clone());
        }
        Ok(())
    }
}
