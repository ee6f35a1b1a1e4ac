//! Exponential moving average of network weights
//!
//! The shadow copy trails the live weights and is preferred at
//! inference time for stability.

use crate::archs::ReflectionNet;
use crate::nn::StateDict;

/// A smoothed trailing average of every network parameter.
#[derive(Debug, Clone)]
pub struct ModelEma {
    decay: f32,
    shadow: StateDict,
}

impl ModelEma {
    /// Start the average from the network's current weights.
    pub fn new(net: &dyn ReflectionNet, decay: f32) -> Self {
        Self {
            decay,
            shadow: net.state_dict(),
        }
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    /// Blend the live weights into the shadow copy.
    ///
    /// shadow = shadow * decay + live * (1 - decay)
    pub fn update(&mut self, net: &dyn ReflectionNet) {
        let decay = self.decay;
        let live = net.state_dict();
        for (name, shadow) in &mut self.shadow {
            if let Some(current) = live.get(name) {
                shadow.zip_mut_with(current, |s, &c| *s = *s * decay + c * (1.0 - decay));
            }
        }
    }

    /// The averaged weights, keyed like the live network's state dict.
    pub fn state_dict(&self) -> &StateDict {
        &self.shadow
    }

    /// Overwrite shadow tensors from a snapshot. Keys that do not name a
    /// shadow tensor of the same shape are left untouched.
    pub fn apply_state(&mut self, state: &StateDict) {
        for (name, tensor) in state {
            if let Some(shadow) = self.shadow.get_mut(name) {
                if shadow.shape() == tensor.shape() {
                    *shadow = tensor.clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archs::{build_network, ReflectionNet};
    use crate::config::NetworkOptions;
    use approx::assert_relative_eq;
    use ndarray::ArrayD;

    fn small_net() -> Box<dyn ReflectionNet> {
        let opts = NetworkOptions {
            num_feat: 4,
            ..NetworkOptions::default()
        };
        build_network(&opts, 3).unwrap()
    }

    #[test]
    fn test_ema_starts_as_copy() {
        let net = small_net();
        let ema = ModelEma::new(net.as_ref(), 0.99);

        assert_eq!(ema.decay(), 0.99);
        assert_eq!(*ema.state_dict(), net.state_dict());
    }

    #[test]
    fn test_update_blends_toward_live() {
        let mut net = small_net();
        let mut ema = ModelEma::new(net.as_ref(), 0.9);

        let before = net.state_dict();
        let mut shifted = StateDict::new();
        for (name, tensor) in &before {
            shifted.insert(name.clone(), tensor + 1.0);
        }
        net.apply_state(&shifted).unwrap();
        ema.update(net.as_ref());

        for (name, shadow) in ema.state_dict() {
            let old = &before[name];
            let live = &shifted[name];
            for ((s, o), l) in shadow.iter().zip(old.iter()).zip(live.iter()) {
                assert_relative_eq!(*s, o * 0.9 + l * 0.1, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_apply_state_matches_by_name_and_shape() {
        let net = small_net();
        let mut ema = ModelEma::new(net.as_ref(), 0.99);

        let target_name = ema.state_dict().keys().next().unwrap().clone();
        let shape = ema.state_dict()[&target_name].shape().to_vec();

        let mut state = StateDict::new();
        state.insert(target_name.clone(), ArrayD::from_elem(shape, 7.0));
        state.insert("unknown.weight".to_string(), ArrayD::zeros(vec![1]));
        ema.apply_state(&state);

        assert!(ema.state_dict()[&target_name].iter().all(|&v| v == 7.0));
        assert!(!ema.state_dict().contains_key("unknown.weight"));
    }

    #[test]
    fn test_apply_state_skips_shape_mismatch() {
        let net = small_net();
        let mut ema = ModelEma::new(net.as_ref(), 0.99);

        let target_name = ema.state_dict().keys().next().unwrap().clone();
        let before = ema.state_dict()[&target_name].clone();

        let mut state = StateDict::new();
        state.insert(target_name.clone(), ArrayD::zeros(vec![1, 1]));
        ema.apply_state(&state);

        assert_eq!(ema.state_dict()[&target_name], before);
    }
}
