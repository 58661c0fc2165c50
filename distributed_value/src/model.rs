//! Value network: encoded state in, probability of eventual solution out.
//!
//! The output is squashed into `(0, 1)` with a sigmoid so it can be read as
//! `γ^k` for an expected `k` steps to solve.

use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

/// A module that scores a batch of encoded states.
pub trait ValueNetwork<B: Backend>: Module<B> {
    /// `[n, encoding] -> [n]`, each value in `(0, 1)`.
    fn predict(&self, states: Tensor<B, 2>) -> Tensor<B, 1>;
}

#[derive(Config, Debug)]
pub struct ValueMlpConfig {
    /// Length of each encoded state.
    pub encoding_size: usize,
    #[config(default = 128)]
    pub hidden_size: usize,
    /// Linear layers including the output layer.
    #[config(default = 3)]
    pub num_layers: usize,
}

impl ValueMlpConfig {
    /// Initialize the network on `device`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ValueMlp<B> {
        let hidden_layers = self.num_layers.saturating_sub(1);
        let mut hidden = Vec::with_capacity(hidden_layers);
        let mut width = self.encoding_size;
        for _ in 0..hidden_layers {
            hidden.push(LinearConfig::new(width, self.hidden_size).init(device));
            width = self.hidden_size;
        }

        ValueMlp {
            hidden,
            output: LinearConfig::new(width, 1).init(device),
            activation: Relu::new(),
        }
    }
}

/// Fully connected ReLU network with a single sigmoid output.
#[derive(Module, Debug)]
pub struct ValueMlp<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> ValueNetwork<B> for ValueMlp<B> {
    fn predict(&self, states: Tensor<B, 2>) -> Tensor<B, 1> {
        let mut x = states;
        for layer in &self.hidden {
            x = self.activation.forward(layer.forward(x));
        }
        let [batch, _] = x.dims();
        sigmoid(self.output.forward(x)).reshape([batch])
    }
}
