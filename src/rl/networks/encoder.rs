//! Recurrent State Encoder
//!
//! LSTM cell that turns a window of bars into a hidden representation for
//! the actor and critic.
//!
//! The backward pass is a one-step approximation: the TD error is broadcast
//! as `dh` and every gate receives the same outer-product gradient against
//! the cached input and previous hidden state. It is not full
//! backpropagation through time.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::linalg::{add, blend_vec, clip, hadamard, sigmoid, Matrix};
use crate::error::{Result, TraderError};
use crate::rl::config::{check_bound, EncoderConfig};
use crate::rl::core::StateWindow;

/// Hidden and cell state after a forward step
#[derive(Debug, Clone, PartialEq)]
pub struct LstmOutput {
    pub hidden_state: Vec<f64>,
    pub cell_state: Vec<f64>,
}

/// Intermediate values of one forward step, consumed by [`LstmEncoder::backward`]
#[derive(Debug, Clone)]
pub struct ActivationCache {
    pub x: Vec<f64>,
    pub prev_hidden: Vec<f64>,
    pub prev_cell: Vec<f64>,
    pub forget_gate: Vec<f64>,
    pub input_gate: Vec<f64>,
    pub candidate: Vec<f64>,
    pub cell_state: Vec<f64>,
    pub output_gate: Vec<f64>,
    pub hidden_state: Vec<f64>,
}

/// Error signal broadcast into the hidden layer
#[derive(Debug, Clone)]
pub enum ErrorSignal {
    /// Same value for every hidden unit
    Scalar(f64),
    /// One value per hidden unit
    PerUnit(Vec<f64>),
}

impl From<f64> for ErrorSignal {
    fn from(value: f64) -> Self {
        ErrorSignal::Scalar(value)
    }
}

/// Gradients for one gate's parameters
#[derive(Debug, Clone, PartialEq)]
pub struct GateGradients {
    pub w: Matrix,
    pub u: Matrix,
    pub b: Vec<f64>,
}

/// Gradients for every encoder parameter
#[derive(Debug, Clone, PartialEq)]
pub struct LstmGradients {
    pub forget: GateGradients,
    pub input: GateGradients,
    pub candidate: GateGradients,
    pub output: GateGradients,
}

impl LstmGradients {
    fn gates(&self) -> [&GateGradients; 4] {
        [&self.forget, &self.input, &self.candidate, &self.output]
    }
}

/// Encoder parameters, serialized with the gate names used in checkpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmWeights {
    #[serde(rename = "inputSize")]
    pub input_size: usize,
    #[serde(rename = "hiddenSize")]
    pub hidden_size: usize,

    // Input weights [hidden x input]
    #[serde(rename = "Wf")]
    pub w_f: Matrix,
    #[serde(rename = "Wi")]
    pub w_i: Matrix,
    #[serde(rename = "Wc")]
    pub w_c: Matrix,
    #[serde(rename = "Wo")]
    pub w_o: Matrix,

    // Recurrent weights [hidden x hidden]
    #[serde(rename = "Uf")]
    pub u_f: Matrix,
    #[serde(rename = "Ui")]
    pub u_i: Matrix,
    #[serde(rename = "Uc")]
    pub u_c: Matrix,
    #[serde(rename = "Uo")]
    pub u_o: Matrix,

    // Biases [hidden]
    pub bf: Vec<f64>,
    pub bi: Vec<f64>,
    pub bc: Vec<f64>,
    pub bo: Vec<f64>,
}

impl LstmWeights {
    fn init<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        Self {
            input_size,
            hidden_size,
            w_f: Matrix::xavier(hidden_size, input_size, rng),
            w_i: Matrix::xavier(hidden_size, input_size, rng),
            w_c: Matrix::xavier(hidden_size, input_size, rng),
            w_o: Matrix::xavier(hidden_size, input_size, rng),
            u_f: Matrix::xavier(hidden_size, hidden_size, rng),
            u_i: Matrix::xavier(hidden_size, hidden_size, rng),
            u_c: Matrix::xavier(hidden_size, hidden_size, rng),
            u_o: Matrix::xavier(hidden_size, hidden_size, rng),
            bf: vec![0.0; hidden_size],
            bi: vec![0.0; hidden_size],
            bc: vec![0.0; hidden_size],
            bo: vec![0.0; hidden_size],
        }
    }

    /// Input-weight layers in gate order (f, i, c, o)
    pub fn input_layers(&self) -> [(&'static str, &Matrix); 4] {
        [
            ("Wf", &self.w_f),
            ("Wi", &self.w_i),
            ("Wc", &self.w_c),
            ("Wo", &self.w_o),
        ]
    }

    /// Recurrent-weight layers in gate order (f, i, c, o)
    pub fn recurrent_layers(&self) -> [(&'static str, &Matrix); 4] {
        [
            ("Uf", &self.u_f),
            ("Ui", &self.u_i),
            ("Uc", &self.u_c),
            ("Uo", &self.u_o),
        ]
    }

    pub fn biases(&self) -> [(&'static str, &Vec<f64>); 4] {
        [
            ("bf", &self.bf),
            ("bi", &self.bi),
            ("bc", &self.bc),
            ("bo", &self.bo),
        ]
    }

    fn gates_mut(&mut self) -> [(&mut Matrix, &mut Matrix, &mut Vec<f64>); 4] {
        [
            (&mut self.w_f, &mut self.u_f, &mut self.bf),
            (&mut self.w_i, &mut self.u_i, &mut self.bi),
            (&mut self.w_c, &mut self.u_c, &mut self.bc),
            (&mut self.w_o, &mut self.u_o, &mut self.bo),
        ]
    }

    /// Verify every matrix and bias matches the declared sizes
    pub fn validate(&self) -> Result<()> {
        let (h, n) = (self.hidden_size, self.input_size);
        for (name, m) in self.input_layers() {
            if m.rows() != h || m.cols() != n || !m.is_rectangular() {
                return Err(TraderError::CheckpointShapeMismatch(format!(
                    "encoder {name} is {}x{}, expected {h}x{n}",
                    m.rows(),
                    m.cols()
                )));
            }
        }
        for (name, m) in self.recurrent_layers() {
            if m.rows() != h || m.cols() != h || !m.is_rectangular() {
                return Err(TraderError::CheckpointShapeMismatch(format!(
                    "encoder {name} is {}x{}, expected {h}x{h}",
                    m.rows(),
                    m.cols()
                )));
            }
        }
        for (name, b) in self.biases() {
            if b.len() != h {
                return Err(TraderError::CheckpointShapeMismatch(format!(
                    "encoder {name} has length {}, expected {h}",
                    b.len()
                )));
            }
        }
        Ok(())
    }
}

/// LSTM encoder
#[derive(Debug, Clone)]
pub struct LstmEncoder {
    weights: LstmWeights,
    grad_clip: f64,
}

impl LstmEncoder {
    /// Create an encoder with randomly initialized weights
    pub fn new<R: Rng + ?Sized>(config: &EncoderConfig, rng: &mut R) -> Result<Self> {
        if config.input_size == 0 || config.hidden_size == 0 {
            return Err(TraderError::InvalidConfig(
                "encoder input_size and hidden_size must be positive".to_string(),
            ));
        }
        check_bound("encoder.grad_clip", config.grad_clip)?;
        Ok(Self {
            weights: LstmWeights::init(config.input_size, config.hidden_size, rng),
            grad_clip: config.grad_clip,
        })
    }

    /// Rebuild from stored weights
    pub fn from_weights(weights: LstmWeights, grad_clip: f64) -> Result<Self> {
        check_bound("encoder.grad_clip", grad_clip)?;
        weights.validate()?;
        Ok(Self { weights, grad_clip })
    }

    pub fn weights(&self) -> &LstmWeights {
        &self.weights
    }

    pub fn input_size(&self) -> usize {
        self.weights.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.weights.hidden_size
    }

    fn gate(
        w: &Matrix,
        u: &Matrix,
        b: &[f64],
        x: &[f64],
        h: &[f64],
        activation: fn(f64) -> f64,
    ) -> Result<Vec<f64>> {
        let pre = add(&add(&w.mat_vec(x)?, &u.mat_vec(h)?), b);
        Ok(pre.into_iter().map(activation).collect())
    }

    /// One LSTM step. Missing previous states default to zeros.
    pub fn forward(
        &self,
        x: &[f64],
        prev_hidden: Option<&[f64]>,
        prev_cell: Option<&[f64]>,
    ) -> Result<(LstmOutput, ActivationCache)> {
        let hidden_size = self.hidden_size();
        if x.len() != self.input_size() {
            return Err(TraderError::shape("encoder input", self.input_size(), x.len()));
        }

        let prev_hidden = match prev_hidden {
            Some(h) if h.len() != hidden_size => {
                return Err(TraderError::shape("encoder hidden state", hidden_size, h.len()))
            }
            Some(h) => h.to_vec(),
            None => vec![0.0; hidden_size],
        };
        let prev_cell = match prev_cell {
            Some(c) if c.len() != hidden_size => {
                return Err(TraderError::shape("encoder cell state", hidden_size, c.len()))
            }
            Some(c) => c.to_vec(),
            None => vec![0.0; hidden_size],
        };

        let w = &self.weights;
        let forget_gate = Self::gate(&w.w_f, &w.u_f, &w.bf, x, &prev_hidden, sigmoid)?;
        let input_gate = Self::gate(&w.w_i, &w.u_i, &w.bi, x, &prev_hidden, sigmoid)?;
        let candidate = Self::gate(&w.w_c, &w.u_c, &w.bc, x, &prev_hidden, f64::tanh)?;
        let cell_state = add(
            &hadamard(&forget_gate, &prev_cell),
            &hadamard(&input_gate, &candidate),
        );
        let output_gate = Self::gate(&w.w_o, &w.u_o, &w.bo, x, &prev_hidden, sigmoid)?;
        let squashed: Vec<f64> = cell_state.iter().map(|c| c.tanh()).collect();
        let hidden_state = hadamard(&output_gate, &squashed);

        let output = LstmOutput {
            hidden_state: hidden_state.clone(),
            cell_state: cell_state.clone(),
        };
        let cache = ActivationCache {
            x: x.to_vec(),
            prev_hidden,
            prev_cell,
            forget_gate,
            input_gate,
            candidate,
            cell_state,
            output_gate,
            hidden_state,
        };

        Ok((output, cache))
    }

    /// Run the cell across a window bar by bar from zero state.
    /// Returns the final states and the cache of the last step.
    pub fn encode(&self, window: &StateWindow) -> Result<(LstmOutput, ActivationCache)> {
        let mut last: Option<(LstmOutput, ActivationCache)> = None;

        for features in window.feature_rows() {
            let (h, c) = match &last {
                Some((out, _)) => (
                    Some(out.hidden_state.as_slice()),
                    Some(out.cell_state.as_slice()),
                ),
                None => (None, None),
            };
            let step = self.forward(&features, h, c)?;
            last = Some(step);
        }

        last.ok_or_else(|| TraderError::shape("state window", 1, 0))
    }

    /// Hidden representation of a window
    pub fn hidden_state(&self, window: &StateWindow) -> Result<Vec<f64>> {
        Ok(self.encode(window)?.0.hidden_state)
    }

    /// One-step gradient approximation from a broadcast error signal.
    /// Input-weight gradients are clipped to ±`grad_clip`; recurrent and
    /// bias gradients are left unclipped.
    pub fn backward(
        &self,
        cache: ActivationCache,
        signal: ErrorSignal,
    ) -> Result<LstmGradients> {
        let hidden_size = self.hidden_size();
        let dh_next = match signal {
            ErrorSignal::Scalar(v) => vec![v; hidden_size],
            ErrorSignal::PerUnit(v) if v.len() == hidden_size => v,
            ErrorSignal::PerUnit(v) => {
                return Err(TraderError::shape("encoder error signal", hidden_size, v.len()))
            }
        };

        let bound = self.grad_clip;
        let outer = |rhs: &[f64], clip_to: Option<f64>| {
            Matrix::from_rows(
                dh_next
                    .iter()
                    .map(|d| {
                        rhs.iter()
                            .map(|v| match clip_to {
                                Some(b) => clip(d * v, b),
                                None => d * v,
                            })
                            .collect()
                    })
                    .collect(),
            )
        };
        let gate = GateGradients {
            w: outer(&cache.x, Some(bound)),
            u: outer(&cache.prev_hidden, None),
            b: dh_next.clone(),
        };

        Ok(LstmGradients {
            forget: gate.clone(),
            input: gate.clone(),
            candidate: gate.clone(),
            output: gate,
        })
    }

    /// Plain SGD on every weight and bias: `w -= lr * grad`
    pub fn update_weights(&mut self, gradients: LstmGradients, learning_rate: f64) {
        for ((w, u, b), grad) in self.weights.gates_mut().into_iter().zip(gradients.gates()) {
            w.sgd_step(&grad.w, learning_rate);
            u.sgd_step(&grad.u, learning_rate);
            for (bias, g) in b.iter_mut().zip(&grad.b) {
                *bias -= learning_rate * g;
            }
        }
    }

    /// Soft update toward `source`: `θ ← (1 − tau)·θ + tau·θ_source`
    pub fn soft_update_from(&mut self, source: &LstmEncoder, tau: f64) -> Result<()> {
        if self.input_size() != source.input_size() || self.hidden_size() != source.hidden_size() {
            return Err(TraderError::shape(
                "encoder soft update",
                self.hidden_size(),
                source.hidden_size(),
            ));
        }
        let src = &source.weights;
        let src_gates = [
            (&src.w_f, &src.u_f, &src.bf),
            (&src.w_i, &src.u_i, &src.bi),
            (&src.w_c, &src.u_c, &src.bc),
            (&src.w_o, &src.u_o, &src.bo),
        ];
        for ((w, u, b), (sw, su, sb)) in self.weights.gates_mut().into_iter().zip(src_gates) {
            w.blend_from(sw, tau);
            u.blend_from(su, tau);
            blend_vec(b, sb, tau);
        }
        Ok(())
    }
}
