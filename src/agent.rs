//! Approximate Q-learning: a small dense network, epsilon-greedy action
//! selection and one-step Bellman targets drawn from experience replay.
//!
//! Current and next-state values both come from the same network; there is
//! no separate target network.

use std::iter;

use candle_core::{DType, Device, Tensor};
use candle_nn::{linear, AdamW, Linear, Module, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, trace};

use crate::config::AgentConfig;
use crate::env::{Action, Observation, OBSERVATION_LEN};
use crate::error::{Error, Result};
use crate::persistence::ModelBlob;
use crate::replay::{ExperienceStore, Transition};

// ── Network ──────────────────────────────────────────────────────────────────

/// Dense ReLU network mapping an observation to one value per action.
pub struct QNetwork {
    varmap: VarMap,
    layers: Vec<Linear>,
    layer_sizes: Vec<usize>,
    device: Device,
}

impl QNetwork {
    pub fn new(hidden_layers: &[usize], device: &Device) -> Result<Self> {
        let layer_sizes = iter::once(OBSERVATION_LEN)
            .chain(hidden_layers.iter().copied())
            .chain(iter::once(Action::COUNT))
            .collect();
        Self::with_layer_sizes(layer_sizes, device)
    }

    fn with_layer_sizes(layer_sizes: Vec<usize>, device: &Device) -> Result<Self> {
        check_topology(&layer_sizes)?;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let layers = layer_sizes
            .windows(2)
            .enumerate()
            .map(|(i, w)| linear(w[0], w[1], vb.pp(format!("dense_{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;

        Ok(Self {
            varmap,
            layers,
            layer_sizes,
            device: device.clone(),
        })
    }

    /// Rebuild a network from a blob.  Every variable must be supplied with
    /// the right shape.
    pub fn from_blob(blob: &ModelBlob, device: &Device) -> Result<Self> {
        // Nothing is allocated until the blob is known to describe this
        // topology and carry exactly the bytes it claims.
        let layer_sizes = &blob.topology.layer_sizes;
        check_topology(layer_sizes)?;
        let specs = blob.weight_specs.as_ref().ok_or(Error::MissingWeightSpecs)?;
        let mut found: Vec<(&str, &[usize])> = specs
            .iter()
            .map(|spec| (spec.name.as_str(), spec.shape.as_slice()))
            .collect();
        found.sort_unstable();
        let expected = expected_weights(layer_sizes);
        let matches = found.len() == expected.len()
            && found
                .iter()
                .zip(&expected)
                .all(|((name, shape), (want_name, want_shape))| {
                    name == want_name && *shape == want_shape.as_slice()
                });
        if !matches {
            return Err(Error::MalformedModel(format!(
                "weight specs do not match topology {layer_sizes:?}"
            )));
        }
        let tensors = blob.unpack()?;

        let network = Self::with_layer_sizes(blob.topology.layer_sizes.clone(), device)?;
        {
            let mut vars = network
                .varmap
                .data()
                .lock()
                .map_err(|_| Error::MalformedModel("variable map lock poisoned".into()))?;
            if vars.len() != tensors.len() {
                return Err(Error::MalformedModel(format!(
                    "blob carries {} tensors, network has {}",
                    tensors.len(),
                    vars.len()
                )));
            }
            for (name, shape, values) in tensors {
                let var = vars
                    .get_mut(&name)
                    .ok_or_else(|| Error::MalformedModel(format!("unknown weight {name}")))?;
                if var.as_tensor().dims() != shape.as_slice() {
                    return Err(Error::MalformedModel(format!(
                        "weight {name} has shape {shape:?}, expected {:?}",
                        var.as_tensor().dims()
                    )));
                }
                var.set(&Tensor::from_vec(values, shape, device)?)?;
            }
        }
        Ok(network)
    }

    pub fn to_blob(&self) -> Result<ModelBlob> {
        let vars = self
            .varmap
            .data()
            .lock()
            .map_err(|_| Error::MalformedModel("variable map lock poisoned".into()))?;
        let mut tensors = Vec::with_capacity(vars.len());
        for (name, var) in vars.iter() {
            let tensor = var.as_tensor().detach();
            let shape = tensor.dims().to_vec();
            let values = tensor.flatten_all()?.to_vec1::<f32>()?;
            tensors.push((name.clone(), shape, values));
        }
        tensors.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(ModelBlob::pack(self.layer_sizes.clone(), &tensors))
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    pub fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let last = self.layers.len() - 1;
        let mut h = xs.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(&h)?;
            if i < last {
                h = h.relu()?;
            }
        }
        Ok(h)
    }

    fn batch_tensor(&self, observations: &[Observation]) -> Result<Tensor> {
        let flat: Vec<f32> = observations.iter().flat_map(|o| o.iter().copied()).collect();
        Ok(Tensor::from_vec(
            flat,
            (observations.len(), OBSERVATION_LEN),
            &self.device,
        )?)
    }

    /// Predicted value of every action for one observation.
    pub fn predict(&self, observation: &Observation) -> Result<Vec<f32>> {
        let xs = Tensor::from_slice(observation.as_slice(), (1, OBSERVATION_LEN), &self.device)?;
        Ok(self.forward(&xs)?.squeeze(0)?.to_vec1::<f32>()?)
    }

    pub fn predict_batch(&self, observations: &[Observation]) -> Result<Vec<Vec<f32>>> {
        let xs = self.batch_tensor(observations)?;
        Ok(self.forward(&xs)?.to_vec2::<f32>()?)
    }
}

fn check_topology(layer_sizes: &[usize]) -> Result<()> {
    if layer_sizes.first() != Some(&OBSERVATION_LEN)
        || layer_sizes.last() != Some(&Action::COUNT)
        || layer_sizes.len() < 2
        || layer_sizes.contains(&0)
    {
        return Err(Error::TopologyMismatch {
            expected: vec![OBSERVATION_LEN, Action::COUNT],
            found: layer_sizes.to_vec(),
        });
    }
    Ok(())
}

/// Variable names and shapes a network of `layer_sizes` holds, sorted by
/// name.  Weights are stored `(out, in)`.
fn expected_weights(layer_sizes: &[usize]) -> Vec<(String, Vec<usize>)> {
    let mut weights: Vec<_> = layer_sizes
        .windows(2)
        .enumerate()
        .flat_map(|(i, w)| {
            [
                (format!("dense_{i}.bias"), vec![w[1]]),
                (format!("dense_{i}.weight"), vec![w[1], w[0]]),
            ]
        })
        .collect();
    weights.sort_unstable();
    weights
}

/// Index of the first maximum.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

// ── Agent ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainReport {
    pub loss: f32,
    pub epsilon: f64,
}

/// The learning loop's state: network, optimiser, replay memory and
/// exploration rate.
pub struct Agent {
    network: QNetwork,
    optimizer: AdamW,
    store: ExperienceStore,
    config: AgentConfig,
    epsilon: f64,
    updates: u64,
    rng: StdRng,
}

fn adam(network: &QNetwork, learning_rate: f64) -> Result<AdamW> {
    let params = ParamsAdamW {
        lr: learning_rate,
        beta1: 0.9,
        beta2: 0.999,
        eps: 1e-7,
        weight_decay: 0.0,
    };
    Ok(AdamW::new(network.varmap.all_vars(), params)?)
}

impl Agent {
    pub fn new(config: AgentConfig, seed: Option<u64>) -> Result<Self> {
        config.validate()?;
        let network = QNetwork::new(&config.hidden_layers, &Device::Cpu)?;
        let optimizer = adam(&network, config.learning_rate)?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            network,
            optimizer,
            store: ExperienceStore::new(config.replay_capacity),
            epsilon: config.epsilon_start,
            config,
            updates: 0,
            rng,
        })
    }

    pub fn network(&self) -> &QNetwork {
        &self.network
    }

    pub fn store(&self) -> &ExperienceStore {
        &self.store
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Override the exploration rate, e.g. `0.0` for greedy evaluation.
    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    /// Completed gradient updates.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn remember(&mut self, transition: Transition) {
        self.store.record(transition);
    }

    /// Epsilon-greedy choice.
    pub fn select_action(&mut self, observation: &Observation) -> Result<Action> {
        if self.rng.gen::<f64>() <= self.epsilon {
            return Ok(Action::ALL[self.rng.gen_range(0..Action::COUNT)]);
        }
        self.greedy_action(observation)
    }

    pub fn greedy_action(&self, observation: &Observation) -> Result<Action> {
        let values = self.network.predict(observation)?;
        Ok(Action::ALL[argmax(&values)])
    }

    /// One replay update.  Returns `None` while the store holds fewer than
    /// `batch_size` transitions.
    pub fn train_step(&mut self, batch_size: usize) -> Result<Option<TrainReport>> {
        if batch_size == 0 || self.store.len() < batch_size {
            return Ok(None);
        }

        let batch = self.store.sample(batch_size, &mut self.rng)?;
        let states: Vec<Observation> = batch.iter().map(|t| t.state).collect();
        let next_states: Vec<Observation> = batch.iter().map(|t| t.next_state).collect();

        // Start from the current predictions so only the taken action moves.
        let mut targets = self.network.predict_batch(&states)?;
        let next_values = self.network.predict_batch(&next_states)?;
        for ((t, row), next) in batch.iter().zip(targets.iter_mut()).zip(&next_values) {
            let backup = if t.terminal {
                t.reward
            } else {
                let best_next = next.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                t.reward + self.config.gamma * best_next
            };
            row[t.action.index()] = backup;
        }

        let xs = self.network.batch_tensor(&states)?;
        let flat: Vec<f32> = targets.into_iter().flatten().collect();
        let ys = Tensor::from_vec(flat, (batch_size, Action::COUNT), &self.network.device)?;
        let loss = candle_nn::loss::mse(&self.network.forward(&xs)?, &ys)?;
        self.optimizer.backward_step(&loss)?;
        let loss = loss.to_scalar::<f32>()?;

        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
        self.updates += 1;
        trace!(update = self.updates, loss, epsilon = self.epsilon, "gradient update");

        Ok(Some(TrainReport {
            loss,
            epsilon: self.epsilon,
        }))
    }

    pub fn export_model(&self) -> Result<ModelBlob> {
        self.network.to_blob()
    }

    /// Replace the network with one restored from `blob`.  On any error the
    /// current network and optimiser are left as they were.
    pub fn import_model(&mut self, blob: &ModelBlob) -> Result<()> {
        let network = QNetwork::from_blob(blob, &self.network.device)?;
        let optimizer = adam(&network, self.config.learning_rate)?;
        self.network = network;
        self.optimizer = optimizer;
        info!(layers = ?self.network.layer_sizes(), "model imported");
        Ok(())
    }
}
