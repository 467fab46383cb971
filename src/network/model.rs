use std::ops::Range;

use ndarray::{s, Array1};
use rand::Rng;

use crate::error::SirFitError;

use super::{Basis, CrossEntropyLoss, Expr, NoSparse, Sparsifier};

/// One sampling decision: an argument of a basis (or the network output)
/// choosing a node from its source range.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub(crate) sources: Range<usize>,
    pub(crate) logits: Range<usize>,
}

/// A choice of source node for every slot of the network
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path(Vec<usize>);

impl Path {
    pub fn choices(&self) -> &[usize] {
        &self.0
    }
}

/// A sampled path together with the expression it encodes
#[derive(Debug, Clone)]
pub struct Function {
    path: Path,
    expr: Expr,
    /// Slots reachable from the output
    used: Vec<bool>,
}

impl Function {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

/// Probabilistic network over a directed acyclic graph of basis functions.
///
/// Nodes are numbered globally: the inputs come first, followed by the outputs
/// of each layer in order. Every basis argument, and the single network output,
/// owns a logit vector over its source nodes. Sampling a node per argument with
/// probabilities `softmax(logits / temperature)` yields a [Path]; tracing the
/// path back from the output yields the symbolic [Expr] it represents.
pub struct Network {
    pub(crate) input_size: usize,
    pub(crate) layers: Vec<Vec<Basis>>,
    pub(crate) skip_connections: bool,
    pub(crate) slots: Vec<Slot>,
    /// First slot of each (layer, basis); arguments are consecutive
    pub(crate) basis_slots: Vec<Vec<usize>>,
    pub(crate) output_slot: usize,
    /// (layer, basis) owning each non-input node
    pub(crate) node_owner: Vec<(usize, usize)>,
    pub(crate) constant_index: Vec<Vec<Option<usize>>>,
    pub(crate) weights: Array1<f64>,
    pub(crate) constants: Vec<f64>,
    pub(crate) sparsifier: Box<dyn Sparsifier>,
    pub(crate) loss: CrossEntropyLoss,
    pub(crate) learning_rate: f64,
    pub(crate) constant_learning_rate: f64,
    pub(crate) temp: f64,
    pub(crate) end_temp: f64,
    pub(crate) equalization: usize,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("input_size", &self.input_size)
            .field("layers", &self.layers)
            .field("skip_connections", &self.skip_connections)
            .field("total_constants", &self.constants.len())
            .field("loss", &self.loss)
            .finish_non_exhaustive()
    }
}

impl Network {
    /// Start building a network with `input_size` variables and the given layers of bases
    pub fn builder(input_size: usize, layers: Vec<Vec<Basis>>) -> NetworkBuilder {
        NetworkBuilder::new(input_size, layers)
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn layers(&self) -> &[Vec<Basis>] {
        &self.layers
    }

    pub fn skip_connections(&self) -> bool {
        self.skip_connections
    }

    pub fn loss(&self) -> &CrossEntropyLoss {
        &self.loss
    }

    pub fn equalization(&self) -> usize {
        self.equalization
    }

    /// Number of sampling slots, the output slot included
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn total_constants(&self) -> usize {
        self.constants.len()
    }

    pub fn constants(&self) -> &[f64] {
        &self.constants
    }

    pub fn set_constants(&mut self, constants: Vec<f64>) -> Result<(), SirFitError> {
        if constants.len() != self.constants.len() {
            return Err(SirFitError::ConstantCount {
                expected: self.constants.len(),
                found: constants.len(),
            });
        }
        self.constants = constants;
        Ok(())
    }

    /// Linear annealing from `temp` to `end_temp` over `epochs`
    pub fn temperature(&self, epoch: usize, epochs: usize) -> f64 {
        if epochs <= 1 {
            return self.temp;
        }
        let frac = epoch as f64 / (epochs - 1) as f64;
        self.temp + (self.end_temp - self.temp) * frac
    }

    /// Per-slot edge probabilities at `temperature`, laid out like the weights
    pub fn probabilities(&self, temperature: f64) -> Array1<f64> {
        let mut probs = Array1::zeros(self.weights.len());
        for slot in &self.slots {
            let logits = self.weights.slice(s![slot.logits.clone()]);
            let max = logits.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            let mut segment = probs.slice_mut(s![slot.logits.clone()]);
            for (p, w) in segment.iter_mut().zip(logits.iter()) {
                *p = ((w - max) / temperature).exp();
            }
            let total: f64 = segment.sum();
            segment.mapv_inplace(|p| p / total);

            self.sparsifier.sparsify(segment.view_mut());
            let kept: f64 = segment.sum();
            segment.mapv_inplace(|p| p / kept);
        }
        probs
    }

    /// Draw one path from the edge probabilities
    pub fn sample<R: Rng + ?Sized>(&self, probs: &Array1<f64>, rng: &mut R) -> Path {
        let choices = self
            .slots
            .iter()
            .map(|slot| {
                let u: f64 = rng.random();
                let mut acc = 0.0;
                let n = slot.logits.len();
                for (k, idx) in slot.logits.clone().enumerate() {
                    acc += probs[idx];
                    if u < acc {
                        return k;
                    }
                }
                // Rounding left u above the cumulative sum, take the last eligible edge
                (0..n)
                    .rev()
                    .find(|&k| probs[slot.logits.start + k] > 0.0)
                    .unwrap_or(n - 1)
            })
            .collect();
        Path(choices)
    }

    /// The path taking the most probable edge of every slot
    pub fn most_probable(&self, temperature: f64) -> Function {
        let probs = self.probabilities(temperature);
        let choices = self
            .slots
            .iter()
            .map(|slot| {
                slot.logits
                    .clone()
                    .enumerate()
                    .max_by(|a, b| probs[a.1].total_cmp(&probs[b.1]))
                    .map_or(0, |(k, _)| k)
            })
            .collect();
        self.trace(Path(choices))
    }

    /// Build a function from explicit choices, one per slot
    pub fn function(&self, choices: Vec<usize>) -> Result<Function, SirFitError> {
        if choices.len() != self.slots.len() {
            return Err(SirFitError::InvalidConfig(format!(
                "a path needs {} choices, got {}",
                self.slots.len(),
                choices.len()
            )));
        }
        for (slot, choice) in self.slots.iter().zip(&choices) {
            if *choice >= slot.sources.len() {
                return Err(SirFitError::InvalidConfig(format!(
                    "choice {} is out of range for a slot with {} sources",
                    choice,
                    slot.sources.len()
                )));
            }
        }
        Ok(self.trace(Path(choices)))
    }

    /// Resolve a path into its expression and the slots it actually uses
    pub fn trace(&self, path: Path) -> Function {
        let mut used = vec![false; self.slots.len()];
        used[self.output_slot] = true;
        let output = &self.slots[self.output_slot];
        let node = output.sources.start + path.0[self.output_slot];
        let expr = self.node_expr(node, &path, &mut used);
        Function { path, expr, used }
    }

    fn node_expr(&self, node: usize, path: &Path, used: &mut [bool]) -> Expr {
        if node < self.input_size {
            return Expr::Variable(node);
        }
        let (layer, basis_idx) = self.node_owner[node - self.input_size];
        let basis = self.layers[layer][basis_idx];
        let first = self.basis_slots[layer][basis_idx];
        let args = (0..basis.arity())
            .map(|a| {
                let slot = first + a;
                used[slot] = true;
                let source = self.slots[slot].sources.start + path.0[slot];
                self.node_expr(source, path, used)
            })
            .collect();
        Expr::Apply {
            basis,
            constant: self.constant_index[layer][basis_idx],
            args,
        }
    }

    /// Log-probability of a function: the sum over the slots it uses
    pub fn log_probability(&self, function: &Function, probs: &Array1<f64>) -> f64 {
        self.slots
            .iter()
            .zip(function.path.0.iter())
            .zip(function.used.iter())
            .filter(|(_, used)| **used)
            .map(|((slot, choice), _)| probs[slot.logits.start + choice].ln())
            .sum()
    }

    /// Add the gradient of `-weight * log p(function)` with respect to the logits.
    ///
    /// `probs` must come from [Network::probabilities] at the same temperature.
    /// A slot's probabilities are a softmax renormalized over the edges its
    /// sparsifier kept, so pruned edges receive no gradient and the result is
    /// exact wherever the kept set does not change.
    pub(crate) fn accumulate_gradient(
        &self,
        grad: &mut Array1<f64>,
        function: &Function,
        probs: &Array1<f64>,
        weight: f64,
        temperature: f64,
    ) {
        for ((slot, choice), used) in self
            .slots
            .iter()
            .zip(function.path.0.iter())
            .zip(function.used.iter())
        {
            if !used {
                continue;
            }
            for (k, idx) in slot.logits.clone().enumerate() {
                if probs[idx] == 0.0 {
                    continue;
                }
                let indicator = if k == *choice { 1.0 } else { 0.0 };
                grad[idx] -= weight * (indicator - probs[idx]) / temperature;
            }
        }
    }
}

/// Builder for [Network]
pub struct NetworkBuilder {
    input_size: usize,
    layers: Vec<Vec<Basis>>,
    skip_connections: bool,
    sparsifier: Box<dyn Sparsifier>,
    loss: Option<CrossEntropyLoss>,
    learning_rate: f64,
    constant_learning_rate: f64,
    temp: f64,
    end_temp: f64,
    equalization: usize,
}

impl NetworkBuilder {
    pub fn new(input_size: usize, layers: Vec<Vec<Basis>>) -> Self {
        Self {
            input_size,
            layers,
            skip_connections: true,
            sparsifier: Box::new(NoSparse),
            loss: None,
            learning_rate: 1.0,
            constant_learning_rate: 0.05,
            temp: 10.0,
            end_temp: 10.0,
            equalization: 0,
        }
    }

    pub fn skip_connections(mut self, skip: bool) -> Self {
        self.skip_connections = skip;
        self
    }

    pub fn sparsifier(mut self, sparsifier: impl Sparsifier + 'static) -> Self {
        self.sparsifier = Box::new(sparsifier);
        self
    }

    pub fn loss(mut self, loss: CrossEntropyLoss) -> Self {
        self.loss = Some(loss);
        self
    }

    pub fn learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = rate;
        self
    }

    pub fn constant_learning_rate(mut self, rate: f64) -> Self {
        self.constant_learning_rate = rate;
        self
    }

    /// Initial and final sampling temperature
    pub fn temperature(mut self, temp: f64, end_temp: f64) -> Self {
        self.temp = temp;
        self.end_temp = end_temp;
        self
    }

    /// Number of initial epochs spent flattening the distribution over functions
    pub fn equalization(mut self, epochs: usize) -> Self {
        self.equalization = epochs;
        self
    }

    pub fn build(self) -> Result<Network, SirFitError> {
        if self.input_size == 0 {
            return Err(SirFitError::InvalidConfig(
                "the network needs at least one input".to_string(),
            ));
        }
        if self.layers.is_empty() || self.layers.iter().any(Vec::is_empty) {
            return Err(SirFitError::InvalidConfig(
                "every layer needs at least one basis".to_string(),
            ));
        }
        if !(self.temp > 0.0 && self.end_temp > 0.0) {
            return Err(SirFitError::InvalidConfig(format!(
                "temperatures must be positive, got {} and {}",
                self.temp, self.end_temp
            )));
        }
        if !(self.learning_rate >= 0.0 && self.constant_learning_rate >= 0.0) {
            return Err(SirFitError::InvalidConfig(
                "learning rates must be non-negative".to_string(),
            ));
        }
        let loss = match self.loss {
            Some(loss) => loss,
            None => CrossEntropyLoss::new(1.0, 1)?,
        };

        // Start of each layer's output block in the global node numbering
        let mut block_start = Vec::with_capacity(self.layers.len() + 1);
        let mut offset = self.input_size;
        for layer in &self.layers {
            block_start.push(offset);
            offset += layer.len();
        }
        block_start.push(offset);

        let sources = |layer: usize| -> Range<usize> {
            if self.skip_connections {
                0..block_start[layer]
            } else if layer == 0 {
                0..self.input_size
            } else {
                block_start[layer - 1]..block_start[layer]
            }
        };

        let mut slots = Vec::new();
        let mut basis_slots = Vec::with_capacity(self.layers.len());
        let mut node_owner = Vec::new();
        let mut constant_index = Vec::with_capacity(self.layers.len());
        let mut nlogits = 0;
        let mut nconstants = 0;

        for (l, layer) in self.layers.iter().enumerate() {
            let src = sources(l);
            let mut firsts = Vec::with_capacity(layer.len());
            let mut consts = Vec::with_capacity(layer.len());
            for (b, basis) in layer.iter().enumerate() {
                firsts.push(slots.len());
                for _ in 0..basis.arity() {
                    slots.push(Slot {
                        sources: src.clone(),
                        logits: nlogits..nlogits + src.len(),
                    });
                    nlogits += src.len();
                }
                consts.push(basis.has_constant().then(|| {
                    nconstants += 1;
                    nconstants - 1
                }));
                node_owner.push((l, b));
            }
            basis_slots.push(firsts);
            constant_index.push(consts);
        }

        let src = sources(self.layers.len());
        let output_slot = slots.len();
        slots.push(Slot {
            sources: src.clone(),
            logits: nlogits..nlogits + src.len(),
        });
        nlogits += src.len();

        Ok(Network {
            input_size: self.input_size,
            layers: self.layers,
            skip_connections: self.skip_connections,
            slots,
            basis_slots,
            output_slot,
            node_owner,
            constant_index,
            weights: Array1::zeros(nlogits),
            constants: vec![0.0; nconstants],
            sparsifier: self.sparsifier,
            loss,
            learning_rate: self.learning_rate,
            constant_learning_rate: self.constant_learning_rate,
            temp: self.temp,
            end_temp: self.end_temp,
            equalization: self.equalization,
        })
    }
}
