//! # Layer Abstraction
//!
//! A [`Layer`] is a node in a feed-forward chain: the channel-last tensor it produced,
//! every learnable tensor that fed into it, and the dropout keep-probabilities
//! registered upstream. Layers are immutable; building a new layer returns a new node
//! whose [`ParameterSet`] shares its predecessor's.

use std::collections::BTreeMap;

use burn::{prelude::*, tensor::TensorData};

use crate::{
    error::{DeformError, DeformResult},
    params::{LayerParam, ParameterSet},
};

/// Identity activation.
pub fn identity<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x
}

/// Dropout keep-probabilities keyed by the name they were registered under.
///
/// The pipeline never interprets the entries; it only carries them forward and merges
/// them when two branches join, later entries winning.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DropMap {
    entries: BTreeMap<String, f64>,
}

impl DropMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, keep_prob: f64) -> Option<f64> {
        self.entries.insert(key.into(), keep_prob)
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(key, prob)| (key.as_str(), *prob))
    }

    /// `self` updated with every entry of `other`.
    pub fn merge(&self, other: &Self) -> Self {
        let mut entries = self.entries.clone();
        entries.extend(other.entries.iter().map(|(k, v)| (k.clone(), *v)));
        Self { entries }
    }
}

/// Output of one stage of a network, with everything accumulated upstream.
#[derive(Clone, Debug)]
pub struct Layer<B: Backend> {
    name: String,
    outputs: Tensor<B, 4>,
    params: ParameterSet<B>,
    drop: DropMap,
}

impl<B: Backend> Layer<B> {
    /// A root layer wrapping a `[N, H, W, C]` tensor.
    pub fn input(name: impl Into<String>, outputs: Tensor<B, 4>) -> Self {
        Self {
            name: name.into(),
            outputs,
            params: ParameterSet::new(),
            drop: DropMap::new(),
        }
    }

    /// A root layer from host data of shape `[H, W, C]` or `[N, H, W, C]`.
    ///
    /// Rank-3 data gets a batch axis of one.
    pub fn from_data(
        name: impl Into<String>,
        data: TensorData,
        device: &B::Device,
    ) -> DeformResult<Self> {
        let outputs = match data.shape.len() {
            3 => Tensor::<B, 3>::from_data(data, device).unsqueeze::<4>(),
            4 => Tensor::<B, 4>::from_data(data, device),
            rank => return Err(DeformError::UnsupportedRank { rank }),
        };
        Ok(Self::input(name, outputs))
    }

    /// Builds the node that follows `prev`: new outputs, `prev`'s parameters plus
    /// `new_params`, and `prev`'s drop map.
    pub fn compose(
        prev: &Self,
        name: impl Into<String>,
        outputs: Tensor<B, 4>,
        new_params: impl IntoIterator<Item = LayerParam<B>>,
    ) -> Self {
        Self {
            name: name.into(),
            outputs,
            params: prev.params.compose(new_params),
            drop: prev.drop.clone(),
        }
    }

    /// Pulls in the parameters and drop entries of a side branch (for example an
    /// offset predictor built on top of `self`) that `self` does not already have.
    pub fn absorb(&self, branch: &Self) -> Self {
        Self {
            name: self.name.clone(),
            outputs: self.outputs.clone(),
            params: self.params.merge(&branch.params),
            drop: self.drop.merge(&branch.drop),
        }
    }

    /// Registers a dropout keep-probability on this node.
    pub fn with_drop(mut self, key: impl Into<String>, keep_prob: f64) -> Self {
        self.drop.insert(key, keep_prob);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn outputs(&self) -> &Tensor<B, 4> {
        &self.outputs
    }

    pub fn into_outputs(self) -> Tensor<B, 4> {
        self.outputs
    }

    pub const fn params(&self) -> &ParameterSet<B> {
        &self.params
    }

    pub const fn drop_map(&self) -> &DropMap {
        &self.drop
    }

    /// `[N, H, W, C]` of the outputs.
    pub fn dims(&self) -> [usize; 4] {
        self.outputs.dims()
    }

    /// Trailing (channel) dimension of the outputs.
    pub fn channels(&self) -> usize {
        self.dims()[3]
    }
}
