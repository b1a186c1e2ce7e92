//! # Parameter Bookkeeping
//!
//! Layers accumulate the learnable tensors of everything upstream of them. A
//! [`ParameterSet`] is a persistent list: composing a layer appends one shared segment
//! on top of its predecessor's set instead of copying it, so long chains stay cheap and
//! every earlier layer keeps seeing exactly its own prefix.
//!
//! Entries are deduplicated by [`ParamId`], keeping the first occurrence.

use std::{collections::HashSet, fmt, sync::Arc};

use burn::{
    module::{Param, ParamId},
    prelude::*,
};

/// A learnable tensor of any rank the layers produce.
#[derive(Clone, Debug)]
pub enum LayerParam<B: Backend> {
    Rank1(Param<Tensor<B, 1>>),
    Rank2(Param<Tensor<B, 2>>),
    Rank3(Param<Tensor<B, 3>>),
    Rank4(Param<Tensor<B, 4>>),
}

impl<B: Backend> LayerParam<B> {
    /// Identity used for deduplication.
    pub fn id(&self) -> ParamId {
        match self {
            Self::Rank1(param) => param.id,
            Self::Rank2(param) => param.id,
            Self::Rank3(param) => param.id,
            Self::Rank4(param) => param.id,
        }
    }

    pub fn dims(&self) -> Vec<usize> {
        match self {
            Self::Rank1(param) => param.dims().to_vec(),
            Self::Rank2(param) => param.dims().to_vec(),
            Self::Rank3(param) => param.dims().to_vec(),
            Self::Rank4(param) => param.dims().to_vec(),
        }
    }

    /// Number of scalar elements.
    pub fn num_elements(&self) -> usize {
        self.dims().iter().product()
    }
}

macro_rules! impl_from_param {
    ($rank:literal, $variant:ident) => {
        impl<B: Backend> From<Param<Tensor<B, $rank>>> for LayerParam<B> {
            fn from(param: Param<Tensor<B, $rank>>) -> Self {
                Self::$variant(param)
            }
        }
    };
}

impl_from_param!(1, Rank1);
impl_from_param!(2, Rank2);
impl_from_param!(3, Rank3);
impl_from_param!(4, Rank4);

struct Segment<B: Backend> {
    params: Vec<LayerParam<B>>,
    parent: Option<Arc<Segment<B>>>,
}

/// Ordered, duplicate-free, structurally shared list of [`LayerParam`]s.
pub struct ParameterSet<B: Backend> {
    tail: Option<Arc<Segment<B>>>,
    len: usize,
}

impl<B: Backend> ParameterSet<B> {
    /// An empty set.
    pub const fn new() -> Self {
        Self { tail: None, len: 0 }
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Parameters in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &LayerParam<B>> {
        let mut segments = Vec::new();
        let mut cursor = self.tail.as_deref();
        while let Some(segment) = cursor {
            segments.push(segment);
            cursor = segment.parent.as_deref();
        }
        segments
            .into_iter()
            .rev()
            .flat_map(|segment| segment.params.iter())
    }

    pub fn ids(&self) -> Vec<ParamId> {
        self.iter().map(LayerParam::id).collect()
    }

    pub fn contains(&self, id: ParamId) -> bool {
        self.iter().any(|param| param.id() == id)
    }

    /// Total number of scalar elements across all parameters.
    pub fn num_elements(&self) -> usize {
        self.iter().map(LayerParam::num_elements).sum()
    }

    /// Returns `self` followed by those of `new_params` not already present.
    ///
    /// `self` is left untouched and shared with the result.
    pub fn compose(&self, new_params: impl IntoIterator<Item = LayerParam<B>>) -> Self {
        let mut seen: HashSet<ParamId> = self.iter().map(LayerParam::id).collect();
        let fresh: Vec<_> = new_params
            .into_iter()
            .filter(|param| seen.insert(param.id()))
            .collect();
        if fresh.is_empty() {
            return self.clone();
        }

        Self {
            len: self.len + fresh.len(),
            tail: Some(Arc::new(Segment {
                params: fresh,
                parent: self.tail.clone(),
            })),
        }
    }

    /// Union in first-seen order: `self`, then the entries of `other` not in `self`.
    pub fn merge(&self, other: &Self) -> Self {
        self.compose(other.iter().cloned())
    }

    /// Whether `self` extends `prefix` without copying it.
    pub fn shares_prefix(&self, prefix: &Self) -> bool {
        let Some(target) = prefix.tail.as_ref() else {
            return true;
        };
        let mut cursor = self.tail.as_ref();
        while let Some(segment) = cursor {
            if Arc::ptr_eq(segment, target) {
                return true;
            }
            cursor = segment.parent.as_ref();
        }
        false
    }
}

impl<B: Backend> Clone for ParameterSet<B> {
    fn clone(&self) -> Self {
        Self {
            tail: self.tail.clone(),
            len: self.len,
        }
    }
}

impl<B: Backend> Default for ParameterSet<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> fmt::Debug for ParameterSet<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|param| (param.id(), param.dims())))
            .finish()
    }
}

impl<B: Backend> FromIterator<LayerParam<B>> for ParameterSet<B> {
    fn from_iter<I: IntoIterator<Item = LayerParam<B>>>(iter: I) -> Self {
        Self::new().compose(iter)
    }
}
