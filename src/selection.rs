use crate::clip::ClipDescriptor;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Trait for the different ways of picking the next clip
pub trait ClipSelector: Debug {
    fn select_next<'a>(
        &mut self,
        clips: &'a [ClipDescriptor],
        previous_id: Option<&str>,
        rng: &mut dyn RngCore,
    ) -> Option<&'a ClipDescriptor>;
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SelectionStrategy {
    #[default]
    Uniform,
    ShuffleBag,
    Sequential,
}

impl SelectionStrategy {
    pub fn selector(&self) -> Box<dyn ClipSelector> {
        match self {
            SelectionStrategy::Uniform => Box::new(UniformSelector),
            SelectionStrategy::ShuffleBag => Box::new(ShuffleBagSelector::default()),
            SelectionStrategy::Sequential => Box::new(SequentialSelector),
        }
    }
}

/// Uniform draw; a draw that repeats the previous clip moves on to the next
/// index instead of redrawing.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformSelector;

impl ClipSelector for UniformSelector {
    fn select_next<'a>(
        &mut self,
        clips: &'a [ClipDescriptor],
        previous_id: Option<&str>,
        rng: &mut dyn RngCore,
    ) -> Option<&'a ClipDescriptor> {
        if clips.is_empty() {
            return None;
        }
        let mut idx = rng.gen_range(0..clips.len());
        if clips.len() > 1 && previous_id == Some(clips[idx].id.as_str()) {
            idx = (idx + 1) % clips.len();
        }
        clips.get(idx)
    }
}

/// Walks the manifest in order, wrapping around.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialSelector;

impl ClipSelector for SequentialSelector {
    fn select_next<'a>(
        &mut self,
        clips: &'a [ClipDescriptor],
        previous_id: Option<&str>,
        _rng: &mut dyn RngCore,
    ) -> Option<&'a ClipDescriptor> {
        let next = previous_id
            .and_then(|prev| clips.iter().position(|c| c.id == prev))
            .map_or(0, |idx| idx + 1);
        clips.get(next % clips.len().max(1))
    }
}

/// Without-replacement bag: every clip shows once before any repeats.
#[derive(Debug, Clone, Default)]
pub struct ShuffleBagSelector {
    bag: Vec<usize>,
    manifest_len: usize,
}

impl ShuffleBagSelector {
    fn refill(&mut self, len: usize, rng: &mut dyn RngCore) {
        self.manifest_len = len;
        self.bag = (0..len).collect();
        self.bag.shuffle(rng);
    }
}

impl ClipSelector for ShuffleBagSelector {
    fn select_next<'a>(
        &mut self,
        clips: &'a [ClipDescriptor],
        previous_id: Option<&str>,
        rng: &mut dyn RngCore,
    ) -> Option<&'a ClipDescriptor> {
        if clips.is_empty() {
            return None;
        }
        if self.bag.is_empty() || self.manifest_len != clips.len() {
            self.refill(clips.len(), rng);
            // Don't let a fresh bag start with the clip that just played.
            if let (Some(prev), Some(&last)) = (previous_id, self.bag.last()) {
                if clips.len() > 1 && clips[last].id == prev {
                    let end = self.bag.len() - 1;
                    self.bag.swap(0, end);
                }
            }
        }
        self.bag.pop().and_then(|idx| clips.get(idx))
    }
}
