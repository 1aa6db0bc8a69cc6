//! Probability-forest ensemble for binary detection data.
//!
//! Grows CART trees on bootstrap samples with random covariate subsets,
//! stores the detection rate at each leaf, and averages leaf rates across
//! trees to estimate an encounter probability. Training is parallel via
//! rayon and reproducible from a single seed. Also provides impurity-based
//! covariate importance and out-of-bag predictions.

mod config;
mod error;
mod forest;
mod importance;
mod node;
mod oob;
mod predict;
mod result;
mod split;
mod tree;

pub use config::{ForestConfig, MaxFeatures, OobMode};
pub use error::ForestError;
pub use forest::TrainedEnsemble;
pub use importance::RankedCovariate;
pub use node::{CovariateIndex, Impurity, Node, NodeIndex};
pub use oob::OobPredictions;
pub use result::{ForestFit, TrainingMetadata};
pub use split::SplitCriterion;
pub use tree::{DetectionTree, TreeConfig};
