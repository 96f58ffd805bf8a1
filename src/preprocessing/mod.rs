//! Feature preprocessing: log transforms and normalization

mod scaler;
mod transforms;

pub use scaler::Normalization;
pub use transforms::{log_offset, log_transform_all, FeatureTransformer};
