//! Type definitions for the churn risk service

pub mod prediction;
pub mod record;

pub use prediction::{PredictionResult, RiskTier};
pub use record::{Column, ColumnData, Frame, RawRecord};
