pub mod indicators;

pub use indicators::{AlertRecord, Category, IndicatorSample};
