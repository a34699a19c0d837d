//! Cross-validation of computed rewards against a reference backend.

mod cross;

pub use cross::{compare_records, CrossValidationError, RecordField, RewardCrossValidator};
