//! Churn prediction pipeline

mod features;
mod inference;
mod orchestrator;
mod output;
mod preprocess;
pub(crate) mod schema;

pub use features::{
    normalize_field_names, FeatureEngineer, DERIVED_FEATURES, INCOME_CATEGORY_DEFAULT,
    MARITAL_STATUS_DEFAULT, UNKNOWN_SENTINEL,
};
pub use inference::{InferenceEngine, Scored};
pub use orchestrator::{ChurnPredictor, PipelineConfig, RequestShape};
pub use output::{OutputFormatter, LABEL_COLUMN, PROBA_CHURN_COLUMN, PROBA_NON_CHURN_COLUMN};
pub use preprocess::{PreprocessorAdapter, TransformOutcome};
pub use schema::{
    SchemaValidator, CARD_CATEGORIES, EDUCATION_LEVELS, FIELD_NAMES, GENDERS, INCOME_CATEGORIES,
    MARITAL_STATUSES,
};
