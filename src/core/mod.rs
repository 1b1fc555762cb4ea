pub mod clv;
pub mod conjoint;
pub mod design;
pub mod engine;
pub mod factor;
pub mod inference;
pub mod linalg;
pub mod logit;
pub mod optimize;
pub mod plots;
pub mod source;

pub use crate::domain::model::{AnalysisReport, Artifact, Table};
pub use crate::domain::ports::{Analysis, Storage};
pub use crate::utils::error::Result;
