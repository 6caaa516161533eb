//! Recommendation Module
//!
//! SAR (Simple Algorithm for Recommendation): item-to-item collaborative
//! filtering driven by co-occurrence.
//!
//! ## Architecture
//!
//! 1. **Interactions** - Validate the interaction table and index users and items
//! 2. **Affinity** - Weight each user's interactions (rating, binary, time decay)
//! 3. **Similarity** - Item-item co-occurrence rescaled by the configured metric
//! 4. **Engine** - Score `affinity × similarity` and rank the top K per user
//! 5. **Updater** - Batch job storing top-K lists for the API
//!
//! ## Similarity Metrics
//!
//! With `co[i,j]` the number of users who touched both items:
//! - **Cooccurrence**: `co[i,j]`
//! - **Jaccard**: `co[i,j] / (co[i,i] + co[j,j] - co[i,j])`
//! - **Lift**: `co[i,j] / (co[i,i] * co[j,j])`
//! - **Cosine**: `co[i,j] / sqrt(co[i,i] * co[j,j])`

pub mod affinity;
pub mod engine;
pub mod interactions;
pub mod metrics;
pub mod model_config;
pub mod similarity;
pub mod updater;

pub use engine::{Recommendation, Sar, SimilarItem};
pub use metrics::FitSummary;
pub use model_config::{ColumnNames, SarConfig};
pub use similarity::SimilarityType;
