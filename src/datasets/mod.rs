//! Datasets
//!
//! Local MovieLens readers and train/test splitting.

pub mod movielens;
pub mod split;

pub use movielens::{load_items, load_ratings, read_items, read_ratings, with_item_metadata, ItemMetadata};
pub use split::{random_split, stratified_split};
