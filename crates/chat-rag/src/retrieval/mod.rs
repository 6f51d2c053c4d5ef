//! Context retrieval for prompt augmentation

mod retriever;

pub use retriever::{filter_by_distance, Retriever};
