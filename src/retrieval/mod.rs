//! Retrieval post-processing: similarity thresholds, outlier trimming,
//! and query augmentation with citation references.

mod augment;
mod filter;

pub use augment::{augment_query, DocReference, MAX_AUGMENT_DOCS};
pub use filter::{
    dedup_by_cid, document_threshold, metadata_threshold, outlier_filter, threshold_filter,
};
