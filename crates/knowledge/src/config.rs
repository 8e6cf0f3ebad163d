//! On-disk layout of the tier indexes.
//!
//! Every tier lives in its own directory under the storage root:
//!
//! ```text
//! <storage>/<index_dir>/index.sqlite
//! <storage>/<index_dir>/sources.jsonl
//! <storage>/<index_dir>/scraped_content/<hash>.txt
//! ```

use kbqa_core::TierConfig;
use std::path::{Path, PathBuf};

/// Get the directory of a tier.
pub fn get_tier_dir(storage: &Path, tier: &TierConfig) -> PathBuf {
    storage.join(&tier.index_dir)
}

/// Get the SQLite index path for a tier.
pub fn get_index_path(storage: &Path, tier: &TierConfig) -> PathBuf {
    get_tier_dir(storage, tier).join("index.sqlite")
}

/// Get the sources JSONL path for a tier.
pub fn get_sources_path(storage: &Path, tier: &TierConfig) -> PathBuf {
    get_tier_dir(storage, tier).join("sources.jsonl")
}

/// Get the directory holding the cleaned text of scraped pages.
pub fn get_scraped_content_dir(storage: &Path, tier: &TierConfig) -> PathBuf {
    get_tier_dir(storage, tier).join("scraped_content")
}
