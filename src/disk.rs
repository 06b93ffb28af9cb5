//! Disk usage of backed-up working copies

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::fs::Metadata;
use std::path::Path;

/// Recursive disk usage of `path` in kilobytes, rounded up
///
/// Every entry is counted, including `.git` and ignored files. On Unix the
/// allocated block count is used so the figure matches `du -sk`.
pub fn directory_size_kb(path: &Path) -> Result<u64> {
    let walker = WalkBuilder::new(path)
        .standard_filters(false)
        .follow_links(false)
        .build();

    let mut bytes = 0u64;
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        let metadata = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?;
        bytes += allocated_bytes(&metadata);
    }

    Ok(bytes.div_ceil(1024))
}

#[cfg(unix)]
fn allocated_bytes(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.blocks() * 512
}

#[cfg(not(unix))]
fn allocated_bytes(metadata: &Metadata) -> u64 {
    metadata.len()
}
