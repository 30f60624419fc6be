use crate::config::Config;
use crate::error::{BmError, Result};
use crate::format::{Format, FormatAdapter};
use crate::tree::BookmarkTree;
use log::debug;
use std::path::Path;

/// Summary of a finished conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertReport {
    pub folders: usize,
    pub urls: usize,
    /// Revision of the tree that was written
    pub revision: u64,
}

impl ConvertReport {
    fn from_tree(tree: &BookmarkTree) -> Self {
        let (folders, urls) = tree.counts();
        Self {
            folders,
            urls,
            revision: tree.revision(),
        }
    }
}

fn ensure_writable(format: Format) -> Result<()> {
    if format.is_writable() {
        Ok(())
    } else {
        Err(BmError::UnsupportedOperation(format!(
            "{} is a read-only format",
            format
        )))
    }
}

/// Read a tree from `source` in the given format
pub fn read_tree(source: &Path, format: Format, config: &Config) -> Result<BookmarkTree> {
    format.adapter(config).read(source)
}

/// Validate and write a tree, marking it saved on success
pub fn write_tree(
    tree: &mut BookmarkTree,
    destination: &Path,
    format: Format,
    config: &Config,
) -> Result<()> {
    ensure_writable(format)?;
    tree.validate()?;
    format.adapter(config).write(tree, destination)?;
    tree.mark_saved();
    Ok(())
}

/// Convert `source` into `destination`
///
/// A read-only destination format is rejected before the source is opened,
/// and a failed read never touches the destination.
pub fn convert(
    source: &Path,
    source_format: Format,
    destination: &Path,
    destination_format: Format,
    config: &Config,
) -> Result<ConvertReport> {
    ensure_writable(destination_format)?;

    debug!(
        "Converting {} ({}) -> {} ({})",
        source.display(),
        source_format,
        destination.display(),
        destination_format
    );
    let mut tree = read_tree(source, source_format, config)?;
    write_tree(&mut tree, destination, destination_format, config)?;

    let report = ConvertReport::from_tree(&tree);
    debug!(
        "Converted {} folders and {} urls",
        report.folders, report.urls
    );
    Ok(report)
}
