// Tree accounting: count files, folders and bytes below a set of local
// paths or remote identifiers.
//
// Both walks carry the chain of folders currently being expanded. A folder
// that reappears inside itself (symlink loop, Drive folder filed under its
// own descendant) is skipped with a warning; `max_depth` bounds the rest.

use crate::error::{DriveError, DriveResult};
use crate::transport::DriveTransport;
use crate::tree::{EntryKind, TreeSummary};
use log::{info, warn};
use std::fs::{self, Metadata};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Summarize local paths. Fails with `NotFound` on the first missing path.
pub fn scan_local<P: AsRef<Path>>(paths: &[P], max_depth: usize) -> DriveResult<TreeSummary> {
    let paths: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
    scan_local_level(&paths, &mut Vec::new(), max_depth)
}

fn scan_local_level(
    paths: &[PathBuf],
    ancestors: &mut Vec<PathBuf>,
    max_depth: usize,
) -> DriveResult<TreeSummary> {
    let mut summary = TreeSummary::default();
    for path in paths {
        let meta = local_metadata(path)?;
        if meta.is_file() {
            summary += TreeSummary::file(meta.len());
        } else if meta.is_dir() {
            let Some(real) = enter_local(path, ancestors, max_depth)? else {
                continue;
            };
            summary += TreeSummary::folder();
            let children = read_children(path)?;
            ancestors.push(real);
            let sub = scan_local_level(&children, ancestors, max_depth);
            ancestors.pop();
            summary += sub?;
        }
    }
    Ok(summary)
}

/// Summarize remote items. Items whose metadata cannot be fetched are
/// logged and left out of the totals; a failed folder listing propagates.
pub fn scan_remote<T, S>(transport: &T, ids: &[S], max_depth: usize) -> DriveResult<TreeSummary>
where
    T: DriveTransport + ?Sized,
    S: AsRef<str>,
{
    let ids: Vec<String> = ids.iter().map(|s| s.as_ref().to_string()).collect();
    scan_remote_level(transport, &ids, &mut Vec::new(), max_depth)
}

fn scan_remote_level<T: DriveTransport + ?Sized>(
    transport: &T,
    ids: &[String],
    ancestors: &mut Vec<String>,
    max_depth: usize,
) -> DriveResult<TreeSummary> {
    let mut summary = TreeSummary::default();
    for id in ids {
        let meta = match transport.get_metadata(id) {
            Ok(meta) => meta,
            Err(e) => {
                info!("Skipping {} in totals, metadata unavailable: {}", id, e);
                continue;
            }
        };
        match meta.kind() {
            EntryKind::File => summary += TreeSummary::file(meta.size.unwrap_or(0)),
            EntryKind::Folder => {
                if !enter_remote(id, ancestors, max_depth)? {
                    continue;
                }
                summary += TreeSummary::folder();
                let children: Vec<String> = transport
                    .list_children(id)?
                    .into_iter()
                    .map(|entry| entry.id)
                    .collect();
                ancestors.push(id.clone());
                let sub = scan_remote_level(transport, &children, ancestors, max_depth);
                ancestors.pop();
                summary += sub?;
            }
        }
    }
    Ok(summary)
}

pub(crate) fn local_metadata(path: &Path) -> DriveResult<Metadata> {
    fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => DriveError::NotFound(path.to_path_buf()),
        _ => DriveError::Io(e),
    })
}

/// Immediate children of a directory as full paths, sorted by name so
/// walks are reproducible.
pub(crate) fn read_children(dir: &Path) -> DriveResult<Vec<PathBuf>> {
    let mut children = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    children.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(children)
}

/// Decide whether a local directory may be descended into. Returns its
/// canonical path, or `None` when it is one of its own ancestors.
pub(crate) fn enter_local(
    path: &Path,
    ancestors: &[PathBuf],
    max_depth: usize,
) -> DriveResult<Option<PathBuf>> {
    let real = fs::canonicalize(path)?;
    if ancestors.contains(&real) {
        warn!("Skipping {}: directory cycle back to {}", path.display(), real.display());
        return Ok(None);
    }
    if ancestors.len() >= max_depth {
        return Err(DriveError::DepthExceeded(path.display().to_string()));
    }
    Ok(Some(real))
}

/// Remote counterpart of [`enter_local`].
pub(crate) fn enter_remote(id: &str, ancestors: &[String], max_depth: usize) -> DriveResult<bool> {
    if ancestors.iter().any(|a| a == id) {
        warn!("Skipping folder {}: it contains itself", id);
        return Ok(false);
    }
    if ancestors.len() >= max_depth {
        return Err(DriveError::DepthExceeded(id.to_string()));
    }
    Ok(true)
}
