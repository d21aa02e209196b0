// Structure-preserving copies between a local directory tree and Drive.
//
// Uploads are fail-fast: the first failure stops the walk and the error
// carries the entries that did complete. Downloads are best-effort: items
// whose metadata cannot be read are skipped, failed transfers are recorded
// on their node and the walk moves on.

use crate::error::{DriveError, DriveResult};
use crate::progress::Progress;
use crate::scan::{enter_local, enter_remote, local_metadata, read_children, scan_local, scan_remote};
use crate::transport::DriveTransport;
use crate::tree::{EntryKind, MirrorNode, RemoteEntry};
use indicatif::HumanBytes;
use log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

pub struct Mirror<'a, T: DriveTransport + ?Sized> {
    transport: &'a T,
    progress: &'a dyn Progress,
    chunk_size: usize,
    max_depth: usize,
}

impl<'a, T: DriveTransport + ?Sized> Mirror<'a, T> {
    pub fn new(transport: &'a T, progress: &'a dyn Progress, chunk_size: usize, max_depth: usize) -> Self {
        Mirror {
            transport,
            progress,
            chunk_size,
            max_depth,
        }
    }

    /// Upload files and directory trees under `destination` (`None` is the
    /// account root). Children are visited in name order.
    pub fn mirror_upload<P: AsRef<Path>>(
        &self,
        paths: &[P],
        destination: Option<&str>,
    ) -> DriveResult<MirrorNode> {
        let paths: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        let totals = scan_local(&paths, self.max_depth)?;
        info!(
            "Total need to upload: {} files, {} folders, ( {} )",
            totals.file_count,
            totals.folder_count,
            HumanBytes(totals.total_bytes)
        );

        let mut root = MirrorNode::folder(
            self.destination_name(destination),
            destination.unwrap_or("root"),
        );
        match self.upload_level(&paths, destination, &mut root, &mut Vec::new()) {
            Ok(()) => Ok(root),
            Err(source) => Err(DriveError::MirrorAborted {
                partial: Box::new(root),
                source: Box::new(source),
            }),
        }
    }

    fn destination_name(&self, destination: Option<&str>) -> String {
        match destination {
            None => "root".to_string(),
            Some(id) => self
                .transport
                .get_metadata(id)
                .map(|meta| meta.name)
                .unwrap_or_else(|_| id.to_string()),
        }
    }

    fn upload_level(
        &self,
        paths: &[PathBuf],
        parent: Option<&str>,
        node: &mut MirrorNode,
        ancestors: &mut Vec<PathBuf>,
    ) -> DriveResult<()> {
        let total = paths.len();
        for (n, path) in paths.iter().enumerate() {
            let meta = local_metadata(path)?;
            let name = base_name(path);
            if meta.is_file() {
                info!("Upload Progress: [ {} / {} ] {}", n + 1, total, path.display());
                let id = self
                    .transport
                    .upload_file(path, &name, parent, self.chunk_size, self.progress)
                    .map_err(|e| DriveError::remote(path.display().to_string(), e))?;
                node.children.push(MirrorNode::file(name, id));
            } else if meta.is_dir() {
                let Some(real) = enter_local(path, ancestors, self.max_depth)? else {
                    continue;
                };
                let id = self
                    .transport
                    .create_folder(&name, parent)
                    .map_err(|e| DriveError::remote(path.display().to_string(), e))?;
                let children = read_children(path)?;
                let mut folder = MirrorNode::folder(name, id.clone());
                ancestors.push(real);
                let result = self.upload_level(&children, Some(&id), &mut folder, ancestors);
                ancestors.pop();
                node.children.push(folder);
                result?;
            }
        }
        Ok(())
    }

    /// Download remote files and folders into `dest_dir`, which is created
    /// if needed. Per-item failures are reported on the returned tree.
    pub fn mirror_download<S: AsRef<str>>(&self, ids: &[S], dest_dir: &Path) -> DriveResult<MirrorNode> {
        fs::create_dir_all(dest_dir)?;
        let ids: Vec<String> = ids.iter().map(|s| s.as_ref().to_string()).collect();
        match scan_remote(self.transport, &ids, self.max_depth) {
            Ok(totals) => info!(
                "Total need to download: {} files, {} folders, ( {} )",
                totals.file_count,
                totals.folder_count,
                HumanBytes(totals.total_bytes)
            ),
            Err(e) => warn!("Could not total the download: {}", e),
        }

        let label = dest_dir.display().to_string();
        let mut root = MirrorNode::folder(label.clone(), label);
        self.download_level(&ids, dest_dir, &mut root, &mut Vec::new());
        Ok(root)
    }

    fn download_level(
        &self,
        ids: &[String],
        dir: &Path,
        node: &mut MirrorNode,
        ancestors: &mut Vec<String>,
    ) {
        let total = ids.len();
        for (n, id) in ids.iter().enumerate() {
            let meta = match self.transport.get_metadata(id) {
                Ok(meta) => meta,
                Err(e) => {
                    error!("Failed to get metadata for file_id={}: {}", id, e);
                    continue;
                }
            };
            match meta.kind() {
                EntryKind::File => {
                    info!("Download Progress: [ {} / {} ] {}", n + 1, total, meta.name);
                    node.children.push(self.download_one(&meta, dir));
                }
                EntryKind::Folder => {
                    let folder = MirrorNode::folder(meta.name.clone(), id.clone());
                    match enter_remote(id, ancestors, self.max_depth) {
                        Ok(true) => {}
                        Ok(false) => continue,
                        Err(e) => {
                            node.children.push(folder.failed(e));
                            continue;
                        }
                    }
                    node.children.push(self.download_folder(folder, dir, ancestors));
                }
            }
        }
    }

    fn download_folder(&self, mut folder: MirrorNode, dir: &Path, ancestors: &mut Vec<String>) -> MirrorNode {
        let local = dir.join(local_name(&folder.name));
        if let Err(e) = fs::create_dir_all(&local) {
            error!("Cannot create {}: {}", local.display(), e);
            return folder.failed(e);
        }
        let children = match self.transport.list_children(&folder.id) {
            Ok(children) => children,
            Err(e) => {
                error!("Failed to list folder {}: {}", folder.id, e);
                return folder.failed(e);
            }
        };
        let child_ids: Vec<String> = children.into_iter().map(|c| c.id).collect();
        ancestors.push(folder.id.clone());
        self.download_level(&child_ids, &local, &mut folder, ancestors);
        ancestors.pop();
        folder
    }

    fn download_one(&self, meta: &RemoteEntry, dir: &Path) -> MirrorNode {
        let local = dir.join(local_name(&meta.name));
        let node = MirrorNode::file(meta.name.clone(), meta.id.clone());
        match self
            .transport
            .download_file(&meta.id, &local, self.chunk_size, self.progress)
        {
            Ok(_) => node,
            Err(e) => {
                error!("Download failed for file_id={}: {}", meta.id, e);
                discard_partial(&local);
                node.failed(e)
            }
        }
    }
}

pub(crate) fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Drive names may contain separators; keep every entry inside its parent.
pub(crate) fn local_name(remote_name: &str) -> String {
    let cleaned: String = remote_name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Remove what a failed download left behind.
pub(crate) fn discard_partial(path: &Path) {
    if path.is_file() {
        match fs::remove_file(path) {
            Ok(()) => warn!("Removed incomplete file {}", path.display()),
            Err(e) => warn!("Could not remove incomplete file {}: {}", path.display(), e),
        }
    }
}
