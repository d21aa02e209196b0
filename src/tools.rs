// High level entry points: settings-driven defaults around the flat batch
// transfers, the tree mirrors and the scanners.

use crate::api::DriveClient;
use crate::auth;
use crate::error::{DriveError, DriveResult};
use crate::mirror::{base_name, discard_partial, local_name, Mirror};
use crate::progress::Progress;
use crate::scan;
use crate::settings::Settings;
use crate::transport::DriveTransport;
use crate::tree::{MirrorNode, TreeSummary};
use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};

pub struct DriveTools<T: DriveTransport = DriveClient> {
    settings: Settings,
    transport: T,
    progress: Box<dyn Progress>,
}

impl DriveTools<DriveClient> {
    /// Connect to Drive with the given settings (runs OAuth if needed).
    pub fn connect(settings: Settings, progress: Box<dyn Progress>) -> DriveResult<Self> {
        let transport = DriveClient::connect(&settings)?;
        Ok(DriveTools::new(settings, transport, progress))
    }

    /// Rebuild the client, optionally discarding the saved token first so
    /// the next connection re-authorizes.
    pub fn restart(&mut self, remove_token: bool) -> DriveResult<()> {
        if remove_token {
            auth::forget_token(&self.settings.google_drive)?;
        }
        self.transport = DriveClient::connect(&self.settings)?;
        Ok(())
    }
}

impl<T: DriveTransport> DriveTools<T> {
    pub fn new(settings: Settings, transport: T, progress: Box<dyn Progress>) -> Self {
        DriveTools {
            settings,
            transport,
            progress,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn mirror(&self, chunk_size: usize) -> Mirror<'_, T> {
        Mirror::new(
            &self.transport,
            self.progress.as_ref(),
            chunk_size,
            self.settings.max_depth,
        )
    }

    /// Upload individual files. Empty `files`/`save_names` and a `None`
    /// folder fall back to the `[upload]` settings. Returns
    /// `(local path, file id)` per file.
    pub fn upload(
        &self,
        files: &[PathBuf],
        save_names: &[String],
        folder_id: Option<&str>,
    ) -> DriveResult<Vec<(PathBuf, String)>> {
        let cfg = &self.settings.upload;
        let files = if files.is_empty() { &cfg.local_file[..] } else { files };
        let save_names = if save_names.is_empty() { &cfg.save_file_name[..] } else { save_names };
        let folder_id = folder_id.or(cfg.save_folder_id.as_deref());

        if files.is_empty() {
            return Err(DriveError::Config("no local files to upload".into()));
        }
        let names: Vec<String> = if save_names.is_empty() {
            files.iter().map(|f| base_name(f)).collect()
        } else if save_names.len() == files.len() {
            save_names.to_vec()
        } else {
            return Err(DriveError::Config(
                "save names must be omitted or match the number of local files".into(),
            ));
        };
        for file in files {
            if !file.exists() {
                return Err(DriveError::NotFound(file.clone()));
            }
        }

        let mut results = Vec::with_capacity(files.len());
        for (n, (file, name)) in files.iter().zip(&names).enumerate() {
            info!("Upload Progress: [ {} / {} ]", n + 1, files.len());
            let id = self
                .transport
                .upload_file(file, name, folder_id, cfg.chunksize, self.progress.as_ref())
                .map_err(|e| DriveError::remote(file.display().to_string(), e))?;
            results.push((file.clone(), id));
        }
        Ok(results)
    }

    /// Download individual files into `dir` (default `[download]`
    /// settings). A failed item yields `None`.
    pub fn download(&self, ids: &[String], dir: Option<&Path>) -> DriveResult<Vec<Option<PathBuf>>> {
        let cfg = &self.settings.download;
        let ids = if ids.is_empty() { &cfg.file_id[..] } else { ids };
        let dir = dir.unwrap_or(cfg.save_local_dir.as_path());
        if ids.is_empty() {
            return Err(DriveError::Config("no file ids to download".into()));
        }
        fs::create_dir_all(dir)?;

        let mut results = Vec::with_capacity(ids.len());
        for (n, id) in ids.iter().enumerate() {
            info!("Download Progress: [ {} / {} ]", n + 1, ids.len());
            results.push(self.download_single(id, dir, cfg.chunksize));
        }
        Ok(results)
    }

    fn download_single(&self, id: &str, dir: &Path, chunk_size: usize) -> Option<PathBuf> {
        let meta = match self.transport.get_metadata(id) {
            Ok(meta) => meta,
            Err(e) => {
                error!("Failed to get metadata for file_id={}: {}", id, e);
                return None;
            }
        };
        let local = dir.join(local_name(&meta.name));
        match self
            .transport
            .download_file(id, &local, chunk_size, self.progress.as_ref())
        {
            Ok(_) => Some(local),
            Err(e) => {
                error!("Download failed for file_id={}: {}", id, e);
                discard_partial(&local);
                None
            }
        }
    }

    pub fn create_folder(&self, name: &str, parent: Option<&str>) -> DriveResult<String> {
        self.transport
            .create_folder(name, parent)
            .map_err(|e| DriveError::remote(name, e))
    }

    /// Mirror local files and directories to Drive. See [`Mirror::mirror_upload`].
    pub fn mirror_upload(&self, paths: &[PathBuf], folder_id: Option<&str>) -> DriveResult<MirrorNode> {
        let cfg = &self.settings.upload;
        let paths = if paths.is_empty() { &cfg.local_file[..] } else { paths };
        if paths.is_empty() {
            return Err(DriveError::Config("no local paths to upload".into()));
        }
        let folder_id = folder_id.or(cfg.save_folder_id.as_deref());
        self.mirror(cfg.chunksize).mirror_upload(paths, folder_id)
    }

    /// Mirror Drive files and folders locally. See [`Mirror::mirror_download`].
    pub fn mirror_download(&self, ids: &[String], dir: Option<&Path>) -> DriveResult<MirrorNode> {
        let cfg = &self.settings.download;
        let ids = if ids.is_empty() { &cfg.file_id[..] } else { ids };
        if ids.is_empty() {
            return Err(DriveError::Config("no file ids to download".into()));
        }
        let dir = dir.unwrap_or(cfg.save_local_dir.as_path());
        self.mirror(cfg.chunksize).mirror_download(ids, dir)
    }

    pub fn scan_local(&self, paths: &[PathBuf]) -> DriveResult<TreeSummary> {
        scan::scan_local(paths, self.settings.max_depth)
    }

    pub fn scan_remote(&self, ids: &[String]) -> DriveResult<TreeSummary> {
        scan::scan_remote(&self.transport, ids, self.settings.max_depth)
    }
}
