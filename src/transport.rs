// The capability boundary between the tree walks and the vendor API.

use crate::error::{DriveError, DriveResult};
use crate::progress::Progress;
use crate::tree::{ChildPage, RemoteEntry};
use std::path::Path;

/// Everything the mirror and scan operations need from a Drive account.
///
/// Primitives return the raw failure; callers attach the identifier they
/// were working on. `parent` of `None` addresses the account root.
pub trait DriveTransport {
    fn create_folder(&self, name: &str, parent: Option<&str>) -> DriveResult<String>;

    fn get_metadata(&self, id: &str) -> DriveResult<RemoteEntry>;

    fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> DriveResult<ChildPage>;

    /// Chunked resumable upload. Returns the new file id.
    fn upload_file(
        &self,
        local_path: &Path,
        name: &str,
        parent: Option<&str>,
        chunk_size: usize,
        progress: &dyn Progress,
    ) -> DriveResult<String>;

    /// Chunked download into `dest`. Returns the number of bytes written.
    fn download_file(
        &self,
        id: &str,
        dest: &Path,
        chunk_size: usize,
        progress: &dyn Progress,
    ) -> DriveResult<u64>;

    /// Every non-trashed child of a folder, following page tokens until
    /// the listing is exhausted. Pages are concatenated in order.
    fn list_children(&self, folder_id: &str) -> DriveResult<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .list_page(folder_id, token.as_deref())
                .map_err(|e| DriveError::remote(folder_id, e))?;
            entries.extend(page.entries);
            match page.next_page_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        Ok(entries)
    }
}
