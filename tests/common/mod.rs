#![allow(dead_code)]

use gdrive_tools::progress::{Direction, Progress};
use gdrive_tools::tree::{ChildPage, FOLDER_MIME_TYPE};
use gdrive_tools::{DriveError, DriveResult, DriveTransport, RemoteEntry};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const ROOT: &str = "root";

#[derive(Clone)]
struct Node {
    name: String,
    mime_type: String,
    data: Option<Vec<u8>>,
}

/// In-memory Drive account. Children keep insertion order; ids are
/// sequential (`id1`, `id2`, ...).
pub struct MemoryDrive {
    nodes: RefCell<HashMap<String, Node>>,
    children: RefCell<HashMap<String, Vec<String>>>,
    next_id: Cell<u64>,
    page_size: usize,
    fail_metadata: RefCell<HashSet<String>>,
    fail_upload: RefCell<HashSet<String>>,
    fail_download: RefCell<HashSet<String>>,
    fail_list: RefCell<HashSet<String>>,
    pub list_calls: Cell<usize>,
    pub uploads: RefCell<Vec<String>>,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self::with_page_size(100)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        MemoryDrive {
            nodes: RefCell::new(HashMap::new()),
            children: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            page_size,
            fail_metadata: RefCell::default(),
            fail_upload: RefCell::default(),
            fail_download: RefCell::default(),
            fail_list: RefCell::default(),
            list_calls: Cell::new(0),
            uploads: RefCell::default(),
        }
    }

    fn insert(&self, name: &str, mime_type: &str, data: Option<Vec<u8>>, parent: Option<&str>) -> String {
        let id = format!("id{}", self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.nodes.borrow_mut().insert(
            id.clone(),
            Node {
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                data,
            },
        );
        self.link(&id, parent.unwrap_or(ROOT));
        id
    }

    /// File an existing item under another parent as well.
    pub fn link(&self, id: &str, parent: &str) {
        self.children
            .borrow_mut()
            .entry(parent.to_string())
            .or_default()
            .push(id.to_string());
    }

    pub fn add_file(&self, name: &str, data: &[u8], parent: Option<&str>) -> String {
        self.insert(name, "text/plain", Some(data.to_vec()), parent)
    }

    pub fn add_folder(&self, name: &str, parent: Option<&str>) -> String {
        self.insert(name, FOLDER_MIME_TYPE, None, parent)
    }

    pub fn fail_metadata_for(&self, id: &str) {
        self.fail_metadata.borrow_mut().insert(id.to_string());
    }

    pub fn fail_upload_of(&self, name: &str) {
        self.fail_upload.borrow_mut().insert(name.to_string());
    }

    pub fn fail_download_of(&self, id: &str) {
        self.fail_download.borrow_mut().insert(id.to_string());
    }

    pub fn fail_list_of(&self, id: &str) {
        self.fail_list.borrow_mut().insert(id.to_string());
    }

    pub fn data(&self, id: &str) -> Option<Vec<u8>> {
        self.nodes.borrow().get(id).and_then(|n| n.data.clone())
    }

    pub fn child_names(&self, parent: &str) -> Vec<String> {
        let nodes = self.nodes.borrow();
        self.children
            .borrow()
            .get(parent)
            .map(|ids| ids.iter().map(|id| nodes[id].name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    fn entry(&self, id: &str) -> Option<RemoteEntry> {
        self.nodes.borrow().get(id).map(|n| RemoteEntry {
            id: id.to_string(),
            name: n.name.clone(),
            mime_type: n.mime_type.clone(),
            size: n.data.as_ref().map(|d| d.len() as u64),
        })
    }
}

fn server_error(what: &str) -> DriveError {
    DriveError::Http {
        status: 500,
        body: format!("simulated failure: {what}"),
    }
}

impl DriveTransport for MemoryDrive {
    fn create_folder(&self, name: &str, parent: Option<&str>) -> DriveResult<String> {
        Ok(self.add_folder(name, parent))
    }

    fn get_metadata(&self, id: &str) -> DriveResult<RemoteEntry> {
        if self.fail_metadata.borrow().contains(id) {
            return Err(server_error(id));
        }
        self.entry(id).ok_or_else(|| DriveError::Http {
            status: 404,
            body: format!("File not found: {id}"),
        })
    }

    fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> DriveResult<ChildPage> {
        self.list_calls.set(self.list_calls.get() + 1);
        if self.fail_list.borrow().contains(folder_id) {
            return Err(server_error(folder_id));
        }
        let ids = self.children.borrow().get(folder_id).cloned().unwrap_or_default();
        let start: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let end = (start + self.page_size).min(ids.len());
        let entries = ids[start..end].iter().filter_map(|id| self.entry(id)).collect();
        Ok(ChildPage {
            entries,
            next_page_token: (end < ids.len()).then(|| end.to_string()),
        })
    }

    fn upload_file(
        &self,
        local_path: &Path,
        name: &str,
        parent: Option<&str>,
        _chunk_size: usize,
        progress: &dyn Progress,
    ) -> DriveResult<String> {
        if self.fail_upload.borrow().contains(name) {
            return Err(server_error(name));
        }
        let data = fs::read(local_path)?;
        progress.start(Direction::Upload, name, Some(data.len() as u64));
        progress.advance(data.len() as u64);
        progress.finish();
        self.uploads.borrow_mut().push(name.to_string());
        Ok(self.add_file(name, &data, parent))
    }

    fn download_file(
        &self,
        id: &str,
        dest: &Path,
        _chunk_size: usize,
        progress: &dyn Progress,
    ) -> DriveResult<u64> {
        let data = self.data(id).ok_or_else(|| server_error(id))?;
        if self.fail_download.borrow().contains(id) {
            // leave a truncated file behind, as an interrupted transfer would
            fs::write(dest, &data[..data.len() / 2])?;
            return Err(DriveError::PartialWrite {
                path: dest.to_path_buf(),
                written: (data.len() / 2) as u64,
                expected: data.len() as u64,
            });
        }
        progress.start(Direction::Download, id, Some(data.len() as u64));
        fs::write(dest, &data)?;
        progress.advance(data.len() as u64);
        progress.finish();
        Ok(data.len() as u64)
    }
}

/// Every file below `root` as relative path -> size.
pub fn file_sizes(root: &Path) -> BTreeMap<PathBuf, u64> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, u64>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let size = fs::metadata(&path).unwrap().len();
                out.insert(path.strip_prefix(root).unwrap().to_path_buf(), size);
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

pub fn write_file(path: &Path, len: usize) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, vec![b'a'; len]).unwrap();
}
