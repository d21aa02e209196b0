// Data shapes produced by the scanners and the mirror walks.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    /// Classify a Drive MIME type. Anything carrying the `.folder` marker is
    /// a container.
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.contains(".folder") {
            EntryKind::Folder
        } else {
            EntryKind::File
        }
    }
}

/// A remote item as described by metadata or a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, with = "size_string", skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl RemoteEntry {
    pub fn kind(&self) -> EntryKind {
        EntryKind::from_mime(&self.mime_type)
    }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildPage {
    #[serde(default, rename = "files")]
    pub entries: Vec<RemoteEntry>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Aggregate counts for a scanned tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeSummary {
    pub file_count: u64,
    pub folder_count: u64,
    pub total_bytes: u64,
}

impl TreeSummary {
    pub fn file(size: u64) -> Self {
        TreeSummary {
            file_count: 1,
            folder_count: 0,
            total_bytes: size,
        }
    }

    pub fn folder() -> Self {
        TreeSummary {
            file_count: 0,
            folder_count: 1,
            total_bytes: 0,
        }
    }
}

impl AddAssign for TreeSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.file_count += rhs.file_count;
        self.folder_count += rhs.folder_count;
        self.total_bytes += rhs.total_bytes;
    }
}

/// The transferred hierarchy, one node per file or folder.
///
/// `id` is the remote identifier of the entry. The root node returned by a
/// download carries the local destination directory instead. `error` is
/// only set on download entries whose transfer failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorNode {
    pub name: String,
    pub id: String,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MirrorNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MirrorNode {
    pub fn file(name: impl Into<String>, id: impl Into<String>) -> Self {
        MirrorNode {
            name: name.into(),
            id: id.into(),
            kind: EntryKind::File,
            children: Vec::new(),
            error: None,
        }
    }

    pub fn folder(name: impl Into<String>, id: impl Into<String>) -> Self {
        MirrorNode {
            kind: EntryKind::Folder,
            ..MirrorNode::file(name, id)
        }
    }

    pub fn failed(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Number of entries below this node, the node itself excluded.
    pub fn entry_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| 1 + child.entry_count())
            .sum()
    }

    /// Depth-first, pre-order iterator over every entry below this node.
    pub fn descendants(&self) -> impl Iterator<Item = &MirrorNode> + '_ {
        let mut stack: Vec<&MirrorNode> = self.children.iter().rev().collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    pub fn child(&self, name: &str) -> Option<&MirrorNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

// Drive reports `size` as a decimal string.
mod size_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Number(n)) => Ok(Some(n)),
            Some(Raw::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}
