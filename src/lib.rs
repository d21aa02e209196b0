// Library root
// -----------
// Google Drive transfer tools. The binary (`main.rs`) wires these modules
// into a command line interface.
//
// Module responsibilities:
// - `api`: Drive v3 REST client (resumable upload, ranged download).
// - `auth`: token source for the client, backed by the yup-oauth2 installed flow.
// - `transport`: the capability trait the tree walks are written against.
// - `scan` / `mirror`: tree accounting and structure-preserving copies.
// - `tools`: settings-driven entry points used by the CLI.
// - `settings`, `proxy`, `logger`, `progress`, `cli`: ambient plumbing.
pub mod api;
pub mod auth;
pub mod cli;
pub mod error;
pub mod logger;
pub mod mirror;
pub mod progress;
pub mod proxy;
pub mod scan;
pub mod settings;
pub mod tools;
pub mod transport;
pub mod tree;

pub use error::{DriveError, DriveResult};
pub use transport::DriveTransport;
pub use tree::{EntryKind, MirrorNode, RemoteEntry, TreeSummary};
