use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gdrive-tools",
    author,
    version,
    about = "Google Drive upload/download tools with settings file support."
)]
pub struct Cli {
    /// Settings file (TOML). `off` uses built-in defaults only.
    #[arg(short, long, default_value = "settings.toml")]
    pub settings: String,

    /// Google OAuth client credentials JSON, overrides the settings file
    #[arg(short, long, value_name = "PATH")]
    pub cred: Option<PathBuf>,

    /// Log file path; `off` logs to standard output
    #[arg(short, long)]
    pub log: Option<String>,

    /// Proxy as [type://]host:port with type in http, https, socks5; `off` for direct
    #[arg(short, long)]
    pub proxy: Option<String>,

    /// Authorize by pasting the redirected URL instead of a local listener
    #[arg(long)]
    pub remote: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload one or more files
    Upload(UploadArgs),
    /// Download one or more files by id
    Download(DownloadArgs),
    /// Upload files and directory trees, recreating folders on Drive
    MirrorUpload(MirrorUploadArgs),
    /// Download files and folder trees by id
    MirrorDownload(DownloadArgs),
    /// Count files, folders and bytes below local paths
    ScanLocal {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Count files, folders and bytes below Drive ids
    ScanRemote {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Authorize and cache a token
    Login {
        /// Discard the cached token and run the consent flow again
        #[arg(long)]
        reauth: bool,
    },
    /// Create a folder on Drive
    Mkdir {
        name: String,
        /// Parent folder id; Drive root when omitted
        #[arg(short = 'i', long = "folder-id")]
        parent: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Local files; defaults to upload.local_file
    #[arg(short = 'n', long = "name", num_args = 1..)]
    pub files: Vec<PathBuf>,

    /// Names to use on Drive, one per file
    #[arg(short = 's', long = "save-name", num_args = 1..)]
    pub save_names: Vec<String>,

    /// Destination folder id; defaults to upload.save_folder_id or the Drive root
    #[arg(short = 'i', long = "folder-id")]
    pub folder_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct MirrorUploadArgs {
    /// Local files or directories; defaults to upload.local_file
    #[arg(short = 'n', long = "name", num_args = 1..)]
    pub paths: Vec<PathBuf>,

    /// Destination folder id; defaults to upload.save_folder_id or the Drive root
    #[arg(short = 'i', long = "folder-id")]
    pub folder_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Drive ids; defaults to download.file_id
    #[arg(short = 'f', long = "file-id", num_args = 1..)]
    pub ids: Vec<String>,

    /// Local directory, created if missing; defaults to download.save_local_dir
    #[arg(short = 'o', long = "out-dir")]
    pub out_dir: Option<PathBuf>,
}

pub fn parse() -> Cli {
    Cli::parse()
}
