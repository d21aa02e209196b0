// Layered, immutable configuration: built-in defaults, then an optional
// TOML settings file, then explicit overrides from the command line.

use crate::error::{DriveError, DriveResult};
use crate::proxy::ProxyConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleDriveSettings {
    pub credentials_file: Option<PathBuf>,
    pub save_token: bool,
    pub save_token_file: PathBuf,
    /// Authorize by pasting the redirected URL instead of a loopback listener.
    pub remote: bool,
    pub oauth_scope: Vec<String>,
}

impl Default for GoogleDriveSettings {
    fn default() -> Self {
        GoogleDriveSettings {
            credentials_file: None,
            save_token: true,
            save_token_file: PathBuf::from("./Json/token.json"),
            remote: false,
            oauth_scope: vec![DRIVE_FILE_SCOPE.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub local_file: Vec<PathBuf>,
    pub save_file_name: Vec<String>,
    pub save_folder_id: Option<String>,
    pub chunksize: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        UploadSettings {
            local_file: Vec::new(),
            save_file_name: Vec::new(),
            save_folder_id: None,
            chunksize: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub save_local_dir: PathBuf,
    pub file_id: Vec<String>,
    pub chunksize: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        DownloadSettings {
            save_local_dir: PathBuf::from("./download"),
            file_id: Vec::new(),
            chunksize: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub google_drive: GoogleDriveSettings,
    pub proxy: Option<String>,
    pub log: Option<PathBuf>,
    pub upload: UploadSettings,
    pub download: DownloadSettings,
    pub max_depth: usize,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            google_drive: GoogleDriveSettings::default(),
            proxy: None,
            log: None,
            upload: UploadSettings::default(),
            download: DownloadSettings::default(),
            max_depth: 64,
            timeout_secs: 120,
        }
    }
}

/// Explicit overrides, typically taken from command line flags. For `proxy`
/// and `log` the literal `off` resets the value to direct / stdout.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub credentials_file: Option<PathBuf>,
    pub proxy: Option<String>,
    pub log: Option<String>,
    pub remote: Option<bool>,
}

impl Settings {
    /// Build the final settings value. `path` of `None` or `off` skips the
    /// file layer.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> DriveResult<Self> {
        let base = match path {
            Some(p) if !is_off(&p.to_string_lossy()) => Self::from_file(p)?,
            _ => Settings::default(),
        };
        let settings = base.with_overrides(overrides);
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> DriveResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            DriveError::Config(format!("cannot read settings {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
            .map_err(|e| DriveError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(cred) = overrides.credentials_file {
            self.google_drive.credentials_file = Some(cred);
        }
        if let Some(proxy) = overrides.proxy {
            self.proxy = (!is_off(&proxy)).then_some(proxy);
        }
        if let Some(log) = overrides.log {
            self.log = (!is_off(&log)).then(|| PathBuf::from(log));
        }
        if let Some(remote) = overrides.remote {
            self.google_drive.remote = remote;
        }
        // a file may also spell the direct connection as "off"
        if self.proxy.as_deref().is_some_and(is_off) {
            self.proxy = None;
        }
        if self.log.as_deref().is_some_and(|p| is_off(&p.to_string_lossy())) {
            self.log = None;
        }

        let gd = &mut self.google_drive;
        gd.credentials_file = gd.credentials_file.take().map(|p| expand_home(&p));
        gd.save_token_file = expand_home(&gd.save_token_file);
        self.log = self.log.take().map(|p| expand_home(&p));
        self.download.save_local_dir = expand_home(&self.download.save_local_dir);
        self
    }

    fn validate(&self) -> DriveResult<()> {
        if self.upload.chunksize == 0 || self.download.chunksize == 0 {
            return Err(DriveError::Config("chunksize must be positive".into()));
        }
        if self.max_depth == 0 {
            return Err(DriveError::Config("max_depth must be positive".into()));
        }
        // same conversion the client builder performs, so a proxy that
        // passes here cannot fail at connect time
        if let Some(proxy) = self.proxy_config()? {
            proxy.to_reqwest()?;
        }
        Ok(())
    }

    pub fn proxy_config(&self) -> DriveResult<Option<ProxyConfig>> {
        match &self.proxy {
            Some(raw) => ProxyConfig::parse(raw),
            None => Ok(None),
        }
    }

    /// Credentials are only needed to talk to Drive, so their absence is
    /// reported here rather than at load time.
    pub fn credentials_file(&self) -> DriveResult<&Path> {
        self.google_drive.credentials_file.as_deref().ok_or_else(|| {
            DriveError::Config(
                "google_drive.credentials_file must be set in the settings file or via --cred"
                    .into(),
            )
        })
    }
}

fn is_off(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("off")
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
