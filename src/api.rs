// Drive API client: a blocking reqwest client that talks to the Drive v3
// REST endpoints with a bearer token. Uploads use resumable sessions and
// downloads use ranged GETs so both can report progress per chunk.

use crate::auth::{Authorizer, TokenSource};
use crate::error::{DriveError, DriveResult};
use crate::progress::{Direction, Progress};
use crate::settings::Settings;
use crate::transport::DriveTransport;
use crate::tree::{ChildPage, RemoteEntry, FOLDER_MIME_TYPE};
use log::{info, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;

pub const API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Resumable upload chunks must be a multiple of this.
pub const UPLOAD_CHUNK_ALIGN: usize = 256 * 1024;
const MAX_CHUNK_RETRIES: u32 = 3;
const ENTRY_FIELDS: &str = "id,name,mimeType,size";

#[derive(Deserialize)]
struct Created {
    id: String,
}

/// Holds the reqwest blocking client, the endpoint bases and the source of
/// bearer tokens.
pub struct DriveClient {
    client: Client,
    api_base: String,
    upload_base: String,
    tokens: Box<dyn TokenSource>,
}

impl DriveClient {
    /// Build the HTTP client, run the OAuth flow and return a ready client.
    pub fn connect(settings: &Settings) -> DriveResult<Self> {
        let client = build_http(settings)?;
        let authorizer = Authorizer::new(&settings.google_drive, settings.credentials_file()?)?;
        authorizer.obtain()?;
        info!("Google Drive service built successfully.");
        Ok(DriveClient::with_endpoints(
            client,
            Box::new(authorizer),
            API_BASE,
            UPLOAD_BASE,
        ))
    }

    /// Client against arbitrary endpoint bases, e.g. a local test server.
    pub fn with_endpoints(
        client: Client,
        tokens: Box<dyn TokenSource>,
        api_base: &str,
        upload_base: &str,
    ) -> Self {
        DriveClient {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Send a request with the bearer token. A 401 triggers one token
    /// refresh and a retry, so `build` may be called twice.
    fn send(&self, build: impl Fn(&Client) -> RequestBuilder) -> DriveResult<Response> {
        let token = self.tokens.token()?;
        let res = build(&self.client).bearer_auth(&token).send()?;
        if res.status() != StatusCode::UNAUTHORIZED {
            return Ok(res);
        }
        warn!("Access token rejected, refreshing");
        let token = self.tokens.renew()?;
        Ok(build(&self.client).bearer_auth(&token).send()?)
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/files/{}", self.api_base, id)
    }

    fn start_upload_session(
        &self,
        name: &str,
        parent: Option<&str>,
        size: u64,
    ) -> DriveResult<String> {
        let mut body = json!({ "name": name });
        if let Some(parent) = parent {
            body["parents"] = json!([parent]);
        }
        let url = format!("{}/files", self.upload_base);
        let res = check(self.send(|c| {
            c.post(&url)
                .query(&[
                    ("uploadType", "resumable"),
                    ("supportsAllDrives", "true"),
                    ("fields", "id"),
                ])
                .header("X-Upload-Content-Length", size)
                .json(&body)
        })?)?;
        res.headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| DriveError::Http {
                status: res.status().as_u16(),
                body: "resumable session has no Location header".into(),
            })
    }

    /// Ask the session how many bytes it already holds.
    fn upload_offset(&self, session: &str, size: u64) -> DriveResult<UploadState> {
        let res = self.send(|c| {
            c.put(session)
                .header(CONTENT_RANGE, format!("bytes */{size}"))
                .body(Vec::new())
        })?;
        upload_state(res)
    }
}

enum UploadState {
    Incomplete(u64),
    Done(String),
}

fn upload_state(res: Response) -> DriveResult<UploadState> {
    match res.status() {
        StatusCode::OK | StatusCode::CREATED => Ok(UploadState::Done(res.json::<Created>()?.id)),
        StatusCode::PERMANENT_REDIRECT => {
            // "Range: bytes=0-N" lists what the server has persisted
            let next = res
                .headers()
                .get(RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(|r| r.rsplit('-').next())
                .and_then(|end| end.parse::<u64>().ok())
                .map(|end| end + 1)
                .unwrap_or(0);
            Ok(UploadState::Incomplete(next))
        }
        _ => Err(http_error(res)),
    }
}

impl DriveTransport for DriveClient {
    fn create_folder(&self, name: &str, parent: Option<&str>) -> DriveResult<String> {
        let mut body = json!({ "name": name, "mimeType": FOLDER_MIME_TYPE });
        if let Some(parent) = parent {
            body["parents"] = json!([parent]);
        }
        let url = format!("{}/files", self.api_base);
        let res = check(self.send(|c| {
            c.post(&url)
                .query(&[("fields", "id"), ("supportsAllDrives", "true")])
                .json(&body)
        })?)?;
        let id = res.json::<Created>()?.id;
        info!("Folder created: {} (ID: {})", name, id);
        Ok(id)
    }

    fn get_metadata(&self, id: &str) -> DriveResult<RemoteEntry> {
        let url = self.file_url(id);
        let res = check(self.send(|c| {
            c.get(&url)
                .query(&[("fields", ENTRY_FIELDS), ("supportsAllDrives", "true")])
        })?)?;
        Ok(res.json()?)
    }

    fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> DriveResult<ChildPage> {
        let url = format!("{}/files", self.api_base);
        let q = format!("'{}' in parents and trashed=false", folder_id.replace('\'', "\\'"));
        let fields = format!("nextPageToken, files({ENTRY_FIELDS})");
        let res = check(self.send(|c| {
            let mut req = c.get(&url).query(&[
                ("q", q.as_str()),
                ("fields", fields.as_str()),
                ("pageSize", "1000"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ]);
            if let Some(token) = page_token {
                req = req.query(&[("pageToken", token)]);
            }
            req
        })?)?;
        Ok(res.json()?)
    }

    fn upload_file(
        &self,
        local_path: &Path,
        name: &str,
        parent: Option<&str>,
        chunk_size: usize,
        progress: &dyn Progress,
    ) -> DriveResult<String> {
        if !local_path.exists() {
            return Err(DriveError::NotFound(local_path.to_path_buf()));
        }
        let size = fs::metadata(local_path)?.len();
        let chunk = align_chunk(chunk_size) as u64;
        info!("Uploading {} -> {} ...", local_path.display(), name);

        let session = self.start_upload_session(name, parent, size)?;
        let mut file = File::open(local_path)?;
        let mut offset = 0u64;
        let mut retries = 0;
        progress.start(Direction::Upload, name, Some(size));

        loop {
            let len = chunk.min(size - offset);
            let mut buf = vec![0u8; len as usize];
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buf)?;
            let range = if size == 0 {
                "bytes */0".to_string()
            } else {
                format!("bytes {}-{}/{}", offset, offset + len - 1, size)
            };

            let sent = self.send(|c| {
                c.put(&session)
                    .header(CONTENT_RANGE, range.as_str())
                    .body(buf.clone())
            });
            let mut resumed = false;
            let state = match sent.and_then(upload_state) {
                Ok(state) => state,
                Err(e) if retries < MAX_CHUNK_RETRIES && is_transient(&e) => {
                    retries += 1;
                    resumed = true;
                    warn!("Chunk at offset {} failed ({}), resuming [{}/{}]", offset, e, retries, MAX_CHUNK_RETRIES);
                    self.upload_offset(&session, size)?
                }
                Err(e) => return Err(e),
            };

            match state {
                UploadState::Done(id) => {
                    progress.advance(size);
                    progress.finish();
                    info!("Upload finished. File Id={}", id);
                    return Ok(id);
                }
                UploadState::Incomplete(next) => {
                    if next == offset && !resumed {
                        return Err(DriveError::Http {
                            status: StatusCode::PERMANENT_REDIRECT.as_u16(),
                            body: format!("upload made no progress at offset {offset}"),
                        });
                    }
                    offset = next.min(size);
                    progress.advance(offset);
                }
            }
        }
    }

    fn download_file(
        &self,
        id: &str,
        dest: &Path,
        chunk_size: usize,
        progress: &dyn Progress,
    ) -> DriveResult<u64> {
        let meta = self.get_metadata(id)?;
        let url = self.file_url(id);
        let media = [("alt", "media"), ("supportsAllDrives", "true")];
        info!("Downloading {} <- {} (id={}) ...", dest.display(), meta.name, id);

        let mut file = File::create(dest)?;
        progress.start(Direction::Download, &meta.name, meta.size);

        let written = match meta.size {
            Some(size) if size > 0 => {
                let chunk = chunk_size.max(1) as u64;
                let mut offset = 0u64;
                while offset < size {
                    let end = (offset + chunk).min(size) - 1;
                    let res = check(self.send(|c| {
                        c.get(&url)
                            .query(&media)
                            .header(RANGE, format!("bytes={offset}-{end}"))
                    })?)?;
                    let whole = res.status() == StatusCode::OK;
                    let bytes = res.bytes()?;
                    file.write_all(&bytes)?;
                    offset += bytes.len() as u64;
                    progress.advance(offset);
                    // server ignored the range and sent everything
                    if whole || bytes.is_empty() {
                        break;
                    }
                }
                offset
            }
            _ => {
                let mut res = check(self.send(|c| c.get(&url).query(&media))?)?;
                let n = res.copy_to(&mut file)?;
                progress.advance(n);
                n
            }
        };
        file.flush()?;
        progress.finish();

        if let Some(expected) = meta.size {
            if written != expected {
                return Err(DriveError::PartialWrite {
                    path: dest.to_path_buf(),
                    written,
                    expected,
                });
            }
        }
        info!("Download finished: {}", dest.display());
        Ok(written)
    }
}

/// Build the blocking HTTP client: timeout, proxy (or explicitly none, so
/// ambient proxy variables are ignored) and no redirect-following on 308,
/// which resumable uploads use to mean "resume incomplete".
pub fn build_http(settings: &Settings) -> DriveResult<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .redirect(Policy::custom(|attempt| {
            if attempt.status() == StatusCode::PERMANENT_REDIRECT {
                attempt.stop()
            } else if attempt.previous().len() > 10 {
                attempt.error("too many redirects")
            } else {
                attempt.follow()
            }
        }));
    match settings.proxy_config()? {
        Some(proxy) => {
            info!("Using proxy {}", proxy);
            builder = builder.proxy(proxy.to_reqwest()?);
        }
        None => {
            info!("No proxy configured. Using direct connection.");
            builder = builder.no_proxy();
        }
    }
    Ok(builder.build()?)
}

/// Round a requested chunk size up to the resumable-upload granularity.
pub fn align_chunk(chunk_size: usize) -> usize {
    let units = chunk_size.max(1).div_ceil(UPLOAD_CHUNK_ALIGN);
    units * UPLOAD_CHUNK_ALIGN
}

fn check(res: Response) -> DriveResult<Response> {
    if res.status().is_success() {
        Ok(res)
    } else {
        Err(http_error(res))
    }
}

fn http_error(res: Response) -> DriveError {
    let status = res.status().as_u16();
    let body = res.text().unwrap_or_default();
    DriveError::Http { status, body }
}

fn is_transient(err: &DriveError) -> bool {
    match err {
        DriveError::Request(_) => true,
        DriveError::Http { status, .. } => *status >= 500 || *status == 429,
        _ => false,
    }
}
