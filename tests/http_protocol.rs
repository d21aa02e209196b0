// Drive REST protocol against a local axum server standing in for the
// Drive endpoints: resumable upload sessions, ranged downloads, paging
// and token renewal on 401.

use anyhow::Result;
use axum::body::{Body, Bytes};
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use gdrive_tools::api::{build_http, DriveClient, UPLOAD_CHUNK_ALIGN};
use gdrive_tools::auth::TokenSource;
use gdrive_tools::progress::Silent;
use gdrive_tools::settings::Settings;
use gdrive_tools::{DriveError, DriveResult, DriveTransport};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

const TOKEN: &str = "token";

struct StoredFile {
    name: String,
    data: Vec<u8>,
    declared_size: u64,
}

#[derive(Default)]
struct FakeDrive {
    base: String,
    accepted_token: String,
    session: Vec<u8>,
    session_name: String,
    /// Chunk PUTs still to be answered with 503.
    fail_puts: u32,
    /// Answer chunk PUTs with 308 without persisting anything.
    stall: bool,
    ignore_range: bool,
    files: HashMap<String, StoredFile>,
    folder: Vec<String>,
    puts: Vec<String>,
    media_ranges: Vec<String>,
    list_queries: Vec<HashMap<String, String>>,
    bearers: Vec<String>,
}

type Shared = Arc<Mutex<FakeDrive>>;

impl FakeDrive {
    fn new() -> Self {
        FakeDrive {
            accepted_token: TOKEN.to_string(),
            ..FakeDrive::default()
        }
    }

    fn with_file(mut self, id: &str, data: &[u8], declared_size: u64) -> Self {
        self.files.insert(
            id.to_string(),
            StoredFile {
                name: format!("{id}.bin"),
                data: data.to_vec(),
                declared_size,
            },
        );
        self
    }

    fn deny(&mut self, headers: &HeaderMap) -> Option<Response> {
        let bearer = header_str(headers, header::AUTHORIZATION);
        let ok = bearer == format!("Bearer {}", self.accepted_token);
        self.bearers.push(bearer);
        (!ok).then(|| StatusCode::UNAUTHORIZED.into_response())
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn start_session(
    State(drive): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut drive = drive.lock().unwrap();
    if let Some(denied) = drive.deny(&headers) {
        return denied;
    }
    drive.session.clear();
    drive.session_name = body["name"].as_str().unwrap_or_default().to_string();
    let location = format!("{}/session", drive.base);
    (StatusCode::OK, [(header::LOCATION, location)]).into_response()
}

async fn session_put(State(drive): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    let mut drive = drive.lock().unwrap();
    if let Some(denied) = drive.deny(&headers) {
        return denied;
    }
    let range = header_str(&headers, header::CONTENT_RANGE);
    drive.puts.push(range.clone());
    let (span, total) = range.trim_start_matches("bytes ").split_once('/').unwrap();
    let total: u64 = total.parse().unwrap();

    if span != "*" {
        if drive.fail_puts > 0 {
            drive.fail_puts -= 1;
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        let start: usize = span.split_once('-').unwrap().0.parse().unwrap();
        if start != drive.session.len() {
            return StatusCode::BAD_REQUEST.into_response();
        }
        if !drive.stall {
            drive.session.extend_from_slice(&body);
        }
    }

    if drive.session.len() as u64 == total {
        let id = format!("up{}", drive.files.len() + 1);
        let file = StoredFile {
            name: drive.session_name.clone(),
            data: drive.session.clone(),
            declared_size: total,
        };
        drive.files.insert(id.clone(), file);
        return (StatusCode::OK, Json(json!({ "id": id }))).into_response();
    }
    let mut res = Response::builder().status(StatusCode::PERMANENT_REDIRECT);
    if !drive.session.is_empty() {
        res = res.header(header::RANGE, format!("bytes=0-{}", drive.session.len() - 1));
    }
    res.body(Body::empty()).unwrap()
}

async fn get_file(
    State(drive): State<Shared>,
    UrlPath(id): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut drive = drive.lock().unwrap();
    if let Some(denied) = drive.deny(&headers) {
        return denied;
    }
    let Some(file) = drive.files.get(&id) else {
        return (StatusCode::NOT_FOUND, "File not found").into_response();
    };
    if query.get("alt").map(String::as_str) != Some("media") {
        let meta = json!({
            "id": id,
            "name": file.name,
            "mimeType": "application/octet-stream",
            "size": file.declared_size.to_string(),
        });
        return Json(meta).into_response();
    }

    let data = file.data.clone();
    let range = header_str(&headers, header::RANGE);
    drive.media_ranges.push(range.clone());
    if drive.ignore_range || range.is_empty() {
        return (StatusCode::OK, data).into_response();
    }
    let (start, end) = range.trim_start_matches("bytes=").split_once('-').unwrap();
    let start = start.parse::<usize>().unwrap().min(data.len());
    let end = (end.parse::<usize>().unwrap() + 1).min(data.len());
    (StatusCode::PARTIAL_CONTENT, data[start..end].to_vec()).into_response()
}

async fn list_files(
    State(drive): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut drive = drive.lock().unwrap();
    if let Some(denied) = drive.deny(&headers) {
        return denied;
    }
    let start: usize = query.get("pageToken").map(|t| t.parse().unwrap()).unwrap_or(0);
    let end = (start + 2).min(drive.folder.len());
    let files: Vec<Value> = drive.folder[start..end]
        .iter()
        .map(|name| json!({ "id": format!("id-{name}"), "name": name, "mimeType": "text/plain" }))
        .collect();
    drive.list_queries.push(query);
    let mut page = json!({ "files": files });
    if end < drive.folder.len() {
        page["nextPageToken"] = json!(end.to_string());
    }
    Json(page).into_response()
}

fn serve(drive: FakeDrive) -> (Shared, String) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let state = Arc::new(Mutex::new(FakeDrive {
        base: base.clone(),
        ..drive
    }));
    let app = Router::new()
        .route("/upload/files", post(start_session))
        .route("/session", put(session_put))
        .route("/api/files", get(list_files))
        .route("/api/files/{id}", get(get_file))
        .with_state(state.clone());

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });
    (state, base)
}

/// Hands out `current` until renewed, then `next`.
struct Tokens {
    current: RefCell<String>,
    next: String,
    renewals: Rc<Cell<u32>>,
}

impl Tokens {
    fn fixed(token: &str) -> Self {
        Tokens {
            current: RefCell::new(token.to_string()),
            next: token.to_string(),
            renewals: Rc::default(),
        }
    }
}

impl TokenSource for Tokens {
    fn token(&self) -> DriveResult<String> {
        Ok(self.current.borrow().clone())
    }

    fn renew(&self) -> DriveResult<String> {
        self.renewals.set(self.renewals.get() + 1);
        *self.current.borrow_mut() = self.next.clone();
        Ok(self.next.clone())
    }
}

fn client(base: &str, tokens: Tokens) -> DriveClient {
    let http = build_http(&Settings::default()).unwrap();
    DriveClient::with_endpoints(
        http,
        Box::new(tokens),
        &format!("{base}/api"),
        &format!("{base}/upload"),
    )
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

const UPLOAD_LEN: usize = 600 * 1024;

#[test]
fn upload_sends_aligned_chunks_until_complete() -> Result<()> {
    let (state, base) = serve(FakeDrive::new());
    let temp = tempfile::tempdir()?;
    let path = temp.path().join("big.bin");
    fs::write(&path, pattern(UPLOAD_LEN))?;

    // a one byte request still moves whole 256 KiB units
    let id = client(&base, Tokens::fixed(TOKEN)).upload_file(&path, "big.bin", None, 1, &Silent)?;

    let drive = state.lock().unwrap();
    let last = UPLOAD_LEN - 1;
    assert_eq!(
        drive.puts,
        vec![
            format!("bytes 0-{}/{UPLOAD_LEN}", UPLOAD_CHUNK_ALIGN - 1),
            format!("bytes {}-{}/{UPLOAD_LEN}", UPLOAD_CHUNK_ALIGN, 2 * UPLOAD_CHUNK_ALIGN - 1),
            format!("bytes {}-{last}/{UPLOAD_LEN}", 2 * UPLOAD_CHUNK_ALIGN),
        ]
    );
    let stored = &drive.files[&id];
    assert_eq!(stored.name, "big.bin");
    assert_eq!(stored.data, pattern(UPLOAD_LEN));
    Ok(())
}

#[test]
fn upload_resumes_after_server_error() -> Result<()> {
    let (state, base) = serve(FakeDrive {
        fail_puts: 1,
        ..FakeDrive::new()
    });
    let temp = tempfile::tempdir()?;
    let path = temp.path().join("big.bin");
    fs::write(&path, pattern(UPLOAD_LEN))?;

    let id = client(&base, Tokens::fixed(TOKEN)).upload_file(&path, "big.bin", None, 1, &Silent)?;

    let drive = state.lock().unwrap();
    assert_eq!(drive.puts.len(), 5);
    assert_eq!(drive.puts[0], drive.puts[2]);
    assert_eq!(drive.puts[1], format!("bytes */{UPLOAD_LEN}"));
    assert_eq!(drive.files[&id].data, pattern(UPLOAD_LEN));
    Ok(())
}

#[test]
fn upload_without_progress_fails() -> Result<()> {
    let (_state, base) = serve(FakeDrive {
        stall: true,
        ..FakeDrive::new()
    });
    let temp = tempfile::tempdir()?;
    let path = temp.path().join("small.bin");
    fs::write(&path, pattern(100))?;

    let err = client(&base, Tokens::fixed(TOKEN))
        .upload_file(&path, "small.bin", None, 1, &Silent)
        .unwrap_err();
    assert!(matches!(err, DriveError::Http { status: 308, .. }), "{err:?}");
    Ok(())
}

#[test]
fn empty_file_upload_completes_in_one_request() -> Result<()> {
    let (state, base) = serve(FakeDrive::new());
    let temp = tempfile::tempdir()?;
    let path = temp.path().join("empty");
    fs::write(&path, b"")?;

    let id = client(&base, Tokens::fixed(TOKEN)).upload_file(&path, "empty", None, 1, &Silent)?;

    let drive = state.lock().unwrap();
    assert_eq!(drive.puts, vec!["bytes */0".to_string()]);
    assert!(drive.files[&id].data.is_empty());
    Ok(())
}

#[test]
fn download_fetches_ranges_in_order() -> Result<()> {
    let data = pattern(10);
    let (state, base) = serve(FakeDrive::new().with_file("f1", &data, 10));
    let temp = tempfile::tempdir()?;
    let dest = temp.path().join("out.bin");

    let written = client(&base, Tokens::fixed(TOKEN)).download_file("f1", &dest, 4, &Silent)?;

    assert_eq!(written, 10);
    assert_eq!(fs::read(&dest)?, data);
    assert_eq!(
        state.lock().unwrap().media_ranges,
        vec!["bytes=0-3", "bytes=4-7", "bytes=8-9"]
    );
    Ok(())
}

#[test]
fn download_accepts_whole_body_when_range_ignored() -> Result<()> {
    let data = pattern(10);
    let (state, base) = serve(FakeDrive {
        ignore_range: true,
        ..FakeDrive::new().with_file("f1", &data, 10)
    });
    let temp = tempfile::tempdir()?;
    let dest = temp.path().join("out.bin");

    let written = client(&base, Tokens::fixed(TOKEN)).download_file("f1", &dest, 4, &Silent)?;

    assert_eq!(written, 10);
    assert_eq!(fs::read(&dest)?, data);
    assert_eq!(state.lock().unwrap().media_ranges.len(), 1);
    Ok(())
}

#[test]
fn short_download_is_partial_write() -> Result<()> {
    let (_state, base) = serve(FakeDrive::new().with_file("f1", &pattern(6), 10));
    let temp = tempfile::tempdir()?;
    let dest = temp.path().join("out.bin");

    match client(&base, Tokens::fixed(TOKEN)).download_file("f1", &dest, 4, &Silent) {
        Err(DriveError::PartialWrite {
            path,
            written,
            expected,
        }) => {
            assert_eq!(path, dest);
            assert_eq!((written, expected), (6, 10));
        }
        other => panic!("expected PartialWrite, got {other:?}"),
    }
    Ok(())
}

#[test]
fn listing_follows_page_tokens() -> Result<()> {
    let names: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
    let (state, base) = serve(FakeDrive {
        folder: names.clone(),
        ..FakeDrive::new()
    });

    let children = client(&base, Tokens::fixed(TOKEN)).list_children("F")?;

    let listed: Vec<String> = children.into_iter().map(|c| c.name).collect();
    assert_eq!(listed, names);
    let drive = state.lock().unwrap();
    assert_eq!(drive.list_queries.len(), 3);
    assert_eq!(drive.list_queries[0]["q"], "'F' in parents and trashed=false");
    assert!(!drive.list_queries[0].contains_key("pageToken"));
    assert_eq!(drive.list_queries[2]["pageToken"], "4");
    Ok(())
}

#[test]
fn rejected_token_is_renewed_once() -> Result<()> {
    let (state, base) = serve(FakeDrive {
        accepted_token: "fresh".to_string(),
        ..FakeDrive::new().with_file("f1", b"abc", 3)
    });
    let tokens = Tokens {
        current: RefCell::new("stale".to_string()),
        next: "fresh".to_string(),
        renewals: Rc::default(),
    };
    let renewals = tokens.renewals.clone();
    let drive_client = client(&base, tokens);

    let meta = drive_client.get_metadata("f1")?;
    assert_eq!(meta.size, Some(3));
    drive_client.get_metadata("f1")?;

    assert_eq!(renewals.get(), 1);
    assert_eq!(
        state.lock().unwrap().bearers,
        vec!["Bearer stale", "Bearer fresh", "Bearer fresh"]
    );
    Ok(())
}

#[test]
fn token_still_rejected_after_renewal_is_http_error() {
    let (_state, base) = serve(FakeDrive {
        accepted_token: "never".to_string(),
        ..FakeDrive::new().with_file("f1", b"abc", 3)
    });
    let err = client(&base, Tokens::fixed(TOKEN)).get_metadata("f1").unwrap_err();
    assert!(matches!(err, DriveError::Http { status: 401, .. }), "{err:?}");
}
