#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, header},
};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use pdf_renamer::config::AppConfig;
use pdf_renamer::services::drive::{CloudStorage, DriveError};
use pdf_renamer::services::naming::{NamingAgent, NamingError};
use pdf_renamer::services::rename_service::RenameService;
use pdf_renamer::{AppState, create_app};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

/// Language model stand-in that records every context it is shown.
pub struct RecordingAgent {
    pub reply: String,
    pub contexts: Mutex<Vec<String>>,
    pub api_keys: Mutex<Vec<String>>,
}

impl RecordingAgent {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            contexts: Mutex::new(Vec::new()),
            api_keys: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl NamingAgent for RecordingAgent {
    async fn propose_filename(&self, api_key: &str, context: &str) -> Result<String, NamingError> {
        self.contexts.lock().unwrap().push(context.to_string());
        self.api_keys.lock().unwrap().push(api_key.to_string());
        Ok(self.reply.clone())
    }
}

/// Drive stand-in that hands out sequential file ids. It can fail every
/// upload, or answer 503 to the first `unavailable_for` calls.
pub struct MockDrive {
    pub fail: bool,
    pub unavailable_for: usize,
    pub uploads: AtomicUsize,
    pub names: Mutex<Vec<String>>,
}

impl MockDrive {
    pub fn working() -> Self {
        Self {
            fail: false,
            unavailable_for: 0,
            uploads: AtomicUsize::new(0),
            names: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable_for(calls: usize) -> Self {
        Self {
            unavailable_for: calls,
            ..Self::working()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::working()
        }
    }
}

#[async_trait]
impl CloudStorage for MockDrive {
    async fn upload_pdf(&self, path: &Path, name: &str) -> Result<String, DriveError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DriveError::Auth("refresh token revoked".to_string()));
        }
        if n < self.unavailable_for {
            return Err(DriveError::Api {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: "backend error".to_string(),
            });
        }
        assert!(path.exists(), "uploaded file must exist at {}", path.display());
        self.names.lock().unwrap().push(name.to_string());
        Ok(format!("drive-file-{}", n + 1))
    }
}

pub struct TestEnv {
    pub app: Router,
    pub upload: TempDir,
    pub download: TempDir,
    pub agent: Arc<RecordingAgent>,
    pub drive: Arc<MockDrive>,
}

impl TestEnv {
    pub fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn output_files(&self) -> Vec<String> {
        Self::files_in(self.download.path())
    }

    pub fn staged_files(&self) -> Vec<String> {
        Self::files_in(self.upload.path())
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.download.path().join(name)
    }
}

pub async fn setup(agent: RecordingAgent, drive: MockDrive) -> TestEnv {
    setup_with(agent, drive, |config| config).await
}

pub async fn setup_with(
    agent: RecordingAgent,
    drive: MockDrive,
    adjust: impl FnOnce(AppConfig) -> AppConfig,
) -> TestEnv {
    let upload = tempfile::tempdir().unwrap();
    let download = tempfile::tempdir().unwrap();
    let config = adjust(AppConfig::with_dirs(upload.path(), download.path()));

    let agent = Arc::new(agent);
    let drive = Arc::new(drive);
    let rename_service = Arc::new(RenameService::new(&config, agent.clone(), drive.clone()));
    rename_service.ensure_directories().await.unwrap();

    let app = create_app(AppState {
        rename_service,
        config,
    });

    TestEnv {
        app,
        upload,
        download,
        agent,
        drive,
    }
}

/// Builds a PDF with one line of Helvetica text per page.
pub fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 14.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// A multipart part: (field name, optional filename, content).
pub type Part<'a> = (&'a str, Option<&'a str>, &'a [u8]);

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/pdf\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
            }
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}
