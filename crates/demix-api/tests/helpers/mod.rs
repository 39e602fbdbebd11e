//! Test helpers: build AppState and router for integration tests.
//!
//! Run from workspace root: `cargo test -p demix-api`. The media toolkit and
//! separator are replaced by fakes; storage is a `LocalStorage` in a temp dir
//! that reports S3-style object URLs.

#![allow(dead_code)]

pub mod fakes;
pub mod link_server;
pub mod storage;

use axum_test::TestServer;
use demix_api::setup::routes;
use demix_api::state::AppState;
use demix_core::Config;
use demix_processing::{AudioStager, RetryPolicy, SeparationPipeline};
use demix_storage::{LocalStorage, Storage};
use fakes::{FakeSeparator, FakeToolkit};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::BucketUrlStorage;
use tempfile::TempDir;

/// Test application: server plus handles on the fakes it was built with.
pub struct TestApp {
    pub server: TestServer,
    pub config: Config,
    pub storage: Arc<dyn Storage>,
    pub toolkit: Arc<FakeToolkit>,
    pub separator: Arc<FakeSeparator>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Number of entries left in the staging directory.
    pub fn staged_files(&self) -> usize {
        count_entries(&self.config.staging_dir)
    }

    /// Number of per-request output directories left by the separator.
    pub fn separation_outputs(&self) -> usize {
        count_entries(&self.config.separated_dir.join("htdemucs"))
    }

    pub fn assert_no_local_leftovers(&self) {
        assert_eq!(self.staged_files(), 0, "staging directory not empty");
        assert_eq!(self.separation_outputs(), 0, "separation output not removed");
    }
}

fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

type StorageWrapper = Box<dyn FnOnce(Arc<dyn Storage>) -> Arc<dyn Storage>>;

/// Builder for [`TestApp`] variations.
pub struct TestAppBuilder {
    env: HashMap<String, String>,
    toolkit_available: bool,
    failing_separator: bool,
    wrap_storage: Option<StorageWrapper>,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            env: HashMap::new(),
            toolkit_available: true,
            failing_separator: false,
            wrap_storage: None,
        }
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn toolkit_unavailable(mut self) -> Self {
        self.toolkit_available = false;
        self
    }

    pub fn failing_separator(mut self) -> Self {
        self.failing_separator = true;
        self
    }

    pub fn wrap_storage<F>(mut self, wrap: F) -> Self
    where
        F: FnOnce(Arc<dyn Storage>) -> Arc<dyn Storage> + 'static,
    {
        self.wrap_storage = Some(Box::new(wrap));
        self
    }

    pub async fn build(self) -> TestApp {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let config = test_config(temp_dir.path(), &self.env);

        let local = LocalStorage::new(
            temp_dir.path().join("store"),
            "http://localhost:5000/files".to_string(),
        )
        .await
        .expect("Failed to create local storage");
        let mut storage: Arc<dyn Storage> = Arc::new(BucketUrlStorage::new(local));
        if let Some(wrap) = self.wrap_storage {
            storage = wrap(storage);
        }

        let toolkit = Arc::new(FakeToolkit::new(self.toolkit_available));
        let separator = Arc::new(if self.failing_separator {
            FakeSeparator::failing(config.separated_dir.clone())
        } else {
            FakeSeparator::new(config.separated_dir.clone())
        });

        let stager = AudioStager::new(
            config.staging_dir.clone(),
            config.max_audio_size_bytes,
            config.url_fetch_timeout,
            config.url_allow_private_hosts,
        )
        .expect("Failed to create stager");
        let retry = RetryPolicy::new(
            config.upload_max_attempts,
            config.upload_initial_backoff,
            config.upload_max_backoff,
        );
        let pipeline = SeparationPipeline::new(
            storage.clone(),
            toolkit.clone(),
            separator.clone(),
            stager,
            retry,
        )
        .with_original_upload(config.upload_original);

        let state = Arc::new(AppState::new(config.clone(), storage.clone(), pipeline));
        let app = routes::setup_routes(state).expect("Failed to setup routes");
        let server =
            TestServer::new(app.into_make_service()).expect("Failed to create test server");

        TestApp {
            server,
            config,
            storage,
            toolkit,
            separator,
            _temp_dir: temp_dir,
        }
    }
}

/// Default test app.
pub async fn setup_test_app() -> TestApp {
    TestAppBuilder::new().build().await
}

fn test_config(root: &Path, overrides: &HashMap<String, String>) -> Config {
    let path = |p: &str| -> String { root.join(p).to_string_lossy().to_string() };

    let mut env: HashMap<String, String> = [
        ("STORAGE_BACKEND", "local".to_string()),
        ("LOCAL_STORAGE_PATH", path("store")),
        ("LOCAL_STORAGE_BASE_URL", "http://localhost:5000/files".to_string()),
        ("STAGING_DIR", path("uploads")),
        ("SEPARATED_DIR", path("separated")),
        ("URL_ALLOW_PRIVATE_HOSTS", "true".to_string()),
        ("UPLOAD_MAX_ATTEMPTS", "3".to_string()),
        ("UPLOAD_INITIAL_BACKOFF_MS", "1".to_string()),
        ("UPLOAD_MAX_BACKOFF_MS", "4".to_string()),
        ("MAX_AUDIO_SIZE_MB", "1".to_string()),
        ("URL_FETCH_TIMEOUT_SECS", "5".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    env.extend(overrides.clone());

    Config::from_lookup(|key| env.get(key).cloned()).expect("Failed to build test config")
}

/// `stems/{stem}_{uuid}_{name}` object URL pattern check.
pub fn assert_stem_url(url: &str, stem: &str, original_name: &str) {
    let prefix = format!(
        "https://{}.s3.{}.amazonaws.com/stems/{}_",
        storage::TEST_BUCKET,
        storage::TEST_REGION,
        stem
    );
    let rest = url
        .strip_prefix(&prefix)
        .unwrap_or_else(|| panic!("unexpected stem URL: {url}"));
    let (id, name) = rest.split_once('_').expect("missing unique prefix");
    assert_eq!(id.len(), 32, "unique prefix should be a simple uuid: {url}");
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(name, original_name);
}

/// Path of a file under the test's temp directory.
pub fn temp_path(app: &TestApp, relative: &str) -> PathBuf {
    app._temp_dir.path().join(relative)
}
