//! Shared helpers for integration tests

#![allow(dead_code)]

use incident_desk_core::auth::{sign_init_data, AdminSet, InitDataVerifier, SigningKeyVariant};
use incident_desk_core::config::UploadLimits;
use incident_desk_core::relay::{Relay, ReportSink};
use incident_desk_core::report::{JsonFileStore, Report, ReportStore};
use incident_desk_core::server::{build_router, AppState};
use incident_desk_core::uploads::UploadStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};
use tokio::net::TcpListener;

pub const BOT_TOKEN: &str = "123456:TEST-TOKEN";
pub const ADMIN_ID: i64 = 1000;
pub const USER_ID: i64 = 2000;

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// A valid payload for the given user, signed with [`BOT_TOKEN`]
pub fn signed_for(user_id: i64, first_name: &str) -> String {
    let user = format!(r#"{{"id":{user_id},"first_name":"{first_name}","username":"user{user_id}"}}"#);
    sign_init_data(
        [("auth_date", "1700000000"), ("query_id", "AAE"), ("user", user.as_str())],
        BOT_TOKEN,
        SigningKeyVariant::WebAppData,
    )
}

/// Sink events recorded by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Created { id: String, photos: usize },
    Updated { id: String },
    Deleted { id: String },
}

/// Records every relay event instead of calling out
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ReportSink for RecordingSink {
    async fn report_created(&self, report: &Report, photos: &[PathBuf]) -> anyhow::Result<()> {
        for photo in photos {
            assert!(photo.exists(), "relayed photo {} is missing", photo.display());
        }
        self.events.lock().unwrap().push(SinkEvent::Created {
            id: report.id.clone(),
            photos: photos.len(),
        });
        Ok(())
    }

    async fn report_updated(&self, report: &Report) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Updated {
            id: report.id.clone(),
        });
        Ok(())
    }

    async fn report_deleted(&self, report: &Report) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Deleted {
            id: report.id.clone(),
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// A running server backed by a temp directory
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub sink: RecordingSink,
    pub store: Arc<JsonFileStore>,
    pub uploads_dir: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|state| state).await
    }

    pub async fn start_with(customize: impl FnOnce(AppState) -> AppState) -> Self {
        init_test_logging();

        let dir = tempfile::TempDir::new().unwrap();
        let uploads_dir = dir.path().join("uploads");
        let store = Arc::new(JsonFileStore::new(dir.path().join("reports.json")));
        let sink = RecordingSink::default();

        let limits = UploadLimits {
            max_photos: 3,
            max_photo_bytes: 64 * 1024,
        };
        let state = AppState::new(
            InitDataVerifier::new(BOT_TOKEN, SigningKeyVariant::WebAppData),
            AdminSet::parse_list(&format!(" {ADMIN_ID} , 31337")),
            store.clone() as Arc<dyn ReportStore>,
            UploadStore::new(&uploads_dir, limits),
            Relay::new(vec![Box::new(sink.clone())]),
        );
        let app = build_router(customize(state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: reqwest::Client::new(),
            sink,
            store,
            uploads_dir,
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Number of files currently in the uploads directory
    pub fn upload_count(&self) -> usize {
        std::fs::read_dir(&self.uploads_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
