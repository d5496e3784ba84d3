//! Shared test fixtures: an instrumented client and a demo application.

#![allow(dead_code)]

use armature_header_session::prelude::*;
use async_trait::async_trait;
use http::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::{Layer, ServiceExt, service_fn};

pub const HEADER: &str = "X-Session-ID";
pub const FORGED_ID: &str = "oFXT7g-1gwIBH4X_zMua7A43qSuu-PW_";

/// Failure injected into the next calls of a [`RecordingClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    GetBackend,
    GetNotFound,
    Set,
    Destroy,
}

/// Memory-backed client that counts calls and can fail on demand.
pub struct RecordingClient {
    inner: MemoryStore,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    pub destroys: AtomicUsize,
    pub last_ttl: Mutex<Option<Duration>>,
    fault: Mutex<Option<Fault>>,
}

impl RecordingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
            last_ttl: Mutex::new(None),
            fault: Mutex::new(None),
        })
    }

    pub fn fail_with(&self, fault: Fault) {
        *self.fault.lock().unwrap() = Some(fault);
    }

    pub fn heal(&self) {
        *self.fault.lock().unwrap() = None;
    }

    pub fn emit(&self, event: StoreEvent) {
        self.inner.emit(event);
    }

    pub fn calls(&self) -> usize {
        self.gets() + self.sets() + self.destroys()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> usize {
        self.inner.len()
    }

    /// Read a record directly, bypassing the counters.
    pub async fn peek(&self, key: &str) -> Option<Session> {
        self.inner.get(key).await.unwrap()
    }

    fn fault(&self) -> Option<Fault> {
        *self.fault.lock().unwrap()
    }
}

#[async_trait]
impl SessionClient for RecordingClient {
    async fn get(&self, key: &str) -> SessionResult<Option<Session>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        match self.fault() {
            Some(Fault::GetBackend) => Err(SessionError::Backend("mock get error".into())),
            Some(Fault::GetNotFound) => Err(SessionError::NotFound(key.to_string())),
            _ => self.inner.get(key).await,
        }
    }

    async fn set(&self, key: &str, session: &Session, ttl: Duration) -> SessionResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        *self.last_ttl.lock().unwrap() = Some(ttl);
        if self.fault() == Some(Fault::Set) {
            return Err(SessionError::Backend("mock set error".into()));
        }
        self.inner.set(key, session, ttl).await
    }

    async fn destroy(&self, key: &str) -> SessionResult<()> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        if self.fault() == Some(Fault::Destroy) {
            return Err(SessionError::Backend("mock destroy error".into()));
        }
        self.inner.destroy(key).await
    }

    fn subscribe(&self, observer: Arc<dyn StoreObserver>) -> bool {
        self.inner.subscribe(observer)
    }
}

fn text(status: StatusCode, body: impl Into<String>) -> Response<String> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
}

/// Demo routes mirroring a typical session-backed application.
pub async fn controllers(req: Request<()>) -> Result<Response<String>, Infallible> {
    Ok(match route(&req).await {
        Ok(body) => text(StatusCode::OK, body),
        Err(_) => text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
    })
}

async fn route(req: &Request<()>) -> SessionResult<String> {
    let handle = req.extensions().get::<SessionHandle>().cloned();

    match (req.uri().path(), handle) {
        ("/session/get", Some(handle)) => {
            let count = handle
                .update(|session| {
                    let count = session.get::<u64>("count").unwrap_or(0) + 1;
                    session.set("count", count).map(|_| count)
                })
                .await?
                .transpose()?
                .unwrap_or(0);
            Ok(count.to_string())
        }
        ("/session/nothing", Some(handle)) => {
            let session = handle.read().await?;
            Ok(session
                .and_then(|s| s.get::<u64>("count"))
                .map(|c| c.to_string())
                .unwrap_or_default())
        }
        ("/session/remove", Some(handle)) => {
            handle.clear().await;
            Ok("0".to_string())
        }
        ("/session/rewrite", Some(handle)) => {
            let mut session = Session::new();
            session.set("foo", "bar")?;
            handle.write(Some(session)).await;
            let current = handle.read().await?.unwrap_or_default();
            current.to_json()
        }
        ("/session/empty", Some(handle)) => {
            handle.write(Some(Session::new())).await;
            Ok("empty".to_string())
        }
        ("/session/notuse", _) => Ok("not touch session".to_string()),
        ("/session/id", _) => Ok(req
            .extensions()
            .get::<SessionId>()
            .map(|id| id.to_string())
            .unwrap_or_default()),
        (_, Some(_)) => Ok("has session".to_string()),
        (_, None) => Ok("no session".to_string()),
    }
}

/// Config used by most middleware tests.
pub fn config(client: &Arc<RecordingClient>) -> SessionConfig {
    SessionConfig::default()
        .with_store(client.clone())
        .with_prefix("koss:test")
        .with_path("/session")
        .with_ttl(Duration::from_secs(1))
}

/// Send a request through `layer` wrapped around [`controllers`].
pub async fn send(layer: &SessionLayer, path: &str, session_id: Option<&str>) -> Response<String> {
    let mut builder = Request::get(path);
    if let Some(id) = session_id {
        builder = builder.header(HEADER, id);
    }
    let req = builder.body(()).unwrap();
    layer
        .layer(service_fn(controllers))
        .oneshot(req)
        .await
        .unwrap()
}

pub fn session_header(response: &Response<String>) -> Option<String> {
    response
        .headers()
        .get(HEADER)
        .map(|v| v.to_str().unwrap().to_string())
}
