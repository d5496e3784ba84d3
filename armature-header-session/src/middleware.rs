//! Tower middleware wiring the session lifecycle into a request pipeline.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::handle::{SessionHandle, SessionId};
use crate::lifecycle::{RequestContext, SessionManager};
use http::{HeaderValue, Request, Response, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, error, trace, warn};

/// Layer attaching a session to every request under the configured path.
///
/// Handlers find a [`SessionHandle`] and the [`SessionStore`](crate::SessionStore)
/// in the request extensions; in eager mode also the resolved [`SessionId`].
///
/// Session failures (store unavailable, load or write errors the error
/// handler re-raised) turn into `500 Internal Server Error` responses. Errors
/// from the inner service propagate unchanged and nothing is persisted.
///
/// # Examples
///
/// ```no_run
/// use armature_header_session::{SessionConfig, SessionLayer};
/// use tower::ServiceBuilder;
///
/// # fn build() -> Result<(), armature_header_session::SessionError> {
/// let layer = SessionLayer::new(SessionConfig::default().with_path("/api"))?;
/// let service = ServiceBuilder::new()
///     .layer(layer)
///     .service_fn(|_req: http::Request<()>| async {
///         Ok::<_, std::convert::Infallible>(http::Response::new(String::new()))
///     });
/// # let _ = service;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SessionLayer {
    manager: Arc<SessionManager>,
}

impl SessionLayer {
    /// Create a layer from configuration.
    pub fn new(config: SessionConfig) -> SessionResult<Self> {
        Ok(Self::from_manager(Arc::new(SessionManager::new(config)?)))
    }

    /// Create a layer around an existing manager.
    pub fn from_manager(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    /// The lifecycle controller behind this layer.
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            manager: Arc::clone(&self.manager),
        }
    }
}

/// Service produced by [`SessionLayer`].
#[derive(Clone, Debug)]
pub struct SessionService<S> {
    inner: S,
    manager: Arc<SessionManager>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for SessionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // the clone may not be ready; keep the one poll_ready was called on
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let manager = Arc::clone(&self.manager);

        Box::pin(async move {
            if req.extensions().get::<SessionHandle>().is_some() {
                trace!("Session already attached upstream, skipping");
                let mut inner = inner;
                return inner.call(req).await;
            }

            req.extensions_mut().insert(manager.store().clone());

            if manager.is_deferred() {
                deferred(manager, inner, req).await
            } else {
                eager(manager, inner, req).await
            }
        })
    }
}

/// Load before the handler, release after it.
async fn eager<S, ReqBody, ResBody>(
    manager: Arc<SessionManager>,
    mut inner: S,
    mut req: Request<ReqBody>,
) -> Result<Response<ResBody>, S::Error>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Default,
{
    let ctx = RequestContext::from_request(&req);

    let acquired = match manager.acquire(&ctx).await {
        Ok(Some(acquired)) => acquired,
        Ok(None) => return inner.call(req).await,
        Err(err) => return Ok(failure_response(&ctx, err)),
    };

    req.extensions_mut()
        .insert(SessionId(acquired.session_id.clone()));
    let handle = SessionHandle::loaded(acquired);
    req.extensions_mut().insert(handle.clone());

    let response = inner.call(req).await?;
    Ok(finish(&manager, &ctx, &handle, response).await)
}

/// Hand the handler a lazy cell; only touched sessions are released.
async fn deferred<S, ReqBody, ResBody>(
    manager: Arc<SessionManager>,
    mut inner: S,
    mut req: Request<ReqBody>,
) -> Result<Response<ResBody>, S::Error>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Default,
{
    let ctx = RequestContext::from_request(&req);

    if !manager.matches_path(ctx.path()) {
        debug!(path = %ctx.path(), "Session path not matched");
        return inner.call(req).await;
    }

    let handle = SessionHandle::deferred(Arc::clone(&manager), ctx.clone());
    req.extensions_mut().insert(handle.clone());

    let response = inner.call(req).await?;
    Ok(finish(&manager, &ctx, &handle, response).await)
}

async fn finish<ResBody: Default>(
    manager: &SessionManager,
    ctx: &RequestContext,
    handle: &SessionHandle,
    mut response: Response<ResBody>,
) -> Response<ResBody> {
    let Some(pending) = handle.pending().await else {
        trace!("Session never touched");
        return response;
    };

    let (session_id, is_new) = match pending.session_id {
        Some(session_id) => (session_id, pending.is_new),
        None => manager.resolve_for_write(ctx),
    };

    let outcome = match manager
        .release(
            ctx,
            &session_id,
            pending.session.as_ref(),
            pending.original_hash,
            is_new,
        )
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => return failure_response(ctx, err),
    };
    trace!(session_id = %session_id, ?outcome, "Session released");

    // cleared sessions have no identifier left to advertise
    if pending.session.is_some() {
        match HeaderValue::from_str(&session_id) {
            Ok(value) => {
                response
                    .headers_mut()
                    .insert(manager.header().clone(), value);
            }
            Err(_) => warn!(session_id = %session_id, "Session id is not a valid header value"),
        }
    }

    response
}

fn failure_response<ResBody: Default>(ctx: &RequestContext, err: SessionError) -> Response<ResBody> {
    error!(error = %err, method = %ctx.method, path = %ctx.path(), "Session handling failed");
    let mut response = Response::new(ResBody::default());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
