use std::sync::Arc;

use axum::handler::Handler;
use axum::http::HeaderName;
use axum::routing::get;
use axum::Router;
use dog_upload::{FormBinder, SessionReaper, StorageHandler, UploadHandler, UploadSessionStore};
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::rest;
use crate::UploadAxumState;

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The upload core plus the axum router serving it
pub struct UploadApp {
    pub uploads: Arc<UploadHandler>,
    pub storage: Arc<StorageHandler>,
    pub sessions: Arc<dyn UploadSessionStore>,
    pub router: Router<()>,
}

impl Clone for UploadApp {
    fn clone(&self) -> Self {
        Self {
            uploads: Arc::clone(&self.uploads),
            storage: Arc::clone(&self.storage),
            sessions: Arc::clone(&self.sessions),
            router: self.router.clone(),
        }
    }
}

impl UploadApp {
    pub fn new(
        uploads: UploadHandler,
        storage: Arc<StorageHandler>,
        sessions: Arc<dyn UploadSessionStore>,
    ) -> Self {
        Self {
            uploads: Arc::new(uploads),
            storage,
            sessions,
            router: Router::new(),
        }
    }

    pub fn use_router(mut self, path: &str, router: Router<()>) -> Self {
        self.router = self.router.nest(path, router);
        self
    }

    /// Serve uploads at `path`, binding form data through `form` when given
    pub fn use_uploads(self, path: &str, form: Option<Arc<dyn FormBinder>>) -> Self {
        let mut state = UploadAxumState::new(Arc::clone(&self.uploads));
        if let Some(form) = form {
            state = state.with_form(form);
        }
        let router = rest::upload_router(state);
        self.use_router(path, router)
    }

    pub fn service<H, T>(mut self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()> + Clone + Send + Sync + 'static,
        T: 'static,
    {
        self.router = self.router.route(path, get(handler));
        self
    }

    /// Request ids, tracing and CORS around every route registered so far
    pub fn with_http_layers(mut self) -> Self {
        self.router = self
            .router
            .layer(PropagateRequestIdLayer::new(REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(REQUEST_ID, MakeRequestUuid))
            .layer(
                tower_http::cors::CorsLayer::new()
                    .allow_origin(tower_http::cors::Any)
                    .allow_methods(tower_http::cors::Any)
                    .allow_headers(tower_http::cors::Any)
                    .expose_headers([
                        HeaderName::from_static("location"),
                        HeaderName::from_static("range"),
                        REQUEST_ID,
                    ]),
            );
        self
    }

    /// Reaper over this app's sessions
    pub fn reaper(&self) -> SessionReaper {
        SessionReaper::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.sessions),
            self.uploads.config().session_ttl,
        )
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}
