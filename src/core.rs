use crate::{
    app::AppContext,
    cors::build_cors_layer,
    error::{RelayError, Result},
    health,
    http::RouteModule,
    middleware::{MakeRequestUuid, require_api_key},
    routes::{CardRoutes, CustomerRoutes, PaymentRoutes, RootRoutes},
    timeout::{enforce_timeout, timeout_limit},
};
use axum::{Router, extract::DefaultBodyLimit};
use std::time::Duration;
use tokio::signal;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// The relay HTTP application.
///
/// Routes are registered against [`AppContext`]; state and the middleware
/// stack are applied once in [`App::into_router`].
pub struct App {
    router: Router<AppContext>,
    context: AppContext,
}

impl App {
    /// An application with only `/health` registered.
    pub fn new(context: AppContext) -> Self {
        Self {
            router: health::health_routes(),
            context,
        }
    }

    /// An application with every relay endpoint registered.
    pub fn relay(context: AppContext) -> Self {
        Self::new(context)
            .register_module(RootRoutes)
            .register_module(CustomerRoutes)
            .register_module(CardRoutes)
            .register_module(PaymentRoutes)
    }

    pub fn register_module<M: RouteModule>(mut self, module: M) -> Self {
        self.router = module.register(self.router);
        self
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    /// Apply middleware and state, producing a servable router.
    pub fn into_router(self) -> Router {
        let config = self.context.config.clone();
        let mut router = self.router;

        // Middleware order (from inner to outer):
        // 1. API key guard on write endpoints
        router = router.layer(axum::middleware::from_fn_with_state(
            self.context.clone(),
            require_api_key,
        ));

        // 2. Body size limit
        router = router.layer(DefaultBodyLimit::max(config.server.max_body_size));

        // 3. Whole-request timeout
        if let Some(limit) = timeout_limit(&config.timeout) {
            router = router.layer(axum::middleware::from_fn_with_state(limit, enforce_timeout));
        }

        // 4. CORS, outside the guard so preflights are answered
        if let Some(cors_layer) = build_cors_layer(&config.cors) {
            router = router.layer(cors_layer);
        }

        // 5. Request ID, then HTTP tracing outermost
        router = router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http());

        router.with_state(self.context)
    }

    /// Router for driving requests in tests without binding a socket.
    pub fn into_test_router(self) -> Router {
        self.into_router()
    }

    pub async fn serve(self) -> Result<()> {
        let addr = self
            .context
            .config
            .server
            .addr()
            .map_err(|e| RelayError::config(format!("Invalid server address: {}", e)))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::internal(format!("Failed to bind {}: {}", addr, e)))?;

        let readiness = self.context.processor.ensure_configured();
        tracing::info!(
            %addr,
            env = %readiness.env,
            square_ready = readiness.ready,
            store = self.context.store.backend(),
            "Server starting"
        );
        if !readiness.ready {
            tracing::warn!(
                has_token = readiness.has_token,
                has_location = readiness.has_location,
                "Square credentials incomplete; payment endpoints will answer 503"
            );
        }

        let router = self.into_router();

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| RelayError::internal(format!("Server error: {}", e)))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give connections a grace period to close
    tokio::time::sleep(Duration::from_secs(1)).await;
    tracing::info!("Shutdown complete");
}
