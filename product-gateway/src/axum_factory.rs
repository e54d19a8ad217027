//! Axum http server factory.

use std::net::SocketAddr;

use async_graphql::BatchRequest;
use async_graphql::BatchResponse;
use async_graphql::http::GraphiQLSource;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::configuration::HEALTH_CHECK_PATH;
use crate::configuration::Server;
use crate::error::GatewayError;
use crate::schema::GatewaySchema;

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
enum HealthStatus {
    Up,
}

#[derive(Debug, Serialize)]
struct Health {
    status: HealthStatus,
}

/// Builds the inbound router: GraphQL on the configured path, plus the landing page and
/// health check when enabled.
pub fn make_axum_router(schema: GatewaySchema, server: &Server) -> Router {
    let mut graphql = post(handle_graphql);
    if server.landing_page {
        let landing_page = GraphiQLSource::build().endpoint(&server.path).finish();
        graphql = graphql.get(move || std::future::ready(Html(landing_page.clone())));
    }

    let mut router = Router::new().route(&server.path, graphql);
    if server.health_check {
        router = router.route(HEALTH_CHECK_PATH, get(health));
    }

    router.layer(TraceLayer::new_for_http()).with_state(schema)
}

async fn handle_graphql(
    State(schema): State<GatewaySchema>,
    Json(request): Json<BatchRequest>,
) -> Json<BatchResponse> {
    Json(schema.execute_batch(request).await)
}

async fn health() -> Json<Health> {
    Json(Health {
        status: HealthStatus::Up,
    })
}

/// A handle with which a client can shut down the server gracefully.
#[derive(Debug)]
pub struct HttpServerHandle {
    /// The address the server actually listens on.
    /// If the configured port is zero the OS assigns a random free port.
    listen_address: SocketAddr,

    /// Sender to use to notify of shutdown
    shutdown_sender: oneshot::Sender<()>,

    /// Future to wait on for graceful shutdown
    server_future: JoinHandle<std::io::Result<()>>,
}

impl HttpServerHandle {
    /// Binds the configured address and starts serving `schema` in the background.
    pub async fn start(schema: GatewaySchema, server: &Server) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind(server.listen)
            .await
            .map_err(GatewayError::ServerCreationError)?;
        let listen_address = listener
            .local_addr()
            .map_err(GatewayError::ServerCreationError)?;

        let router = make_axum_router(schema, server);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel::<()>();
        let server_future = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_receiver.await;
                })
                .await
        });

        tracing::info!("Listening on http://{}{} 🚀", listen_address, server.path);
        Ok(Self {
            listen_address,
            shutdown_sender,
            server_future,
        })
    }

    pub fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Stops accepting connections and waits for in-flight requests to drain.
    pub async fn shutdown(self) -> Result<(), GatewayError> {
        if let Err(_err) = self.shutdown_sender.send(()) {
            tracing::error!("Failed to notify http thread of shutdown")
        };
        self.server_future
            .await
            .map_err(GatewayError::ServerTaskError)?
            .map_err(GatewayError::ServerError)
    }
}
