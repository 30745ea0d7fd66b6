use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Router};
use std::sync::Arc;
use tracing::error;

use super::auth::Authorizer;
use super::types::{Controller, RequestOutcome};

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    pub authorizer: Arc<dyn Authorizer>,
}

/// Client id resolved by the auth middleware, carried in extensions.
#[derive(Clone)]
pub struct ClientId(pub String);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/request", post(handle_request))
        .layer(middleware::from_fn_with_state(state.clone(), authorize))
        .with_state(state)
}

async fn authorize(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    match state.authorizer.authorize(header_value) {
        Some(id) => {
            request.extensions_mut().insert(ClientId(id));
            next.run(request).await
        }
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn handle_request(
    State(state): State<AppState>,
    Extension(ClientId(client_id)): Extension<ClientId>,
    headers: HeaderMap,
) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    match state.controller.handle_request(&client_id, host).await {
        Ok(RequestOutcome::Pending) => StatusCode::ACCEPTED.into_response(),
        Ok(RequestOutcome::Ready(address)) => (StatusCode::OK, address).into_response(),
        Err(err) => {
            error!(client = %client_id, error = %err, "request handling failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::controller::HeaderAuthorizer;
    use crate::probe::MockProbe;
    use crate::record::{RequestRecord, Status};
    use crate::store::{MemoryStore, Store};

    fn app(store: Arc<MemoryStore>, probe: Arc<MockProbe>) -> Router {
        let controller = Controller::new(store, probe);
        router(AppState {
            controller: Arc::new(controller),
            authorizer: Arc::new(HeaderAuthorizer),
        })
    }

    fn request(auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/request")
            .header(header::HOST, "front.example:3000");
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn missing_authorization_is_401() {
        let app = app(Arc::new(MemoryStore::new()), Arc::new(MockProbe::new()));

        let response = app.oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn fresh_request_is_accepted() {
        let store = Arc::new(MemoryStore::new());
        let app = app(Arc::clone(&store), Arc::new(MockProbe::new()));

        let response = app.oneshot(request(Some("c1"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(store.snapshot("c1").unwrap().status, Status::Created);
    }

    #[tokio::test]
    async fn done_request_returns_the_rebuilt_address() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(&RequestRecord {
                id: "c1".to_string(),
                status: Status::Done,
                container: Some("host-x".to_string()),
                server_port: Some("34999".to_string()),
            })
            .await
            .unwrap();
        let app = app(Arc::clone(&store), Arc::new(MockProbe::new()));

        let response = app.oneshot(request(Some("c1"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"front.example:34999");
    }
}
