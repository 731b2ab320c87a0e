//! Edge gateway.
//!
//! Routes by path prefix to the session service and the downstream
//! services. Protected prefixes require a valid access token, verified
//! locally with the shared secret; there is no lookup against the token
//! store, so an access token stays usable until it expires.

pub mod identity;
pub mod relay;

use anyhow::{Context, Result};
use axum::{
    Router, middleware,
    routing::{any, get},
};
use tower_http::trace::TraceLayer;

use crate::app::cors_layer;
use crate::auth::jwt::JwtManager;
use crate::config::GatewayConfig;
use crate::error::AppError;
use crate::handlers::health::health;
use relay::Upstream;

pub fn build_gateway(config: &GatewayConfig) -> Result<Router> {
    // Verification only; the gateway never mints tokens.
    let jwt = JwtManager::new(&config.jwt_secret, 0);
    let client = reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("failed to build upstream HTTP client")?;

    let mut router = Router::new().route("/health", get(health));

    for route in &config.routes {
        let upstream = Upstream {
            base: route.upstream.clone(),
            client: client.clone(),
        };
        let mut routes = Router::new()
            .route(&route.prefix, any(relay::forward))
            .route(&format!("{}/{{*rest}}", route.prefix), any(relay::forward))
            .with_state(upstream);

        if route.protected {
            routes = routes.route_layer(middleware::from_fn_with_state(
                jwt.clone(),
                identity::require_identity,
            ));
        }
        router = router.merge(routes);
    }

    Ok(router
        .fallback(|| async { AppError::not_found("No route for this path") })
        .layer(middleware::from_fn(identity::strip_identity))
        .layer(cors_layer(&config.frontend_url)?)
        .layer(TraceLayer::new_for_http()))
}
