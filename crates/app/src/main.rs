//! Shopkeep API client - command-line entry point.
//!
//! Usage: `shopkeep <METHOD> <PATH> [JSON_BODY]`
//!
//! Restores the persisted session, signs in first when `SHOPKEEP_EMAIL` and
//! `SHOPKEEP_PASSWORD` are set, then performs one request and prints the
//! JSON response.

use std::sync::Arc;

use serde_json::{Value, json};
use shopkeep_domain::{HttpMethod, PendingRequest, RequestBody};
use shopkeep_infrastructure::{FileStorage, SettingsLoader};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: shopkeep <METHOD> <PATH> [JSON_BODY]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args().skip(1);
    let method: HttpMethod = args.next().ok_or(USAGE)?.parse()?;
    let path = args.next().ok_or(USAGE)?;
    let body = args
        .next()
        .map(|raw| serde_json::from_str::<Value>(&raw))
        .transpose()?;

    let settings = SettingsLoader::new().load().await?;
    tracing::info!(
        base_url = %settings.base_url,
        "Starting Shopkeep client v{}",
        env!("CARGO_PKG_VERSION")
    );

    let storage = Arc::new(FileStorage::in_config_dir()?);
    let shopkeep = shopkeep::connect(settings, storage).await?;

    if let (Ok(email), Ok(password)) = (
        std::env::var("SHOPKEEP_EMAIL"),
        std::env::var("SHOPKEEP_PASSWORD"),
    ) {
        shopkeep
            .client
            .login(&json!({ "email": email, "password": password }))
            .await?;
    }

    shopkeep.monitor.start();

    let mut request = PendingRequest::new(method, path);
    if let Some(body) = body {
        request = request.with_body(RequestBody::Json(body));
    }
    let result = shopkeep.client.send::<Value>(request).await;
    shopkeep.monitor.stop();

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}
