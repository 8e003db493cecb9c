//! Binary entry point: load configuration, validate and ingest the
//! configured document, then serve the read API.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kunskap::error::KunskapError;
use kunskap::graph::Strictness;
use kunskap::interface::{DEFAULT_SESSION_CAPACITY, SessionStore};
use kunskap::{ingest, server};

#[derive(Debug, Deserialize)]
struct Settings {
    #[serde(default = "default_document")]
    document: String,
    #[serde(default = "default_listen")]
    listen: String,
    #[serde(default = "default_strictness")]
    strictness: String,
    #[serde(default = "default_session_capacity")]
    session_capacity: usize,
}

fn default_document() -> String {
    "knowledgebase.xml".into()
}
fn default_listen() -> String {
    "127.0.0.1:8080".into()
}
fn default_strictness() -> String {
    "strict".into()
}
fn default_session_capacity() -> usize {
    DEFAULT_SESSION_CAPACITY
}

impl Settings {
    fn load() -> Result<Self, KunskapError> {
        config::Config::builder()
            .add_source(config::File::with_name("kunskap").required(false))
            .add_source(config::Environment::with_prefix("KUNSKAP"))
            .build()
            .and_then(|raw| raw.try_deserialize())
            .map_err(|cause| KunskapError::Config(cause.to_string()))
    }

    fn strictness(&self) -> Result<Strictness, KunskapError> {
        match self.strictness.as_str() {
            "strict" => Ok(Strictness::Strict),
            "lenient" => Ok(Strictness::Lenient),
            other => Err(KunskapError::Config(format!(
                "unknown strictness '{}'",
                other
            ))),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kunskap=info")),
        )
        .init();

    let settings = Settings::load()?;
    let graph = Arc::new(ingest::load(&settings.document, settings.strictness()?)?);
    info!(
        document = %settings.document,
        name = graph.metadata().name(),
        version = graph.metadata().version(),
        purposes = graph.purposes().len(),
        variants = graph.variants().len(),
        roots = graph.root_purposes().len(),
        "knowledge base loaded"
    );

    let sessions = Arc::new(SessionStore::new(
        Arc::clone(&graph),
        settings.session_capacity,
    ));
    let app = server::router(graph, sessions);
    let listener = tokio::net::TcpListener::bind(&settings.listen).await?;
    info!(listen = %settings.listen, "serving");
    axum::serve(listener, app).await?;
    Ok(())
}
