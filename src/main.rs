use rmcp::ServiceExt;
use rmcp::transport::stdio;

use shijing::config::BackendConfig;
use shijing::context::AppContext;
use shijing::server::PoetryServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Unconfigured backends still serve the built-in sample data.
    let config = BackendConfig::from_env();
    let ctx = AppContext::from_config(&config);

    let server = PoetryServer::new(ctx);
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
