use duskfall::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let server = DuskfallServer::builder().config(config).build().await?;

    tracing::info!(addr = %server.local_addr()?, "listening");
    eprintln!("Duskfall server on ws://{}", server.local_addr()?);

    server.run().await?;
    Ok(())
}
