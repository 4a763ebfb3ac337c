use anyhow::Result;
use dog_upload_axum::{build, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();
    let ax = build(&config).await?;

    tokio::spawn(ax.reaper().with_interval(config.reap_interval).start());

    let addr = config.addr();
    println!("[upload] listening on http://{addr}");

    ax.listen(addr).await?;

    Ok(())
}
