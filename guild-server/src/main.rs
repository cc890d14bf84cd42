use std::env;
use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use guild_server::{router, State};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().collect();
    let port: u16 = match args.get(1) {
        Some(p) => p.parse()?,
        None => 8000,
    };
    let data_dir = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| format!("guild-db-{port}"));

    let state = State::new(&data_dir)?;
    let app = router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!(%addr, %data_dir, "guild record store listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
