use clap::Parser;
use tracing::{debug, info, warn};

mod log;
mod utils;

#[derive(Parser)]
#[command(version)]
struct Args {
    /// Set config file path
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = muxion::config::Config::parse(args.config)?;

    log::set(format!(
        "tvmux={},muxion={},tower_http={},sea_orm=warn",
        cfg.log.level, cfg.log.level, cfg.log.level
    ));

    warn!("set log level : {}", cfg.log.level);
    debug!("config : {:?}", cfg);

    let listener = tokio::net::TcpListener::bind(cfg.http.listen).await?;
    info!("Server listening on {}", listener.local_addr()?);

    muxion::server_up(cfg, listener, utils::shutdown_signal()).await?;
    info!("Server shutdown");
    Ok(())
}
