use clap::Args;
use tracing::info;

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long, short, help = "Port to listen on (defaults to PORT or the environment preset)")]
    pub port: Option<u16>,
}

pub async fn handle(args: ServeArgs) -> anyhow::Result<()> {
    let config = crate::config::config();
    info!("Starting product page API in {:?} mode", config.environment);

    crate::serve(config, args.port.unwrap_or(config.api.port)).await
}
