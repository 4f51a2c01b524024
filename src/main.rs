use anyhow::Result;
use tomodachi_testcontainers::cli::{Args, ExecutionMode, commands};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tomodachi_testcontainers=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    match mode {
        ExecutionMode::Up(config) => {
            info!("Starting {:?} side-car", config.profile);
            commands::up(config).await
        }
        ExecutionMode::Build(config) => commands::build(config).await,
        ExecutionMode::ShowConfig { config } => commands::show_config(config.as_deref()),
    }
}
