//! bconsole - terminal console for a Birdactyl server

use std::sync::Arc;

use birdactyl_console::cli::Args;
use birdactyl_console::ui::App;
use birdactyl_console::{HttpPanelApi, Session, SessionOptions};
use birdactyl_utils::{init_logging_with_config, LogConfig, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    // Log to file; the terminal belongs to the UI
    init_logging_with_config(LogConfig::client())?;
    tracing::info!(server_id = %args.server_id, "bconsole starting");

    match run_app(args).await {
        Ok(()) => {
            tracing::info!("bconsole exiting normally");
            Ok(())
        }
        Err(e) => {
            tracing::error!("bconsole error: {}", e);
            eprintln!("Error: {}", e);
            if e.is_retryable() {
                eprintln!("The panel may be temporarily unreachable; try again shortly.");
            }
            Err(e)
        }
    }
}

async fn run_app(args: Args) -> Result<()> {
    let config = args.load_config()?;
    let options = SessionOptions::from_config(args.server_id, &config)?;

    let api = Arc::new(HttpPanelApi::new(
        options.panel_url.clone(),
        options.token.clone(),
    )?);

    // Resolve the server and permissions before taking over the terminal
    let session = Session::open(options, api).await?;
    tracing::info!(server = %session.server().name, "Console attached");

    let mut app = App::new(session);
    app.run().await
}
