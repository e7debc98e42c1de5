mod app;
mod cli;
mod ui;

use anyhow::Result;
use clap::Parser;
use tracing::Level;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut app = app::HarvestApp::new(&args)?;

    let interrupter = app.interrupter();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupter.interrupt() {
                eprintln!("Stopping after in-flight work; press Ctrl-C again to quit");
            } else {
                std::process::exit(130);
            }
        }
    });

    app::run(&mut app, &args).await
}
