use anyhow::Result;
use clap::Parser;
use matchsim_cli::cli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let headless = args.is_headless();

    match cli::run(args).await {
        // Headless runs may leave the channel reader parked on a socket.
        Ok(()) if headless => std::process::exit(0),
        Ok(()) => Ok(()),
        Err(e) => Err(e),
    }
}
