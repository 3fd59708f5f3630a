use clap::Parser;
use taskspace::cli::commands::Cli;
use taskspace::cli::handlers;
use tracing_subscriber::EnvFilter;

fn main() {
    // Quiet unless RUST_LOG asks otherwise; stdout stays clean for --json
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(handlers::dispatch(cli)) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
