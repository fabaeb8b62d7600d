mod cmd_render;
mod cmd_watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "agent-trace")]
#[command(about = "Record which conversation turn caused each file change")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log debug detail (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch a directory and append a trace entry for every settled change
    Watch(cmd_watch::WatchArgs),
    /// Render a trace log as an SVG diagram
    Render(cmd_render::RenderArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Watch(args) => cmd_watch::run(args),
        Commands::Render(args) => cmd_render::run(args),
    }
}
