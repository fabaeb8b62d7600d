use agent_trace_svg::RenderOptions;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Trace log to read
    #[arg(long, default_value = "docs/agent-trace.md")]
    log: PathBuf,

    /// SVG file to write
    #[arg(long, default_value = "docs/agent-trace.svg")]
    out: PathBuf,

    /// Omit the per-change summary line
    #[arg(long)]
    no_summary: bool,

    /// Prefix each change with its time of day
    #[arg(long)]
    timestamps: bool,
}

pub fn run(args: RenderArgs) -> Result<()> {
    let options = RenderOptions {
        show_summary: !args.no_summary,
        show_timestamps: args.timestamps,
        ..RenderOptions::default()
    };
    let count = agent_trace_svg::render_file(&args.log, &args.out, &options)
        .with_context(|| format!("failed to render {}", args.log.display()))?;
    tracing::info!(entries = count, out = %args.out.display(), "rendered");
    Ok(())
}
