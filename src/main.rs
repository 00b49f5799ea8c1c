use anyhow::Result;
use cinema_reels::supervisor::{LogBuffer, LogSink, start_production};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const CLI_BIN: &str = "cinema-reels-cli";
const TAIL_ON_FAILURE: usize = 20;

/// The single-cycle binary next to this one, or whatever is on PATH.
fn cli_program() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(CLI_BIN)))
        .filter(|path: &PathBuf| path.is_file())
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| CLI_BIN.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let program = cli_program();
    info!("starting production: {} {}", program, args.join(" "));

    let buffer = LogBuffer::default();
    let sink_buffer = buffer.clone();
    let sink: LogSink = Arc::new(move |line: &str| {
        println!("{}", line);
        sink_buffer.push(line);
    });

    let mut handle = start_production(&program, &args, sink)?;
    let finished = tokio::select! {
        code = handle.wait() => Some(code?),
        _ = tokio::signal::ctrl_c() => None,
    };

    let code = match finished {
        Some(code) => code,
        None => {
            warn!("interrupt received; stopping production");
            handle.cancel().await?;
            handle.wait().await?
        }
    };

    if code != 0 {
        let lines = buffer.snapshot();
        let start = lines.len().saturating_sub(TAIL_ON_FAILURE);
        warn!("production exited with code {}; last output:", code);
        for line in &lines[start..] {
            eprintln!("  {}", line);
        }
    } else {
        info!("production finished");
    }
    std::process::exit(code);
}
