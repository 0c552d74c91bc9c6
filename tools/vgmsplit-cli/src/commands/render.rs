//! Render a file's master mix and every channel.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use vgmsplit_common::config::Settings;
use vgmsplit_render_engine::{format_duration, Backend, RenderSession, SessionStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Returns whether the render completed without errors.
pub fn run(file: PathBuf) -> anyhow::Result<bool> {
    let mut backend = Backend::new(Settings::load());
    backend
        .load_path(&file)
        .with_context(|| format!("Failed to load {}", file.display()))?;

    let metadata = backend.metadata().context("No metadata after loading")?;
    super::info::print(metadata);

    let output = file.with_extension("wav");
    tracing::debug!(input = %file.display(), output = %output.display(), "Starting render");
    println!("Rendering to {}", output.display());

    if let Err(errors) = backend.start_render(&output) {
        eprintln!("Failed to start render:");
        for e in &errors {
            eprintln!("  {e}");
        }
        return Ok(false);
    }

    let mut session = RenderSession::new(backend.render_jobs().to_vec());
    let mut stdout = std::io::stdout();
    let status = loop {
        let (status, progress) = session.poll();
        let (current, maximum) = progress.normalized();
        print!(
            "\r  Progress: {}% ({}/{})",
            progress.percent(),
            format_duration(current as u64),
            format_duration(maximum as u64)
        );
        stdout.flush().ok();
        if status.is_done() {
            break status;
        }
        std::thread::sleep(POLL_INTERVAL);
    };
    println!();

    for row in session.rows() {
        println!("  {row}");
    }
    for entry in session.log() {
        eprintln!("{entry}");
    }
    println!("{status}");

    Ok(status == SessionStatus::Complete)
}
