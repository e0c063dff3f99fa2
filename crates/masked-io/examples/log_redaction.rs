//! Log redaction example.
//!
//! This example routes `tracing` output through a masking writer so that
//! secrets never reach stderr, even when a keyword is logged piecemeal.
//!
//! Run with: `cargo run --example log_redaction`

use std::io::Write;
use std::sync::Mutex;

use masked_io::{MaskConfig, MaskedWriter};

fn main() -> masked_io::Result<()> {
    // Keywords from MASKED_IO_KEYWORDS are added on top of these.
    let mut config = MaskConfig::new()
        .with_keywords(["hunter2", "tk_live_51HxYz2eZvKYlo2C"])
        .with_mask_token("[REDACTED]");
    config.apply_env(&masked_io::EnvConfig::default())?;

    let writer = MaskedWriter::from_config(std::io::stderr(), &config);
    let stdout = writer.derive_shared(std::io::stdout());

    tracing_subscriber::fmt()
        .with_writer(Mutex::new(writer))
        .with_ansi(false)
        .init();

    tracing::info!(user = "john_doe", password = "hunter2", "login attempt");
    tracing::warn!("retrying with token tk_live_51HxYz2eZvKYlo2C");

    // Rule changes reach every writer that shares the rule.
    stdout.add_keywords(["s3cr3t-session"]);
    tracing::info!(session = "s3cr3t-session", "session opened");

    let mut stdout = stdout;
    stdout.disable_auto_flush();
    stdout.write_all(b"plain output with s3cr3t-")?;
    stdout.write_all(b"session split across writes\n")?;
    stdout.flush()?;

    Ok(())
}
