//! Line-oriented I/O for the control plane.
//!
//! - **stdout**: one JSON outcome per line
//! - **stderr**: logs (never parsed)
//! - **Never use `println!`**: It may add `\r\n` on Windows

use std::io::Write;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::CommandOutcome;
use crate::error::Result;

/// Write a line to stdout.
///
/// Writes the string followed by a single `\n` and flushes.
pub fn write_stdout_line(line: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(line.as_bytes())?;
    handle.write_all(b"\n")?;
    handle.flush()?;
    Ok(())
}

/// Write an outcome to stdout as a single JSON line.
pub fn write_outcome(outcome: &CommandOutcome) -> Result<()> {
    let json = serde_json::to_string(outcome)?;
    write_stdout_line(&json)?;
    Ok(())
}

/// Write an outcome as a single JSON line to any async writer.
pub async fn write_outcome_to<W>(writer: &mut W, outcome: &CommandOutcome) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut line = serde_json::to_vec(outcome)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
