pub mod analyze;
pub mod index;
pub mod report;
pub mod search;
pub mod stage;
pub mod status;

mod setup;

use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;

fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, value).context("failed to serialize json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text(text: &str) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    output.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        writeln!(output)?;
    }
    output.flush()?;
    Ok(())
}
