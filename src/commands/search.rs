use anyhow::Result;

use crate::cli::SearchArgs;

use super::setup::{build_retriever, load_config};
use super::{write_json, write_text};

pub fn run(args: SearchArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let retriever = build_retriever(&config)?;
    let outcome = retriever.search_detailed(&args.query, config.retrieval.k)?;

    if args.json {
        return write_json(&outcome);
    }

    let mut text = format!(
        "Query: {}\nHits: {} (k={}) skipped={} judged={}\n",
        outcome.query,
        outcome.entries.len(),
        outcome.k,
        outcome.skipped.len(),
        outcome.judged
    );
    for entry in &outcome.entries {
        text.push_str(&format!(
            "{}.\tscore={:.6}\tid={}\tchunk={}\t{}\n",
            entry.rank,
            entry.score,
            entry.identifier.as_deref().unwrap_or("-"),
            entry.chunk_id,
            entry.document
        ));
    }
    text.push_str("\nContext:\n");
    for block in &outcome.context {
        text.push_str(block);
        text.push('\n');
    }
    write_text(&text)
}
