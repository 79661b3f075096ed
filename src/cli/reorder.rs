//! cardsync reorder command implementation

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::lock::write_atomic_str;
use crate::output::{emit, HumanReport, OutputOptions};
use crate::reorder::reorder_document;

#[derive(Serialize)]
struct ReorderReport {
    file: PathBuf,
    changed: bool,
    written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

pub fn run(root: &Path, file: &Path, dry_run: bool, output: OutputOptions) -> Result<()> {
    let path = if file.is_absolute() {
        file.to_path_buf()
    } else {
        root.join(file)
    };
    if !path.is_file() {
        return Err(Error::DocumentNotFound(path));
    }

    let text = std::fs::read_to_string(&path)?;
    let reordered = reorder_document(&text);
    let changed = reordered != text;
    let written = changed && !dry_run;
    if written {
        write_atomic_str(&path, &reordered)?;
    }

    let report = ReorderReport {
        file: path.clone(),
        changed,
        written,
        text: dry_run.then(|| reordered.clone()),
    };

    if dry_run && !output.json && !output.quiet {
        print!("{reordered}");
        return Ok(());
    }

    let outcome = if changed { "reordered" } else { "already ordered" };
    let mut human = HumanReport::new("reorder", outcome);
    human.fact("file", path.display().to_string());
    emit(output, &report, &human)
}
