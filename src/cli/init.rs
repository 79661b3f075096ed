//! cardsync init command implementation
//!
//! Creates the default config and the `.cardsync/` state directory.

use std::path::{Path, PathBuf};

use crate::config::{Config, CONFIG_FILE};
use crate::error::{Error, Result};
use crate::output::{emit, HumanReport, OutputOptions};

#[derive(serde::Serialize)]
struct InitReport {
    vault: PathBuf,
    created: InitCreated,
    updated: InitUpdated,
}

#[derive(serde::Serialize)]
struct InitCreated {
    config: bool,
    state_dir: bool,
}

#[derive(serde::Serialize)]
struct InitUpdated {
    gitignore: bool,
}

pub fn run(root: &Path, output: OutputOptions) -> Result<()> {
    let created_config = ensure_config(root)?;
    let created_state_dir = ensure_dir(&root.join(".cardsync"))?;
    let updated_gitignore = ensure_gitignore(root)?;

    let report = InitReport {
        vault: root.to_path_buf(),
        created: InitCreated {
            config: created_config,
            state_dir: created_state_dir,
        },
        updated: InitUpdated {
            gitignore: updated_gitignore,
        },
    };

    let mut created_items = Vec::new();
    if created_config {
        created_items.push(CONFIG_FILE);
    }
    if created_state_dir {
        created_items.push(".cardsync/");
    }

    let outcome = if created_items.is_empty() && !updated_gitignore {
        "nothing to do"
    } else {
        "initialized vault"
    };

    let mut human = HumanReport::new("init", outcome);
    human.fact("vault", root.display().to_string());
    if !created_items.is_empty() {
        human.fact("created", created_items.join(", "));
    }
    if updated_gitignore {
        human.fact("updated", ".gitignore");
    }
    human
        .hint("export CARDSYNC_TOKEN=<token>")
        .hint("cardsync status");

    emit(output, &report, &human)
}

fn ensure_config(root: &Path) -> Result<bool> {
    let config_path = root.join(CONFIG_FILE);
    if config_path.exists() {
        if !config_path.is_file() {
            return Err(Error::OperationFailed(format!(
                "{CONFIG_FILE} exists but is not a file: {}",
                config_path.display()
            )));
        }
        return Ok(false);
    }

    Config::default().save(&config_path)?;
    Ok(true)
}

/// Only touches an existing `.gitignore`; vaults are not always repositories.
fn ensure_gitignore(root: &Path) -> Result<bool> {
    let path = root.join(".gitignore");
    if !path.is_file() {
        return Ok(false);
    }

    let existing = std::fs::read_to_string(&path)?;
    if has_state_ignore(&existing) {
        return Ok(false);
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(".cardsync/\n");
    std::fs::write(&path, updated)?;
    Ok(true)
}

fn has_state_ignore(contents: &str) -> bool {
    contents.lines().any(|line| {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return false;
        }
        trimmed == ".cardsync" || trimmed == ".cardsync/" || trimmed.starts_with(".cardsync/")
    })
}

fn ensure_dir(path: &Path) -> Result<bool> {
    if path.exists() {
        if !path.is_dir() {
            return Err(Error::OperationFailed(format!(
                "Expected directory at {}",
                path.display()
            )));
        }
        return Ok(false);
    }

    std::fs::create_dir_all(path)?;
    Ok(true)
}
