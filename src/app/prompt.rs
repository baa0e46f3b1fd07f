//! User confirmations the orchestrator asks for before destructive steps

use crate::mods::Mod;
use async_trait::async_trait;
use std::io::{BufRead, Write};

/// Questions asked of the user. Each has its own contract and answer shape.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Confirmations: Send + Sync {
    /// `target` is about to be uninstalled or disabled while `dependents` still use it.
    async fn confirm_remove_with_dependents(&self, target: &Mod, dependents: &[String]) -> bool;

    /// `target` is being enabled but `missing` dependencies are not installed.
    /// `true` installs them first; `false` enables without them.
    async fn confirm_install_missing_dependencies(&self, target: &Mod, missing: &[String]) -> bool;

    /// Pick which of `candidates` to uninstall now that nothing needs them.
    async fn select_unused_dependencies(
        &self,
        candidates: &[String],
        has_external_mods: bool,
    ) -> Vec<String>;

    async fn confirm_uninstall_all(&self) -> bool;
}

/// Terminal prompts on stdin/stdout. With `assume_yes` every question is
/// answered affirmatively without reading input.
pub struct TerminalConfirmations {
    assume_yes: bool,
}

impl TerminalConfirmations {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    async fn ask(&self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{} [y/N] ", question);
        let _ = std::io::stdout().flush();

        read_answer().await.is_some_and(|line| parse_yes(&line))
    }
}

/// One line from stdin, read off the async workers
async fn read_answer() -> Option<String> {
    read_line_blocking(|| std::io::stdin().lock()).await
}

async fn read_line_blocking<R, F>(open: F) -> Option<String>
where
    F: FnOnce() -> R + Send + 'static,
    R: BufRead,
{
    let read = tokio::task::spawn_blocking(move || {
        let mut line = String::new();
        open().read_line(&mut line).map(|_| line)
    })
    .await;

    match read {
        Ok(Ok(line)) => Some(line),
        Ok(Err(e)) => {
            tracing::warn!("Failed to read answer: {}", e);
            None
        }
        Err(e) => {
            tracing::warn!("Prompt reader stopped: {}", e);
            None
        }
    }
}

fn parse_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Parse a selection like `1 3`, `all` or `none` against `count` numbered options.
fn parse_selection(answer: &str, count: usize) -> Vec<usize> {
    let answer = answer.trim().to_ascii_lowercase();
    match answer.as_str() {
        "" | "a" | "all" | "y" | "yes" => (0..count).collect(),
        "n" | "no" | "none" => Vec::new(),
        _ => {
            let mut picked: Vec<usize> = answer
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter_map(|s| s.parse::<usize>().ok())
                .filter(|&n| n >= 1 && n <= count)
                .map(|n| n - 1)
                .collect();
            picked.sort_unstable();
            picked.dedup();
            picked
        }
    }
}

#[async_trait]
impl Confirmations for TerminalConfirmations {
    async fn confirm_remove_with_dependents(&self, target: &Mod, dependents: &[String]) -> bool {
        println!("The following enabled mods depend on {}:", target.name);
        for name in dependents {
            println!("  - {}", name);
        }
        self.ask("They may stop working. Continue?").await
    }

    async fn confirm_install_missing_dependencies(&self, target: &Mod, missing: &[String]) -> bool {
        println!("{} needs mods that are not installed:", target.name);
        for name in missing {
            println!("  - {}", name);
        }
        self.ask("Install them first?").await
    }

    async fn select_unused_dependencies(
        &self,
        candidates: &[String],
        has_external_mods: bool,
    ) -> Vec<String> {
        if self.assume_yes {
            return candidates.to_vec();
        }

        println!("These dependencies are no longer used by any enabled mod:");
        for (i, name) in candidates.iter().enumerate() {
            println!("  {}. {}", i + 1, name);
        }
        if has_external_mods {
            println!("Note: manually installed mods may still use them.");
        }
        print!("Uninstall which? (numbers, 'all' or 'none') [all] ");
        let _ = std::io::stdout().flush();

        let Some(answer) = read_answer().await else {
            return Vec::new();
        };
        parse_selection(&answer, candidates.len())
            .into_iter()
            .map(|i| candidates[i].clone())
            .collect()
    }

    async fn confirm_uninstall_all(&self) -> bool {
        self.ask("Are you sure you want to uninstall all mods?").await
    }
}
