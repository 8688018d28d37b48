//! ui::prompts
//!
//! Interactive prompts and confirmations.
//!
//! # Design
//!
//! The engine asks three kinds of questions, each behind a trait so hosts
//! can answer from a dialog and tests can script the answers:
//!
//! - [`Interaction`]: stash-and-continue, per-file conflict resolution
//! - [`RetryPrompt`]: retry after rejected credentials
//! - [`CredentialPrompt`]: username and password for a remote
//!
//! Prompts are only shown in interactive mode. In non-interactive mode the
//! terminal implementation picks the safe answer: do not stash, abort the
//! conflict, do not retry, no credentials.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

/// Errors from prompts.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt cancelled by user")]
    Cancelled,

    #[error("not in interactive mode")]
    NotInteractive,

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<io::Error> for PromptError {
    fn from(err: io::Error) -> Self {
        PromptError::IoError(err.to_string())
    }
}

/// Decision for one conflicted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Roll the whole operation back.
    Abort,
    /// Revert this path to the base revision and continue.
    Skip,
    /// Stage the resolved content on disk and continue.
    Continue,
}

/// Questions asked during merge, rebase and switch.
pub trait Interaction: Send + Sync {
    /// Local changes are in the way; stash them and continue?
    fn confirm_stash(&self, dirty: &[PathBuf]) -> bool;

    /// How to handle a conflicted path (relative to the work dir).
    fn resolve_conflict(&self, path: &Path) -> ConflictChoice;
}

/// Asked after a remote rejected credentials.
pub trait RetryPrompt: Send + Sync {
    /// Try again with new credentials?
    fn ask_retry(&self, message: &str) -> bool;
}

/// Asks for username and password.
pub trait CredentialPrompt: Send + Sync {
    /// Credentials for `url`, or `None` when the user cancels.
    fn ask_credentials(&self, url: &str, username: Option<&str>) -> Option<(String, String)>;
}

/// Prompt for confirmation (yes/no).
///
/// Returns `Err(PromptError::NotInteractive)` if not in interactive mode.
pub fn confirm(message: &str, default: bool, interactive: bool) -> Result<bool, PromptError> {
    if !interactive {
        return Err(PromptError::NotInteractive);
    }
    confirm_from(&mut io::stdin().lock(), &mut io::stderr(), message, default)
}

/// [`confirm`] over explicit streams.
pub fn confirm_from(
    reader: &mut impl BufRead,
    writer: &mut impl Write,
    message: &str,
    default: bool,
) -> Result<bool, PromptError> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        write!(writer, "{} {} ", message, hint)?;
        writer.flush()?;
        let answer = read_answer(reader)?;
        match answer.as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(writer, "Please answer y or n.")?,
        }
    }
}

/// Prompt for a conflict decision.
pub fn choose_conflict_from(
    reader: &mut impl BufRead,
    writer: &mut impl Write,
    path: &Path,
) -> Result<ConflictChoice, PromptError> {
    loop {
        write!(
            writer,
            "Conflict in {}. Resolve the file, then [c]ontinue, [s]kip or [a]bort: ",
            path.display()
        )?;
        writer.flush()?;
        match read_answer(reader)?.as_str() {
            "c" | "continue" => return Ok(ConflictChoice::Continue),
            "s" | "skip" => return Ok(ConflictChoice::Skip),
            "a" | "abort" => return Ok(ConflictChoice::Abort),
            _ => writeln!(writer, "Please answer c, s or a.")?,
        }
    }
}

/// Prompt for text input.
pub fn input(message: &str, default: Option<&str>, interactive: bool) -> Result<String, PromptError> {
    if !interactive {
        return Err(PromptError::NotInteractive);
    }
    let mut stderr = io::stderr();
    match default {
        Some(d) => write!(stderr, "{} [{}]: ", message, d)?,
        None => write!(stderr, "{}: ", message)?,
    }
    stderr.flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(PromptError::Cancelled);
    }
    let line = line.trim();
    Ok(match (line.is_empty(), default) {
        (true, Some(d)) => d.to_string(),
        _ => line.to_string(),
    })
}

/// Prompt for masked input (e.g., passwords, tokens).
///
/// The input is not echoed to the terminal.
pub fn password(message: &str, interactive: bool) -> Result<String, PromptError> {
    if !interactive {
        return Err(PromptError::NotInteractive);
    }
    Ok(rpassword::prompt_password(format!("{}: ", message))?)
}

fn read_answer(reader: &mut impl BufRead) -> Result<String, PromptError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(PromptError::Cancelled);
    }
    Ok(line.trim().to_ascii_lowercase())
}

/// Terminal implementation of every prompt trait.
#[derive(Debug, Clone, Copy)]
pub struct TerminalPrompts {
    interactive: bool,
}

impl TerminalPrompts {
    /// Create prompts; non-interactive prompts answer without asking.
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }
}

impl Interaction for TerminalPrompts {
    fn confirm_stash(&self, dirty: &[PathBuf]) -> bool {
        if !self.interactive {
            return false;
        }
        eprintln!("Local changes:");
        eprintln!("{}", super::output::format_paths(dirty, "  "));
        confirm("Stash them and continue?", true, true).unwrap_or(false)
    }

    fn resolve_conflict(&self, path: &Path) -> ConflictChoice {
        if !self.interactive {
            return ConflictChoice::Abort;
        }
        choose_conflict_from(&mut io::stdin().lock(), &mut io::stderr(), path)
            .unwrap_or(ConflictChoice::Abort)
    }
}

impl RetryPrompt for TerminalPrompts {
    fn ask_retry(&self, message: &str) -> bool {
        if !self.interactive {
            return false;
        }
        confirm(&format!("{}. Try again?", message), true, true).unwrap_or(false)
    }
}

impl CredentialPrompt for TerminalPrompts {
    fn ask_credentials(&self, url: &str, username: Option<&str>) -> Option<(String, String)> {
        if !self.interactive {
            return None;
        }
        eprintln!("Credentials for {}", url);
        let user = match username {
            Some(u) => u.to_string(),
            None => input("Username", None, true).ok()?,
        };
        let pass = password("Password", true).ok()?;
        Some((user, pass))
    }
}

/// Scripted [`Interaction`] for tests and headless hosts.
///
/// Conflict answers are consumed in order; once exhausted every further
/// conflict is aborted.
#[derive(Debug)]
pub struct ScriptedInteraction {
    stash_answer: bool,
    choices: Mutex<VecDeque<ConflictChoice>>,
    asked: Mutex<Vec<PathBuf>>,
    stash_prompts: Mutex<usize>,
}

impl ScriptedInteraction {
    /// Answer `stash_answer` to stash prompts and `choices` to conflicts.
    pub fn new(stash_answer: bool, choices: impl IntoIterator<Item = ConflictChoice>) -> Self {
        Self {
            stash_answer,
            choices: Mutex::new(choices.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
            stash_prompts: Mutex::new(0),
        }
    }

    /// Paths asked about, in order.
    pub fn asked(&self) -> Vec<PathBuf> {
        self.asked.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of stash prompts shown.
    pub fn stash_prompts(&self) -> usize {
        *self.stash_prompts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Interaction for ScriptedInteraction {
    fn confirm_stash(&self, _dirty: &[PathBuf]) -> bool {
        *self.stash_prompts.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        self.stash_answer
    }

    fn resolve_conflict(&self, path: &Path) -> ConflictChoice {
        self.asked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.to_path_buf());
        self.choices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(ConflictChoice::Abort)
    }
}

/// Scripted [`RetryPrompt`]; answers `false` once exhausted.
#[derive(Debug, Default)]
pub struct ScriptedRetry {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<usize>,
}

impl ScriptedRetry {
    /// Answer with `answers` in order.
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(0),
        }
    }

    /// Number of prompts shown.
    pub fn asked(&self) -> usize {
        *self.asked.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RetryPrompt for ScriptedRetry {
    fn ask_retry(&self, _message: &str) -> bool {
        *self.asked.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        self.answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(false)
    }
}
