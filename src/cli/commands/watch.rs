//! cli::commands::watch
//!
//! Print lock transitions in the git directory for a while.
//!
//! Useful for checking that the watcher sees another process's locks:
//!
//! ```bash
//! repoflow watch --seconds 30 &
//! git commit --allow-empty -m touch
//! ```

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};

use super::Context;

const POLL: Duration = Duration::from_millis(50);

/// Run the watch command.
pub fn watch(ctx: &Context, seconds: u64) -> Result<()> {
    let engine = ctx.open_engine()?;
    if !engine.is_watching() {
        bail!("the lock watcher is disabled in configuration ([watcher] enabled = false)");
    }
    println!(
        "Watching {} for {}s",
        engine.paths().git_dir().display(),
        seconds
    );

    let gate = engine.gate();
    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut open = gate.is_open();
    println!("{}", if open { "unlocked" } else { "locked" });

    while Instant::now() < deadline {
        thread::sleep(POLL);
        let now = gate.is_open();
        if now != open {
            open = now;
            println!("{}", if open { "unlocked" } else { "locked" });
        }
    }
    Ok(())
}
