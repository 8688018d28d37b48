//! cli::commands::status
//!
//! Show branch, HEAD and file status, per (sub)repository.

use std::path::PathBuf;

use anyhow::Result;

use super::Context;
use crate::ui::output;

/// Run the status command.
pub fn status(ctx: &Context, paths: &[PathBuf]) -> Result<()> {
    let engine = ctx.open_engine()?;
    let cwd = ctx.cwd()?;
    let paths: Vec<PathBuf> = paths.iter().map(|p| cwd.join(p)).collect();
    let reports = engine.status(&paths)?;

    for (i, report) in reports.iter().enumerate() {
        if i > 0 {
            println!();
        }
        if report.root != engine.paths().work_dir() {
            println!("Submodule {}", report.root.display());
        }
        match &report.branch {
            Some(branch) => println!("On branch {}", branch),
            None => println!("HEAD detached"),
        }
        match &report.head {
            Some(head) => println!("HEAD {} {}", head.oid.short(7), head.summary),
            None => println!("No commits yet"),
        }
        if report.files.is_empty() {
            output::print("Nothing to report.", ctx.verbosity);
        }
        for file in &report.files {
            println!("{}", output::format_status(file));
        }
    }
    Ok(())
}
