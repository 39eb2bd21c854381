//! # Git and Repo Invocation
//!
//! The project checkout is versioned with `git` and populated with `repo`.
//! Both tools are invoked through the [`CommandRunner`] trait so that the
//! sequence of calls can be checked in tests without either tool installed.
//!
//! - [`commit_config`]: `git init` (new projects), `git add`, and
//!   `git commit` when `git diff-index --quiet HEAD` reports a change.
//! - [`repo_sync`]: `repo init` (new projects) followed by `repo sync`.

use std::path::Path;
use std::process::Command;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::manifest::MANIFEST_FILE;
use crate::project::CONFIG_FILES;

/// Exit status and combined stdout/stderr of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub output: String,
}

/// Trait for running external commands - allows mocking in tests
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> Result<CommandOutput>;
}

/// Runs commands with [`std::process::Command`].
pub struct SystemRunner;

fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> Result<CommandOutput> {
        debug!("Running {} in {}", command_line(program, args), cwd.display());
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|e| Error::Command {
                command: command_line(program, args),
                status: -1,
                expected: 0,
                output: e.to_string(),
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            output: text,
        })
    }
}

/// Run a command and require exit status `expected`.
pub fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[String],
    cwd: &Path,
    expected: i32,
) -> Result<String> {
    let result = runner.run(program, args, cwd)?;
    if result.status != expected {
        return Err(Error::Command {
            command: command_line(program, args),
            status: result.status,
            expected,
            output: result.output,
        });
    }
    Ok(result.output)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Configuration files present in the project.
fn config_files(project_dir: &Path) -> Vec<String> {
    CONFIG_FILES
        .iter()
        .chain(["config/site.conf.sample"].iter())
        .filter(|file| project_dir.join(file).exists())
        .map(|file| file.to_string())
        .collect()
}

/// Commit configuration changes. Returns whether a commit was made.
pub fn commit_config(runner: &dyn CommandRunner, project_dir: &Path, setup_args: &str) -> Result<bool> {
    if !project_dir.join(".git").exists() {
        run_checked(runner, "git", &strings(&["init", "--quiet"]), project_dir, 0)?;
    }

    let files = config_files(project_dir);
    let with_files = |head: &[&str]| {
        let mut args = strings(head);
        args.push("--".to_string());
        args.extend(files.iter().cloned());
        args
    };

    run_checked(runner, "git", &with_files(&["add"]), project_dir, 0)?;

    let diff = runner.run("git", &with_files(&["diff-index", "--quiet", "HEAD"]), project_dir)?;
    if diff.status == 0 {
        debug!("Project configuration unchanged");
        return Ok(false);
    }

    warn!("Updated project configuration");
    let message = format!("Configuration change - {}", setup_args);
    run_checked(runner, "git", &with_files(&["commit", "-m", message.as_str()]), project_dir, 0)?;
    Ok(true)
}

/// `repo init` (unless already initialized) and `repo sync`.
pub fn repo_sync(runner: &dyn CommandRunner, project_dir: &Path, mirror: bool, jobs: usize) -> Result<()> {
    if !project_dir.join(".repo").exists() {
        let project = project_dir.display().to_string();
        let mut args = strings(&["init", "-m", MANIFEST_FILE, "-u", project.as_str()]);
        if mirror {
            args.push("--mirror".to_string());
        }
        args.push("--no-repo-verify".to_string());
        info!("Initializing repo in {}", project);
        run_checked(runner, "repo", &args, project_dir, 0)?;
    }

    info!("Syncing layers with {} jobs", jobs);
    run_checked(runner, "repo", &strings(&["sync", "-j", jobs.to_string().as_str()]), project_dir, 0)?;
    Ok(())
}
