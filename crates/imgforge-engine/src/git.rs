//! Git context resolution.

use imgforge_core::{ContextOptions, Error, LogSink, Result, SourceContext};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

/// Turn a `git://host/org/repo` locator into an https clone URL.
pub fn clone_url(locator: &str) -> Result<String> {
    let rest = locator
        .strip_prefix("git://")
        .ok_or_else(|| Error::Build(format!("unsupported build context: {}", locator)))?;
    if rest.is_empty() {
        return Err(Error::Build("empty git context".to_string()));
    }
    Ok(format!("https://{}", rest))
}

/// Arguments for `git clone`.
pub fn clone_args(url: &str, options: &ContextOptions) -> Vec<String> {
    let mut args = vec!["clone".to_string()];
    if !options.branch.is_empty() {
        args.push("--branch".to_string());
        args.push(options.branch.clone());
    }
    if options.single_branch {
        args.push("--single-branch".to_string());
    }
    if options.recurse_submodules {
        args.push("--recurse-submodules".to_string());
    }
    args.push(url.to_string());
    args.push(options.target_dir.to_string_lossy().to_string());
    args
}

/// Clone the repository behind `locator` into `options.target_dir`.
pub async fn clone_context(
    locator: &str,
    options: &ContextOptions,
    logs: &LogSink,
) -> Result<SourceContext> {
    let url = clone_url(locator)?;
    let args = clone_args(&url, options);

    info!(url = %url, branch = %options.branch, path = %options.target_dir.display(), "Cloning build context");
    logs.line(format!("Cloning {} (branch {})", url, options.branch));

    let output = Command::new("git")
        .args(&args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| Error::Build(format!("failed to run git: {}", e)))?;

    // git reports progress on stderr even when it succeeds
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        logs.line(line);
    }

    if !output.status.success() {
        warn!(url = %url, "Git clone failed");
        return Err(Error::Build(format!(
            "git clone failed: {}",
            stderr.trim()
        )));
    }

    Ok(SourceContext {
        path: options.target_dir.clone(),
    })
}
