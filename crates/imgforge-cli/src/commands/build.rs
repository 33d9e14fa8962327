//! Build submission command.

use anyhow::{Result, bail};
use clap::Args;
use imgforge_core::{BuildRequest, GitOptions, ImageOptions};
use std::io::Write;
use std::time::Duration;

use super::client::ApiClient;

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Git repository to build, e.g. github.com/org/repo
    pub git_url: String,
    /// Branch to check out
    #[arg(long)]
    pub branch: Option<String>,
    /// Clone only the selected branch
    #[arg(long)]
    pub single_branch: bool,
    /// Clone submodules as well
    #[arg(long)]
    pub recurse_submodules: bool,
    /// Dockerfile path relative to the repository root
    #[arg(long)]
    pub dockerfile: Option<String>,
    /// Target platform, e.g. linux/arm64
    #[arg(long)]
    pub platform: Option<String>,
    /// Image name; generated when omitted
    #[arg(long)]
    pub name: Option<String>,
    /// Prefix for a generated image name
    #[arg(long)]
    pub prefix: Option<String>,
    /// Image tag
    #[arg(long)]
    pub tag: Option<String>,
    /// Registry to push to
    #[arg(long)]
    pub destination: Option<String>,
    /// Build argument as KEY=VALUE, repeatable
    #[arg(long = "build-arg")]
    pub build_args: Vec<String>,
}

impl From<BuildArgs> for BuildRequest {
    fn from(args: BuildArgs) -> Self {
        BuildRequest {
            dockerfile_path: args.dockerfile.unwrap_or_default(),
            git: GitOptions {
                url: args.git_url,
                branch: args.branch.unwrap_or_default(),
                single_branch: args.single_branch,
                recurse_submodules: args.recurse_submodules,
            },
            custom_platform: args.platform.unwrap_or_default(),
            image: ImageOptions {
                prefix: args.prefix.unwrap_or_default(),
                name: args.name.unwrap_or_default(),
                tag: args.tag.unwrap_or_default(),
                destination: args.destination.unwrap_or_default(),
            },
            build_args: args.build_args,
        }
    }
}

/// Submit a build. With `follow`, poll until it finishes and print its logs.
pub async fn run(client: &ApiClient, args: BuildArgs, follow: Option<Duration>) -> Result<()> {
    let result = client.submit(&args.into()).await?;
    println!("Submitted {}:{}", result.image_name, result.image_tag);

    let Some(interval) = follow else {
        println!("Check progress with: imgforge status {}", result.image_name);
        return Ok(());
    };

    let mut cursor = LogCursor::default();
    loop {
        let report = client.status(&result.image_name).await?;
        let new_text = cursor.advance(&report.logs);
        if !new_text.is_empty() {
            print!("{}", new_text);
            std::io::stdout().flush()?;
        }

        if report.status.is_terminal() {
            if report.error.is_empty() {
                return Ok(());
            }
            bail!("build {} failed: {}", result.image_name, report.error);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Tracks how much of a growing log has already been printed.
#[derive(Debug, Default)]
struct LogCursor {
    printed: usize,
}

impl LogCursor {
    /// Text appended since the last call. A log that shrank was replaced, so
    /// it is returned whole.
    fn advance<'a>(&mut self, logs: &'a str) -> &'a str {
        let new_text = logs.get(self.printed..).unwrap_or(logs);
        self.printed = logs.len();
        new_text
    }
}
