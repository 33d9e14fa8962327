//! Build requests and their submission-time normalization.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use url::{ParseError, Url};
use uuid::Uuid;

use crate::{Error, Result};

/// A single repository path component, as accepted by image registries.
static IMAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").expect("valid image name pattern")
});

static IMAGE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("valid tag pattern"));

static BUILD_ARG_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid build arg pattern"));

/// Fallback values applied to empty request fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDefaults {
    pub image_tag: String,
    pub dockerfile_path: String,
    pub git_branch: String,
    pub destination: String,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            image_tag: "1h".to_string(),
            dockerfile_path: "Dockerfile".to_string(),
            git_branch: "main".to_string(),
            destination: "ttl.sh".to_string(),
        }
    }
}

/// Where the build context comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitOptions {
    pub url: String,
    pub branch: String,
    pub single_branch: bool,
    pub recurse_submodules: bool,
}

/// Naming and destination of the produced image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    pub prefix: String,
    pub name: String,
    pub tag: String,
    /// Registry (and optional namespace) the image is pushed to.
    pub destination: String,
}

/// A build submission. Serialized as-is into the job queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildRequest {
    pub dockerfile_path: String,
    #[serde(rename = "git_options")]
    pub git: GitOptions,
    pub custom_platform: String,
    pub image: ImageOptions,
    pub build_args: Vec<String>,
}

/// Immediate reply to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub image_name: String,
    pub image_tag: String,
}

impl BuildRequest {
    /// Create a request for the given git URL with every other field empty.
    pub fn from_git_url(url: impl Into<String>) -> Self {
        Self {
            git: GitOptions {
                url: url.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate the request and fill in defaults.
    ///
    /// A missing image name is generated from the prefix and a random UUID,
    /// so the status key is known before the job is ever dequeued.
    pub fn normalize(mut self, defaults: &RequestDefaults) -> Result<Self> {
        if self.git.url.trim().is_empty() {
            return Err(Error::Validation("git url is required".to_string()));
        }
        self.git.url = strip_scheme(self.git.url.trim())?;

        if self.image.name.is_empty() {
            self.image.name = format!("{}{}", self.image.prefix, Uuid::new_v4());
        }
        if self.image.tag.is_empty() {
            self.image.tag = defaults.image_tag.clone();
        }
        if self.image.destination.is_empty() {
            self.image.destination = defaults.destination.clone();
        }
        if self.dockerfile_path.is_empty() {
            self.dockerfile_path = defaults.dockerfile_path.clone();
        }
        if self.git.branch.is_empty() {
            self.git.branch = defaults.git_branch.clone();
        }

        if !IMAGE_NAME.is_match(&self.image.name) {
            return Err(Error::Validation(format!(
                "invalid image name: {}",
                self.image.name
            )));
        }
        if !IMAGE_TAG.is_match(&self.image.tag) {
            return Err(Error::Validation(format!(
                "invalid image tag: {}",
                self.image.tag
            )));
        }
        self.build_arg_map()?;

        Ok(self)
    }

    /// Context locator handed to the engine, e.g. `git://github.com/org/repo`.
    pub fn context_locator(&self) -> String {
        format!("git://{}", self.git.url)
    }

    /// Fully qualified reference the image is pushed to.
    pub fn destination_ref(&self) -> String {
        format!(
            "{}/{}:{}",
            self.image.destination.trim_end_matches('/'),
            self.image.name,
            self.image.tag
        )
    }

    /// Parse `KEY=VALUE` build arguments.
    pub fn build_arg_map(&self) -> Result<BTreeMap<String, String>> {
        self.build_args
            .iter()
            .map(|arg| {
                let (key, value) = arg.split_once('=').ok_or_else(|| {
                    Error::Validation(format!("build arg must be KEY=VALUE: {}", arg))
                })?;
                if !BUILD_ARG_KEY.is_match(key) {
                    return Err(Error::Validation(format!("invalid build arg name: {}", key)));
                }
                Ok((key.to_string(), value.to_string()))
            })
            .collect()
    }

    pub fn result(&self) -> BuildResult {
        BuildResult {
            image_name: self.image.name.clone(),
            image_tag: self.image.tag.clone(),
        }
    }
}

/// Remove the `scheme://` prefix from a git URL. Scheme-less input is kept as-is.
fn strip_scheme(raw: &str) -> Result<String> {
    match Url::parse(raw) {
        Ok(parsed) => {
            let prefix = format!("{}://", parsed.scheme());
            Ok(raw.strip_prefix(&prefix).unwrap_or(raw).to_string())
        }
        Err(ParseError::RelativeUrlWithoutBase) => Ok(raw.to_string()),
        Err(e) => Err(Error::Validation(format!("invalid git url {}: {}", raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_git_url_is_rejected() {
        let result = BuildRequest::default().normalize(&RequestDefaults::default());
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_defaults_are_applied() {
        let request = BuildRequest::from_git_url("example.com/u/r")
            .normalize(&RequestDefaults::default())
            .unwrap();

        assert_eq!(request.image.tag, "1h");
        assert_eq!(request.image.destination, "ttl.sh");
        assert_eq!(request.dockerfile_path, "Dockerfile");
        assert_eq!(request.git.branch, "main");
        assert!(!request.image.name.is_empty());
    }

    #[test]
    fn test_generated_names_use_prefix_and_are_unique() {
        let mut request = BuildRequest::from_git_url("example.com/u/r");
        request.image.prefix = "ci-".to_string();

        let first = request.clone().normalize(&RequestDefaults::default()).unwrap();
        let second = request.normalize(&RequestDefaults::default()).unwrap();

        assert!(first.image.name.starts_with("ci-"));
        assert!(second.image.name.starts_with("ci-"));
        assert_ne!(first.image.name, second.image.name);
    }

    #[test]
    fn test_explicit_values_are_kept() {
        let mut request = BuildRequest::from_git_url("https://github.com/org/repo");
        request.image.name = "test-image".to_string();
        request.image.tag = "v1".to_string();
        request.image.destination = "registry.local:5000".to_string();
        request.git.branch = "dev".to_string();

        let request = request.normalize(&RequestDefaults::default()).unwrap();
        assert_eq!(request.image.name, "test-image");
        assert_eq!(request.git.branch, "dev");
        assert_eq!(request.destination_ref(), "registry.local:5000/test-image:v1");
    }

    #[test]
    fn test_scheme_is_stripped() {
        assert_eq!(
            strip_scheme("https://github.com/org/repo").unwrap(),
            "github.com/org/repo"
        );
        assert_eq!(
            strip_scheme("git://github.com/org/repo").unwrap(),
            "github.com/org/repo"
        );
        assert_eq!(strip_scheme("example.com/u/r").unwrap(), "example.com/u/r");
    }

    #[test]
    fn test_context_locator() {
        let request = BuildRequest::from_git_url("https://github.com/org/repo")
            .normalize(&RequestDefaults::default())
            .unwrap();
        assert_eq!(request.context_locator(), "git://github.com/org/repo");
    }

    #[test]
    fn test_invalid_image_name_is_rejected() {
        let mut request = BuildRequest::from_git_url("example.com/u/r");
        request.image.name = "../escape".to_string();
        let result = request.normalize(&RequestDefaults::default());
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_build_args() {
        let mut request = BuildRequest::from_git_url("example.com/u/r");
        request.build_args = vec!["VERSION=1.2".to_string(), "EMPTY=".to_string()];
        let args = request.build_arg_map().unwrap();
        assert_eq!(args.get("VERSION"), Some(&"1.2".to_string()));
        assert_eq!(args.get("EMPTY"), Some(&String::new()));

        request.build_args = vec!["NOVALUE".to_string()];
        assert!(request.build_arg_map().is_err());
    }

    #[test]
    fn test_request_json_field_names() {
        let json = r#"{
            "dockerfile_path": "build/Dockerfile",
            "git_options": {"url": "github.com/org/repo", "branch": "dev", "single_branch": true},
            "image": {"prefix": "pr-", "tag": "latest"},
            "build_args": ["A=1"]
        }"#;
        let request: BuildRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.dockerfile_path, "build/Dockerfile");
        assert!(request.git.single_branch);
        assert!(!request.git.recurse_submodules);
        assert_eq!(request.image.prefix, "pr-");
        assert!(request.custom_platform.is_empty());
    }
}
