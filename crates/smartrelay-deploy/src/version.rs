// SPDX-License-Identifier: MIT

//! Expected build identity of the firmware under deployment

use crate::error::{DeployError, Result};
use std::path::Path;
use tokio::process::Command;

/// Identity of the build being pushed, used to verify what a device reports
/// after an upgrade.
///
/// The commit id must match exactly; the version string only has to be a
/// substring of the device's reported version, because the device appends
/// build metadata of its own. Either check alone is insufficient: in this
/// versioning scheme a version string can be ambiguous across builds sharing
/// a commit range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildVersion {
    pub git_commit_id: String,
    pub version_string: String,
}

impl BuildVersion {
    pub fn new(git_commit_id: impl Into<String>, version_string: impl Into<String>) -> Self {
        Self {
            git_commit_id: git_commit_id.into(),
            version_string: version_string.into(),
        }
    }

    /// Derive the expected identity from the firmware checkout.
    pub async fn from_git(repo_dir: &Path) -> Result<Self> {
        let git_commit_id = git_output(repo_dir, &["rev-parse", "HEAD"]).await?;
        let version_string = git_output(repo_dir, &["describe", "--tags", "--always"]).await?;
        Ok(Self {
            git_commit_id,
            version_string,
        })
    }

    /// True iff a device-reported commit/version pair identifies this build.
    pub fn matches(&self, reported_commit: &str, reported_version: &str) -> bool {
        reported_commit == self.git_commit_id && reported_version.contains(&self.version_string)
    }
}

async fn git_output(repo_dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .await
        .map_err(|e| DeployError::Git(format!("failed to run git {}: {e}", args.join(" "))))?;

    if !output.status.success() {
        return Err(DeployError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_requires_both_commit_and_version() {
        let expected = BuildVersion::new("3f9c2d1", "v1.4");

        assert!(expected.matches("3f9c2d1", "v1.4-3-g3f9c2d1"));
        // Right commit, wrong version string
        assert!(!expected.matches("3f9c2d1", "v1.3-9-gdeadbee"));
        // Right version substring, wrong commit
        assert!(!expected.matches("deadbee", "v1.4-3-g3f9c2d1"));
    }

    #[test]
    fn test_matches_version_by_substring() {
        let expected = BuildVersion::new("3f9c2d1", "v1.4");
        assert!(expected.matches("3f9c2d1", "v1.4"));
        assert!(expected.matches("3f9c2d1", "smartrelay v1.4 (release)"));
    }
}
