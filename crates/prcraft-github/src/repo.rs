use std::fmt;

use url::Url;

use crate::error::GitHubError;

/// `owner/name` of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Accepts web URLs on any host (`https://github.com/o/r`, Enterprise
    /// hosts, trailing `.git` or `/`), `git@host:o/r.git`, `ssh://git@host/o/r`
    /// and a bare `o/r`.
    pub fn parse(input: &str) -> Result<Self, GitHubError> {
        let invalid = || GitHubError::InvalidRepoUrl(input.to_string());
        let normalized = input.trim().trim_end_matches('/');
        let normalized = normalized.strip_suffix(".git").unwrap_or(normalized);

        let path = if let Some(rest) = normalized
            .strip_prefix("git@")
            .and_then(|value| value.split_once(':'))
            .map(|(_, path)| path)
        {
            rest.to_string()
        } else if normalized.contains("://") {
            let url = Url::parse(normalized).map_err(|_| invalid())?;
            if !matches!(url.scheme(), "https" | "http" | "ssh") {
                return Err(invalid());
            }
            url.path().trim_start_matches('/').to_string()
        } else {
            normalized.to_string()
        };

        let mut parts = path.split('/');
        let owner = parts.next().map(str::trim).unwrap_or_default();
        let name = parts.next().map(str::trim).unwrap_or_default();
        if owner.is_empty() || name.is_empty() || parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self::new(owner, name))
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_remote_forms() {
        let expected = RepoRef::new("acme", "widgets");
        for input in [
            "https://github.com/acme/widgets",
            "https://github.com/acme/widgets.git",
            "https://github.com/acme/widgets/",
            "http://github.com/acme/widgets",
            "ssh://git@github.com/acme/widgets.git",
            "git@github.com:acme/widgets.git",
            "https://git.example.com/acme/widgets",
            "acme/widgets",
        ] {
            assert_eq!(RepoRef::parse(input).expect(input), expected, "{input}");
        }
    }

    #[test]
    fn rejects_urls_without_owner_and_name() {
        assert!(RepoRef::parse("https://github.com/acme").is_err());
        assert!(RepoRef::parse("").is_err());
        assert!(RepoRef::parse("https://github.com/acme/widgets/tree/main").is_err());
        assert!(RepoRef::parse("ftp://github.com/acme/widgets").is_err());
    }
}
