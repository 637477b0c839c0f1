use std::fmt;

use super::container::short_id;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub size: u64,      // bytes
    pub created: i64,   // engine epoch seconds
}

impl ImageRecord {
    pub fn short_id(&self) -> String {
        short_id(&self.id)
    }

    /// First `repo:tag`, or `<none>:<none>` for dangling images.
    pub fn primary_tag(&self) -> &str {
        self.repo_tags
            .iter()
            .map(|t| t.as_str())
            .find(|t| !t.is_empty())
            .unwrap_or("<none>:<none>")
    }
}

/// An image reference split into the `fromImage` and `tag` pull parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    pub repo: String,
    pub tag: String,
}

impl ImageRef {
    pub const DEFAULT_TAG: &'static str = "latest";

    /// Parse `repo[:tag]`. A colon inside the registry host (`host:5000/app`)
    /// is a port, not a tag separator.
    pub fn parse(reference: &str) -> Self {
        let reference = reference.trim();
        let last_slash = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
        match reference[last_slash..].rfind(':') {
            Some(pos) if last_slash + pos + 1 < reference.len() => {
                let split = last_slash + pos;
                Self {
                    repo: reference[..split].to_string(),
                    tag: reference[split + 1..].to_string(),
                }
            }
            Some(pos) => Self {
                repo: reference[..last_slash + pos].to_string(),
                tag: Self::DEFAULT_TAG.to_string(),
            },
            None => Self {
                repo: reference.to_string(),
                tag: Self::DEFAULT_TAG.to_string(),
            },
        }
    }

    pub fn new(repo: &str, tag: Option<&str>) -> Self {
        Self {
            repo: repo.to_string(),
            tag: tag
                .filter(|t| !t.is_empty())
                .unwrap_or(Self::DEFAULT_TAG)
                .to_string(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo, self.tag)
    }
}
