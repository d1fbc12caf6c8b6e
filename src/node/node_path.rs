use derive_more::Display;
use thiserror::Error;

use super::NodeName;

/// A hierarchy node path.
///
/// A path always starts with `/`. The root is `/`, every other path is a `/` separated list of [`NodeName`]s.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct NodePath(String);

/// An invalid node path.
#[derive(Debug, Error)]
#[error("invalid node path {0}")]
pub struct NodePathError(String);

impl NodePath {
    /// Create a new node path from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`NodePathError`] if `path` is not valid according to [`NodePath::validate`()].
    pub fn new(path: &str) -> Result<Self, NodePathError> {
        if Self::validate(path) {
            Ok(Self(path.to_string()))
        } else {
            Err(NodePathError(path.to_string()))
        }
    }

    /// The root node.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Extracts a string slice containing the node path `String`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is the root node.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Validates a path:
    /// - a path always starts with `/`,
    /// - a non-root path cannot end with `/`, and
    /// - every segment between separators is a valid [`NodeName`].
    #[must_use]
    pub fn validate(path: &str) -> bool {
        path == "/"
            || path
                .strip_prefix('/')
                .is_some_and(|path| path.split('/').all(NodeName::validate))
    }

    /// The names of the nodes from the root to this node, excluding the root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// The name of the node, or [`None`] for the root.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// The path of the parent node, or [`None`] for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let parent = self.0.rsplit_once('/').map_or("", |(parent, _)| parent);
            Some(if parent.is_empty() {
                Self::root()
            } else {
                Self(parent.to_string())
            })
        }
    }

    /// Join a relative `path` to this path.
    ///
    /// Leading and trailing `/` of `path` are ignored. An empty `path` refers to this node.
    ///
    /// # Errors
    /// Returns [`NodePathError`] if a segment of `path` is not a valid [`NodeName`].
    pub fn join(&self, path: &str) -> Result<Self, NodePathError> {
        let relative = path.trim_matches('/');
        if relative.is_empty() {
            return Ok(self.clone());
        }
        if !relative.split('/').all(NodeName::validate) {
            return Err(NodePathError(path.to_string()));
        }
        Ok(if self.is_root() {
            Self(format!("/{relative}"))
        } else {
            Self(format!("{}/{relative}", self.0))
        })
    }
}

impl TryFrom<&str> for NodePath {
    type Error = NodePathError;

    fn try_from(path: &str) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}
