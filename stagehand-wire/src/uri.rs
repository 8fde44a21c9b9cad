//! Resource addressing: `stage://<category>/<id>`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// URI scheme for host resources.
pub const SCHEME: &str = "stage";

/// Errors from resource URI parsing.
#[derive(Debug, Error)]
pub enum UriError {
    #[error("invalid resource URI {0:?}: expected {SCHEME}://<category>/<id>")]
    MissingScheme(String),
    #[error("invalid resource URI {uri:?}: unknown category {category:?}")]
    UnknownCategory { uri: String, category: String },
    #[error("invalid resource URI {0:?}: missing id")]
    MissingId(String),
}

/// The fixed set of observable host resource categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    Object,
    Material,
    Light,
    Camera,
    Scene,
}

impl ResourceCategory {
    /// All categories, in detector polling order.
    pub const ALL: [ResourceCategory; 5] = [
        ResourceCategory::Object,
        ResourceCategory::Material,
        ResourceCategory::Light,
        ResourceCategory::Camera,
        ResourceCategory::Scene,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Object => "object",
            ResourceCategory::Material => "material",
            ResourceCategory::Light => "light",
            ResourceCategory::Camera => "camera",
            ResourceCategory::Scene => "scene",
        }
    }

    fn from_segment(uri: &str, segment: &str) -> Result<Self, UriError> {
        match segment {
            "object" => Ok(ResourceCategory::Object),
            "material" => Ok(ResourceCategory::Material),
            "light" => Ok(ResourceCategory::Light),
            "camera" => Ok(ResourceCategory::Camera),
            "scene" => Ok(ResourceCategory::Scene),
            other => Err(UriError::UnknownCategory {
                uri: uri.to_string(),
                category: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `stage://<category>/<id>` address.
///
/// The id is everything after the category segment and may itself contain
/// `/` (host object names are not restricted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceUri {
    pub category: ResourceCategory,
    pub id: String,
}

impl ResourceUri {
    pub fn new(category: ResourceCategory, id: impl Into<String>) -> Self {
        Self {
            category,
            id: id.into(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, UriError> {
        let rest = s
            .strip_prefix(SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| UriError::MissingScheme(s.to_string()))?;
        let (category, id) = match rest.split_once('/') {
            Some((category, id)) if !id.is_empty() => (category, id),
            _ => return Err(UriError::MissingId(s.to_string())),
        };
        Ok(Self {
            category: ResourceCategory::from_segment(s, category)?,
            id: id.to_string(),
        })
    }
}

impl FromStr for ResourceUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}://{}/{}", self.category, self.id)
    }
}
