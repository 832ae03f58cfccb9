//! Registry references for the image produced by a build.
//!
//! The grammar is a subset of the one documented in
//! [reference.go](https://github.com/distribution/distribution/blob/v2.7.1/reference/reference.go):
//!
//! ```txt
//! repository := domain ['/' path-component]+
//! domain     := domain-component ['.' domain-component]+ [':' port-number]
//! tag        := /[\w][\w.-]{0,127}/
//! ```
//!
//! Unlike the general grammar, the domain is required because a build can only push to a remote registry.

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

static REPOSITORY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^",
        r"(?P<registry>[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)+(?::[0-9]+)?)",
        r"/",
        r"(?P<path>[a-z0-9]+(?:(?:[_.]|__|[-]*)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[_.]|__|[-]*)[a-z0-9]+)*)*)",
        r"$"
    ))
    .expect("repository regex is valid")
});

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag regex is valid")
    });

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidReference {
    #[error("invalid repository uri {0:?}, expected `<registry>/<path>`")]
    Repository(String),

    #[error("invalid image tag {0:?}")]
    Tag(String),
}

pub fn is_valid_tag(tag: &str) -> bool {
    TAG_REGEX.is_match(tag)
}

/// A registry repository such as `123456789012.dkr.ecr.eu-west-1.amazonaws.com/my-image`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RepositoryUri {
    buffer: String,
    registry_end: usize,
}

impl RepositoryUri {
    pub fn new(value: String) -> Result<Self, InvalidReference> {
        let registry_end = match REPOSITORY_REGEX
            .captures(&value)
            .and_then(|captures| captures.name("registry"))
        {
            Some(m) => m.end(),
            None => return Err(InvalidReference::Repository(value)),
        };
        Ok(Self {
            buffer: value,
            registry_end,
        })
    }

    /// The `<domain>(:<port>)?` section, which is what `docker login` expects.
    pub fn registry(&self) -> &str {
        &self.buffer[..self.registry_end]
    }

    pub fn path(&self) -> &str {
        // Skip the `/` separating registry and path.
        &self.buffer[self.registry_end + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn with_tag(&self, tag: &str) -> Result<ImageReference, InvalidReference> {
        if !is_valid_tag(tag) {
            return Err(InvalidReference::Tag(tag.to_owned()));
        }
        Ok(ImageReference {
            repository: self.clone(),
            tag: tag.to_owned(),
        })
    }
}

impl FromStr for RepositoryUri {
    type Err = InvalidReference;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_owned())
    }
}

impl fmt::Debug for RepositoryUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.buffer.fmt(f)
    }
}

impl fmt::Display for RepositoryUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buffer)
    }
}

/// A repository together with the tag of one specific build.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    repository: RepositoryUri,
    tag: String,
}

impl ImageReference {
    /// For tags that have already been validated.
    pub(crate) fn from_parts(repository: RepositoryUri, tag: String) -> Self {
        debug_assert!(is_valid_tag(&tag));
        Self { repository, tag }
    }

    pub fn repository(&self) -> &RepositoryUri {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Debug for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

impl Serialize for ImageReference {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl Serialize for RepositoryUri {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.buffer)
    }
}

impl<'de> Deserialize<'de> for RepositoryUri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Self::new(Deserialize::deserialize(deserializer)?).map_err(::serde::de::Error::custom)
    }
}

/// Image reference in the shape a container orchestrator task definition consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerImageHandle {
    pub image: ImageReference,
}

/// Image reference in the shape a container-image-backed function consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionImageHandle {
    pub image_uri: ImageReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactHandles {
    pub artifact_tag: String,
    pub container_image: ContainerImageHandle,
    pub function_image: FunctionImageHandle,
}

/// Resolves the downstream handles for the tag a successful build reported. Both handles reference the exact tag,
/// never a floating one.
pub fn resolve(
    repository: &RepositoryUri,
    artifact_tag: &str,
) -> Result<ArtifactHandles, InvalidReference> {
    let image = repository.with_tag(artifact_tag)?;
    Ok(ArtifactHandles {
        artifact_tag: artifact_tag.to_owned(),
        container_image: ContainerImageHandle {
            image: image.clone(),
        },
        function_image: FunctionImageHandle { image_uri: image },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPOSITORY: &str = "123456789012.dkr.ecr.eu-west-1.amazonaws.com/team/my-image";

    #[test]
    fn repository_parsing_works() {
        let repository: RepositoryUri = REPOSITORY.parse().unwrap();
        assert_eq!(
            repository.registry(),
            "123456789012.dkr.ecr.eu-west-1.amazonaws.com"
        );
        assert_eq!(repository.path(), "team/my-image");

        let repository: RepositoryUri = "localhost.localdomain:5000/img".parse().unwrap();
        assert_eq!(repository.registry(), "localhost.localdomain:5000");
        assert_eq!(repository.path(), "img");
    }

    #[test]
    fn repository_requires_registry_and_path() {
        assert!("my-image".parse::<RepositoryUri>().is_err());
        assert!("reg.io/".parse::<RepositoryUri>().is_err());
        assert!("reg.io/UPPER".parse::<RepositoryUri>().is_err());
        assert!("reg.io/img:latest".parse::<RepositoryUri>().is_err());
    }

    #[test]
    fn tag_validation_works() {
        assert!(is_valid_tag("latest"));
        assert!(is_valid_tag("0f8b7c1e-3d4a-4b2f-9e8d-1a2b3c4d5e6f"));
        assert!(!is_valid_tag(""));
        assert!(!is_valid_tag("-leading-dash"));
        assert!(!is_valid_tag(&"a".repeat(129)));
    }

    #[test]
    fn non_ascii_tags_are_rejected() {
        assert!(!is_valid_tag("café"));
        assert!(!is_valid_tag("ünicode"));
        assert!(!is_valid_tag("v1-\u{0663}"));
        assert!(is_valid_tag("cafe_1.2-rc"));
    }

    #[test]
    fn both_handles_reference_the_same_tag() {
        let repository: RepositoryUri = REPOSITORY.parse().unwrap();
        let handles = resolve(&repository, "abc-123").unwrap();
        assert_eq!(
            handles.container_image.image.to_string(),
            format!("{REPOSITORY}:abc-123")
        );
        assert_eq!(handles.container_image.image, handles.function_image.image_uri);
        assert_eq!(
            serde_json::to_value(&handles).unwrap(),
            serde_json::json!({
                "artifactTag": "abc-123",
                "containerImage": { "image": format!("{REPOSITORY}:abc-123") },
                "functionImage": { "ImageUri": format!("{REPOSITORY}:abc-123") },
            })
        );
    }

    #[test]
    fn resolve_rejects_invalid_tag() {
        let repository: RepositoryUri = REPOSITORY.parse().unwrap();
        assert_eq!(
            resolve(&repository, "no spaces"),
            Err(InvalidReference::Tag("no spaces".to_owned()))
        );
    }
}
