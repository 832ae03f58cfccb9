use log::info;
use serde::Deserialize;

use super::AwsCli;
use crate::{artifact::RepositoryUri, buildspec::RegistryEncryption, process, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    repository_uri: RepositoryUri,
}

#[derive(Debug, Deserialize)]
struct DescribeRepositoriesOutput {
    #[serde(default)]
    repositories: Vec<Repository>,
}

#[derive(Debug, Deserialize)]
struct CreateRepositoryOutput {
    repository: Repository,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeImagesOutput {
    #[serde(default)]
    image_details: Vec<serde_json::Value>,
}

const REPOSITORY_NOT_FOUND: &str = "RepositoryNotFoundException";
const IMAGE_NOT_FOUND: &str = "ImageNotFoundException";

fn encryption_configuration(encryption: &RegistryEncryption) -> String {
    match encryption {
        RegistryEncryption::Aes256 => "encryptionType=AES256".to_owned(),
        RegistryEncryption::Kms { key } => format!("encryptionType=KMS,kmsKey={key}"),
    }
}

impl AwsCli {
    /// Returns the uri of the named repository, creating it first if it does not exist yet. The encryption only
    /// applies to a newly created repository.
    pub fn ensure_repository(
        &self,
        name: &str,
        encryption: &RegistryEncryption,
    ) -> Result<RepositoryUri> {
        let describe = process::args!(
            self.aws(),
            "ecr",
            "describe-repositories",
            "--repository-names",
            name
        )
        .output();

        match describe {
            Ok(output) => {
                let output: DescribeRepositoriesOutput = serde_json::from_slice(&output.stdout)?;
                if let Some(repository) = output.repositories.into_iter().next() {
                    return Ok(repository.repository_uri);
                }
            }
            Err(error)
                if error
                    .stderr()
                    .is_some_and(|stderr| stderr.contains(REPOSITORY_NOT_FOUND)) => {}
            Err(error) => return Err(error.into()),
        }

        info!("creating repository {name:?}...");
        let command = process::args!(
            self.aws(),
            "ecr",
            "create-repository",
            "--repository-name",
            name,
            "--encryption-configuration",
            encryption_configuration(encryption),
        );
        Ok(Self::json::<CreateRepositoryOutput>(command)?
            .repository
            .repository_uri)
    }

    /// Whether the repository holds an image with the given tag.
    pub fn image_exists(&self, repository_name: &str, tag: &str) -> Result<bool> {
        let describe = process::args!(
            self.aws(),
            "ecr",
            "describe-images",
            "--repository-name",
            repository_name,
            "--image-ids",
            format!("imageTag={tag}"),
        )
        .output();

        match describe {
            Ok(output) => {
                let output: DescribeImagesOutput = serde_json::from_slice(&output.stdout)?;
                Ok(!output.image_details.is_empty())
            }
            Err(error)
                if error.stderr().is_some_and(|stderr| {
                    stderr.contains(IMAGE_NOT_FOUND) || stderr.contains(REPOSITORY_NOT_FOUND)
                }) =>
            {
                Ok(false)
            }
            Err(error) => Err(error.into()),
        }
    }
}
