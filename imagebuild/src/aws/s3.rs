use std::path::Path;

use super::AwsCli;
use crate::{buildspec::SourceLocator, process, Result};

impl AwsCli {
    pub fn upload(&self, path: &Path, target: &SourceLocator) -> Result<()> {
        process::args!(
            self.aws(),
            "s3",
            "cp",
            "--only-show-errors",
            path,
            format!("s3://{target}"),
        )
        .output()?;
        Ok(())
    }
}
