include!(concat!(env!("OUT_DIR"), "/version.rs"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_the_package_version_with_an_optional_commit() {
        let suffix = VERSION
            .strip_prefix(env!("CARGO_PKG_VERSION"))
            .expect("version starts with the package version");
        if let Some(commit) = suffix.strip_prefix('+') {
            let hash = commit.strip_suffix(".dirty").unwrap_or(commit);
            assert!(!hash.is_empty());
            assert!(hash.bytes().all(|byte| byte.is_ascii_hexdigit()), "{VERSION}");
        } else {
            assert_eq!(suffix, "");
        }
    }
}
