use std::path::PathBuf;

use rand::distributions::{Alphanumeric, DistString};

const LEN: usize = 16;

/// Returns a random alphanumeric token of the given length.
pub fn random_token(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), len)
}

/// Returns a path in the system temporary directory that does not exist yet with overwhelming probability. The
/// extension is appended as given, e.g. `".zip"`.
pub fn tmp_path(ext: &str) -> PathBuf {
    let mut name = String::with_capacity(LEN + ext.len());
    Alphanumeric.append_string(&mut rand::thread_rng(), &mut name, LEN);
    name.push_str(ext);
    std::env::temp_dir().join(name)
}
