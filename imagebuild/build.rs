use std::{env, fs, io::BufRead, path::PathBuf};

/// Runs git and returns its stdout, or `None` when git is unavailable or we are not inside a checkout.
fn git<'a, I: IntoIterator<Item = &'a str>>(args: I) -> Option<Vec<u8>> {
    let output = std::process::Command::new("git")
        .args(args)
        .output()
        .ok()?;
    output.status.success().then_some(output.stdout)
}

fn git_commit_hash() -> Option<String> {
    let stdout = git(["rev-parse", "--short", "HEAD"])?;
    stdout.lines().next()?.ok()
}

fn git_is_clean() -> bool {
    git(["status", "--porcelain"]).is_some_and(|stdout| stdout.is_empty())
}

/// Git files that change on commit, checkout and staging. Missing paths are skipped, cargo would rerun on every
/// build otherwise.
fn git_state_paths() -> Vec<PathBuf> {
    let Some(stdout) = git(["rev-parse", "--absolute-git-dir"]) else {
        return Vec::new();
    };
    let Some(Ok(git_dir)) = stdout.lines().next() else {
        return Vec::new();
    };
    let git_dir = PathBuf::from(git_dir);
    ["HEAD", "index", "logs/HEAD"]
        .into_iter()
        .map(|path| git_dir.join(path))
        .filter(|path| path.exists())
        .collect()
}

fn main() {
    // Any rerun-if directive disables the default of rerunning on every package change, so list what the
    // version depends on.
    println!("cargo:rerun-if-env-changed=IMAGEBUILD_RELEASE");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=src");
    for path in git_state_paths() {
        println!("cargo:rerun-if-changed={}", path.display());
    }

    let doing_release = env::var("IMAGEBUILD_RELEASE")
        .map(|env| matches!(env.as_str(), "1" | "true"))
        .unwrap_or_default();

    let mut version = env!("CARGO_PKG_VERSION").to_owned();
    if !doing_release {
        if let Some(commit_hash) = git_commit_hash() {
            version.push('+');
            version.push_str(&commit_hash);
            if !git_is_clean() {
                version.push_str(".dirty");
            }
        }
    }

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("cargo sets OUT_DIR"));
    fs::write(
        out_dir.join("version.rs"),
        format!("pub const VERSION: &str = {version:?};"),
    )
    .expect("unable to write version.rs");
}
