//! Stamps the `kl` binary with build metadata.
//!
//! - `KL_BUILD_TIMESTAMP`: UTC build time (RFC 3339, seconds)
//! - `KL_GIT_COMMIT`: `git describe --always --dirty` of the source tree, or `unknown`

use std::process::Command;

fn main() {
    for path in [".git/HEAD", ".git/index"] {
        println!("cargo:rerun-if-changed={}", path);
    }
    println!("cargo:rerun-if-env-changed=KL_GIT_COMMIT");

    let built = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    println!("cargo:rustc-env=KL_BUILD_TIMESTAMP={}", built);

    // Packagers without a checkout can pin the revision themselves
    let commit = std::env::var("KL_GIT_COMMIT")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| git(&["describe", "--always", "--dirty"]))
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=KL_GIT_COMMIT={}", commit);
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
