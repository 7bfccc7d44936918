//! Build script for jukebox
//!
//! Embeds build identification for the startup log line:
//! `JUKEBOX_GIT_HASH`, `JUKEBOX_BUILD_TIMESTAMP` and `JUKEBOX_BUILD_PROFILE`.

use std::process::Command;

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_string())
}

fn main() {
    let git_hash = git_short_hash().unwrap_or_else(|| "unknown".to_string());
    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=JUKEBOX_GIT_HASH={git_hash}");
    println!("cargo:rustc-env=JUKEBOX_BUILD_TIMESTAMP={timestamp}");
    println!("cargo:rustc-env=JUKEBOX_BUILD_PROFILE={profile}");

    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-changed=build.rs");
}
