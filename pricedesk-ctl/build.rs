//! Stamps `PRICEDESK_BUILD_ID` ("<git hash> <UTC timestamp> <profile>") for
//! the startup log line.

use std::process::Command;

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|hash| hash.trim().to_string())
}

fn main() {
    let build_id = format!(
        "{} {} {}",
        git_short_hash().unwrap_or_else(|| "nogit".to_string()),
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
        std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string()),
    );
    println!("cargo:rustc-env=PRICEDESK_BUILD_ID={build_id}");
}
