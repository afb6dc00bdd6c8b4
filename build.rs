#![forbid(unsafe_code)]

// Embeds build provenance for the startup banner.  Builds that run outside
// a git checkout (release tarballs) embed "unknown" for the git fields.
fn main() {
    set_build_env("GIT_BRANCH", build_data::get_git_branch().ok());
    set_build_env("GIT_COMMIT_SHORT", build_data::get_git_commit_short().ok());
    set_build_env("RUSTC_VERSION", build_data::get_rustc_version().ok());
}

fn set_build_env(key: &str, value: Option<String>) {
    println!("cargo:rustc-env={}={}", key, value.unwrap_or_else(|| "unknown".to_string()));
}
