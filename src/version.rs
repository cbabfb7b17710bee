/// Admin API version served by this build.
pub const ADMIN_API_VERSION: &str = "1";

/// Release version of the server.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit the server was built from, when known at build time.
pub const COMMIT_ID: &str = match option_env!("KODIAK_BUILD_GIT_HASH") {
    Some(hash) => hash,
    None => "DEVELOPMENT.GOGET",
};

/// Returns the Kodiak version information.
pub fn kodiak_version_info(build_time: Option<&str>) -> String {
    let fallback = "Unknown (env var does not exist when building)";
    format!(
        "\nRelease Version:   {}\
         \nGit Commit Hash:   {}\
         \nGit Commit Branch: {}\
         \nUTC Build Time:    {}\
         \nRust Version:      {}\
         \nProfile:           {}",
        VERSION,
        option_env!("KODIAK_BUILD_GIT_HASH").unwrap_or(fallback),
        option_env!("KODIAK_BUILD_GIT_BRANCH").unwrap_or(fallback),
        build_time.unwrap_or(fallback),
        option_env!("KODIAK_BUILD_RUSTC_VERSION").unwrap_or(fallback),
        option_env!("KODIAK_PROFILE").unwrap_or(fallback),
    )
}
