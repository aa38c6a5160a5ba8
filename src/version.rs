// Build-time version from Cargo.toml

/// Package version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dashboard title, e.g. "GTOP v0.1.0".
pub fn title() -> String {
    format!("GTOP v{}", VERSION)
}
