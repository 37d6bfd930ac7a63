// ABOUTME: Process-wide tracing subscriber façade
// ABOUTME: Confines global logger setup to one call site, matching the teacher's examples binaries

use tracing_subscriber::FmtSubscriber;

/// Install a global `tracing` subscriber reading its level from `RUST_LOG`,
/// falling back to `default_level` when unset. Intended to be called once,
/// near the top of `main()`.
///
/// Mirrors spec.md §9's "process-wide logger with a set-once level and a
/// mutex guarding output" design note: `tracing`'s global dispatcher is
/// itself the set-once singleton, so this façade just confines where that
/// singleton gets configured.
pub fn init(default_level: tracing::Level) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level.to_string()));

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("global tracing subscriber already set");
    }
}
