mod process;

pub use process::{is_process_alive, read_pid_file};

use procshim_shared::constants::envs;
use procshim_shared::errors::{ShimError, ShimResult};
use std::path::PathBuf;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Find a procshim binary in common locations.
///
/// Searches next to the current executable (and its parent, which covers
/// test binaries under `target/*/deps`), then `PROCSHIM_RUNTIME_DIR`.
///
/// # Arguments
/// * `binary_name` - Name of the binary to find (e.g., "procshim-helper")
///
/// # Returns
/// * `Ok(PathBuf)` - Path to the found binary
/// * `Err(...)` - Binary not found in any expected location
pub fn find_binary(binary_name: &str) -> ShimResult<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(exe) = std::env::current_exe()
        && let Some(exe_dir) = exe.parent()
    {
        candidates.push(exe_dir.join(binary_name));
        if let Some(parent) = exe_dir.parent() {
            candidates.push(parent.join(binary_name));
        }
    }

    if let Ok(runtime_dir) = std::env::var(envs::RUNTIME_DIR) {
        candidates.push(PathBuf::from(runtime_dir).join(binary_name));
    }

    for candidate in &candidates {
        tracing::debug!("Finding binary {:?} in path: {:?}", binary_name, candidate);
        if candidate.is_file() {
            tracing::debug!(binary = %candidate.display(), "Found binary");
            return Ok(candidate.clone());
        }
    }

    let locations = candidates
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ShimError::Config(format!(
        "Binary '{}' not found.\nSearched locations:\n{}",
        binary_name, locations
    )))
}

/// `RUST_LOG` filter, defaulting to `info`.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a stderr fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Intended for daemons embedding procshim and for tests. Does nothing if a
/// global subscriber is already set.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(default_env_filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init();
}

/// Install a subscriber emitting one JSON object per line to `writer`.
///
/// The helper and the runtime stub log this way so their records can be
/// decoded on the other end of the log pipe.
pub fn register_json_to_tracing<W>(writer: W, env_filter: EnvFilter)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(false)
                .with_span_list(false)
                .with_ansi(false),
        )
        .try_init();
}
