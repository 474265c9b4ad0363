//! Logging setup
//!
//! Every component logs through `tracing` with a `testtrace::*` target.
//! Hosts that already install a subscriber keep theirs; [`init_logging`]
//! only installs the default fmt subscriber when none is set.

use tracing::Level;

/// Install the fmt subscriber (debug when verbose, info otherwise)
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_logging(verbose: bool) -> bool {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .is_ok()
}
