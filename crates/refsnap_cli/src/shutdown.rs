use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use console::Term;

/// Shared cancellation flag, observed by the fetch engine between rounds.
fn flag() -> &'static Arc<AtomicBool> {
    static FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();
    FLAG.get_or_init(|| Arc::new(AtomicBool::new(false)))
}

/// Handle to the cancellation flag, for wiring into the fetcher.
pub(crate) fn cancel_flag() -> Arc<AtomicBool> {
    Arc::clone(flag())
}

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C raises the flag: the current round finishes and
/// whatever was merged is printed/persisted. A second Ctrl+C force-quits.
pub(crate) fn setup_shutdown_handler() {
    tokio::spawn(async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing the current round...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing the current round");
        }

        flag().store(true, Ordering::Release);

        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install second Ctrl+C handler");

        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(130);
    });
}
