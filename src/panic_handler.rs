use log::error;
use std::panic;

use crate::export::controller::WORKER_THREAD_NAME;

/// Install the process panic hook.
///
/// Debug builds get `better-panic` backtraces, release builds the `human-panic` report.
/// Either way the panic is written to the log first. Panics on the export worker are
/// caught and recorded against the certificate being produced, so they are only logged.
pub fn initialize_panic_handler() {
    #[cfg(debug_assertions)]
    better_panic::install();

    #[cfg(not(debug_assertions))]
    human_panic::setup_panic!();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current();
        let name = thread.name().unwrap_or("<unnamed>");
        error!("Panic on thread '{name}': {panic_info}");
        if name != WORKER_THREAD_NAME {
            default_hook(panic_info);
        }
    }));
}
