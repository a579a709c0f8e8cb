use std::sync::OnceLock;

use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

use crate::modules::store::get_data_dir;

const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "genie_match.log";

// Keeps the file writer flushing for the lifetime of the process
static FILE_GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Install the global subscriber: console output plus, when requested, a
/// daily-rolling file under `<data dir>/logs`. Safe to call more than once.
pub fn init_logger(log_to_file: bool) {
    FILE_GUARD.get_or_init(|| {
        let _ = tracing_log::LogTracer::init();

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let console = fmt::layer().with_target(false).boxed();

        let (file_layer, guard) = if log_to_file {
            match get_data_dir() {
                Ok(dir) => {
                    let appender = tracing_appender::rolling::daily(dir.join(LOG_DIR), LOG_FILE_PREFIX);
                    let (writer, guard) = tracing_appender::non_blocking(appender);
                    let layer = fmt::layer().with_ansi(false).with_writer(writer).boxed();
                    (Some(layer), Some(guard))
                }
                Err(e) => {
                    eprintln!("log directory unavailable, file logging disabled: {}", e);
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        let subscriber = Registry::default().with(filter).with(console).with(file_layer);
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            // Another subscriber (e.g. a test harness) is already installed
            return guard;
        }
        info!("Logger initialised");
        guard
    });
}

pub fn log_info(message: &str) {
    info!("{}", message);
}

pub fn log_warn(message: &str) {
    warn!("{}", message);
}

pub fn log_error(message: &str) {
    error!("{}", message);
}
