use std::process::ExitCode;

use configs::AppConfig;
use dotenvy::dotenv;
use tracing::{error, info};
use uuid::Uuid;

fn install_panic_hook(instance: Uuid) {
    std::panic::set_hook(Box::new(move |info| {
        error!(service = "server", event = "panic", %instance, pid = std::process::id(), message = %info, "unhandled panic");
    }));
}

fn runtime(worker_threads: Option<usize>) -> std::io::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(n) = worker_threads {
        builder.worker_threads(n);
    }
    builder.build()
}

fn main() -> ExitCode {
    dotenv().ok();

    // Config decides the log format, so a load failure is reported on the
    // default subscriber before giving up.
    let cfg = match AppConfig::load_or_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            common::utils::logging::init_logging_default();
            error!(service = "server", event = "config_invalid", error = %format!("{e:#}"), "cannot load configuration");
            return ExitCode::FAILURE;
        }
    };
    common::utils::logging::init_logging(&cfg.logging.format);

    let instance = Uuid::new_v4();
    install_panic_hook(instance);

    let rt = match runtime(cfg.server.worker_threads) {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "server", event = "runtime_build_failed", error = %e, "cannot build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    info!(
        service = "server",
        event = "start",
        %instance,
        pid = std::process::id(),
        version = env!("CARGO_PKG_VERSION"),
        threads = cfg.server.worker_threads.unwrap_or_default(),
        "coachdesk starting"
    );

    match rt.block_on(server::run(cfg)) {
        Ok(()) => {
            info!(service = "server", event = "stop", %instance, "stopped after draining requests");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(service = "server", event = "run_failed", %instance, error = %format!("{e:#}"), "server exited with error");
            ExitCode::FAILURE
        }
    }
}
