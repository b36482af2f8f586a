//! backplane-tools binary.

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

use backplane_tools::cli::{self, EXIT_CONFIG, EXIT_SIGINT, exit_code_for, render_error};
use backplane_tools::tracing::{TracingConfig, init_tracing};
use tokio_util::sync::CancellationToken;

fn main() {
    // tracing may be unusable during a panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let args: Vec<std::ffi::OsString> = std::env::args_os().collect();
    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: cli.log_format,
        level: cli.level.into(),
        ..Default::default()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("{e:?}");
        std::process::exit(EXIT_CONFIG);
    }

    // downloads run one at a time; a single thread preserves that ordering
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    let cancel = CancellationToken::new();
    let code = rt.block_on(async {
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; finishing the current step");
                on_interrupt.cancel();
            }
        });

        match backplane_tools::run(cli, &args, cancel.clone()).await {
            Ok(code) => code,
            Err(err) => {
                render_error(&err);
                exit_code_for(&err)
            }
        }
    });

    std::process::exit(if cancel.is_cancelled() { EXIT_SIGINT } else { code });
}
