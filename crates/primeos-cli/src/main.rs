//! primeos-cli/src/main.rs
//!
//! Process setup (error reports, logging) then delegates to
//! `primeos_cli::run()`.

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("warning: failed to install color-eyre: {e}");
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(err) = primeos_cli::run() {
        eprintln!("error: {err}");
        if std::env::var("RUST_BACKTRACE").as_deref() == Ok("1") {
            eprintln!("\n{:?}", err);
        }
        std::process::exit(1);
    }
}
