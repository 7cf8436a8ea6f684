use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub const LOG_ENV: &str = "LOADFLEET_LOG";
const FALLBACK_LOG_ENV: &str = "RUST_LOG";

/// Picks the directive string: `LOADFLEET_LOG`, then `RUST_LOG`, then the
/// verbosity default.
fn filter_directive(primary: Option<String>, fallback: Option<String>, verbose: bool) -> String {
    primary
        .or(fallback)
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| if verbose { "debug" } else { "info" }.to_owned())
}

fn build_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_logging(verbose: bool, no_color: bool) {
    let directive = filter_directive(
        std::env::var(LOG_ENV).ok(),
        std::env::var(FALLBACK_LOG_ENV).ok(),
        verbose,
    );

    // stdout belongs to the status screen.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(build_filter(&directive))
        .with_ansi(!no_color)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set global default subscriber: {}", err);
    }
}
