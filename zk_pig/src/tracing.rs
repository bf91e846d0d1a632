use tracing_subscriber::{prelude::*, util::SubscriberInitExt, EnvFilter};

/// Used when `RUST_LOG` is not set: stage progress of the binary and the
/// witness crate, warnings from everything else.
pub const DEFAULT_DIRECTIVES: &str = "warn,zk_pig=info,witness=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Logs to stderr, so that nothing gets mixed with artifacts written to
/// stdout.
pub fn init() {
    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(true)
                .with_filter(env_filter()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;

    #[test]
    fn default_directives_parse() {
        check!(EnvFilter::try_new(DEFAULT_DIRECTIVES).is_ok());
    }
}
