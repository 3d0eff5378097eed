use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::{prelude::*, registry::LookupSpan, EnvFilter, Layer};

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Installs the global subscriber. Events are filtered by `default_directive`
/// unless `RUST_LOG` says otherwise; `LOG_TARGET=0` hides event targets.
///
/// Calling it twice is harmless: the second subscriber is discarded.
pub fn init(default_directive: &str) {
    let directive = default_directive
        .parse::<Directive>()
        .unwrap_or_else(|_| LevelFilter::INFO.into());

    let _ = tracing_subscriber::registry().with(stdout(directive)).try_init();
}

fn stdout<S>(default_directive: Directive) -> BoxedLayer<S>
where
    S: tracing::Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let with_target = std::env::var("LOG_TARGET").map(|val| val != "0").unwrap_or(true);

    let filter = EnvFilter::builder().with_default_directive(default_directive).from_env_lossy();

    tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_target(with_target)
        .with_filter(filter)
        .boxed()
}
