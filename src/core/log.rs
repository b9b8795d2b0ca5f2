use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// Installs the global subscriber. `verbose` enables debug output for this
/// crate; `RUST_LOG` replaces the default filter when set.
pub fn init_logging(verbose: bool) {
    let level_filter = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let env_filter = EnvFilter::try_from_default_env().ok();
    let app_filter = env_filter.is_none().then(|| {
        Targets::new()
            .with_target("fipeval", level_filter)
            .with_default(LevelFilter::WARN)
    });

    // try_init: tests may have installed a subscriber already
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .pretty()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(app_filter)
        .with(env_filter)
        .try_init();
}
