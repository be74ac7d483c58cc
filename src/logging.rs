// 📜 Logging - one-time tracing subscriber setup for the binary

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT_ONCE: Once = Once::new();

/// Install the global subscriber. `RUST_LOG` wins over the default
/// `cardapio_bot=info`; `json` switches to one JSON object per line.
pub fn init(json: bool) {
    INIT_ONCE.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("cardapio_bot=info"));

        if json {
            tracing_subscriber::fmt().json().with_env_filter(filter).init();
        } else {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    });
}
