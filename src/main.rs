use float::config::{Settings, parse_env_lines};
use tracing_subscriber::EnvFilter;

/// Bundled defaults, used for anything the environment does not set
const BUNDLED_CONFIG: &str = include_str!("../assets/config.env");

fn load_dotenv() {
    // .env first (desktop dev); a missing file is fine
    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        eprintln!("ignoring unreadable .env: {err}");
    }

    load_bundled_config();
}

fn load_bundled_config() {
    for (key, value) in parse_env_lines(BUNDLED_CONFIG) {
        // Only set if not already set (allow env override)
        if std::env::var(&key).is_err() {
            // SAFETY: We're setting env vars at startup before any threads are spawned
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    load_dotenv();
    init_tracing();

    let settings = Settings::from_env();
    if float::config::credential_from_env().is_none() {
        tracing::warn!("OPENAI_API_KEY environment variable is not set");
    }

    // The runtime is built only after the environment is final.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(float::server::serve(&settings))
}
