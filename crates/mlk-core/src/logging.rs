use tracing_subscriber::{fmt, EnvFilter};

use crate::Result;

/// Initialize tracing for the process. A second call is a no-op.
pub fn init(service_name: &str) -> Result<()> {
    // Default: info for our crates, warn for chatty HTTP / bot internals.
    // Can be overridden with `RUST_LOG`.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,mlk=info,mlk_core=info,{service_name}=info,reqwest=warn,hyper=warn,teloxide=warn"
        ))
    });

    // Already installed (tests, or a host that set its own subscriber).
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init();

    Ok(())
}
