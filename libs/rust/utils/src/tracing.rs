use futures::{Future, FutureExt};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// HTTP/networking crates are silenced unless RUST_LOG asks for them
const DEFAULT_FILTER: &str =
    "info,hyper_util=off,alloy_rpc_client=off,alloy_transport_http=off,reqwest=off";

pub fn setup_tracing() {
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // JSON for log shipping, compact for terminals
    let (json_layer, compact_layer) = if json {
        (
            Some(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::io::stdout),
            ),
            None,
        )
    } else {
        (
            None,
            Some(
                fmt::layer()
                    .with_line_number(true)
                    .compact()
                    .with_writer(std::io::stdout),
            ),
        )
    };

    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(json_layer)
        .with(compact_layer)
        .try_init();
}

pub async fn run_with_tracing<F, Fut>(future: F) -> Result<(), anyhow::Error>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
{
    setup_tracing();

    // Wrap the async block in a catch_unwind
    match std::panic::AssertUnwindSafe(future()).catch_unwind().await {
        Ok(result) => result,
        Err(e) => {
            capture_panic_details(e);
            Err(anyhow::anyhow!("task panicked"))
        }
    }
}

fn capture_panic_details(e: Box<dyn std::any::Any + Send>) {
    let backtrace = backtrace::Backtrace::new();
    if let Some(s) = e.downcast_ref::<&str>() {
        error!(panic_message = *s, backtrace = ?backtrace, "Panic occurred with message");
    } else if let Some(s) = e.downcast_ref::<String>() {
        error!(panic_message = s, backtrace = ?backtrace, "Panic occurred with message");
    } else {
        error!(backtrace = ?backtrace, "Panic occurred but the payload is not a string");
    }
}
