//! Tracing setup for dfs processes.
//!
//! Every binary calls [`init_tracing`] once at startup. Log output goes to
//! stderr, filtered by `RUST_LOG` (default `info`).
//!
//! # OpenTelemetry
//!
//! Built with the `telemetry` feature, spans are also exported over OTLP when
//! the standard OTel environment variables ask for it:
//!
//! ```bash
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 cargo run -p dfs-naming --features telemetry
//! ```
//!
//! `OTEL_SDK_DISABLED=true` turns export off regardless.
//!
//! # Propagation across RPC
//!
//! The transport stamps each request with the caller's W3C trace context
//! ([`inject_trace_context`]) and the serving side wraps the dispatched call in
//! a span parented to it ([`serve_span`]). Without the feature both are cheap
//! no-ops: empty strings going out, a plain local span coming in.

#[cfg(feature = "telemetry")]
mod otel;

#[cfg(feature = "telemetry")]
pub use otel::OtelGuard;

use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Placeholder guard when OTel export is compiled out.
#[cfg(not(feature = "telemetry"))]
#[derive(Debug)]
pub struct OtelGuard;

/// Keeps telemetry alive; drop it last in `main` so pending spans flush.
#[derive(Default)]
pub struct TelemetryGuard {
    otel: Option<OtelGuard>,
}

impl TelemetryGuard {
    /// Whether spans are being exported over OTLP.
    pub fn exporting(&self) -> bool {
        self.otel.is_some()
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global tracing subscriber for a dfs process.
///
/// Safe to call more than once; later calls keep the first subscriber and
/// only report the conflict on stderr.
pub fn init_tracing(service_name: &str) -> TelemetryGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (otel, guard) = otel_parts(service_name);

    let installed = tracing_subscriber::registry()
        .with(otel)
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();

    if let Err(e) = installed {
        eprintln!("{service_name}: tracing subscriber already installed: {e}");
    }

    TelemetryGuard { otel: guard }
}

#[cfg(feature = "telemetry")]
fn otel_parts(service_name: &str) -> (Option<BoxedLayer>, Option<OtelGuard>) {
    if !otel_enabled() {
        return (None, None);
    }
    match otel::otel_layer(service_name) {
        Ok((layer, guard)) => (Some(Box::new(layer)), Some(guard)),
        Err(e) => {
            eprintln!("{service_name}: OTel export disabled: {e}");
            (None, None)
        }
    }
}

#[cfg(not(feature = "telemetry"))]
fn otel_parts(_service_name: &str) -> (Option<BoxedLayer>, Option<OtelGuard>) {
    (None, None)
}

/// Whether the OTel environment asks for span export.
///
/// `OTEL_SDK_DISABLED=true` always wins. Otherwise an OTLP endpoint, or a
/// traces exporter other than `none`, turns export on.
pub fn otel_enabled() -> bool {
    let var = |name: &str| std::env::var(name).ok();

    if var("OTEL_SDK_DISABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        return false;
    }
    var("OTEL_EXPORTER_OTLP_ENDPOINT").is_some()
        || var("OTEL_TRACES_EXPORTER").is_some_and(|v| !v.eq_ignore_ascii_case("none"))
}

/// Capture the current span's trace context as `(traceparent, tracestate)`.
///
/// Both strings are empty when nothing is being traced.
pub fn inject_trace_context() -> (String, String) {
    #[cfg(feature = "telemetry")]
    {
        otel::inject_trace_context_impl()
    }
    #[cfg(not(feature = "telemetry"))]
    {
        (String::new(), String::new())
    }
}

/// Span for serving one RPC call, parented to the caller's trace context when
/// one was propagated.
pub fn serve_span(
    interface: &str,
    operation: &str,
    traceparent: &str,
    tracestate: &str,
) -> tracing::Span {
    let span = tracing::info_span!("rpc.serve", interface = %interface, operation = %operation);
    #[cfg(feature = "telemetry")]
    otel::attach_remote_parent(&span, traceparent, tracestate);
    #[cfg(not(feature = "telemetry"))]
    let _ = (traceparent, tracestate);
    span
}
