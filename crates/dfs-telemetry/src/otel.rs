//! OTLP export, trace-context carriers for RPC requests, and the sampler.

use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::{
    Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
    TracerProvider as _,
};
use opentelemetry::{Context, KeyValue, global};
use opentelemetry_otlp::SpanExporter;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Sampler, SdkTracer, SdkTracerProvider, ShouldSample};
use tracing_opentelemetry::{OpenTelemetryLayer, OpenTelemetrySpanExt};
use tracing_subscriber::Registry;

const TRACEPARENT: &str = "traceparent";
const TRACESTATE: &str = "tracestate";

/// Flushes and shuts down the tracer provider when dropped.
pub struct OtelGuard {
    provider: SdkTracerProvider,
}

impl std::fmt::Debug for OtelGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OtelGuard")
    }
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("dfs-telemetry: tracer shutdown failed: {e}");
        }
    }
}

/// Build the OTLP export layer. The tonic channel and the batch processor
/// spawn onto the current Tokio runtime, so one must be running.
pub(crate) fn otel_layer(
    service_name: &str,
) -> Result<(OpenTelemetryLayer<Registry, SdkTracer>, OtelGuard), String> {
    if tokio::runtime::Handle::try_current().is_err() {
        return Err("OTLP export needs a running tokio runtime".to_string());
    }

    let exporter = SpanExporter::builder()
        .with_tonic()
        .build()
        .map_err(|e| format!("OTLP exporter: {e}"))?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(DfsSampler)
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_string())
                .build(),
        )
        .build();
    global::set_tracer_provider(provider.clone());

    let layer = tracing_opentelemetry::layer().with_tracer(provider.tracer("dfs"));
    Ok((layer, OtelGuard { provider }))
}

/// The two W3C header values a request carries.
#[derive(Default)]
struct TraceHeaders {
    traceparent: String,
    tracestate: String,
}

impl Injector for TraceHeaders {
    fn set(&mut self, key: &str, value: String) {
        match key {
            TRACEPARENT => self.traceparent = value,
            TRACESTATE => self.tracestate = value,
            _ => {}
        }
    }
}

impl Extractor for TraceHeaders {
    fn get(&self, key: &str) -> Option<&str> {
        let value = match key {
            TRACEPARENT => &self.traceparent,
            TRACESTATE => &self.tracestate,
            _ => return None,
        };
        (!value.is_empty()).then_some(value.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        vec![TRACEPARENT, TRACESTATE]
    }
}

pub(crate) fn inject_trace_context_impl() -> (String, String) {
    let mut headers = TraceHeaders::default();
    TraceContextPropagator::new().inject_context(&tracing::Span::current().context(), &mut headers);
    (headers.traceparent, headers.tracestate)
}

pub(crate) fn attach_remote_parent(span: &tracing::Span, traceparent: &str, tracestate: &str) {
    if traceparent.is_empty() {
        return;
    }
    let headers = TraceHeaders {
        traceparent: traceparent.to_string(),
        tracestate: tracestate.to_string(),
    };
    span.set_parent(TraceContextPropagator::new().extract(&headers));
}

/// Per-category sampling.
///
/// | Span name    | Rate | Why                                         |
/// |--------------|------|---------------------------------------------|
/// | `lock.*`     | 100% | Lock waits are where hangs show up          |
/// | `replica.*`  | 100% | Node-to-node copies and invalidations       |
/// | `register`   | 100% | Rare, and shapes the whole tree             |
/// | anything else| 10%  | `rpc.serve` fires once per call everywhere  |
///
/// Children of a sampled span and spans flagged as errors are always kept.
#[derive(Debug, Clone)]
struct DfsSampler;

impl DfsSampler {
    fn rate(name: &str) -> f64 {
        const ALWAYS: [&str; 3] = ["lock", "replica", "register"];
        if ALWAYS.iter().any(|prefix| name.starts_with(prefix)) {
            1.0
        } else {
            0.1
        }
    }

    fn flags_error(attributes: &[KeyValue]) -> bool {
        attributes.iter().any(|kv| match kv.key.as_str() {
            "otel.status_code" => kv.value.as_str() == "ERROR",
            "error" => kv.value.as_str() == "true",
            _ => false,
        })
    }
}

impl ShouldSample for DfsSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        let sampled_parent = parent_context
            .map(|cx| cx.span().span_context().clone())
            .filter(|parent| parent.is_sampled());
        if let Some(parent) = sampled_parent {
            return SamplingResult {
                decision: SamplingDecision::RecordAndSample,
                attributes: Vec::new(),
                trace_state: parent.trace_state().clone(),
            };
        }

        if Self::flags_error(attributes) {
            return SamplingResult {
                decision: SamplingDecision::RecordAndSample,
                attributes: Vec::new(),
                trace_state: TraceState::default(),
            };
        }

        Sampler::TraceIdRatioBased(Self::rate(name)).should_sample(
            parent_context,
            trace_id,
            name,
            span_kind,
            attributes,
            links,
        )
    }
}
