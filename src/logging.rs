use color_eyre::Result;
use color_eyre::eyre::Context;
use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "chart-sync";

/// Flushes pending spans when dropped at the end of `main`.
pub struct TracingGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            if let Err(error) = provider.shutdown() {
                eprintln!("Failed to shut down tracer provider: {error}");
            }
        }
    }
}

/// Install the global subscriber: an env-filtered console layer, plus an OTLP
/// exporter when `otlp_endpoint` is given.
pub fn init_tracing(log_level: &str, otlp_endpoint: Option<&str>) -> Result<TracingGuard> {
    let filter_layer = EnvFilter::try_new(log_level)
        .wrap_err_with(|| format!("Invalid log level filter: {log_level}"))?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    let Some(endpoint) = otlp_endpoint else {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
        return Ok(TracingGuard {
            tracer_provider: None,
        });
    };

    let resource = Resource::builder()
        .with_attributes(vec![KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            SERVICE_NAME,
        )])
        .build();

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .wrap_err("Failed to create OTLP span exporter")?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();
    let tracer = tracer_provider.tracer(SERVICE_NAME);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .init();

    Ok(TracingGuard {
        tracer_provider: Some(tracer_provider),
    })
}
