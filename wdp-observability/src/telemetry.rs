//! Tracing/metrics bootstrap for the worker binaries. The `telemetry`
//! feature wires OpenTelemetry OTLP export when `OTEL_EXPORTER_OTLP_*` env
//! vars are present; without it (or without the feature), plain
//! `tracing_subscriber::fmt` is used.

#[cfg(feature = "telemetry")]
mod otel {
    use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
    use opentelemetry_sdk::{
        Resource,
        metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider},
        trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
    };
    use opentelemetry_semantic_conventions::{
        SCHEMA_URL,
        attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION},
    };
    use std::env;
    use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Protocol {
        Http,
        Grpc,
    }

    impl Protocol {
        pub fn from_env() -> Option<Self> {
            let enabled = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok()
                || env::var("OTEL_EXPORTER_OTLP_HEADERS").is_ok()
                || env::var("OTEL_EXPORTER_OTLP_PROTOCOL").is_ok();
            if !enabled {
                return None;
            }
            Some(match env::var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref() {
                Ok("grpc") => Protocol::Grpc,
                _ => Protocol::Http,
            })
        }
    }

    fn resource(service_name: &'static str, service_version: &'static str) -> Resource {
        let deployment_env = env::var("DEPLOYMENT_ENV").unwrap_or_else(|_| "develop".to_string());
        Resource::builder()
            .with_service_name(service_name)
            .with_schema_url(
                [
                    KeyValue::new(SERVICE_VERSION, service_version),
                    KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment_env),
                ],
                SCHEMA_URL,
            )
            .build()
    }

    fn init_meter_provider(protocol: Protocol, resource: Resource) -> SdkMeterProvider {
        let exporter = opentelemetry_otlp::MetricExporter::builder();
        let exporter = match protocol {
            Protocol::Http => exporter
                .with_http()
                .with_temporality(opentelemetry_sdk::metrics::Temporality::default())
                .build(),
            Protocol::Grpc => exporter
                .with_tonic()
                .with_temporality(opentelemetry_sdk::metrics::Temporality::default())
                .build(),
        }
        .expect("failed to build OTLP metric exporter");

        let reader = PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(30))
            .build();
        let stdout_reader =
            PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default()).build();

        let provider = MeterProviderBuilder::default()
            .with_resource(resource)
            .with_reader(reader)
            .with_reader(stdout_reader)
            .build();
        global::set_meter_provider(provider.clone());
        provider
    }

    fn init_tracer_provider(protocol: Protocol, resource: Resource) -> SdkTracerProvider {
        let exporter = opentelemetry_otlp::SpanExporter::builder();
        let exporter = match protocol {
            Protocol::Http => exporter.with_http().build(),
            Protocol::Grpc => exporter.with_tonic().build(),
        }
        .expect("failed to build OTLP span exporter");

        SdkTracerProvider::builder()
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                1.0,
            ))))
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource)
            .with_batch_exporter(exporter)
            .build()
    }

    pub struct Providers {
        pub tracer_provider: SdkTracerProvider,
        pub meter_provider: SdkMeterProvider,
    }

    pub fn init(service_name: &'static str, service_version: &'static str) -> Option<Providers> {
        let protocol = Protocol::from_env()?;
        let resource = resource(service_name, service_version);
        let tracer_provider = init_tracer_provider(protocol, resource.clone());
        let meter_provider = init_meter_provider(protocol, resource);
        let tracer = tracer_provider.tracer("wdp");

        tracing_subscriber::registry()
            .with(tracing_subscriber::filter::LevelFilter::INFO)
            .with(tracing_subscriber::fmt::layer())
            .with(MetricsLayer::new(meter_provider.clone()))
            .with(OpenTelemetryLayer::new(tracer))
            .init();

        tracing::info!("OpenTelemetry export enabled via {:?}", protocol);
        Some(Providers {
            tracer_provider,
            meter_provider,
        })
    }
}

/// Initializes process-wide tracing for a worker binary. Holds OTel
/// provider handles (when the `telemetry` feature is active and configured)
/// so they can be flushed on shutdown.
pub struct Telemetry {
    name: &'static str,
    version: &'static str,
    #[cfg(feature = "telemetry")]
    providers: Option<otel::Providers>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            name: "wdp-worker",
            version: "0.0.0",
            #[cfg(feature = "telemetry")]
            providers: None,
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Installs the global tracing subscriber, OTel-backed if `telemetry` is
    /// compiled in and configured, plain `fmt` otherwise.
    pub fn register(mut self) -> Self {
        #[cfg(feature = "telemetry")]
        {
            self.providers = otel::init(self.name, self.version);
            if self.providers.is_some() {
                return self;
            }
        }
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
        self
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        #[cfg(feature = "telemetry")]
        if let Some(providers) = self.providers.take() {
            let _ = providers.tracer_provider.shutdown();
            let _ = providers.meter_provider.shutdown();
        }
    }
}
