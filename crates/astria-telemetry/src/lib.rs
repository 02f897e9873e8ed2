//! Initialize tracing and metrics in the price feed services.
//!
//! # Examples
//! ```no_run
//! let _guard = astria_telemetry::configure()
//!     .set_filter_directives("info")
//!     .set_no_otel(true)
//!     .set_metrics("127.0.0.1:9000", "astria-price-feed")
//!     .try_init()
//!     .expect("must be able to initialize telemetry");
//! tracing::info!("telemetry initialized");
//! ```
use std::{
    io::IsTerminal as _,
    net::{
        AddrParseError,
        SocketAddr,
    },
};

use metrics_exporter_prometheus::{
    Matcher,
    PrometheusBuilder,
};
use opentelemetry::{
    global,
    trace::TracerProvider as _,
};
use opentelemetry_sdk::{
    runtime::Tokio,
    trace::TracerProvider,
};
use tracing_subscriber::{
    filter::{
        LevelFilter,
        ParseError,
    },
    layer::SubscriberExt as _,
    util::{
        SubscriberInitExt as _,
        TryInitError,
    },
    EnvFilter,
    Layer as _,
};

#[cfg(feature = "display")]
pub mod display;
#[doc(hidden)]
pub mod macros;

/// The errors that can occur when initializing telemetry.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    fn otlp(source: opentelemetry::trace::TraceError) -> Self {
        Self(ErrorKind::Otlp(source))
    }

    fn filter_directives(source: ParseError) -> Self {
        Self(ErrorKind::FilterDirectives(source))
    }

    fn init_subscriber(source: TryInitError) -> Self {
        Self(ErrorKind::InitSubscriber(source))
    }

    fn metrics_addr(source: AddrParseError) -> Self {
        Self(ErrorKind::MetricsAddr(source))
    }

    fn metrics_exporter(source: metrics_exporter_prometheus::BuildError) -> Self {
        Self(ErrorKind::MetricsExporter(source))
    }
}

#[derive(Debug, thiserror::Error)]
enum ErrorKind {
    #[error("failed constructing opentelemetry otlp exporter")]
    Otlp(#[source] opentelemetry::trace::TraceError),
    #[error("failed to parse filter directives")]
    FilterDirectives(#[source] ParseError),
    #[error("failed installing global tracing subscriber")]
    InitSubscriber(#[source] TryInitError),
    #[error("failed to parse metrics exporter listening address")]
    MetricsAddr(#[source] AddrParseError),
    #[error("failed installing the prometheus metrics exporter")]
    MetricsExporter(#[source] metrics_exporter_prometheus::BuildError),
}

#[must_use = "the telemetry config must be initialized to be useful"]
pub fn configure() -> Config {
    Config::new()
}

struct MetricsConfig {
    listening_addr: String,
    service_name: String,
}

pub struct Config {
    filter_directives: String,
    force_stdout: bool,
    no_otel: bool,
    pretty_print: bool,
    metrics: Option<MetricsConfig>,
    histogram_buckets: Vec<(String, Vec<f64>)>,
}

impl Config {
    #[must_use = "telemetry must be initialized to be useful"]
    fn new() -> Self {
        Self {
            filter_directives: String::new(),
            force_stdout: false,
            no_otel: false,
            pretty_print: false,
            metrics: None,
            histogram_buckets: Vec::new(),
        }
    }

    #[must_use = "telemetry must be initialized to be useful"]
    pub fn set_filter_directives(mut self, filter_directives: &str) -> Self {
        self.filter_directives = filter_directives.to_string();
        self
    }

    /// Write events to stdout even if stdout is not a terminal.
    #[must_use = "telemetry must be initialized to be useful"]
    pub fn set_force_stdout(mut self, force_stdout: bool) -> Self {
        self.force_stdout = force_stdout;
        self
    }

    #[must_use = "telemetry must be initialized to be useful"]
    pub fn set_no_otel(mut self, no_otel: bool) -> Self {
        self.no_otel = no_otel;
        self
    }

    /// Write compact human readable lines instead of json objects to stdout.
    #[must_use = "telemetry must be initialized to be useful"]
    pub fn set_pretty_print(mut self, pretty_print: bool) -> Self {
        self.pretty_print = pretty_print;
        self
    }

    /// Serve prometheus metrics on `listening_addr`, labelling all of them with
    /// `service="<service_name>"`.
    #[must_use = "telemetry must be initialized to be useful"]
    pub fn set_metrics(mut self, listening_addr: &str, service_name: &str) -> Self {
        self.metrics = Some(MetricsConfig {
            listening_addr: listening_addr.to_string(),
            service_name: service_name.to_string(),
        });
        self
    }

    /// Export histograms whose names end in `suffix` with the given bucket bounds instead of as
    /// summaries.
    ///
    /// Has no effect unless metrics are enabled through [`Config::set_metrics`].
    #[must_use = "telemetry must be initialized to be useful"]
    pub fn add_histogram_buckets(mut self, suffix: &str, buckets: &[f64]) -> Self {
        self.histogram_buckets
            .push((suffix.to_string(), buckets.to_vec()));
        self
    }

    /// Initialize telemetry, consuming the config.
    ///
    /// Must be called from within a tokio runtime if OTLP export or metrics are enabled.
    ///
    /// # Errors
    /// Fails if the filter directives could not be parsed, if the OTLP exporter could not be
    /// constructed, if the metrics exporter could not be installed (for example because a set of
    /// histogram buckets is empty), or if the global tracing subscriber could not be installed.
    pub fn try_init(self) -> Result<Guard, Error> {
        let Self {
            filter_directives,
            force_stdout,
            no_otel,
            pretty_print,
            metrics,
            histogram_buckets,
        } = self;

        let env_filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .parse(filter_directives)
            .map_err(Error::filter_directives)?;

        let stdout_layer = if force_stdout || std::io::stdout().is_terminal() {
            if pretty_print {
                Some(tracing_subscriber::fmt::layer().compact().boxed())
            } else {
                Some(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .flatten_event(true)
                        .boxed(),
                )
            }
        } else {
            None
        };

        let otel_layer = if no_otel {
            None
        } else {
            // XXX: the endpoint is set by a hardcoded environment variable, one of:
            //      OTEL_EXPORTER_OTLP_ENDPOINT
            //      OTEL_EXPORTER_OTLP_TRACES_ENDPOINT
            let otel_exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .build_span_exporter()
                .map_err(Error::otlp)?;
            let tracer_provider = TracerProvider::builder()
                .with_batch_exporter(otel_exporter, Tokio)
                .build();
            let tracer = tracer_provider.versioned_tracer(
                "astria-telemetry",
                Some(env!("CARGO_PKG_VERSION")),
                Some(opentelemetry_semantic_conventions::SCHEMA_URL),
                None,
            );
            let _ = global::set_tracer_provider(tracer_provider);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        };

        if let Some(MetricsConfig {
            listening_addr,
            service_name,
        }) = metrics
        {
            let addr: SocketAddr = listening_addr.parse().map_err(Error::metrics_addr)?;
            let mut builder = PrometheusBuilder::new().with_http_listener(addr);
            if !service_name.is_empty() {
                builder = builder.add_global_label("service", service_name);
            }
            for (suffix, buckets) in histogram_buckets {
                builder = builder
                    .set_buckets_for_metric(Matcher::Suffix(suffix), &buckets)
                    .map_err(Error::metrics_exporter)?;
            }
            builder.install().map_err(Error::metrics_exporter)?;
        }

        tracing_subscriber::registry()
            .with(stdout_layer)
            .with(otel_layer)
            .with(env_filter)
            .try_init()
            .map_err(Error::init_subscriber)?;

        Ok(Guard {
            run_otel_shutdown: !no_otel,
        })
    }
}

/// A drop guard for terminating all `OpenTelemetry` tracer providers on drop.
///
/// *Note:* Shutting down the tracer providers can potentially block a thread
/// indefinitely.
pub struct Guard {
    run_otel_shutdown: bool,
}

impl Drop for Guard {
    fn drop(&mut self) {
        if self.run_otel_shutdown {
            opentelemetry::global::shutdown_tracer_provider();
        }
    }
}
