
use std::time::Duration;

use bitcoin::secp256k1::PublicKey;
use bitcoin_ext::BlockHeight;
use opentelemetry::metrics::{Counter, Gauge};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;

use crate::Config;

pub const METER_WATCHTOWER: &str = "watchtower";

pub const METER_COUNTER_VERSION: &str = "version_counter";
pub const METER_GAUGE_APPOINTMENTS: &str = "appointments_gauge";
pub const METER_GAUGE_TRACKERS: &str = "trackers_gauge";
pub const METER_GAUGE_UNCONFIRMED: &str = "unconfirmed_penalties_gauge";
pub const METER_GAUGE_BLOCK_HEIGHT: &str = "block_gauge";
pub const METER_COUNTER_BREACHES: &str = "breaches_counter";
pub const METER_COUNTER_REBROADCAST: &str = "rebroadcast_counter";

pub const ATTRIBUTE_COMPONENT: &str = "component";

#[derive(Debug, Clone)]
struct InnerMetrics {
	appointments_gauge: Gauge<u64>,
	trackers_gauge: Gauge<u64>,
	unconfirmed_gauge: Gauge<u64>,
	block_height_gauge: Gauge<u64>,
	breaches_counter: Counter<u64>,
	rebroadcast_counter: Counter<u64>,
}

/// Handle to the tower's metrics, a no-op when telemetry is disabled.
#[derive(Debug, Clone)]
pub struct TelemetryMetrics {
	inner: Option<InnerMetrics>,
}

impl TelemetryMetrics {
	pub const fn disabled() -> Self {
		Self { inner: None }
	}

	pub fn init(config: &Config, public_key: PublicKey) -> anyhow::Result<TelemetryMetrics> {
		let endpoint = match config.otel_collector_endpoint {
			Some(ref e) => e,
			None => return Ok(TelemetryMetrics::disabled()),
		};

		let resource = Resource::builder()
			.with_attribute(KeyValue::new("service.name", "watchtower"))
			.with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
			.with_attribute(KeyValue::new("watchtower.public_key", public_key.to_string()))
			.with_attribute(KeyValue::new("watchtower.network", config.network.to_string()))
			.build();

		let metrics_exporter = opentelemetry_otlp::MetricExporter::builder()
			.with_tonic()
			.with_endpoint(endpoint)
			.with_timeout(Duration::from_secs(3))
			.build()?;

		let metrics_reader = PeriodicReader::builder(metrics_exporter).build();
		let provider = SdkMeterProvider::builder()
			.with_reader(metrics_reader)
			.with_resource(resource)
			.build();
		global::set_meter_provider(provider);

		let meter = global::meter_provider().meter(METER_WATCHTOWER);
		let version_counter = meter.u64_counter(METER_COUNTER_VERSION).build();
		version_counter.add(1u64, &[KeyValue::new("version", env!("CARGO_PKG_VERSION"))]);

		Ok(TelemetryMetrics {
			inner: Some(InnerMetrics {
				appointments_gauge: meter.u64_gauge(METER_GAUGE_APPOINTMENTS).build(),
				trackers_gauge: meter.u64_gauge(METER_GAUGE_TRACKERS).build(),
				unconfirmed_gauge: meter.u64_gauge(METER_GAUGE_UNCONFIRMED).build(),
				block_height_gauge: meter.u64_gauge(METER_GAUGE_BLOCK_HEIGHT).build(),
				breaches_counter: meter.u64_counter(METER_COUNTER_BREACHES).build(),
				rebroadcast_counter: meter.u64_counter(METER_COUNTER_REBROADCAST).build(),
			}),
		})
	}

	pub fn set_appointments(&self, count: usize) {
		if let Some(ref m) = self.inner {
			m.appointments_gauge.record(count as u64, &[]);
		}
	}

	pub fn set_trackers(&self, trackers: usize, unconfirmed: usize) {
		if let Some(ref m) = self.inner {
			m.trackers_gauge.record(trackers as u64, &[]);
			m.unconfirmed_gauge.record(unconfirmed as u64, &[]);
		}
	}

	pub fn set_block_height(&self, component: &'static str, block_height: BlockHeight) {
		if let Some(ref m) = self.inner {
			m.block_height_gauge.record(block_height as u64, &[
				KeyValue::new(ATTRIBUTE_COMPONENT, component),
			]);
		}
	}

	pub fn add_breaches(&self, count: usize) {
		if let Some(ref m) = self.inner {
			m.breaches_counter.add(count as u64, &[]);
		}
	}

	pub fn add_rebroadcasts(&self, count: usize) {
		if let Some(ref m) = self.inner {
			m.rebroadcast_counter.add(count as u64, &[]);
		}
	}
}
