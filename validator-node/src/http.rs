//! Operator surface (spec §6, explicitly "boundary only, not core"):
//! `/health`, `/status`, `/metrics` (Prometheus text), and `POST
//! /api/dkg/start`. Grounded on the teacher's `engine/src/metrics.rs`
//! (lazy_static `Registry` + `warp` text-encoder handler) and
//! `engine/src/health.rs` (liveness over HTTP); reimplemented on top of
//! `warp`'s routing combinators instead of a hand-rolled TCP listener,
//! since this repo already depends on `warp` for the rest of the surface.
//!
//! No auth, no TLS termination here — those are explicit non-goals/thin
//! collaborators (spec §1).

use std::{net::SocketAddr, sync::Arc};

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;
use warp::{http::StatusCode, Filter};

use crate::monitor::ChainHealth;

lazy_static! {
	static ref REGISTRY: Registry = Registry::new();
	pub static ref SIGNALS_OBSERVED: IntCounter =
		IntCounter::with_opts(Opts::new("signals_observed_total", "Signal events handed to the signing coordinator"))
			.expect("metric is well-formed");
	pub static ref SIGNATURES_COMPLETED: IntCounter = IntCounter::with_opts(Opts::new(
		"signatures_completed_total",
		"Aggregated signatures successfully emitted"
	))
	.expect("metric is well-formed");
	pub static ref PENDING_REQUESTS: IntGauge =
		IntGauge::with_opts(Opts::new("signing_requests_pending", "Signing requests not yet DONE or FAILED"))
			.expect("metric is well-formed");
}

pub fn register_metrics() {
	REGISTRY.register(Box::new(SIGNALS_OBSERVED.clone())).expect("metric registers once");
	REGISTRY.register(Box::new(SIGNATURES_COMPLETED.clone())).expect("metric registers once");
	REGISTRY.register(Box::new(PENDING_REQUESTS.clone())).expect("metric registers once");
}

fn encode_metrics() -> String {
	let mut buffer = Vec::new();
	let encoder = TextEncoder::new();
	if let Err(error) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
		tracing::error!(%error, "Failed to encode Prometheus metrics");
	}
	String::from_utf8(buffer).unwrap_or_default()
}

#[derive(Clone)]
pub struct ChainStatusSource(pub Arc<dyn Fn() -> Vec<(String, ChainHealth)> + Send + Sync>);

#[derive(Clone)]
pub struct AppState {
	pub has_key_share: Arc<std::sync::atomic::AtomicBool>,
	pub pending_count: Arc<dyn Fn() -> usize + Send + Sync>,
	pub chain_status: ChainStatusSource,
	pub dkg_start: UnboundedSender<()>,
}

#[derive(Serialize)]
struct StatusResponse {
	has_key_share: bool,
	pending_requests: usize,
	chains: Vec<ChainStatusEntry>,
}

#[derive(Serialize)]
struct ChainStatusEntry {
	chain: String,
	healthy: bool,
	latency_ms: u64,
}

#[derive(Serialize)]
struct DkgStartResponse {
	accepted: bool,
}

fn overall_healthy(state: &AppState) -> bool {
	let chains_healthy = (state.chain_status.0)().iter().all(|(_, health)| health.healthy);
	chains_healthy
}

pub async fn serve(bind: SocketAddr, state: AppState) {
	let with_state = warp::any().map(move || state.clone());

	let health = warp::path("health").and(with_state.clone()).map(|state: AppState| {
		if overall_healthy(&state) {
			warp::reply::with_status("ok", StatusCode::OK)
		} else {
			warp::reply::with_status("degraded", StatusCode::SERVICE_UNAVAILABLE)
		}
	});

	let status = warp::path("status").and(with_state.clone()).map(|state: AppState| {
		let chains = (state.chain_status.0)()
			.into_iter()
			.map(|(chain, health)| ChainStatusEntry { chain, healthy: health.healthy, latency_ms: health.latency_ms })
			.collect();
		warp::reply::json(&StatusResponse {
			has_key_share: state.has_key_share.load(std::sync::atomic::Ordering::Relaxed),
			pending_requests: (state.pending_count)(),
			chains,
		})
	});

	let metrics = warp::path("metrics").map(encode_metrics);

	let dkg_start = warp::path!("api" / "dkg" / "start")
		.and(warp::post())
		.and(with_state.clone())
		.map(|state: AppState| {
			let accepted = state.dkg_start.send(()).is_ok();
			warp::reply::json(&DkgStartResponse { accepted })
		});

	let routes = health.or(status).or(metrics).or(dkg_start);

	info!(%bind, "Starting operator HTTP surface");
	warp::serve(routes).run(bind).await;
}

/// Keeps the `signing_requests_pending` gauge in sync; called by the
/// supervisor's periodic sweep rather than computed lazily on scrape, so a
/// slow `/metrics` consumer never blocks ceremony progress.
pub fn set_pending_gauge(value: i64) {
	PENDING_REQUESTS.set(value);
}
