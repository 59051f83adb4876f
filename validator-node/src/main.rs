//! Supervisor binary (spec §2 "control flow: a supervisor starts A, then
//! B, then D, then E; C runs once on demand"). This binary is ambient
//! wiring, not a sixth protocol component: it owns process startup order,
//! configuration loading, structured logging initialization, and
//! signal-based shutdown, mirroring how the teacher's engine binary
//! sequences component startup.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use multisig::{
	client::ceremony_manager::CeremonyManager, keystore::FileKeyStore, BridgeSchnorr, CryptoScheme, KeyStoreAPI,
	LoopbackBus, MultisigClient, MultisigClientApi, PartyId, WireMessage,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use validator_node::{
	config::{CommandLineOptions, KeystoreBackend, Settings},
	coordinator::SigningCoordinator,
	http, monitor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let opts = CommandLineOptions::parse();
	let settings = Settings::load(opts)?;
	http::register_metrics();

	let my_id = PartyId::new(settings.party_id)
		.ok_or_else(|| anyhow::anyhow!("PARTY_ID must not be zero"))?;

	// --- A: Key Store -----------------------------------------------------
	let mut key_store = open_key_store(&settings)?;
	let existing_key = key_store.list().into_iter().next();
	let group_key = match &existing_key {
		Some(key_id) => {
			let point = key_store.public_key(key_id)?;
			Some((key_id.clone(), BridgeSchnorr::pubkey_from_point(&point)))
		},
		None => {
			warn!("No key share present yet; waiting for POST /api/dkg/start before signing is possible");
			None
		},
	};

	// --- B: Transport Bus ---------------------------------------------------
	// No TLS peer configuration is taken seriously here (mTLS socket
	// plumbing is an explicit thin collaborator, spec §1): every
	// configured party's bus lives in this one process. A real multi-host
	// deployment fills in `multisig::bus::TlsTransport`.
	let all_party_ids: Vec<PartyId> =
		(1..=settings.total_parties).map(|i| PartyId::new(i).expect("1..=N excludes zero")).collect();
	let mut buses = LoopbackBus::network(&all_party_ids);
	let my_bus: Arc<dyn multisig::Bus> = Arc::new(buses.remove(&my_id).expect("my_id is in 1..=N"));
	drop(buses); // other parties' loopback endpoints are idle in this process

	let (ceremony_request_tx, ceremony_request_rx) = mpsc::unbounded_channel();
	let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
	let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

	let ceremony_manager = CeremonyManager::<BridgeSchnorr>::new(my_id, outgoing_tx, 0);
	let ceremony_manager_task = tokio::spawn(ceremony_manager.run(ceremony_request_rx, incoming_rx));

	let client = Arc::new(MultisigClient::new(my_id, key_store, ceremony_request_tx));

	let (dkg_start_tx, mut dkg_start_rx) = mpsc::unbounded_channel::<()>();
	let dkg_client = client.clone();
	let dkg_bus = my_bus.clone();
	let dkg_participants = all_party_ids.iter().copied().collect::<std::collections::BTreeSet<_>>();
	let dkg_threshold = settings.threshold;
	let dkg_total_parties = settings.total_parties;
	let dkg_task = tokio::spawn(async move {
		const DKG_CEREMONY_ID: u64 = 1;
		while dkg_start_rx.recv().await.is_some() {
			info!("DKG ceremony requested via operator API");
			if let Err(e) = dkg_bus
				.broadcast(WireMessage::DkgStart {
					ceremony_id: DKG_CEREMONY_ID,
					threshold: dkg_threshold,
					total_parties: dkg_total_parties,
				})
				.await
			{
				warn!(%e, "failed to announce DKG ceremony to peers");
			}
			match dkg_client.initiate_keygen(DKG_CEREMONY_ID, dkg_participants.clone(), dkg_threshold).await {
				Ok(_public_key) => info!("DKG ceremony completed and key share persisted"),
				Err((_, reason)) => error!(%reason, "DKG ceremony failed"),
			}
		}
	});

	// --- D/E: Chain Event Monitor + Signing Coordinator ---------------------
	// Only runnable once a key share exists; before the first DKG
	// ceremony, the node serves `/health` (unhealthy) and the DKG trigger
	// only.
	let pending_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
	let coordinator_pending: Arc<dyn Fn() -> usize + Send + Sync>;
	let chain_health_snapshot: Arc<dyn Fn() -> Vec<(String, monitor::ChainHealth)> + Send + Sync>;
	let has_key_share = Arc::new(std::sync::atomic::AtomicBool::new(group_key.is_some()));

	let bridge_task;
	let monitor_tasks;
	let timeout_sweep_task;

	if let Some((key_id, group_public_key)) = group_key {
		let threshold_parties = all_party_ids.iter().copied().collect();
		let coordinator = SigningCoordinator::new(
			my_id,
			key_id,
			group_public_key,
			settings.threshold,
			threshold_parties,
			settings.selection_policy.into(),
			settings.heartbeat_window(),
			client.clone(),
			my_bus.clone(),
		);

		bridge_task = Some(tokio::spawn(validator_node::bridge::run_ceremony_bridge(
			my_bus.clone(),
			coordinator.clone(),
			outgoing_rx,
			incoming_tx,
		)));

		let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
		let mut workers = Vec::new();
		for (chain_name, chain_config) in settings.chains.clone() {
			let provider = NoopChainProvider { chain_id: hash_chain_name(&chain_name), depth: chain_config.confirmation_depth };
			let worker = monitor::ChainWorker::new(Box::new(provider), monitor::MIN_DEDUP_CAPACITY);
			workers.push((chain_name, worker.clone()));
			tokio::spawn(worker.run(signal_tx.clone()));
		}
		drop(signal_tx);

		let coordinator_for_signals = coordinator.clone();
		monitor_tasks = Some(tokio::spawn(async move {
			while let Some(event) = signal_rx.recv().await {
				http::SIGNALS_OBSERVED.inc();
				coordinator_for_signals.on_signal_event(event).await;
			}
		}));

		let coordinator_for_sweep = coordinator.clone();
		let pending_for_sweep = pending_count.clone();
		timeout_sweep_task = Some(tokio::spawn(async move {
			let mut tick = tokio::time::interval(Duration::from_secs(1));
			loop {
				tick.tick().await;
				coordinator_for_sweep.expire_timed_out_requests().await;
				let pending = coordinator_for_sweep.pending().await.len();
				pending_for_sweep.store(pending, std::sync::atomic::Ordering::Relaxed);
				http::set_pending_gauge(pending as i64);
			}
		}));

		let pending_for_http = pending_count.clone();
		coordinator_pending = Arc::new(move || pending_for_http.load(std::sync::atomic::Ordering::Relaxed));
		let workers_for_health = workers.clone();
		chain_health_snapshot =
			Arc::new(move || workers_for_health.iter().map(|(name, w)| (name.clone(), w.health_check())).collect());
	} else {
		bridge_task = None;
		monitor_tasks = None;
		timeout_sweep_task = None;
		coordinator_pending = Arc::new(|| 0);
		chain_health_snapshot = Arc::new(Vec::new);
	}

	// --- Operator HTTP surface ----------------------------------------------
	let bind: SocketAddr = settings.http_bind.parse()?;
	let http_state = http::AppState {
		has_key_share,
		pending_count: coordinator_pending,
		chain_status: http::ChainStatusSource(chain_health_snapshot),
		dkg_start: dkg_start_tx,
	};
	let http_task = tokio::spawn(http::serve(bind, http_state));

	info!(party_id = my_id.get(), threshold = settings.threshold, total_parties = settings.total_parties, "Validator node started");

	tokio::select! {
		_ = tokio::signal::ctrl_c() => {
			info!("Shutdown signal received, draining in-flight work");
		}
	}

	// Grace period for in-flight ceremonies/monitor workers to drain
	// (spec §5 shutdown: cancel deadlines, wait up to 5s).
	tokio::time::sleep(Duration::from_secs(5)).await;
	ceremony_manager_task.abort();
	dkg_task.abort();
	http_task.abort();
	if let Some(t) = bridge_task {
		t.abort();
	}
	if let Some(t) = monitor_tasks {
		t.abort();
	}
	if let Some(t) = timeout_sweep_task {
		t.abort();
	}

	Ok(())
}

fn init_tracing() {
	use tracing_subscriber::{fmt, EnvFilter};
	fmt()
		.json()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();
}

fn open_key_store(settings: &Settings) -> anyhow::Result<FileKeyStore<BridgeSchnorr>> {
	match settings.keystore_backend {
		KeystoreBackend::File => {
			let password = std::env::var("KEYSTORE_PASSWORD")
				.map_err(|_| anyhow::anyhow!("KEYSTORE_PASSWORD must be set for the file key store backend"))?;
			FileKeyStore::open(&settings.keystore_path, password.into_bytes())
				.map_err(|e| anyhow::anyhow!("failed to open key store: {e}"))
		},
		KeystoreBackend::Remote => {
			anyhow::bail!(
				"remote key store backend selected but no transport configured; see \
				 multisig::keystore::RemoteKeyStoreTransport for the seam a production deployment fills in"
			)
		},
	}
}

fn hash_chain_name(name: &str) -> u32 {
	use sha2::{Digest, Sha256};
	let digest = Sha256::digest(name.as_bytes());
	u32::from_be_bytes(digest[..4].try_into().unwrap())
}

/// Stand-in [`monitor::ChainProvider`] used when no real chain RPC client
/// is wired in (spec §1 places destination-chain contract tooling out of
/// scope): never produces logs, but exercises the worker's backoff and
/// health-check machinery end to end. A real deployment swaps this for an
/// RPC client per configured chain family.
#[derive(Clone)]
struct NoopChainProvider {
	chain_id: u32,
	depth: u64,
}

#[async_trait::async_trait]
impl monitor::ChainProvider for NoopChainProvider {
	fn chain_id(&self) -> u32 {
		self.chain_id
	}

	fn confirmation_depth(&self) -> u64 {
		self.depth
	}

	async fn poll(&self) -> anyhow::Result<Vec<monitor::RawLog>> {
		tokio::time::sleep(Duration::from_secs(5)).await;
		Ok(Vec::new())
	}
}
