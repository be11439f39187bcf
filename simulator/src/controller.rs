//! Simulation controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use trellis_accounts::{AccountManager, AccountingConfig, CreateAccountRequest};
use trellis_common::{AccountId, Amount, AssetCode};
use trellis_ledger::{BalanceStore, MemoryLedger};

use crate::metrics::SimulationMetrics;
use crate::peer::{PeerFactory, SimulatedPeer};
use crate::scenario::{Scenario, ScenarioStep};

/// Opening balance deposited into every generated peer account.
const INITIAL_PEER_BALANCE: Amount = 100_000_000;

/// Upper bound for payment amounts in continuous mode.
const MAX_PAYMENT_AMOUNT: Amount = 100_000;

/// Controls the simulation.
pub struct SimulationController {
    /// The account layer under test.
    manager: Arc<AccountManager>,
    /// The backing ledger, kept for the expiry sweeper.
    ledger: Arc<MemoryLedger>,
    /// Number of peers.
    peer_count: usize,
    /// Simulation speed multiplier.
    speed: f64,
    /// Random number generator.
    rng: Arc<RwLock<StdRng>>,
    /// Simulated peers.
    peers: Arc<RwLock<Vec<SimulatedPeer>>>,
    /// Simulation metrics.
    metrics: Arc<RwLock<SimulationMetrics>>,
    /// Running flag.
    running: Arc<RwLock<bool>>,
}

impl SimulationController {
    /// Create a new simulation controller over a fresh in-memory node.
    pub fn new(peer_count: usize, speed: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let ledger = Arc::new(MemoryLedger::new());
        let store: Arc<dyn BalanceStore> = ledger.clone();
        let manager = Arc::new(AccountManager::new(store, AccountingConfig::from_env()));

        Self {
            manager,
            ledger,
            peer_count,
            speed,
            rng: Arc::new(RwLock::new(rng)),
            peers: Arc::new(RwLock::new(Vec::new())),
            metrics: Arc::new(RwLock::new(SimulationMetrics::new())),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Initialize the simulation.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        info!("Initializing simulation with {} peers", self.peer_count);

        // Sweep lapsed reservations in the background
        let ledger = self.ledger.clone();
        tokio::spawn(async move {
            ledger.run_expiry_loop().await;
        });

        let peers = PeerFactory::create_peers(&self.manager, self.peer_count).await?;

        for peer in &peers {
            self.manager
                .deposit(peer.account, INITIAL_PEER_BALANCE, None)
                .await?;
            info!(
                "Funded peer {} ({}) with {} units",
                peer.name, peer.display_name, INITIAL_PEER_BALANCE
            );
        }

        *self.peers.write().await = peers;

        Ok(())
    }

    /// Run a scenario.
    pub async fn run_scenario(&self, scenario: Scenario) -> anyhow::Result<()> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        *self.running.write().await = true;

        for step in &scenario.steps {
            if !*self.running.read().await {
                break;
            }

            self.execute_step(step).await?;
        }

        *self.running.write().await = false;

        Ok(())
    }

    /// Run in continuous mode.
    pub async fn run(&self, duration: Option<Duration>) -> anyhow::Result<()> {
        info!("Running simulation in continuous mode");

        *self.running.write().await = true;

        // Spawn payment generator
        let manager = self.manager.clone();
        let peers = self.peers.clone();
        let metrics = self.metrics.clone();
        let rng = self.rng.clone();
        let running = self.running.clone();
        let speed = self.speed;

        let handle = tokio::spawn(async move {
            loop {
                if !*running.read().await {
                    break;
                }

                if !random_payment(&manager, &peers, &metrics, &rng, MAX_PAYMENT_AMOUNT).await {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }

                // Wait based on speed
                let delay = Duration::from_millis((1000.0 / speed) as u64);
                tokio::time::sleep(delay).await;
            }
        });

        // Wait for duration or Ctrl+C
        match duration {
            Some(d) => {
                tokio::time::sleep(d).await;
            }
            None => {
                tokio::signal::ctrl_c().await?;
            }
        }

        *self.running.write().await = false;
        handle.await?;

        Ok(())
    }

    /// Execute a single scenario step.
    async fn execute_step(&self, step: &ScenarioStep) -> anyhow::Result<()> {
        match step {
            ScenarioStep::Wait { seconds } => {
                let adjusted = (*seconds as f64 / self.speed) as u64;
                info!("Waiting {} seconds (adjusted: {})", seconds, adjusted);
                tokio::time::sleep(Duration::from_secs(adjusted)).await;
            }
            ScenarioStep::OpenAccount {
                name,
                asset,
                scale,
                super_peer,
            } => {
                info!("Opening account {} ({} scale {})", name, asset, scale);

                let mut request = CreateAccountRequest::new(asset.clone(), *scale);
                if let Some(parent) = super_peer {
                    match self.find_peer_account(parent).await {
                        Some(parent_account) => {
                            request = request.with_super_account(parent_account);
                        }
                        None => {
                            warn!("Parent peer not found: {}", parent);
                            return Ok(());
                        }
                    }
                }

                let account = self.manager.create_account(request).await?;
                let peer = SimulatedPeer::new(name.clone(), name.clone(), account.id);
                self.peers.write().await.push(peer);
            }
            ScenarioStep::Deposit { peer, amount } => {
                info!("Depositing {} units into {}", amount, peer);
                match self.find_peer_account(peer).await {
                    Some(account) => {
                        self.manager.deposit(account, *amount, None).await?;
                    }
                    None => warn!("Peer not found: {}", peer),
                }
            }
            ScenarioStep::Withdraw { peer, amount } => {
                info!("Withdrawing {} units from {}", amount, peer);
                match self.find_peer_account(peer).await {
                    Some(account) => {
                        let withdrawal_id =
                            self.manager.create_withdrawal(account, *amount, None).await?;
                        self.manager
                            .finalize_withdrawal(&withdrawal_id.to_string())
                            .await?;
                    }
                    None => warn!("Peer not found: {}", peer),
                }
            }
            ScenarioStep::SeedLiquidity {
                asset,
                scale,
                amount,
            } => {
                info!("Seeding {} liquidity with {} units", asset, amount);
                let code = AssetCode::new(asset.clone());
                self.manager
                    .deposit_liquidity(&code, *scale, *amount, None)
                    .await?;
            }
            ScenarioStep::SendPayment {
                from_peer,
                to_peer,
                amount,
                destination_amount,
            } => {
                info!(
                    "Sending payment: {} -> {} for {} units",
                    from_peer, to_peer, amount
                );

                let peers = self.peers.read().await;
                let from = peers.iter().find(|peer| peer.name == *from_peer);
                let to = peers.iter().find(|peer| peer.name == *to_peer);

                if let (Some(from), Some(to)) = (from, to) {
                    let started = Instant::now();
                    match self
                        .manager
                        .transfer(from.account, to.account, *amount, *destination_amount)
                        .await
                    {
                        Ok(transaction) => match transaction.commit().await {
                            Ok(()) => {
                                let latency = started.elapsed().as_millis() as u64;
                                if let Some(id) = transaction.transfer_ids().first() {
                                    from.record_sent(id.to_string()).await;
                                    to.record_received(id.to_string()).await;
                                }
                                self.metrics.write().await.record_success(latency);
                            }
                            Err(error) => {
                                warn!("Payment commit failed: {}", error);
                                self.metrics.write().await.record_failure();
                            }
                        },
                        Err(error) => {
                            warn!("Payment rejected: {}", error);
                            self.metrics.write().await.record_failure();
                        }
                    }
                } else {
                    warn!("Peers not found: {} or {}", from_peer, to_peer);
                }
            }
            ScenarioStep::Burst {
                payments,
                max_amount,
            } => {
                info!("Bursting {} random payments", payments);
                for _ in 0..*payments {
                    random_payment(
                        &self.manager,
                        &self.peers,
                        &self.metrics,
                        &self.rng,
                        *max_amount,
                    )
                    .await;
                }
            }
            ScenarioStep::ExtendCredit {
                peer,
                sub_peer,
                amount,
                auto_apply,
            } => {
                info!(
                    "Extending {} units of credit: {} -> {}",
                    amount, peer, sub_peer
                );
                match (
                    self.find_peer_account(peer).await,
                    self.find_peer_account(sub_peer).await,
                ) {
                    (Some(account), Some(sub_account)) => {
                        self.manager
                            .extend_credit(account, sub_account, *amount, *auto_apply)
                            .await?;
                    }
                    _ => warn!("Peers not found: {} or {}", peer, sub_peer),
                }
            }
            ScenarioStep::UtilizeCredit {
                peer,
                sub_peer,
                amount,
            } => {
                info!(
                    "Utilizing {} units of credit: {} -> {}",
                    amount, peer, sub_peer
                );
                match (
                    self.find_peer_account(peer).await,
                    self.find_peer_account(sub_peer).await,
                ) {
                    (Some(account), Some(sub_account)) => {
                        self.manager
                            .utilize_credit(account, sub_account, *amount)
                            .await?;
                    }
                    _ => warn!("Peers not found: {} or {}", peer, sub_peer),
                }
            }
            ScenarioStep::SettleDebt {
                peer,
                sub_peer,
                amount,
                revolve,
            } => {
                info!(
                    "Settling {} units of debt: {} -> {}",
                    amount, sub_peer, peer
                );
                match (
                    self.find_peer_account(peer).await,
                    self.find_peer_account(sub_peer).await,
                ) {
                    (Some(account), Some(sub_account)) => {
                        self.manager
                            .settle_debt(account, sub_account, *amount, *revolve)
                            .await?;
                    }
                    _ => warn!("Peers not found: {} or {}", peer, sub_peer),
                }
            }
            ScenarioStep::AssertBalance { peer, amount } => {
                match self.find_peer_account(peer).await {
                    Some(account) => {
                        let snapshot = self.manager.get_account_balance(account).await?;
                        if snapshot.balance != *amount {
                            anyhow::bail!(
                                "Balance assertion failed for {}: expected {}, found {}",
                                peer,
                                amount,
                                snapshot.balance
                            );
                        }
                        info!("Balance assertion held for {}: {} units", peer, amount);
                    }
                    None => warn!("Peer not found: {}", peer),
                }
            }
        }

        Ok(())
    }

    /// Log per-peer activity and closing balances.
    pub async fn log_peer_activity(&self) {
        let peers = self.peers.read().await;
        for peer in peers.iter() {
            match self.manager.get_account_balance(peer.account).await {
                Ok(snapshot) => info!(
                    "Peer {}: sent {}, received {}, balance {}",
                    peer.name,
                    peer.sent_count().await,
                    peer.received_count().await,
                    snapshot.balance
                ),
                Err(error) => warn!("Could not read balance for {}: {}", peer.name, error),
            }
        }
    }

    /// Get simulation metrics.
    pub fn get_metrics(&self) -> SimulationMetrics {
        // Block on async read
        futures::executor::block_on(async { self.metrics.read().await.clone() })
    }

    /// Stop the simulation.
    #[allow(dead_code)]
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    /// Resolve a peer name to its account id.
    async fn find_peer_account(&self, name: &str) -> Option<AccountId> {
        let peers = self.peers.read().await;
        peers
            .iter()
            .find(|peer| peer.name == name)
            .map(|peer| peer.account)
    }
}

/// Pick two distinct peers and push one payment between them.
///
/// Returns `false` when fewer than two peers exist.
async fn random_payment(
    manager: &AccountManager,
    peers: &RwLock<Vec<SimulatedPeer>>,
    metrics: &RwLock<SimulationMetrics>,
    rng: &RwLock<StdRng>,
    max_amount: Amount,
) -> bool {
    let peers_guard = peers.read().await;
    if peers_guard.len() < 2 {
        return false;
    }

    let (from_idx, to_idx) = {
        let mut rng_guard = rng.write().await;
        let from = rng_guard.gen_range(0..peers_guard.len());
        let mut to = rng_guard.gen_range(0..peers_guard.len());
        while to == from {
            to = rng_guard.gen_range(0..peers_guard.len());
        }
        (from, to)
    };

    let amount = {
        let mut rng_guard = rng.write().await;
        rng_guard.gen_range(1..max_amount.max(2))
    };

    let from_peer = &peers_guard[from_idx];
    let to_peer = &peers_guard[to_idx];

    info!(
        "Generating payment: {} -> {} for {} units",
        from_peer.name, to_peer.name, amount
    );

    let started = Instant::now();
    match manager
        .transfer(from_peer.account, to_peer.account, amount, None)
        .await
    {
        Ok(transaction) => match transaction.commit().await {
            Ok(()) => {
                let latency = started.elapsed().as_millis() as u64;
                if let Some(id) = transaction.transfer_ids().first() {
                    from_peer.record_sent(id.to_string()).await;
                    to_peer.record_received(id.to_string()).await;
                }
                metrics.write().await.record_success(latency);
            }
            Err(error) => {
                debug!("Payment commit failed: {}", error);
                metrics.write().await.record_failure();
            }
        },
        Err(error) => {
            debug!("Payment rejected: {}", error);
            metrics.write().await.record_failure();
        }
    }

    true
}
