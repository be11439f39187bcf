//! Simulated network peer.

use std::sync::Arc;

use tokio::sync::RwLock;

use trellis_accounts::{AccountManager, CreateAccountRequest};
use trellis_common::AccountId;

/// A simulated peer holding a real account on the node.
pub struct SimulatedPeer {
    /// Short peer identifier used by scenarios.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// The account backing this peer.
    pub account: AccountId,
    /// Payment history.
    payments_sent: Arc<RwLock<Vec<String>>>,
    payments_received: Arc<RwLock<Vec<String>>>,
}

impl SimulatedPeer {
    /// Create a new simulated peer over an existing account.
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        account: AccountId,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            account,
            payments_sent: Arc::new(RwLock::new(Vec::new())),
            payments_received: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Record a sent payment.
    pub async fn record_sent(&self, transfer_id: String) {
        self.payments_sent.write().await.push(transfer_id);
    }

    /// Record a received payment.
    pub async fn record_received(&self, transfer_id: String) {
        self.payments_received.write().await.push(transfer_id);
    }

    /// Get count of sent payments.
    pub async fn sent_count(&self) -> usize {
        self.payments_sent.read().await.len()
    }

    /// Get count of received payments.
    pub async fn received_count(&self) -> usize {
        self.payments_received.read().await.len()
    }
}

/// Peer factory for creating test peers.
pub struct PeerFactory;

impl PeerFactory {
    /// Create N simulated peers, each backed by a fresh USD account.
    pub async fn create_peers(
        manager: &AccountManager,
        count: usize,
    ) -> anyhow::Result<Vec<SimulatedPeer>> {
        let peer_names = [
            ("PEER_A", "Aurora Payments"),
            ("PEER_B", "Borealis Exchange"),
            ("PEER_C", "Cascade Clearing"),
            ("PEER_D", "Drift Capital"),
            ("PEER_E", "Ember Remit"),
            ("PEER_F", "Fjord Transfer"),
            ("PEER_G", "Granite Settlement"),
            ("PEER_H", "Harbor Payments"),
            ("PEER_I", "Inlet Financial"),
            ("PEER_J", "Junction Pay"),
        ];

        let mut peers = Vec::with_capacity(count);
        for i in 0..count {
            let (name, display_name) = if i < peer_names.len() {
                let (name, display_name) = peer_names[i];
                (name.to_string(), display_name.to_string())
            } else {
                // Generate names for peers beyond the predefined list
                (format!("PEER_{}", i + 1), format!("Peer {}", i + 1))
            };

            let account = manager
                .create_account(CreateAccountRequest::new("USD", 2))
                .await?;
            peers.push(SimulatedPeer::new(name, display_name, account.id));
        }

        Ok(peers)
    }
}
