//! Simulation scenarios.

use std::path::Path;

use serde::{Deserialize, Serialize};

use trellis_common::Amount;

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Duration in seconds.
    pub duration_secs: u64,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A step in a scenario.
///
/// Amounts are in minor units of the account's asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioStep {
    /// Wait for a duration.
    Wait { seconds: u64 },
    /// Open a fresh account and register it as a peer.
    OpenAccount {
        name: String,
        asset: String,
        scale: u8,
        #[serde(default)]
        super_peer: Option<String>,
    },
    /// Deposit external funds into a peer account.
    Deposit { peer: String, amount: Amount },
    /// Withdraw funds from a peer account and finalize immediately.
    Withdraw { peer: String, amount: Amount },
    /// Seed the liquidity pool of an asset.
    SeedLiquidity {
        asset: String,
        scale: u8,
        amount: Amount,
    },
    /// Send a payment between two peers.
    SendPayment {
        from_peer: String,
        to_peer: String,
        amount: Amount,
        #[serde(default)]
        destination_amount: Option<Amount>,
    },
    /// Fire a burst of random payments between the funded peers.
    Burst { payments: u64, max_amount: Amount },
    /// Extend a credit line from an ancestor down to a sub-account peer.
    ExtendCredit {
        peer: String,
        sub_peer: String,
        amount: Amount,
        auto_apply: bool,
    },
    /// Draw on an extended credit line.
    UtilizeCredit {
        peer: String,
        sub_peer: String,
        amount: Amount,
    },
    /// Repay debt up the chain.
    SettleDebt {
        peer: String,
        sub_peer: String,
        amount: Amount,
        revolve: bool,
    },
    /// Assert the real balance of a peer account.
    AssertBalance { peer: String, amount: Amount },
}

impl Scenario {
    /// Load a built-in scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "simple-transfer" => Ok(Self::simple_transfer()),
            "cross-currency" => Ok(Self::cross_currency()),
            "credit-chain" => Ok(Self::credit_chain()),
            "high-volume" => Ok(Self::high_volume()),
            "funding-limits" => Ok(Self::funding_limits()),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Load a scenario from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let scenario = serde_json::from_str(&text)?;
        Ok(scenario)
    }

    /// Single payment into a fresh account.
    fn simple_transfer() -> Self {
        Self {
            name: "simple-transfer".to_string(),
            description: "One payment from a funded peer into a fresh account".to_string(),
            duration_secs: 5,
            steps: vec![
                ScenarioStep::OpenAccount {
                    name: "MERCHANT".to_string(),
                    asset: "USD".to_string(),
                    scale: 2,
                    super_peer: None,
                },
                ScenarioStep::SendPayment {
                    from_peer: "PEER_A".to_string(),
                    to_peer: "MERCHANT".to_string(),
                    amount: 50_000,
                    destination_amount: None,
                },
                ScenarioStep::Wait { seconds: 1 },
                ScenarioStep::AssertBalance {
                    peer: "MERCHANT".to_string(),
                    amount: 50_000,
                },
            ],
        }
    }

    /// Cross-currency payment through the liquidity pools.
    fn cross_currency() -> Self {
        Self {
            name: "cross-currency".to_string(),
            description: "USD payment delivered in EUR via the liquidity pools".to_string(),
            duration_secs: 10,
            steps: vec![
                ScenarioStep::OpenAccount {
                    name: "PEER_EUR".to_string(),
                    asset: "EUR".to_string(),
                    scale: 2,
                    super_peer: None,
                },
                ScenarioStep::SeedLiquidity {
                    asset: "EUR".to_string(),
                    scale: 2,
                    amount: 5_000_000,
                },
                ScenarioStep::SendPayment {
                    from_peer: "PEER_A".to_string(),
                    to_peer: "PEER_EUR".to_string(),
                    amount: 100_000,
                    destination_amount: Some(92_000),
                },
                ScenarioStep::Wait { seconds: 1 },
                ScenarioStep::AssertBalance {
                    peer: "PEER_EUR".to_string(),
                    amount: 92_000,
                },
            ],
        }
    }

    /// Credit extended down a three-level hierarchy, drawn and repaid.
    fn credit_chain() -> Self {
        Self {
            name: "credit-chain".to_string(),
            description: "Extend, utilize, and settle credit across a treasury chain".to_string(),
            duration_secs: 15,
            steps: vec![
                ScenarioStep::OpenAccount {
                    name: "TREASURY".to_string(),
                    asset: "USD".to_string(),
                    scale: 2,
                    super_peer: None,
                },
                ScenarioStep::OpenAccount {
                    name: "DESK".to_string(),
                    asset: "USD".to_string(),
                    scale: 2,
                    super_peer: Some("TREASURY".to_string()),
                },
                ScenarioStep::OpenAccount {
                    name: "TRADER".to_string(),
                    asset: "USD".to_string(),
                    scale: 2,
                    super_peer: Some("DESK".to_string()),
                },
                ScenarioStep::Deposit {
                    peer: "TREASURY".to_string(),
                    amount: 1_000_000,
                },
                ScenarioStep::ExtendCredit {
                    peer: "TREASURY".to_string(),
                    sub_peer: "TRADER".to_string(),
                    amount: 250_000,
                    auto_apply: false,
                },
                ScenarioStep::UtilizeCredit {
                    peer: "TREASURY".to_string(),
                    sub_peer: "TRADER".to_string(),
                    amount: 100_000,
                },
                ScenarioStep::AssertBalance {
                    peer: "TRADER".to_string(),
                    amount: 100_000,
                },
                ScenarioStep::SettleDebt {
                    peer: "TREASURY".to_string(),
                    sub_peer: "TRADER".to_string(),
                    amount: 40_000,
                    revolve: true,
                },
                ScenarioStep::AssertBalance {
                    peer: "TRADER".to_string(),
                    amount: 60_000,
                },
                ScenarioStep::AssertBalance {
                    peer: "TREASURY".to_string(),
                    amount: 940_000,
                },
            ],
        }
    }

    /// High-volume stress test scenario.
    fn high_volume() -> Self {
        Self {
            name: "high-volume".to_string(),
            description: "Stress test with a burst of random payments".to_string(),
            duration_secs: 35,
            steps: vec![
                ScenarioStep::Burst {
                    payments: 200,
                    max_amount: 50_000,
                },
                ScenarioStep::Wait { seconds: 2 },
            ],
        }
    }

    /// Overdraw rejection and a finalized withdrawal.
    fn funding_limits() -> Self {
        Self {
            name: "funding-limits".to_string(),
            description: "Overdraw attempt is rejected, then a withdrawal clears".to_string(),
            duration_secs: 10,
            steps: vec![
                ScenarioStep::OpenAccount {
                    name: "VENDOR".to_string(),
                    asset: "USD".to_string(),
                    scale: 2,
                    super_peer: None,
                },
                // Exceeds the initial peer funding and must be rejected
                ScenarioStep::SendPayment {
                    from_peer: "PEER_A".to_string(),
                    to_peer: "VENDOR".to_string(),
                    amount: 200_000_000,
                    destination_amount: None,
                },
                ScenarioStep::AssertBalance {
                    peer: "VENDOR".to_string(),
                    amount: 0,
                },
                ScenarioStep::SendPayment {
                    from_peer: "PEER_A".to_string(),
                    to_peer: "VENDOR".to_string(),
                    amount: 25_000,
                    destination_amount: None,
                },
                ScenarioStep::Withdraw {
                    peer: "VENDOR".to_string(),
                    amount: 10_000,
                },
                ScenarioStep::AssertBalance {
                    peer: "VENDOR".to_string(),
                    amount: 15_000,
                },
            ],
        }
    }
}
