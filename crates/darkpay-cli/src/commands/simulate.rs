use crate::{print_error, print_info, print_success};
use colored::*;
use darkpay_core::sim::{Network, SimResult};
use darkpay_core::{Amount, InMemoryStore, RewardsConfig, Timestamp, TokenId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

/// Default genesis when a script does not name one (2024-01-01T00:00:00Z).
const DEFAULT_GENESIS: Timestamp = 1_704_067_200;

/// Serde adapter for script amounts: serialize as string, deserialize from
/// string or integer. Amounts above u64::MAX must be written as strings.
mod amount_json {
    use super::*;

    pub fn serialize<S: Serializer>(val: &Amount, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&val.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Amount, D::Error> {
        use serde::de::{self, Visitor};
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("an amount as a string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                v.replace('_', "").parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(v as Amount)
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
                Ok(v)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                if v >= 0 {
                    Ok(v as Amount)
                } else {
                    Err(E::custom("negative amount"))
                }
            }
        }

        d.deserialize_any(AmountVisitor)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Script {
    #[serde(default)]
    pub genesis: Option<Timestamp>,
    /// Balances carried over from the flat-balance scheme.
    #[serde(default)]
    pub legacy: Vec<LegacyBalance>,
    pub actions: Vec<Action>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LegacyBalance {
    pub node: String,
    pub token: TokenId,
    #[serde(with = "amount_json")]
    pub amount: Amount,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Advance { secs: u64 },
    RegisterToken { token: TokenId },
    DeregisterToken { token: TokenId },
    RegisterNode { node: String, operator: String },
    DeregisterNode { node: String },
    RefundNode { node: String },
    Deposit {
        token: TokenId,
        #[serde(with = "amount_json")]
        amount: Amount,
    },
    SendDirect {
        token: TokenId,
        #[serde(with = "amount_json")]
        amount: Amount,
    },
    Forward { token: TokenId },
    Epoch,
    Cycle,
    Withdraw { node: String, token: TokenId },
    WithdrawMultiple { operator: String, nodes: Vec<String>, tokens: Vec<TokenId> },
    WithdrawCommunity { tokens: Vec<TokenId> },
    Balance { node: String, token: TokenId },
    SetWithheld { numerator: u64 },
    SetCommunityNumerator { numerator: u64 },
    SetCommunityFund { address: String },
}

pub fn handle(
    config_path: Option<&Path>,
    script_path: &Path,
    snapshot: Option<&Path>,
    strict: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => RewardsConfig::load_from_file(path)?,
        None => RewardsConfig::load_from_env()?,
    };
    let script: Script = serde_json::from_str(&std::fs::read_to_string(script_path)?)?;
    log::debug!(
        "Loaded {} actions and {} legacy balances from {}",
        script.actions.len(),
        script.legacy.len(),
        script_path.display()
    );

    let mut net = build_network(config, &script)?;
    print_info(&format!(
        "Genesis {} with {} actions",
        net.now(),
        script.actions.len()
    ));
    println!();

    let mut failures = 0usize;
    for (i, action) in script.actions.iter().enumerate() {
        match run_action(&mut net, action) {
            Ok(msg) => print_success(&format!("[{:>3}] {}", i, msg)),
            Err(e) => {
                failures += 1;
                print_error(&format!("[{:>3}] {:?} reverted: {}", i, action, e));
                if strict {
                    return Err(e.into());
                }
            }
        }
    }

    println!();
    println!("{}", "Supply audit".bold());
    for audit in net.audit_all()? {
        println!(
            "  {:<8} available {:>24}  darknodes {:>24}  community {:>24}  legacy {:>16}  total {:>24}",
            audit.token.cyan(),
            audit.available,
            audit.darknode_pool,
            audit.community_pool,
            audit.legacy,
            audit.total
        );
    }
    print_info(&format!("State root: {}", net.rewards.state_root()));
    if failures > 0 {
        print_info(&format!("{} action(s) reverted", failures));
    }

    if let Some(path) = snapshot {
        std::fs::write(path, net.rewards.snapshot_json()?)?;
        print_success(&format!("Snapshot written to {}", path.display()));
    }
    Ok(())
}

pub fn build_network(config: RewardsConfig, script: &Script) -> SimResult<Network> {
    let mut store = InMemoryStore::new();
    for seed in &script.legacy {
        store.seed_legacy_balance(&seed.node, &seed.token, seed.amount)?;
    }
    Network::with_store(config, store, script.genesis.unwrap_or(DEFAULT_GENESIS))
}

pub fn run_action(net: &mut Network, action: &Action) -> SimResult<String> {
    let owner = net.owner();
    let msg = match action {
        Action::Advance { secs } => format!("now = {}", net.advance(*secs)),
        Action::RegisterToken { token } => {
            net.register_token(token)?;
            format!("token {} registered", token)
        }
        Action::DeregisterToken { token } => {
            net.deregister_token(token)?;
            format!("token {} deregistered", token)
        }
        Action::RegisterNode { node, operator } => {
            net.register_node(node, operator)?;
            format!("darknode {} registered by {}", node, operator)
        }
        Action::DeregisterNode { node } => {
            net.deregister_node(node)?;
            format!("darknode {} deregistered", node)
        }
        Action::RefundNode { node } => {
            net.refund_node(node)?;
            format!("darknode {} refunded", node)
        }
        Action::Deposit { token, amount } => {
            net.deposit(token, *amount)?;
            format!("deposited {} {}", amount, token)
        }
        Action::SendDirect { token, amount } => {
            net.rewards.receive_direct(token, *amount)?;
            format!("{} {} sent directly to the ledger", amount, token)
        }
        Action::Forward { token } => {
            let amount = net.rewards.forward(token)?;
            format!("forwarded {} {}", amount, token)
        }
        Action::Epoch => {
            let outcome = net.epoch()?;
            format!(
                "epoch at {} ({} live darknodes, {} tokens)",
                outcome.plan.timestamp,
                outcome.live_darknodes,
                outcome.tokens.len()
            )
        }
        Action::Cycle => {
            let outcome = net.change_cycle()?;
            let shares: Vec<String> = outcome
                .tokens
                .iter()
                .map(|t| format!("{}:{}", t.token, t.share))
                .collect();
            format!(
                "cycle at {} ({} units, shares [{}])",
                outcome.plan.timestamp,
                outcome.plan.units,
                shares.join(", ")
            )
        }
        Action::Withdraw { node, token } => {
            let amount = net.withdraw(node, token)?;
            format!("{} withdrew {} {}", node, amount, token)
        }
        Action::WithdrawMultiple {
            operator,
            nodes,
            tokens,
        } => {
            let paid = net.rewards.withdraw_multiple(operator, nodes, tokens)?;
            let total: Amount = paid.iter().map(|w| w.amount).sum();
            format!("{} withdrew {} across {} pairs", operator, total, paid.len())
        }
        Action::WithdrawCommunity { tokens } => {
            let paid = net.withdraw_to_community_fund(tokens)?;
            let parts: Vec<String> = paid
                .iter()
                .map(|w| format!("{} {}", w.amount, w.token))
                .collect();
            format!("community fund withdrew [{}]", parts.join(", "))
        }
        Action::Balance { node, token } => {
            let amount = net.rewards.darknode_balance(node, token)?;
            format!("{} is owed {} {}", node, amount, token)
        }
        Action::SetWithheld { numerator } => {
            net.rewards.update_hourly_withheld(&owner, *numerator)?;
            format!("withheld numerator = {}", numerator)
        }
        Action::SetCommunityNumerator { numerator } => {
            net.rewards.update_community_fund_numerator(&owner, *numerator)?;
            format!("community fund numerator = {}", numerator)
        }
        Action::SetCommunityFund { address } => {
            net.rewards.update_community_fund(&owner, address)?;
            format!("community fund = {}", address)
        }
    };
    Ok(msg)
}
