// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS: darkpay-core
//
// Accounting invariants that must hold for any interleaving of deposits,
// manual cycles, epochs and withdrawals, at any fraction settings.
//
// Run: cargo test --release -p darkpay-core --test prop_rewards
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use darkpay_core::cycle::{mul_div_floor, withheld_amount};
use darkpay_core::sim::Network;
use darkpay_core::{Amount, BalanceStore, RewardsConfig, Timestamp, CYCLE_UNIT_SECS, NUMERATOR_DENOMINATOR};
use proptest::prelude::*;

const GENESIS: Timestamp = 1_700_000_000;
const TOKEN: &str = "DAI";
const NODES: [&str; 3] = ["dn0", "dn1", "dn2"];

#[derive(Debug, Clone)]
enum Op {
    Deposit(Amount),
    Cycle(u64),
    Epoch(u64),
    Withdraw(usize),
    Community,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u128..=1_000_000_000_000_000_000_000u128).prop_map(Op::Deposit),
        (1u64..=5).prop_map(Op::Cycle),
        (1u64..=2 * CYCLE_UNIT_SECS).prop_map(Op::Epoch),
        (0usize..NODES.len()).prop_map(Op::Withdraw),
        Just(Op::Community),
    ]
}

fn arb_numerator() -> impl Strategy<Value = u64> {
    prop_oneof![
        Just(0u64),
        Just(NUMERATOR_DENOMINATOR),
        0u64..=NUMERATOR_DENOMINATOR,
    ]
}

fn network(withheld: u64, community: u64) -> Network {
    let mut config = RewardsConfig::new("owner", "community");
    config.hourly_withheld_numerator = withheld;
    config.community_fund_numerator = community;
    let mut net = Network::new(config, GENESIS).unwrap();
    net.register_token(TOKEN).unwrap();
    for (i, node) in NODES.iter().enumerate() {
        net.register_node(node, &format!("op{}", i)).unwrap();
    }
    net
}

/// Apply one op; returns the amount deposited.
fn apply(net: &mut Network, op: &Op) -> Result<Amount, TestCaseError> {
    match op {
        Op::Deposit(amount) => {
            net.deposit(TOKEN, *amount).unwrap();
            return Ok(*amount);
        }
        Op::Cycle(hours) => {
            net.advance(hours * CYCLE_UNIT_SECS);
            let res = net.change_cycle();
            prop_assert!(res.is_ok(), "cycle failed: {:?}", res.err());
        }
        Op::Epoch(secs) => {
            net.advance(*secs);
            let res = net.epoch();
            prop_assert!(res.is_ok(), "epoch failed: {:?}", res.err());
        }
        Op::Withdraw(i) => {
            let res = net.withdraw(NODES[*i], TOKEN);
            prop_assert!(res.is_ok(), "withdraw failed: {:?}", res.err());
        }
        Op::Community => {
            let res = net.withdraw_to_community_fund(&[TOKEN.to_string()]);
            prop_assert!(res.is_ok(), "community withdraw failed: {:?}", res.err());
        }
    }
    Ok(0)
}

// ─────────────────────────────────────────────────────────────────
// ARITHMETIC PROPERTIES
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// PROPERTY: mul_div_floor matches exact widened arithmetic where it fits
    #[test]
    fn prop_mul_div_matches_exact(value in 0u128..=u64::MAX as u128, num in 0u64..=NUMERATOR_DENOMINATOR) {
        let exact = value * num as u128 / NUMERATOR_DENOMINATOR as u128;
        prop_assert_eq!(mul_div_floor(value, num, NUMERATOR_DENOMINATOR).unwrap(), exact);
    }

    /// PROPERTY: withheld never exceeds free and shrinks with more elapsed units
    #[test]
    fn prop_withheld_bounded_and_monotonic(
        free in any::<u128>(),
        num in 0u64..=NUMERATOR_DENOMINATOR,
        units in 0u64..50,
    ) {
        let a = withheld_amount(free, num, NUMERATOR_DENOMINATOR, units).unwrap();
        let b = withheld_amount(free, num, NUMERATOR_DENOMINATOR, units + 1).unwrap();
        prop_assert!(a <= free);
        prop_assert!(b <= a);
    }
}

// ─────────────────────────────────────────────────────────────────
// LEDGER PROPERTIES
// ─────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// PROPERTY: paid out + available + committed pools == deposited
    #[test]
    fn prop_conservation(
        ops in prop::collection::vec(arb_op(), 1..40),
        withheld in arb_numerator(),
        community in arb_numerator(),
    ) {
        let mut net = network(withheld, community);
        let mut deposited: Amount = 0;
        for op in &ops {
            deposited += apply(&mut net, op)?;
            let audit = net.rewards.audit(TOKEN);
            prop_assert!(audit.is_ok(), "audit failed: {:?}", audit.err());
        }
        let rewards = &net.rewards;
        let store = rewards.store();
        prop_assert_eq!(
            store.total_paid(TOKEN)
                + store.available_balance(TOKEN)
                + rewards.darknode_pool(TOKEN)
                + rewards.community_pool(TOKEN),
            deposited
        );
    }

    /// PROPERTY: checkpoint timestamps strictly increase, cumulatives never decrease
    #[test]
    fn prop_checkpoints_monotonic(ops in prop::collection::vec(arb_op(), 1..40)) {
        let mut net = network(999_000, 50_000);
        for op in &ops {
            apply(&mut net, op)?;
        }
        let state = net.rewards.state();
        for ledger in [&state.shares, &state.community] {
            if let Some(series) = ledger.series(TOKEN) {
                let points: Vec<_> = series.iter().copied().collect();
                for pair in points.windows(2) {
                    prop_assert!(pair[0].timestamp < pair[1].timestamp);
                    prop_assert!(pair[0].cumulative <= pair[1].cumulative);
                }
            }
        }
    }

    /// PROPERTY: a second withdrawal with no rollover in between pays 0
    #[test]
    fn prop_withdraw_idempotent(ops in prop::collection::vec(arb_op(), 1..40)) {
        let mut net = network(0, 50_000);
        for op in &ops {
            apply(&mut net, op)?;
        }
        for node in NODES {
            net.withdraw(node, TOKEN).unwrap();
            prop_assert_eq!(net.withdraw(node, TOKEN).unwrap(), 0);
            prop_assert_eq!(net.rewards.darknode_balance(node, TOKEN).unwrap(), 0);
        }
        net.withdraw_to_community_fund(&[TOKEN.to_string()]).unwrap();
        // Every node was live for every cycle, so nothing committed is left over.
        prop_assert_eq!(net.rewards.darknode_pool(TOKEN), 0);
        prop_assert_eq!(net.rewards.community_pool(TOKEN), 0);
    }

    /// PROPERTY: nodes with identical registration windows are owed identical amounts
    #[test]
    fn prop_fairness(
        before in prop::collection::vec(arb_op(), 0..20),
        after in prop::collection::vec(arb_op(), 0..20),
        withheld in arb_numerator(),
        settled in any::<bool>(),
    ) {
        let mut net = network(withheld, 50_000);
        net.advance(17);
        net.register_node("twin-a", "op-a").unwrap();
        net.register_node("twin-b", "op-b").unwrap();
        if settled {
            net.advance(1);
            net.epoch().unwrap();
        }
        for op in &before {
            apply(&mut net, op)?;
        }
        net.deregister_node("twin-a").unwrap();
        net.deregister_node("twin-b").unwrap();
        for op in &after {
            apply(&mut net, op)?;
        }
        // Errors name the node, so compare reason codes.
        let a = net.rewards.darknode_balance("twin-a", TOKEN).map_err(|e| e.code());
        let b = net.rewards.darknode_balance("twin-b", TOKEN).map_err(|e| e.code());
        if settled {
            prop_assert!(a.is_ok(), "settled twin not withdrawable: {:?}", a);
        }
        prop_assert_eq!(a, b);
    }

    /// PROPERTY: nothing accrues once a deregistration has taken effect
    #[test]
    fn prop_eligibility_window(
        before in prop::collection::vec(arb_op(), 0..20),
        after in prop::collection::vec(arb_op(), 0..20),
        gap in 1u64..=CYCLE_UNIT_SECS,
    ) {
        let mut net = network(0, 50_000);
        for op in &before {
            apply(&mut net, op)?;
        }
        net.deregister_node("dn0").unwrap();
        net.advance(gap);
        net.epoch().unwrap();
        let settled = net.rewards.darknode_balance("dn0", TOKEN).unwrap();

        // dn0 must not be touched afterwards.
        let after: Vec<Op> = after
            .into_iter()
            .filter(|op| !matches!(op, Op::Withdraw(0)))
            .collect();
        for op in &after {
            apply(&mut net, op)?;
        }
        prop_assert_eq!(net.rewards.darknode_balance("dn0", TOKEN).unwrap(), settled);
    }
}
