//! 余额守恒属性测试
//!
//! 随机的发放、兑换、过期序列之后：
//! - current = earned - spent - expired 且非负
//! - 流水合计等于当前余额
//! - 最新流水的 balance_after 等于当前余额

mod common;

use chrono::{Duration, Utc};
use common::TestEnv;
use loyalty_ledger::LedgerStore;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Award(i64),
    Redeem(usize),
    Expire,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1_i64..200).prop_map(Op::Award),
        3 => (0_usize..3).prop_map(Op::Redeem),
        1 => Just(Op::Expire),
    ]
}

async fn run_and_check(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let env = TestEnv::new();
    let rewards = [
        env.add_reward(25, |_| {}),
        env.add_reward(90, |_| {}),
        env.add_reward(150, |r| r.stock_limit = Some(2)),
    ];

    for op in ops {
        match op {
            Op::Award(tokens) => {
                env.award(env.customer_id, tokens).await;
            }
            Op::Redeem(idx) => {
                let before = env.balance_of(env.customer_id).await;
                let resp = env
                    .ledger
                    .redeem_reward(&env.ctx(), env.customer_id, rewards[idx])
                    .await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                if !resp.success {
                    prop_assert_eq!(env.balance_of(env.customer_id).await, before);
                }
            }
            Op::Expire => {
                env.ledger
                    .expire_tokens_at(Utc::now() + Duration::days(31))
                    .await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
            }
        }

        let Some(balance) = env
            .store
            .get_balance(env.program_id, env.customer_id)
            .await
            .map_err(|e| TestCaseError::fail(e.to_string()))?
        else {
            continue;
        };
        prop_assert!(balance.is_conserved());
        prop_assert!(balance.current_balance >= 0);

        let rows = env
            .store
            .list_transactions(balance.id, i64::MAX)
            .await
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let sum: i64 = rows.iter().map(|t| t.tokens).sum();
        prop_assert_eq!(sum, balance.current_balance);
        prop_assert_eq!(rows[0].balance_after, balance.current_balance);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn balance_is_conserved(ops in prop::collection::vec(op_strategy(), 1..30)) {
        tokio_test::block_on(run_and_check(ops))?;
    }
}
