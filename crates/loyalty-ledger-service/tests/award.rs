//! 积分发放集成测试

mod common;

use chrono::Utc;
use common::TestEnv;
use loyalty_ledger::{
    AuthContext, AwardTokensRequest, ErrorKind, LedgerStore, Membership, MembershipPlan,
    MembershipStatus, SourceType, TransactionType,
};
use rust_decimal::Decimal;
use uuid::Uuid;

fn gold_member(env: &TestEnv, customer_id: Uuid, multiplier: Decimal, plan_id: i64) {
    env.store.upsert_plan(MembershipPlan {
        id: plan_id,
        name: format!("plan-{}", plan_id),
        tokens_multiplier: multiplier,
    });
    env.store.add_membership(Membership {
        id: plan_id,
        customer_id,
        program_id: env.program_id,
        plan_id,
        status: MembershipStatus::Active,
        end_date: None,
    });
}

#[tokio::test]
async fn test_first_award_creates_balance() {
    let env = TestEnv::new();

    let resp = env
        .ledger
        .award_tokens(
            &env.ctx(),
            AwardTokensRequest::new(env.program_id, env.customer_id, 25)
                .with_description("到店消费"),
        )
        .await
        .unwrap();

    assert!(resp.success);
    assert_eq!(resp.tokens_awarded, 25);
    assert_eq!(resp.new_balance, Some(25));

    let balance = env
        .store
        .get_balance(env.program_id, env.customer_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.total_earned, 25);
    assert!(balance.is_conserved());

    let rows = env.store.list_transactions(balance.id, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].transaction_type, TransactionType::Earn);
    assert_eq!(rows[0].source_type, SourceType::Manual);
    assert_eq!(rows[0].description, "到店消费");
    assert!(rows[0].expires_at.is_some_and(|at| at > Utc::now()));
}

#[tokio::test]
async fn test_highest_membership_multiplier_wins() {
    let env = TestEnv::new();
    gold_member(&env, env.customer_id, Decimal::new(15, 1), 9001);
    gold_member(&env, env.customer_id, Decimal::new(12, 1), 9002);

    let resp = env
        .ledger
        .award_tokens(
            &env.ctx(),
            AwardTokensRequest::new(env.program_id, env.customer_id, 10),
        )
        .await
        .unwrap();

    assert!(resp.success);
    assert_eq!(resp.tokens_awarded, 15);
}

#[tokio::test]
async fn test_expired_membership_is_ignored() {
    let env = TestEnv::new();
    env.store.upsert_plan(MembershipPlan {
        id: 9100,
        name: "过期会员".to_string(),
        tokens_multiplier: Decimal::from(3),
    });
    env.store.add_membership(Membership {
        id: 9100,
        customer_id: env.customer_id,
        program_id: env.program_id,
        plan_id: 9100,
        status: MembershipStatus::Active,
        end_date: Some(Utc::now().date_naive() - chrono::Duration::days(1)),
    });

    let resp = env
        .ledger
        .award_tokens(
            &env.ctx(),
            AwardTokensRequest::new(env.program_id, env.customer_id, 10),
        )
        .await
        .unwrap();

    assert_eq!(resp.tokens_awarded, 10);
}

#[tokio::test]
async fn test_award_without_expiry_program() {
    let env = TestEnv::with_expiry(None);
    env.award(env.customer_id, 10).await;

    let balance = env
        .store
        .get_balance(env.program_id, env.customer_id)
        .await
        .unwrap()
        .unwrap();
    let rows = env.store.list_transactions(balance.id, 10).await.unwrap();
    assert!(rows[0].expires_at.is_none());
}

#[tokio::test]
async fn test_non_positive_tokens_rejected() {
    let env = TestEnv::new();

    for tokens in [0, -5] {
        let resp = env
            .ledger
            .award_tokens(
                &env.ctx(),
                AwardTokensRequest::new(env.program_id, env.customer_id, tokens),
            )
            .await
            .unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error_kind, Some(ErrorKind::ValidationError));
    }
    assert_eq!(env.balance_of(env.customer_id).await, 0);
}

#[tokio::test]
async fn test_non_earn_type_rejected() {
    let env = TestEnv::new();
    let mut request = AwardTokensRequest::new(env.program_id, env.customer_id, 10);
    request.transaction_type = TransactionType::Redeem;

    let resp = env.ledger.award_tokens(&env.ctx(), request).await.unwrap();

    assert!(!resp.success);
    assert_eq!(resp.error_kind, Some(ErrorKind::ValidationError));
}

#[tokio::test]
async fn test_unknown_program_is_not_found() {
    let env = TestEnv::new();

    let resp = env
        .ledger
        .award_tokens(
            &env.ctx(),
            AwardTokensRequest::new(-1, env.customer_id, 10),
        )
        .await
        .unwrap();

    assert!(!resp.success);
    assert_eq!(resp.error_kind, Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_other_tenant_cannot_award() {
    let env = TestEnv::new();
    let intruder = AuthContext::new(Uuid::new_v4(), "someone-else");

    let resp = env
        .ledger
        .award_tokens(
            &intruder,
            AwardTokensRequest::new(env.program_id, env.customer_id, 10),
        )
        .await
        .unwrap();

    assert!(!resp.success);
    assert_eq!(resp.error_kind, Some(ErrorKind::AccessDenied));
    assert_eq!(env.balance_of(env.customer_id).await, 0);
}

#[tokio::test]
async fn test_customer_from_other_tenant_rejected() {
    let env = TestEnv::new();
    let stranger = Uuid::new_v4();
    env.store.add_customer(stranger, Uuid::new_v4());

    let resp = env
        .ledger
        .award_tokens(
            &env.ctx(),
            AwardTokensRequest::new(env.program_id, stranger, 10),
        )
        .await
        .unwrap();

    assert!(!resp.success);
    assert_eq!(resp.error_kind, Some(ErrorKind::AccessDenied));
    assert!(
        env.store
            .get_balance(env.program_id, stranger)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_balance_overflow_rejected_without_writes() {
    let env = TestEnv::new();
    let huge = i64::MAX / 2 + 1;
    env.award(env.customer_id, huge).await;

    let resp = env
        .ledger
        .award_tokens(
            &env.ctx(),
            AwardTokensRequest::new(env.program_id, env.customer_id, huge),
        )
        .await
        .unwrap();

    assert!(!resp.success);
    assert_eq!(resp.error_kind, Some(ErrorKind::ValidationError));

    let balance = env
        .store
        .get_balance(env.program_id, env.customer_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.current_balance, huge);
    assert_eq!(balance.total_earned, huge);
    assert!(balance.is_conserved());
    let rows = env.store.list_transactions(balance.id, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_award_stats_track_average() {
    let env = TestEnv::new();
    env.award(env.customer_id, 10).await;
    env.award(env.customer_id, 20).await;

    let stats = env.ledger.award_stats(env.program_id);
    assert_eq!(stats.awards, 2);
    assert!((stats.average_tokens - 15.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_reads_are_tenant_scoped() {
    let env = TestEnv::new();
    env.award(env.customer_id, 40).await;

    let balance = env
        .ledger
        .get_balance(&env.ctx(), env.program_id, env.customer_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.current_balance, 40);

    let history = env
        .ledger
        .list_transactions(&env.ctx(), env.program_id, env.customer_id, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);

    let intruder = AuthContext::new(Uuid::new_v4(), "someone-else");
    let err = env
        .ledger
        .get_balance(&intruder, env.program_id, env.customer_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
}
