//! 预约完成触发器集成测试

mod common;

use chrono::Utc;
use common::TestEnv;
use loyalty_ledger::{
    AppointmentEvent, AppointmentStatus, AppointmentTrigger, ErrorKind, LedgerStore, SourceType,
};
use loyalty_shared::test_utils::test_tenant_id;
use rust_decimal::Decimal;
use uuid::Uuid;

fn completed(env: &TestEnv, customer_id: Uuid, service_id: Option<Uuid>) -> AppointmentEvent {
    AppointmentEvent {
        event_id: Uuid::new_v4(),
        tenant_id: env.tenant_id,
        customer_id,
        service_id,
        previous_status: AppointmentStatus::InProgress,
        status: AppointmentStatus::Completed,
        occurred_at: Utc::now(),
    }
}

fn trigger(env: &TestEnv) -> AppointmentTrigger {
    AppointmentTrigger::new(env.ledger.clone(), env.shared_store(), &env.config).unwrap()
}

#[tokio::test]
async fn test_completion_awards_price_times_ratio() {
    let env = TestEnv::new();
    let service_id = Uuid::new_v4();
    env.store
        .add_service(service_id, env.tenant_id, Some(Decimal::from(500)));

    let resp = trigger(&env)
        .handle_completed(&completed(&env, env.customer_id, Some(service_id)))
        .await
        .unwrap()
        .unwrap();

    assert!(resp.success);
    assert_eq!(resp.tokens_awarded, 50);

    let balance = env
        .store
        .get_balance(env.program_id, env.customer_id)
        .await
        .unwrap()
        .unwrap();
    let rows = env.store.list_transactions(balance.id, 10).await.unwrap();
    assert_eq!(rows[0].source_type, SourceType::Appointment);
}

#[tokio::test]
async fn test_missing_price_uses_default() {
    let env = TestEnv::new();
    let service_id = Uuid::new_v4();
    env.store.add_service(service_id, env.tenant_id, None);
    let default_price: Decimal = env.config.default_service_price.parse().unwrap();
    let expected = (default_price * Decimal::new(1, 1)).floor();

    let trigger = trigger(&env);
    let with_service = trigger
        .handle_completed(&completed(&env, env.customer_id, Some(service_id)))
        .await
        .unwrap()
        .unwrap();
    let without_service = trigger
        .handle_completed(&completed(&env, env.customer_id, None))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(Decimal::from(with_service.tokens_awarded), expected);
    assert_eq!(Decimal::from(without_service.tokens_awarded), expected);
}

#[tokio::test]
async fn test_award_is_clamped_to_bounds() {
    let env = TestEnv::new();
    let service_id = Uuid::new_v4();
    env.store
        .add_service(service_id, env.tenant_id, Some(Decimal::from(100_000)));

    let resp = trigger(&env)
        .handle_completed(&completed(&env, env.customer_id, Some(service_id)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(resp.tokens_awarded, env.config.trigger_max_tokens);
}

#[tokio::test]
async fn test_same_event_awards_once() {
    let env = TestEnv::new();
    let trigger = trigger(&env);
    let event = completed(&env, env.customer_id, None);

    let first = trigger.handle_completed(&event).await.unwrap().unwrap();
    let replay = trigger.handle_completed(&event).await.unwrap().unwrap();

    assert!(!first.duplicate);
    assert!(replay.duplicate);
    assert_eq!(first.transaction_id, replay.transaction_id);
    assert_eq!(env.balance_of(env.customer_id).await, first.tokens_awarded);
}

#[tokio::test]
async fn test_non_completion_is_ignored() {
    let env = TestEnv::new();
    let mut event = completed(&env, env.customer_id, None);
    event.status = AppointmentStatus::Cancelled;

    assert!(trigger(&env).handle_completed(&event).await.unwrap().is_none());
    assert_eq!(env.balance_of(env.customer_id).await, 0);
}

#[tokio::test]
async fn test_tenant_without_token_program_is_skipped() {
    let env = TestEnv::new();
    let mut event = completed(&env, env.customer_id, None);
    let bare_tenant = test_tenant_id();
    let customer = Uuid::new_v4();
    env.store.add_customer(customer, bare_tenant);
    event.tenant_id = bare_tenant;
    event.customer_id = customer;

    assert!(trigger(&env).handle_completed(&event).await.unwrap().is_none());
}

#[tokio::test]
async fn test_customer_outside_event_tenant_rejected() {
    let env = TestEnv::new();
    let stranger = Uuid::new_v4();
    env.store.add_customer(stranger, test_tenant_id());

    let err = trigger(&env)
        .handle_completed(&completed(&env, stranger, None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessDenied);

    // 对外入口只记录日志
    trigger(&env)
        .on_event_completed(&completed(&env, stranger, None))
        .await;
}

#[tokio::test]
async fn test_earn_then_redeem_last_unit_of_stock() {
    let env = TestEnv::new();
    let service_id = Uuid::new_v4();
    env.store
        .add_service(service_id, env.tenant_id, Some(Decimal::from(500)));
    let reward_id = env.add_reward(50, |r| {
        r.stock_limit = Some(5);
        r.stock_used = 4;
    });
    let other = env.new_customer();

    let trigger = trigger(&env);
    trigger
        .on_event_completed(&completed(&env, env.customer_id, Some(service_id)))
        .await;
    trigger
        .on_event_completed(&completed(&env, other, Some(service_id)))
        .await;
    assert_eq!(env.balance_of(env.customer_id).await, 50);
    assert_eq!(env.balance_of(other).await, 50);

    let first = env
        .ledger
        .redeem_reward(&env.ctx(), env.customer_id, reward_id)
        .await
        .unwrap();
    assert!(first.success);
    assert_eq!(first.new_balance, Some(0));

    let second = env
        .ledger
        .redeem_reward(&env.ctx(), other, reward_id)
        .await
        .unwrap();
    assert!(!second.success);
    assert_eq!(second.error_kind, Some(ErrorKind::StockExhausted));
    assert_eq!(env.balance_of(other).await, 50);
}
