//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and truncate every table
//! before each test. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{CouponId, Credits, ProductId, TransactionId, UserCouponId, UserId};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    CatalogStore, CouponStore, DeliveryInfo, DeliveryType, LedgerStore, PostgresStore,
    ProductStatus, StoreError, Transaction, TransactionLog, TransactionQuery, TransactionStatus,
    UnitOfWork,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_settlement_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;
    let store = PostgresStore::connect(&info.connection_string, 8, Duration::from_secs(5))
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE transactions, user_coupons, coupons, products, users CASCADE")
        .execute(store.pool())
        .await
        .unwrap();

    store
}

async fn seed_user(store: &PostgresStore, balance: i64) -> UserId {
    let id = UserId::new();
    sqlx::query("INSERT INTO users (id, credit_balance) VALUES ($1, $2)")
        .bind(id.as_uuid())
        .bind(balance)
        .execute(store.pool())
        .await
        .unwrap();
    id
}

async fn seed_product(store: &PostgresStore, seller: UserId, price: i64) -> ProductId {
    let id = ProductId::new();
    sqlx::query("INSERT INTO products (id, seller_id, title, price) VALUES ($1, $2, $3, $4)")
        .bind(id.as_uuid())
        .bind(seller.as_uuid())
        .bind("Mechanical keyboard")
        .bind(price)
        .execute(store.pool())
        .await
        .unwrap();
    id
}

async fn seed_user_coupon(store: &PostgresStore, user: UserId) -> UserCouponId {
    let coupon_id = CouponId::new();
    sqlx::query(
        r#"
        INSERT INTO coupons (id, code, name, coupon_type, value, min_order_amount, expires_at)
        VALUES ($1, $2, 'Spring sale', 'fixed', 3000, 10000, $3)
        "#,
    )
    .bind(coupon_id.as_uuid())
    .bind(format!("SPRING-{}", coupon_id))
    .bind(Utc::now() + chrono::Duration::days(30))
    .execute(store.pool())
    .await
    .unwrap();

    let id = UserCouponId::new();
    sqlx::query("INSERT INTO user_coupons (id, user_id, coupon_id) VALUES ($1, $2, $3)")
        .bind(id.as_uuid())
        .bind(user.as_uuid())
        .bind(coupon_id.as_uuid())
        .execute(store.pool())
        .await
        .unwrap();
    id
}

fn transaction(buyer: UserId, seller: UserId, product: ProductId, amount: i64) -> Transaction {
    let now = Utc::now();
    Transaction {
        id: TransactionId::new(),
        buyer_id: buyer,
        seller_id: seller,
        product_id: product,
        product_price: Credits::new(amount - 3_000),
        delivery_fee: Credits::new(3_000),
        discount: Credits::new(0),
        amount: Credits::new(amount),
        applied_coupon_id: None,
        delivery_type: DeliveryType::Standard,
        delivery_info: DeliveryInfo {
            recipient_name: "Park Seojun".to_string(),
            phone: "010-5555-0101".to_string(),
            zip_code: "48058".to_string(),
            address: "Haeundae-ro 264, Busan".to_string(),
            detail_address: String::new(),
            delivery_request: String::new(),
        },
        status: TransactionStatus::Completed,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn conditional_debit_never_overdraws() {
    let store = get_test_store().await;
    let user = seed_user(&store, 10_000).await;

    let balance = store.debit(user, Credits::new(7_000)).await.unwrap();
    assert_eq!(balance, Credits::new(3_000));

    let err = store.debit(user, Credits::new(5_000)).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientFunds { balance, .. } if balance == Credits::new(3_000)
    ));

    let balance = store.credit(user, Credits::new(2_000)).await.unwrap();
    assert_eq!(balance, Credits::new(5_000));
    assert_eq!(store.get_balance(user).await.unwrap(), Credits::new(5_000));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn concurrent_debits_respect_the_balance() {
    let store = get_test_store().await;
    let user = seed_user(&store, 10_000).await;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.debit(user, Credits::new(3_000)).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(store.get_balance(user).await.unwrap(), Credits::new(1_000));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn debit_of_unknown_user_is_not_found() {
    let store = get_test_store().await;

    let err = store
        .debit(UserId::new(), Credits::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: "User", .. }));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn product_is_sold_at_most_once() {
    let store = get_test_store().await;
    let seller = seed_user(&store, 0).await;
    let first = seed_user(&store, 0).await;
    let second = seed_user(&store, 0).await;
    let product = seed_product(&store, seller, 20_000).await;

    let sold = store
        .mark_sold(product, first, ProductStatus::Available)
        .await
        .unwrap();
    assert_eq!(sold.status, ProductStatus::Sold);
    assert_eq!(sold.buyer_id, Some(first));
    assert!(sold.sold_at.is_some());

    let err = store
        .mark_sold(product, second, ProductStatus::Available)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadySold(id) if id == product));

    let err = store
        .revert_to_available(product, second)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotSoldTo { .. }));

    let reverted = store.revert_to_available(product, first).await.unwrap();
    assert_eq!(reverted.status, ProductStatus::Available);
    assert_eq!(reverted.buyer_id, None);
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn coupon_is_redeemed_once() {
    let store = get_test_store().await;
    let user = seed_user(&store, 0).await;
    let user_coupon = seed_user_coupon(&store, user).await;

    let issued = store.get_user_coupon_by_id(user_coupon).await.unwrap();
    assert!(!issued.is_used);
    let coupon = store.get_coupon_by_id(issued.coupon_id).await.unwrap();
    assert_eq!(
        store.get_coupon(&coupon.code).await.unwrap().id,
        coupon.id
    );
    assert_eq!(
        store.get_user_coupon(user, coupon.id).await.unwrap().id,
        user_coupon
    );

    let redeemed = store.redeem(user_coupon).await.unwrap();
    assert!(redeemed.is_used);
    assert!(redeemed.used_at.is_some());

    let err = store.redeem(user_coupon).await.unwrap_err();
    assert!(matches!(err, StoreError::CouponAlreadyUsed(id) if id == user_coupon));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn append_rejects_a_second_completed_transaction_for_a_product() {
    let store = get_test_store().await;
    let buyer = seed_user(&store, 0).await;
    let seller = seed_user(&store, 0).await;
    let product = seed_product(&store, seller, 20_000).await;

    let first = transaction(buyer, seller, product, 23_000);
    let stored = store.append(first.clone()).await.unwrap();
    assert_eq!(stored.id, first.id);

    let duplicate_id = store.append(first.clone()).await.unwrap_err();
    assert!(matches!(duplicate_id, StoreError::TransactionConflict { .. }));

    let second = transaction(buyer, seller, product, 23_000);
    let err = store.append(second).await.unwrap_err();
    assert!(matches!(err, StoreError::TransactionConflict { .. }));

    let loaded = store.get_transaction(first.id).await.unwrap();
    assert_eq!(loaded.amount, Credits::new(23_000));
    assert_eq!(loaded.delivery_info, first.delivery_info);
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn status_changes_are_conditional() {
    let store = get_test_store().await;
    let buyer = seed_user(&store, 0).await;
    let seller = seed_user(&store, 0).await;
    let product = seed_product(&store, seller, 20_000).await;
    let tx = store
        .append(transaction(buyer, seller, product, 23_000))
        .await
        .unwrap();

    let refunded = store
        .update_status(tx.id, TransactionStatus::Completed, TransactionStatus::Refunded)
        .await
        .unwrap();
    assert_eq!(refunded.status, TransactionStatus::Refunded);
    assert_eq!(refunded.amount, tx.amount);

    let err = store
        .update_status(tx.id, TransactionStatus::Completed, TransactionStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidStatusTransition { .. }));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn listing_is_newest_first_and_filtered_by_role() {
    let store = get_test_store().await;
    let alice = seed_user(&store, 0).await;
    let bob = seed_user(&store, 0).await;

    let mut ids = Vec::new();
    for (buyer, seller) in [(alice, bob), (bob, alice), (alice, bob)] {
        let product = seed_product(&store, seller, 10_000).await;
        let tx = store
            .append(transaction(buyer, seller, product, 13_000))
            .await
            .unwrap();
        ids.push(tx.id);
    }

    let all = store
        .list_for_participant(TransactionQuery::for_participant(alice))
        .await
        .unwrap();
    let listed: Vec<_> = all.iter().map(|tx| tx.id).collect();
    assert_eq!(listed, vec![ids[2], ids[1], ids[0]]);

    let bought = store
        .list_for_participant(TransactionQuery::for_participant(alice).as_buyer())
        .await
        .unwrap();
    assert_eq!(bought.len(), 2);
    assert!(bought.iter().all(|tx| tx.buyer_id == alice));

    let page = store
        .list_for_participant(TransactionQuery::for_participant(alice).limit(1).offset(1))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, ids[1]);
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn commit_settlement_applies_every_write_together() {
    let store = get_test_store().await;
    let buyer = seed_user(&store, 50_000).await;
    let seller = seed_user(&store, 1_000).await;
    let product = seed_product(&store, seller, 20_000).await;
    let user_coupon = seed_user_coupon(&store, buyer).await;

    let mut purchase = transaction(buyer, seller, product, 23_000);
    purchase.applied_coupon_id = Some(user_coupon);
    let committed = store.commit_settlement(purchase.clone()).await.unwrap();

    assert_eq!(committed.buyer_balance, Credits::new(27_000));
    assert_eq!(committed.seller_balance, Credits::new(21_000));
    assert!(committed.coupon_redeemed);
    assert_eq!(store.get_balance(buyer).await.unwrap(), Credits::new(27_000));
    assert_eq!(store.get_balance(seller).await.unwrap(), Credits::new(21_000));
    let sold = store.get_product(product).await.unwrap();
    assert_eq!(sold.status, ProductStatus::Sold);
    assert_eq!(sold.buyer_id, Some(buyer));
    assert!(store.get_user_coupon_by_id(user_coupon).await.unwrap().is_used);
    assert_eq!(store.get_transaction(purchase.id).await.unwrap().amount, purchase.amount);
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn failed_append_rolls_back_the_whole_settlement() {
    let store = get_test_store().await;
    let buyer = seed_user(&store, 50_000).await;
    let seller = seed_user(&store, 1_000).await;
    let product = seed_product(&store, seller, 20_000).await;
    let user_coupon = seed_user_coupon(&store, buyer).await;

    // A completed row for the product makes the final INSERT fail
    store
        .append(transaction(seed_user(&store, 0).await, seller, product, 23_000))
        .await
        .unwrap();

    let mut purchase = transaction(buyer, seller, product, 23_000);
    purchase.applied_coupon_id = Some(user_coupon);
    let err = store.commit_settlement(purchase.clone()).await.unwrap_err();
    assert!(matches!(err, StoreError::TransactionConflict { .. }));

    let unsold = store.get_product(product).await.unwrap();
    assert_eq!(unsold.status, ProductStatus::Available);
    assert_eq!(unsold.buyer_id, None);
    assert_eq!(store.get_balance(buyer).await.unwrap(), Credits::new(50_000));
    assert_eq!(store.get_balance(seller).await.unwrap(), Credits::new(1_000));
    assert!(!store.get_user_coupon_by_id(user_coupon).await.unwrap().is_used);
    assert!(matches!(
        store.get_transaction(purchase.id).await,
        Err(StoreError::NotFound { .. })
    ));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn short_balance_rolls_back_the_reservation() {
    let store = get_test_store().await;
    let buyer = seed_user(&store, 10_000).await;
    let seller = seed_user(&store, 0).await;
    let product = seed_product(&store, seller, 20_000).await;

    let err = store
        .commit_settlement(transaction(buyer, seller, product, 23_000))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientFunds { balance, .. } if balance == Credits::new(10_000)
    ));

    assert!(store.get_product(product).await.unwrap().is_available());
    assert_eq!(store.get_balance(seller).await.unwrap(), Credits::new(0));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn concurrent_settlements_sell_a_product_once() {
    let store = get_test_store().await;
    let seller = seed_user(&store, 0).await;
    let product = seed_product(&store, seller, 20_000).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let buyer = seed_user(&store, 30_000).await;
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .commit_settlement(transaction(buyer, seller, product, 23_000))
                .await
        }));
    }

    let mut sold = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => sold += 1,
            Err(err) => assert!(matches!(err, StoreError::AlreadySold(id) if id == product)),
        }
    }

    assert_eq!(sold, 1);
    assert_eq!(store.get_balance(seller).await.unwrap(), Credits::new(20_000));
}
