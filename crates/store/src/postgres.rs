use std::time::Duration;

use async_trait::async_trait;
use common::{CouponId, Credits, ProductId, TransactionId, UserCouponId, UserId};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgExecutor, PgPool, Row};
use uuid::Uuid;

use crate::ledger::ensure_valid_amount;
use crate::{
    CatalogStore, CommittedSettlement, Coupon, CouponStore, DeliveryInfo, LedgerStore,
    ParticipantRole, Product, ProductStatus, Result, StoreError, Transaction, TransactionLog,
    TransactionQuery, TransactionStatus, UnitOfWork, User, UserCoupon,
};

const PRODUCT_COLUMNS: &str = "id, seller_id, title, price, status, buyer_id, sold_at";
const COUPON_COLUMNS: &str =
    "id, code, name, coupon_type, value, min_order_amount, expires_at, is_active";
const USER_COUPON_COLUMNS: &str = "id, user_id, coupon_id, is_used, used_at";
const TRANSACTION_COLUMNS: &str = "id, buyer_id, seller_id, product_id, product_price, \
     delivery_fee, discount, amount, applied_coupon_id, delivery_type, delivery_info, status, \
     created_at, updated_at";

/// PostgreSQL-backed implementation of every settlement store.
///
/// Contended writes are single conditional `UPDATE ... RETURNING`
/// statements, so the row lock taken by the update is the serialization point.
/// [`UnitOfWork::commit_settlement`] runs the same statements inside one
/// database transaction.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store from an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Closes every pooled connection. The store is unusable afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_user(row: PgRow) -> Result<User> {
        let role: String = row.try_get("role")?;
        Ok(User {
            id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
            credit_balance: Credits::new(row.try_get("credit_balance")?),
            role: role.parse()?,
        })
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let status: String = row.try_get("status")?;
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
            title: row.try_get("title")?,
            price: Credits::new(row.try_get("price")?),
            status: status.parse()?,
            buyer_id: row
                .try_get::<Option<Uuid>, _>("buyer_id")?
                .map(UserId::from_uuid),
            sold_at: row.try_get("sold_at")?,
        })
    }

    fn row_to_coupon(row: PgRow) -> Result<Coupon> {
        let coupon_type: String = row.try_get("coupon_type")?;
        Ok(Coupon {
            id: CouponId::from_uuid(row.try_get::<Uuid, _>("id")?),
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            coupon_type: coupon_type.parse()?,
            value: row.try_get("value")?,
            min_order_amount: Credits::new(row.try_get("min_order_amount")?),
            expires_at: row.try_get("expires_at")?,
            is_active: row.try_get("is_active")?,
        })
    }

    fn row_to_user_coupon(row: PgRow) -> Result<UserCoupon> {
        Ok(UserCoupon {
            id: UserCouponId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            coupon_id: CouponId::from_uuid(row.try_get::<Uuid, _>("coupon_id")?),
            is_used: row.try_get("is_used")?,
            used_at: row.try_get("used_at")?,
        })
    }

    fn row_to_transaction(row: PgRow) -> Result<Transaction> {
        let delivery_type: String = row.try_get("delivery_type")?;
        let status: String = row.try_get("status")?;
        let delivery_info: serde_json::Value = row.try_get("delivery_info")?;
        let delivery_info: DeliveryInfo = serde_json::from_value(delivery_info)?;

        Ok(Transaction {
            id: TransactionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            buyer_id: UserId::from_uuid(row.try_get::<Uuid, _>("buyer_id")?),
            seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            product_price: Credits::new(row.try_get("product_price")?),
            delivery_fee: Credits::new(row.try_get("delivery_fee")?),
            discount: Credits::new(row.try_get("discount")?),
            amount: Credits::new(row.try_get("amount")?),
            applied_coupon_id: row
                .try_get::<Option<Uuid>, _>("applied_coupon_id")?
                .map(UserCouponId::from_uuid),
            delivery_type: delivery_type.parse()?,
            delivery_info,
            status: status.parse()?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn product_exists(&self, product_id: ProductId) -> Result<bool> {
        let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1")
            .bind(product_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn get_user(&self, user_id: UserId) -> Result<User> {
        let row = sqlx::query("SELECT id, credit_balance, role FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_user(row),
            None => Err(StoreError::not_found("User", user_id)),
        }
    }

    async fn debit(&self, user_id: UserId, amount: Credits) -> Result<Credits> {
        ensure_valid_amount(amount)?;

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET credit_balance = credit_balance - $2
            WHERE id = $1 AND credit_balance >= $2
            RETURNING credit_balance
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(amount.units())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(balance) = updated {
            return Ok(Credits::new(balance));
        }

        // The conditional update matched nothing: either unknown user or short balance.
        let balance = self.get_balance(user_id).await?;
        Err(StoreError::InsufficientFunds {
            user_id,
            balance,
            requested: amount,
        })
    }

    async fn credit(&self, user_id: UserId, amount: Credits) -> Result<Credits> {
        ensure_valid_amount(amount)?;

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET credit_balance = credit_balance + $2
            WHERE id = $1
            RETURNING credit_balance
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(amount.units())
        .fetch_optional(&self.pool)
        .await?;

        updated
            .map(Credits::new)
            .ok_or_else(|| StoreError::not_found("User", user_id))
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn get_product(&self, product_id: ProductId) -> Result<Product> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_product(row),
            None => Err(StoreError::not_found("Product", product_id)),
        }
    }

    async fn mark_sold(
        &self,
        product_id: ProductId,
        buyer_id: UserId,
        expected: ProductStatus,
    ) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET status = 'sold', buyer_id = $2, sold_at = now()
            WHERE id = $1 AND status = $3 AND status = 'available'
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product_id.as_uuid())
        .bind(buyer_id.as_uuid())
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_product(row),
            None if self.product_exists(product_id).await? => {
                Err(StoreError::AlreadySold(product_id))
            }
            None => Err(StoreError::not_found("Product", product_id)),
        }
    }

    async fn revert_to_available(&self, product_id: ProductId, buyer_id: UserId) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET status = 'available', buyer_id = NULL, sold_at = NULL
            WHERE id = $1 AND status = 'sold' AND buyer_id = $2
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product_id.as_uuid())
        .bind(buyer_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_product(row),
            None if self.product_exists(product_id).await? => Err(StoreError::NotSoldTo {
                product_id,
                buyer_id,
            }),
            None => Err(StoreError::not_found("Product", product_id)),
        }
    }
}

#[async_trait]
impl CouponStore for PostgresStore {
    async fn get_coupon(&self, code: &str) -> Result<Coupon> {
        let row = sqlx::query(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_coupon(row),
            None => Err(StoreError::not_found("Coupon", code)),
        }
    }

    async fn get_coupon_by_id(&self, coupon_id: CouponId) -> Result<Coupon> {
        let row = sqlx::query(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1"
        ))
        .bind(coupon_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_coupon(row),
            None => Err(StoreError::not_found("Coupon", coupon_id)),
        }
    }

    async fn get_user_coupon(&self, user_id: UserId, coupon_id: CouponId) -> Result<UserCoupon> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COUPON_COLUMNS} FROM user_coupons WHERE user_id = $1 AND coupon_id = $2"
        ))
        .bind(user_id.as_uuid())
        .bind(coupon_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_user_coupon(row),
            None => Err(StoreError::not_found(
                "UserCoupon",
                format!("{user_id}/{coupon_id}"),
            )),
        }
    }

    async fn get_user_coupon_by_id(&self, user_coupon_id: UserCouponId) -> Result<UserCoupon> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COUPON_COLUMNS} FROM user_coupons WHERE id = $1"
        ))
        .bind(user_coupon_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_user_coupon(row),
            None => Err(StoreError::not_found("UserCoupon", user_coupon_id)),
        }
    }

    async fn redeem(&self, user_coupon_id: UserCouponId) -> Result<UserCoupon> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE user_coupons
            SET is_used = TRUE, used_at = now()
            WHERE id = $1 AND is_used = FALSE
            RETURNING {USER_COUPON_COLUMNS}
            "#
        ))
        .bind(user_coupon_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_user_coupon(row),
            None => {
                // Distinguish "already used" from "never issued".
                self.get_user_coupon_by_id(user_coupon_id).await?;
                Err(StoreError::CouponAlreadyUsed(user_coupon_id))
            }
        }
    }
}

#[async_trait]
impl TransactionLog for PostgresStore {
    async fn append(&self, transaction: Transaction) -> Result<Transaction> {
        insert_transaction(&self.pool, &transaction).await?;
        Ok(transaction)
    }

    async fn get_transaction(&self, transaction_id: TransactionId) -> Result<Transaction> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(transaction_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_transaction(row),
            None => Err(StoreError::not_found("Transaction", transaction_id)),
        }
    }

    async fn list_for_participant(&self, query: TransactionQuery) -> Result<Vec<Transaction>> {
        let filter = match query.role {
            Some(ParticipantRole::Buyer) => "buyer_id = $1",
            Some(ParticipantRole::Seller) => "seller_id = $1",
            None => "(buyer_id = $1 OR seller_id = $1)",
        };

        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE {filter}
            ORDER BY created_at DESC, seq DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(query.participant.as_uuid())
        .bind(query.effective_limit() as i64)
        .bind(query.effective_offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }

    async fn update_status(
        &self,
        transaction_id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> Result<Transaction> {
        if !expected.can_transition_to(next) {
            return Err(StoreError::InvalidStatusTransition {
                transaction_id,
                from: expected.to_string(),
                to: next.to_string(),
            });
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE transactions
            SET status = $3, updated_at = now()
            WHERE id = $1 AND status = $2
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(transaction_id.as_uuid())
        .bind(expected.as_str())
        .bind(next.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_transaction(row),
            None => {
                let current = self.get_transaction(transaction_id).await?;
                Err(StoreError::InvalidStatusTransition {
                    transaction_id,
                    from: current.status.to_string(),
                    to: next.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl UnitOfWork for PostgresStore {
    async fn commit_settlement(&self, transaction: Transaction) -> Result<CommittedSettlement> {
        ensure_valid_amount(transaction.amount)?;
        ensure_valid_amount(transaction.product_price)?;

        let mut tx = self.pool.begin().await?;

        // Row locks are taken product first, then users in id order
        let sold: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET status = 'sold', buyer_id = $2, sold_at = now()
            WHERE id = $1 AND status = 'available'
            RETURNING id
            "#,
        )
        .bind(transaction.product_id.as_uuid())
        .bind(transaction.buyer_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        if sold.is_none() {
            let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1")
                .bind(transaction.product_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => StoreError::AlreadySold(transaction.product_id),
                None => StoreError::not_found("Product", transaction.product_id),
            });
        }

        let (buyer_balance, seller_balance) =
            if transaction.buyer_id.as_uuid() <= transaction.seller_id.as_uuid() {
                let buyer = debit_in(&mut *tx, transaction.buyer_id, transaction.amount).await?;
                let seller =
                    credit_in(&mut *tx, transaction.seller_id, transaction.product_price).await?;
                (buyer, seller)
            } else {
                let seller =
                    credit_in(&mut *tx, transaction.seller_id, transaction.product_price).await?;
                let buyer = debit_in(&mut *tx, transaction.buyer_id, transaction.amount).await?;
                (buyer, seller)
            };
        // Same row: the credit ran last
        let buyer_balance = if transaction.buyer_id == transaction.seller_id {
            seller_balance
        } else {
            buyer_balance
        };

        let coupon_redeemed = match transaction.applied_coupon_id {
            Some(user_coupon_id) => {
                let used: Option<bool> =
                    sqlx::query_scalar("SELECT is_used FROM user_coupons WHERE id = $1 FOR UPDATE")
                        .bind(user_coupon_id.as_uuid())
                        .fetch_optional(&mut *tx)
                        .await?;
                match used {
                    None => return Err(StoreError::not_found("UserCoupon", user_coupon_id)),
                    Some(true) => false,
                    Some(false) => {
                        sqlx::query(
                            "UPDATE user_coupons SET is_used = TRUE, used_at = now() WHERE id = $1",
                        )
                        .bind(user_coupon_id.as_uuid())
                        .execute(&mut *tx)
                        .await?;
                        true
                    }
                }
            }
            None => false,
        };

        insert_transaction(&mut *tx, &transaction).await?;

        tx.commit().await?;

        Ok(CommittedSettlement {
            transaction,
            buyer_balance,
            seller_balance,
            coupon_redeemed,
        })
    }
}

async fn debit_in(
    conn: &mut sqlx::PgConnection,
    user_id: UserId,
    amount: Credits,
) -> Result<Credits> {
    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE users
        SET credit_balance = credit_balance - $2
        WHERE id = $1 AND credit_balance >= $2
        RETURNING credit_balance
        "#,
    )
    .bind(user_id.as_uuid())
    .bind(amount.units())
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(balance) = updated {
        return Ok(Credits::new(balance));
    }

    let balance: Option<i64> = sqlx::query_scalar("SELECT credit_balance FROM users WHERE id = $1")
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;
    match balance {
        Some(balance) => Err(StoreError::InsufficientFunds {
            user_id,
            balance: Credits::new(balance),
            requested: amount,
        }),
        None => Err(StoreError::not_found("User", user_id)),
    }
}

async fn credit_in(
    conn: &mut sqlx::PgConnection,
    user_id: UserId,
    amount: Credits,
) -> Result<Credits> {
    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE users
        SET credit_balance = credit_balance + $2
        WHERE id = $1
        RETURNING credit_balance
        "#,
    )
    .bind(user_id.as_uuid())
    .bind(amount.units())
    .fetch_optional(&mut *conn)
    .await?;

    updated
        .map(Credits::new)
        .ok_or_else(|| StoreError::not_found("User", user_id))
}

async fn insert_transaction<'e, E>(executor: E, transaction: &Transaction) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let delivery_info = serde_json::to_value(&transaction.delivery_info)?;

    sqlx::query(&format!(
        r#"
        INSERT INTO transactions ({TRANSACTION_COLUMNS})
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#
    ))
    .bind(transaction.id.as_uuid())
    .bind(transaction.buyer_id.as_uuid())
    .bind(transaction.seller_id.as_uuid())
    .bind(transaction.product_id.as_uuid())
    .bind(transaction.product_price.units())
    .bind(transaction.delivery_fee.units())
    .bind(transaction.discount.units())
    .bind(transaction.amount.units())
    .bind(transaction.applied_coupon_id.map(|id| id.as_uuid()))
    .bind(transaction.delivery_type.as_str())
    .bind(delivery_info)
    .bind(transaction.status.as_str())
    .bind(transaction.created_at)
    .bind(transaction.updated_at)
    .execute(executor)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            let reason = match db_err.constraint() {
                Some("transactions_pkey") => Some("duplicate transaction id".to_string()),
                Some("transactions_completed_product_key") => Some(format!(
                    "product {} already has a completed transaction",
                    transaction.product_id
                )),
                _ => None,
            };
            if let Some(reason) = reason {
                return StoreError::TransactionConflict {
                    transaction_id: transaction.id,
                    reason,
                };
            }
        }
        StoreError::Database(e)
    })?;

    Ok(())
}
