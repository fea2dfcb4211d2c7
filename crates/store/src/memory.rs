use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{CouponId, Credits, ProductId, TransactionId, UserCouponId, UserId};
use tokio::sync::{Mutex, RwLock};

use crate::ledger::ensure_valid_amount;
use crate::transaction::check_status_transition;
use crate::{
    CatalogStore, CommittedSettlement, Coupon, CouponStore, LedgerStore, Product, ProductStatus,
    Result, StoreError, Transaction, TransactionLog, TransactionQuery, TransactionStatus,
    UnitOfWork, User, UserCoupon,
};

/// Store operations that can have faults injected in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    GetUser,
    Debit,
    Credit,
    GetProduct,
    MarkSold,
    RevertToAvailable,
    GetCoupon,
    GetUserCoupon,
    Redeem,
    AppendTransaction,
    GetTransaction,
    ListTransactions,
    UpdateStatus,
    CommitSettlement,
}

#[derive(Debug, Default)]
struct FaultPlan {
    failures: HashMap<StoreOperation, u32>,
    latency: HashMap<StoreOperation, Duration>,
    calls: HashMap<StoreOperation, u32>,
}

/// In-memory implementation of every settlement store, for tests and local runs.
///
/// Each table sits behind its own write lock, so every conditional update
/// checks and writes inside one critical section. Cloning shares the data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    users: Arc<RwLock<HashMap<UserId, User>>>,
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
    coupons: Arc<RwLock<HashMap<CouponId, Coupon>>>,
    user_coupons: Arc<RwLock<HashMap<UserCouponId, UserCoupon>>>,
    transactions: Arc<RwLock<Vec<Transaction>>>,
    faults: Arc<Mutex<FaultPlan>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user (normally done by the registration service).
    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    /// Lists a product (normally done by the seller-facing catalog).
    pub async fn insert_product(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }

    /// Defines a coupon (normally done by promotions).
    pub async fn insert_coupon(&self, coupon: Coupon) {
        self.coupons.write().await.insert(coupon.id, coupon);
    }

    /// Issues a coupon to a user (normally done by the coupon issuance service).
    pub async fn insert_user_coupon(&self, user_coupon: UserCoupon) {
        self.user_coupons
            .write()
            .await
            .insert(user_coupon.id, user_coupon);
    }

    /// Returns the total number of logged transactions.
    pub async fn transaction_count(&self) -> usize {
        self.transactions.read().await.len()
    }

    /// Makes the next `times` calls of `operation` fail with `Unavailable`.
    pub async fn fail_next(&self, operation: StoreOperation, times: u32) {
        self.faults.lock().await.failures.insert(operation, times);
    }

    /// Delays every call of `operation` by `latency`.
    pub async fn set_latency(&self, operation: StoreOperation, latency: Duration) {
        self.faults.lock().await.latency.insert(operation, latency);
    }

    /// Returns how many times `operation` has been called.
    pub async fn call_count(&self, operation: StoreOperation) -> u32 {
        self.faults
            .lock()
            .await
            .calls
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    async fn enter(&self, operation: StoreOperation) -> Result<()> {
        let (latency, fail) = {
            let mut plan = self.faults.lock().await;
            *plan.calls.entry(operation).or_insert(0) += 1;
            let latency = plan.latency.get(&operation).copied();
            let fail = match plan.failures.get_mut(&operation) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            (latency, fail)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(StoreError::Unavailable(format!(
                "injected failure in {operation:?}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn get_user(&self, user_id: UserId) -> Result<User> {
        self.enter(StoreOperation::GetUser).await?;
        self.users
            .read()
            .await
            .get(&user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("User", user_id))
    }

    async fn debit(&self, user_id: UserId, amount: Credits) -> Result<Credits> {
        ensure_valid_amount(amount)?;
        self.enter(StoreOperation::Debit).await?;

        let mut users = self.users.write().await;
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::not_found("User", user_id))?;

        if user.credit_balance < amount {
            return Err(StoreError::InsufficientFunds {
                user_id,
                balance: user.credit_balance,
                requested: amount,
            });
        }
        user.credit_balance -= amount;
        Ok(user.credit_balance)
    }

    async fn credit(&self, user_id: UserId, amount: Credits) -> Result<Credits> {
        ensure_valid_amount(amount)?;
        self.enter(StoreOperation::Credit).await?;

        let mut users = self.users.write().await;
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::not_found("User", user_id))?;

        user.credit_balance = user
            .credit_balance
            .checked_add(amount)
            .ok_or(StoreError::InvalidAmount(amount))?;
        Ok(user.credit_balance)
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn get_product(&self, product_id: ProductId) -> Result<Product> {
        self.enter(StoreOperation::GetProduct).await?;
        self.products
            .read()
            .await
            .get(&product_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Product", product_id))
    }

    async fn mark_sold(
        &self,
        product_id: ProductId,
        buyer_id: UserId,
        expected: ProductStatus,
    ) -> Result<Product> {
        self.enter(StoreOperation::MarkSold).await?;

        let mut products = self.products.write().await;
        let product = products
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::not_found("Product", product_id))?;

        if product.status != expected || product.status == ProductStatus::Sold {
            return Err(StoreError::AlreadySold(product_id));
        }
        product.status = ProductStatus::Sold;
        product.buyer_id = Some(buyer_id);
        product.sold_at = Some(Utc::now());
        Ok(product.clone())
    }

    async fn revert_to_available(&self, product_id: ProductId, buyer_id: UserId) -> Result<Product> {
        self.enter(StoreOperation::RevertToAvailable).await?;

        let mut products = self.products.write().await;
        let product = products
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::not_found("Product", product_id))?;

        if product.status != ProductStatus::Sold || product.buyer_id != Some(buyer_id) {
            return Err(StoreError::NotSoldTo {
                product_id,
                buyer_id,
            });
        }
        product.status = ProductStatus::Available;
        product.buyer_id = None;
        product.sold_at = None;
        Ok(product.clone())
    }
}

#[async_trait]
impl CouponStore for InMemoryStore {
    async fn get_coupon(&self, code: &str) -> Result<Coupon> {
        self.enter(StoreOperation::GetCoupon).await?;
        self.coupons
            .read()
            .await
            .values()
            .find(|c| c.code == code)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Coupon", code))
    }

    async fn get_coupon_by_id(&self, coupon_id: CouponId) -> Result<Coupon> {
        self.enter(StoreOperation::GetCoupon).await?;
        self.coupons
            .read()
            .await
            .get(&coupon_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Coupon", coupon_id))
    }

    async fn get_user_coupon(&self, user_id: UserId, coupon_id: CouponId) -> Result<UserCoupon> {
        self.enter(StoreOperation::GetUserCoupon).await?;
        self.user_coupons
            .read()
            .await
            .values()
            .find(|uc| uc.user_id == user_id && uc.coupon_id == coupon_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("UserCoupon", format!("{user_id}/{coupon_id}")))
    }

    async fn get_user_coupon_by_id(&self, user_coupon_id: UserCouponId) -> Result<UserCoupon> {
        self.enter(StoreOperation::GetUserCoupon).await?;
        self.user_coupons
            .read()
            .await
            .get(&user_coupon_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("UserCoupon", user_coupon_id))
    }

    async fn redeem(&self, user_coupon_id: UserCouponId) -> Result<UserCoupon> {
        self.enter(StoreOperation::Redeem).await?;

        let mut user_coupons = self.user_coupons.write().await;
        let user_coupon = user_coupons
            .get_mut(&user_coupon_id)
            .ok_or_else(|| StoreError::not_found("UserCoupon", user_coupon_id))?;

        if user_coupon.is_used {
            return Err(StoreError::CouponAlreadyUsed(user_coupon_id));
        }
        user_coupon.is_used = true;
        user_coupon.used_at = Some(Utc::now());
        Ok(user_coupon.clone())
    }
}

#[async_trait]
impl TransactionLog for InMemoryStore {
    async fn append(&self, transaction: Transaction) -> Result<Transaction> {
        self.enter(StoreOperation::AppendTransaction).await?;

        let mut log = self.transactions.write().await;
        check_append(&log, &transaction)?;
        log.push(transaction.clone());
        Ok(transaction)
    }

    async fn get_transaction(&self, transaction_id: TransactionId) -> Result<Transaction> {
        self.enter(StoreOperation::GetTransaction).await?;
        self.transactions
            .read()
            .await
            .iter()
            .find(|t| t.id == transaction_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Transaction", transaction_id))
    }

    async fn list_for_participant(&self, query: TransactionQuery) -> Result<Vec<Transaction>> {
        self.enter(StoreOperation::ListTransactions).await?;

        let log = self.transactions.read().await;
        // Newest appended first, so equal timestamps keep append order reversed.
        let mut matching: Vec<_> = log
            .iter()
            .rev()
            .filter(|t| query.matches(t.buyer_id, t.seller_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matching
            .into_iter()
            .skip(query.effective_offset())
            .take(query.effective_limit())
            .collect())
    }

    async fn update_status(
        &self,
        transaction_id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> Result<Transaction> {
        self.enter(StoreOperation::UpdateStatus).await?;

        let mut log = self.transactions.write().await;
        let transaction = log
            .iter_mut()
            .find(|t| t.id == transaction_id)
            .ok_or_else(|| StoreError::not_found("Transaction", transaction_id))?;

        check_status_transition(transaction_id, transaction.status, expected, next)?;
        transaction.status = next;
        transaction.updated_at = Utc::now();
        Ok(transaction.clone())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryStore {
    async fn commit_settlement(&self, transaction: Transaction) -> Result<CommittedSettlement> {
        ensure_valid_amount(transaction.amount)?;
        ensure_valid_amount(transaction.product_price)?;
        self.enter(StoreOperation::CommitSettlement).await?;

        // Fixed order: products, users, user coupons, log
        let mut products = self.products.write().await;
        let mut users = self.users.write().await;
        let mut user_coupons = self.user_coupons.write().await;
        let mut log = self.transactions.write().await;

        let product_id = transaction.product_id;
        let product = products
            .get(&product_id)
            .ok_or_else(|| StoreError::not_found("Product", product_id))?;
        if product.status != ProductStatus::Available {
            return Err(StoreError::AlreadySold(product_id));
        }

        let buyer = users
            .get(&transaction.buyer_id)
            .ok_or_else(|| StoreError::not_found("User", transaction.buyer_id))?;
        if buyer.credit_balance < transaction.amount {
            return Err(StoreError::InsufficientFunds {
                user_id: buyer.id,
                balance: buyer.credit_balance,
                requested: transaction.amount,
            });
        }
        let buyer_balance = buyer.credit_balance - transaction.amount;

        let seller = users
            .get(&transaction.seller_id)
            .ok_or_else(|| StoreError::not_found("User", transaction.seller_id))?;
        let seller_before = if seller.id == buyer.id {
            buyer_balance
        } else {
            seller.credit_balance
        };
        let seller_balance = seller_before
            .checked_add(transaction.product_price)
            .ok_or(StoreError::InvalidAmount(transaction.product_price))?;

        let coupon_redeemed = match transaction.applied_coupon_id {
            Some(user_coupon_id) => {
                let user_coupon = user_coupons
                    .get(&user_coupon_id)
                    .ok_or_else(|| StoreError::not_found("UserCoupon", user_coupon_id))?;
                !user_coupon.is_used
            }
            None => false,
        };

        check_append(&log, &transaction)?;

        // Every check passed; apply all writes under the same locks
        let now = Utc::now();
        if let Some(product) = products.get_mut(&product_id) {
            product.status = ProductStatus::Sold;
            product.buyer_id = Some(transaction.buyer_id);
            product.sold_at = Some(now);
        }
        if let Some(buyer) = users.get_mut(&transaction.buyer_id) {
            buyer.credit_balance = buyer_balance;
        }
        if let Some(seller) = users.get_mut(&transaction.seller_id) {
            seller.credit_balance = seller_balance;
        }
        if coupon_redeemed
            && let Some(user_coupon) = transaction
                .applied_coupon_id
                .and_then(|id| user_coupons.get_mut(&id))
        {
            user_coupon.is_used = true;
            user_coupon.used_at = Some(now);
        }
        log.push(transaction.clone());

        let buyer_balance = if transaction.buyer_id == transaction.seller_id {
            seller_balance
        } else {
            buyer_balance
        };
        Ok(CommittedSettlement {
            transaction,
            buyer_balance,
            seller_balance,
            coupon_redeemed,
        })
    }
}

fn check_append(log: &[Transaction], transaction: &Transaction) -> Result<()> {
    if log.iter().any(|t| t.id == transaction.id) {
        return Err(StoreError::TransactionConflict {
            transaction_id: transaction.id,
            reason: "duplicate transaction id".to_string(),
        });
    }
    if log
        .iter()
        .any(|t| t.product_id == transaction.product_id && t.status == TransactionStatus::Completed)
    {
        return Err(StoreError::TransactionConflict {
            transaction_id: transaction.id,
            reason: format!(
                "product {} already has a completed transaction",
                transaction.product_id
            ),
        });
    }
    Ok(())
}
