//! Settlement coordinator for purchases.

use std::sync::Arc;

use chrono::Utc;
use common::{Credits, ProductId, TransactionId, UserCouponId, UserId};
use domain::{CouponQuote, CouponValidationRequest, PriceQuote, PurchaseRequest, check_eligibility};
use store::{
    CatalogStore, CommittedSettlement, CouponStore, DeliveryType, LedgerStore, Product,
    ProductStatus, SettlementStore, StoreError, Transaction, TransactionLog, TransactionQuery,
    TransactionStatus, UnitOfWork,
};
use tokio::time::Instant;

use crate::attempt::SettlementAttempt;
use crate::config::SettlementConfig;
use crate::error::{ReasonCode, Result, SettlementError};
use crate::locks::KeyedLocks;
use crate::receipt::SettlementReceipt;
use crate::reconciliation::{PendingAction, ReconciliationQueue};
use crate::state::SettlementState;
use crate::steps;

/// Largest single top-up accepted by [`SettlementCoordinator::charge`].
pub const MAX_CHARGE_AMOUNT: Credits = Credits::new(1_000_000);

/// Drives a purchase through RESERVE → DEBIT → CREDIT → COUPON_REDEEM → LOG.
///
/// Built with [`SettlementCoordinator::from_store`], every write is handed to
/// the store's [`UnitOfWork`] and applies all at once or not at all.
///
/// Built from separate stores, the steps run one by one. Failures before the
/// debit are compensated and reported. Once the buyer is charged the
/// settlement always completes, deferring any step that stays unavailable to
/// the reconciliation queue.
pub struct SettlementCoordinator<L, C, K, T>
where
    L: LedgerStore,
    C: CatalogStore,
    K: CouponStore,
    T: TransactionLog,
{
    ledger: L,
    catalog: C,
    coupons: K,
    log: T,
    config: SettlementConfig,
    coupon_locks: KeyedLocks<UserCouponId>,
    reconciliation: ReconciliationQueue,
    unit_of_work: Option<Arc<dyn UnitOfWork>>,
}

/// Everything decided before the first write.
struct PreparedPurchase {
    product: Product,
    quote: PriceQuote,
    applied_coupon: Option<UserCouponId>,
    coupon_rejection: Option<ReasonCode>,
}

impl<S> SettlementCoordinator<S, S, S, S>
where
    S: SettlementStore,
{
    /// Creates a coordinator backed by one handle for all four stores.
    ///
    /// Purchases commit through the store's [`UnitOfWork`].
    pub fn from_store(store: S, config: SettlementConfig) -> Self {
        let unit_of_work: Arc<dyn UnitOfWork> = Arc::new(store.clone());
        let mut coordinator =
            Self::with_config(store.clone(), store.clone(), store.clone(), store, config);
        coordinator.unit_of_work = Some(unit_of_work);
        coordinator
    }
}

impl<L, C, K, T> SettlementCoordinator<L, C, K, T>
where
    L: LedgerStore,
    C: CatalogStore,
    K: CouponStore,
    T: TransactionLog,
{
    /// Creates a new coordinator with default configuration.
    pub fn new(ledger: L, catalog: C, coupons: K, log: T) -> Self {
        Self::with_config(ledger, catalog, coupons, log, SettlementConfig::default())
    }

    pub fn with_config(ledger: L, catalog: C, coupons: K, log: T, config: SettlementConfig) -> Self {
        Self {
            ledger,
            catalog,
            coupons,
            log,
            config,
            coupon_locks: KeyedLocks::new(),
            reconciliation: ReconciliationQueue::new(),
            unit_of_work: None,
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Settles a purchase of `product_id` by `buyer_id`.
    #[tracing::instrument(skip(self, request), fields(%buyer_id, %product_id))]
    pub async fn purchase(
        &self,
        buyer_id: UserId,
        product_id: ProductId,
        request: PurchaseRequest,
    ) -> Result<SettlementReceipt> {
        metrics::counter!("settlement_attempts_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.settle(buyer_id, product_id, request).await;

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("settlement_duration_seconds").record(duration);
        match &result {
            Ok(receipt) => {
                metrics::counter!("settlement_completed_total").increment(1);
                tracing::info!(
                    transaction_id = %receipt.transaction_id,
                    amount = receipt.amount.units(),
                    reconciliation_pending = receipt.reconciliation_pending,
                    duration,
                    "settlement completed"
                );
            }
            Err(err) => {
                metrics::counter!("settlement_failed_total", "reason" => err.code().as_str())
                    .increment(1);
                tracing::warn!(reason = %err.code(), error = %err, duration, "settlement failed");
            }
        }
        result
    }

    async fn settle(
        &self,
        buyer_id: UserId,
        product_id: ProductId,
        request: PurchaseRequest,
    ) -> Result<SettlementReceipt> {
        // 1. Validate input before anything else
        request.validate()?;
        let deadline = Instant::now() + self.config.settlement_timeout;

        // Settlements naming the same coupon run one at a time in this process
        let _coupon_guard = match request.applied_coupon {
            Some(applied) => Some(
                tokio::time::timeout_at(deadline, self.coupon_locks.lock(applied.user_coupon_id))
                    .await
                    .map_err(|_| deadline_exceeded("waiting for coupon"))?,
            ),
            None => None,
        };

        // 2. Read and price, still free of side effects
        let prepared = tokio::time::timeout_at(deadline, self.prepare(buyer_id, product_id, &request))
            .await
            .map_err(|_| deadline_exceeded("pricing"))??;

        if let Some(unit_of_work) = &self.unit_of_work {
            return self
                .commit_atomically(
                    unit_of_work.as_ref(),
                    buyer_id,
                    product_id,
                    request,
                    prepared,
                    deadline,
                )
                .await;
        }

        let mut attempt = SettlementAttempt::new(buyer_id, product_id);

        // 3. RESERVE, never cancelled; the deadline is checked once it returns
        tracing::info!(step = steps::STEP_RESERVE, "settlement step started");
        if let Err(err) = self
            .config
            .retry
            .run("mark_sold", || {
                self.catalog
                    .mark_sold(product_id, buyer_id, ProductStatus::Available)
            })
            .await
        {
            attempt.fail(err.to_string())?;
            return Err(err.into());
        }
        attempt.complete_step(steps::STEP_RESERVE, SettlementState::Reserved)?;

        // 4. DEBIT, started only inside the deadline and never cancelled
        if Instant::now() >= deadline {
            return Err(self
                .abort(&mut attempt, deadline_exceeded(steps::STEP_RESERVE))
                .await);
        }
        tracing::info!(step = steps::STEP_DEBIT, "settlement step started");
        let amount = prepared.quote.amount;
        let buyer_credits = match self
            .config
            .retry
            .run("debit", || self.ledger.debit(buyer_id, amount))
            .await
        {
            Ok(balance) => balance,
            Err(err) => return Err(self.abort(&mut attempt, err.into()).await),
        };
        record(&mut attempt, steps::STEP_DEBIT, SettlementState::Debited);

        // From here on the settlement always completes
        let transaction = completed_transaction(buyer_id, product_id, &prepared, request);
        let transaction_id = transaction.id;
        let seller_id = transaction.seller_id;
        let product_price = transaction.product_price;
        let mut reconciliation_pending = false;

        // 5. CREDIT
        tracing::info!(step = steps::STEP_CREDIT, "settlement step started");
        let seller_credits = match self
            .config
            .retry
            .run("credit", || self.ledger.credit(seller_id, product_price))
            .await
        {
            Ok(balance) => Some(balance),
            Err(err) => {
                tracing::error!(%transaction_id, %seller_id, error = %err, "seller credit failed after debit");
                self.reconciliation
                    .push(PendingAction::SellerCredit {
                        transaction_id,
                        seller_id,
                        amount: product_price,
                    })
                    .await;
                reconciliation_pending = true;
                None
            }
        };
        record(&mut attempt, steps::STEP_CREDIT, SettlementState::Credited);

        // 6. COUPON_REDEEM
        match prepared.applied_coupon {
            Some(user_coupon_id) => {
                tracing::info!(step = steps::STEP_COUPON_REDEEM, "settlement step started");
                match self
                    .config
                    .retry
                    .run("redeem", || self.coupons.redeem(user_coupon_id))
                    .await
                {
                    Ok(_) => record(
                        &mut attempt,
                        steps::STEP_COUPON_REDEEM,
                        SettlementState::CouponRedeemed,
                    ),
                    Err(err) if err.is_transient() => {
                        self.reconciliation
                            .push(PendingAction::CouponRedemption {
                                transaction_id,
                                user_coupon_id,
                            })
                            .await;
                        reconciliation_pending = true;
                        skip(&mut attempt, SettlementState::CouponSkipped);
                    }
                    Err(err) => {
                        tracing::warn!(%user_coupon_id, error = %err, "coupon redemption rejected after pricing");
                        skip(&mut attempt, SettlementState::CouponSkipped);
                    }
                }
            }
            None => skip(&mut attempt, SettlementState::CouponSkipped),
        }

        // 7. LOG
        tracing::info!(step = steps::STEP_LOG, "settlement step started");
        if let Err(err) = self
            .config
            .retry
            .run("append_transaction", || self.log.append(transaction.clone()))
            .await
        {
            tracing::error!(%transaction_id, error = %err, "transaction append failed after debit");
            self.reconciliation
                .push(PendingAction::TransactionAppend {
                    transaction: Box::new(transaction.clone()),
                })
                .await;
            reconciliation_pending = true;
        }
        record(&mut attempt, steps::STEP_LOG, SettlementState::Logged);

        Ok(receipt(
            &transaction,
            buyer_credits,
            seller_credits,
            prepared.coupon_rejection,
            reconciliation_pending,
        ))
    }

    /// Commits every step of a prepared purchase in one store-side unit of work.
    ///
    /// A failed commit leaves nothing to compensate. The commit itself is never
    /// cancelled by the deadline.
    async fn commit_atomically(
        &self,
        unit_of_work: &dyn UnitOfWork,
        buyer_id: UserId,
        product_id: ProductId,
        request: PurchaseRequest,
        prepared: PreparedPurchase,
        deadline: Instant,
    ) -> Result<SettlementReceipt> {
        let mut attempt = SettlementAttempt::new(buyer_id, product_id);
        if Instant::now() >= deadline {
            attempt.fail("deadline exceeded before commit")?;
            return Err(deadline_exceeded("commit"));
        }

        let transaction = completed_transaction(buyer_id, product_id, &prepared, request);
        tracing::info!(transaction_id = %transaction.id, "settlement commit started");
        let committed = match self
            .config
            .retry
            .run("commit_settlement", || {
                unit_of_work.commit_settlement(transaction.clone())
            })
            .await
        {
            Ok(committed) => committed,
            Err(err) => {
                attempt.fail(err.to_string())?;
                return Err(err.into());
            }
        };

        let CommittedSettlement {
            transaction,
            buyer_balance,
            seller_balance,
            coupon_redeemed,
        } = committed;
        record(&mut attempt, steps::STEP_RESERVE, SettlementState::Reserved);
        record(&mut attempt, steps::STEP_DEBIT, SettlementState::Debited);
        record(&mut attempt, steps::STEP_CREDIT, SettlementState::Credited);
        match transaction.applied_coupon_id {
            Some(_) if coupon_redeemed => record(
                &mut attempt,
                steps::STEP_COUPON_REDEEM,
                SettlementState::CouponRedeemed,
            ),
            Some(user_coupon_id) => {
                tracing::warn!(%user_coupon_id, "coupon was used before commit, kept the discount");
                skip(&mut attempt, SettlementState::CouponSkipped);
            }
            None => skip(&mut attempt, SettlementState::CouponSkipped),
        }
        record(&mut attempt, steps::STEP_LOG, SettlementState::Logged);

        Ok(receipt(
            &transaction,
            buyer_balance,
            Some(seller_balance),
            prepared.coupon_rejection,
            false,
        ))
    }

    /// Checks preconditions and computes the price. Performs no writes.
    async fn prepare(
        &self,
        buyer_id: UserId,
        product_id: ProductId,
        request: &PurchaseRequest,
    ) -> Result<PreparedPurchase> {
        let retry = &self.config.retry;

        let product = retry
            .run("get_product", || self.catalog.get_product(product_id))
            .await?;
        if !product.is_available() {
            return Err(SettlementError::AlreadySold(product_id));
        }
        if product.seller_id == buyer_id {
            return Err(SettlementError::SelfPurchase(product_id));
        }

        let buyer = retry
            .run("get_user", || self.ledger.get_user(buyer_id))
            .await?;
        retry
            .run("get_user", || self.ledger.get_user(product.seller_id))
            .await?;

        let (discount, applied_coupon, coupon_rejection) = match request.applied_coupon {
            Some(applied) => {
                match self
                    .quote_user_coupon(
                        buyer_id,
                        applied.user_coupon_id,
                        product.price,
                        request.delivery_type,
                    )
                    .await
                {
                    Ok(quote) => (quote.discount, Some(applied.user_coupon_id), None),
                    Err(err) if err.is_coupon_rejection() => {
                        tracing::warn!(
                            user_coupon_id = %applied.user_coupon_id,
                            reason = %err.code(),
                            error = %err,
                            "ignoring ineligible coupon"
                        );
                        (Credits::zero(), None, Some(err.code()))
                    }
                    Err(err) => return Err(err),
                }
            }
            None => (Credits::zero(), None, None),
        };

        let quote = PriceQuote::new(product.price, request.delivery_type, discount)?;
        if buyer.credit_balance < quote.amount {
            return Err(SettlementError::InsufficientFunds {
                balance: buyer.credit_balance,
                required: quote.amount,
            });
        }

        Ok(PreparedPurchase {
            product,
            quote,
            applied_coupon,
            coupon_rejection,
        })
    }

    async fn quote_user_coupon(
        &self,
        buyer_id: UserId,
        user_coupon_id: UserCouponId,
        product_price: Credits,
        delivery_type: DeliveryType,
    ) -> Result<CouponQuote> {
        let retry = &self.config.retry;
        let user_coupon = retry
            .run("get_user_coupon", || {
                self.coupons.get_user_coupon_by_id(user_coupon_id)
            })
            .await
            .map_err(|err| coupon_lookup_error(err, "coupon does not exist"))?;
        let coupon = retry
            .run("get_coupon", || {
                self.coupons.get_coupon_by_id(user_coupon.coupon_id)
            })
            .await
            .map_err(|err| coupon_lookup_error(err, "coupon does not exist"))?;

        Ok(check_eligibility(
            &coupon,
            &user_coupon,
            buyer_id,
            product_price,
            delivery_type,
            Utc::now(),
        )?)
    }

    /// Fails the attempt, compensates completed steps and hands back `err`.
    async fn abort(&self, attempt: &mut SettlementAttempt, err: SettlementError) -> SettlementError {
        if let Err(invalid) = attempt.fail(err.to_string()) {
            tracing::error!(error = %invalid, "could not mark settlement failed");
        }
        self.compensate(attempt).await;
        err
    }

    /// Runs compensations in reverse order of completed steps.
    #[tracing::instrument(skip(self, attempt), fields(buyer_id = %attempt.buyer_id(), product_id = %attempt.product_id()))]
    async fn compensate(&self, attempt: &SettlementAttempt) {
        metrics::counter!("settlement_compensations_total").increment(1);
        let reason = attempt.failure_reason().unwrap_or("unknown");

        for step in attempt.completed_steps().iter().rev() {
            match *step {
                steps::STEP_RESERVE => {
                    self.release_reservation(attempt.product_id(), attempt.buyer_id())
                        .await
                }
                other => {
                    // Only RESERVE can complete before an abort
                    tracing::error!(step = other, "no compensation for committed step");
                }
            }
        }
        tracing::warn!(reason, "settlement compensated");
    }

    /// Returns a product held by `buyer_id` to sale. A product not held by
    /// the buyer is left untouched.
    async fn release_reservation(&self, product_id: ProductId, buyer_id: UserId) {
        match self
            .config
            .retry
            .run("revert_to_available", || {
                self.catalog.revert_to_available(product_id, buyer_id)
            })
            .await
        {
            Ok(_) => tracing::info!(%product_id, "reservation released"),
            Err(StoreError::NotSoldTo { .. }) => {
                tracing::debug!(%product_id, "no reservation held");
            }
            Err(err) => {
                tracing::error!(%product_id, error = %err, "failed to release reservation");
                self.reconciliation
                    .push(PendingAction::ReleaseReservation {
                        product_id,
                        buyer_id,
                    })
                    .await;
            }
        }
    }

    /// Checks which discount a coupon code would give `buyer_id`.
    #[tracing::instrument(skip(self, request), fields(%buyer_id, coupon_code = %request.coupon_code))]
    pub async fn validate_coupon(
        &self,
        buyer_id: UserId,
        request: CouponValidationRequest,
    ) -> Result<CouponQuote> {
        request.validate()?;
        let retry = &self.config.retry;

        let coupon = retry
            .run("get_coupon", || self.coupons.get_coupon(&request.coupon_code))
            .await
            .map_err(|err| coupon_lookup_error(err, "unknown coupon code"))?;
        let user_coupon = retry
            .run("get_user_coupon", || {
                self.coupons.get_user_coupon(buyer_id, coupon.id)
            })
            .await
            .map_err(|err| coupon_lookup_error(err, "coupon was not issued to this user"))?;

        let quote = check_eligibility(
            &coupon,
            &user_coupon,
            buyer_id,
            request.product_price,
            request.delivery_type,
            Utc::now(),
        )?;
        tracing::debug!(discount = quote.discount.units(), "coupon is eligible");
        Ok(quote)
    }

    /// Returns the current balance of `user_id`.
    pub async fn balance(&self, user_id: UserId) -> Result<Credits> {
        Ok(self
            .config
            .retry
            .run("get_balance", || self.ledger.get_balance(user_id))
            .await?)
    }

    /// Tops up `user_id` by `amount`, returning the new balance.
    #[tracing::instrument(skip(self), fields(%user_id, amount = amount.units()))]
    pub async fn charge(&self, user_id: UserId, amount: Credits) -> Result<Credits> {
        if !amount.is_positive() || amount > MAX_CHARGE_AMOUNT {
            return Err(SettlementError::Validation(format!(
                "charge amount must be between 1 and {}",
                MAX_CHARGE_AMOUNT.units()
            )));
        }
        let balance = self
            .config
            .retry
            .run("credit", || self.ledger.credit(user_id, amount))
            .await?;
        tracing::info!(balance = balance.units(), "credits charged");
        Ok(balance)
    }

    /// Lists transactions matching `query`, newest first.
    pub async fn transactions(&self, query: TransactionQuery) -> Result<Vec<Transaction>> {
        Ok(self
            .config
            .retry
            .run("list_transactions", || {
                self.log.list_for_participant(query.clone())
            })
            .await?)
    }

    /// Fetches a transaction visible to `user_id`.
    ///
    /// Transactions the user did not take part in are reported as not found.
    pub async fn transaction_for(
        &self,
        user_id: UserId,
        transaction_id: TransactionId,
    ) -> Result<Transaction> {
        let transaction = self
            .config
            .retry
            .run("get_transaction", || self.log.get_transaction(transaction_id))
            .await?;
        if transaction.buyer_id != user_id && transaction.seller_id != user_id {
            return Err(SettlementError::NotFound {
                entity: "Transaction",
                id: transaction_id.to_string(),
            });
        }
        Ok(transaction)
    }

    /// Replays every queued action once. Returns how many were resolved;
    /// the rest stay queued.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self) -> usize {
        let pending = self.reconciliation.drain().await;
        let mut resolved = 0;

        for action in pending {
            match self.replay(&action).await {
                Ok(()) => {
                    resolved += 1;
                    tracing::info!(action = action.kind(), "reconciled");
                }
                Err(err) => {
                    tracing::warn!(action = action.kind(), error = %err, "reconciliation still failing");
                    self.reconciliation.requeue(action).await;
                }
            }
        }
        resolved
    }

    /// Lists actions waiting for [`Self::reconcile`].
    pub async fn pending_reconciliation(&self) -> Vec<PendingAction> {
        self.reconciliation.snapshot().await
    }

    async fn replay(&self, action: &PendingAction) -> store::Result<()> {
        match action {
            PendingAction::ReleaseReservation {
                product_id,
                buyer_id,
            } => match self
                .catalog
                .revert_to_available(*product_id, *buyer_id)
                .await
            {
                Ok(_) | Err(StoreError::NotSoldTo { .. }) => Ok(()),
                Err(err) => Err(err),
            },
            PendingAction::SellerCredit {
                seller_id, amount, ..
            } => self.ledger.credit(*seller_id, *amount).await.map(|_| ()),
            PendingAction::CouponRedemption { user_coupon_id, .. } => {
                match self.coupons.redeem(*user_coupon_id).await {
                    Ok(_) | Err(StoreError::CouponAlreadyUsed(_)) => Ok(()),
                    Err(err) => Err(err),
                }
            }
            PendingAction::TransactionAppend { transaction } => {
                match self.log.append((**transaction).clone()).await {
                    Ok(_) => Ok(()),
                    Err(StoreError::TransactionConflict { .. }) => {
                        // Already written by an earlier replay
                        self.log.get_transaction(transaction.id).await.map(|_| ())
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }
}

fn completed_transaction(
    buyer_id: UserId,
    product_id: ProductId,
    prepared: &PreparedPurchase,
    request: PurchaseRequest,
) -> Transaction {
    let now = Utc::now();
    let quote = prepared.quote;
    Transaction {
        id: TransactionId::new(),
        buyer_id,
        seller_id: prepared.product.seller_id,
        product_id,
        product_price: quote.product_price,
        delivery_fee: quote.delivery_fee,
        discount: quote.discount,
        amount: quote.amount,
        applied_coupon_id: prepared.applied_coupon,
        delivery_type: request.delivery_type,
        delivery_info: request.delivery_info,
        status: TransactionStatus::Completed,
        created_at: now,
        updated_at: now,
    }
}

fn receipt(
    transaction: &Transaction,
    buyer_credits: Credits,
    seller_credits: Option<Credits>,
    coupon_rejection: Option<ReasonCode>,
    reconciliation_pending: bool,
) -> SettlementReceipt {
    SettlementReceipt {
        transaction_id: transaction.id,
        product_id: transaction.product_id,
        buyer_id: transaction.buyer_id,
        seller_id: transaction.seller_id,
        amount: transaction.amount,
        product_price: transaction.product_price,
        delivery_fee: transaction.delivery_fee,
        discount: transaction.discount,
        buyer_credits,
        seller_credits,
        applied_user_coupon_id: transaction.applied_coupon_id,
        coupon_rejection,
        reconciliation_pending,
    }
}

fn deadline_exceeded(stage: &str) -> SettlementError {
    SettlementError::ServiceUnavailable(format!("settlement deadline exceeded during {stage}"))
}

fn coupon_lookup_error(err: StoreError, not_found: &str) -> SettlementError {
    match err {
        StoreError::NotFound { .. } => SettlementError::CouponInvalid(not_found.to_string()),
        other => other.into(),
    }
}

/// Advances a committed attempt. Past the debit an illegal transition is
/// logged, never returned.
fn record(attempt: &mut SettlementAttempt, step: &'static str, next: SettlementState) {
    if let Err(err) = attempt.complete_step(step, next) {
        tracing::error!(step, error = %err, "unexpected settlement transition");
    }
}

fn skip(attempt: &mut SettlementAttempt, next: SettlementState) {
    if let Err(err) = attempt.skip_to(next) {
        tracing::error!(error = %err, "unexpected settlement transition");
    }
}
