use common::UserId;
use serde::{Deserialize, Serialize};

/// Page size used when a query does not set one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page a single query may return.
pub const MAX_PAGE_SIZE: usize = 100;

/// Which side of a transaction the participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Buyer,
    Seller,
}

/// Builder for paginated transaction lookups by participant.
///
/// Results are ordered by creation time, newest first.
#[derive(Debug, Clone)]
pub struct TransactionQuery {
    /// The user whose transactions are listed.
    pub participant: UserId,

    /// Restrict to one side; `None` matches either.
    pub role: Option<ParticipantRole>,

    /// Maximum number of transactions to return.
    pub limit: Option<usize>,

    /// Number of transactions to skip.
    pub offset: Option<usize>,
}

impl TransactionQuery {
    /// Creates a query for every transaction the user took part in.
    pub fn for_participant(participant: UserId) -> Self {
        Self {
            participant,
            role: None,
            limit: None,
            offset: None,
        }
    }

    /// Only transactions where the participant bought.
    pub fn as_buyer(mut self) -> Self {
        self.role = Some(ParticipantRole::Buyer);
        self
    }

    /// Only transactions where the participant sold.
    pub fn as_seller(mut self) -> Self {
        self.role = Some(ParticipantRole::Seller);
        self
    }

    pub fn role(mut self, role: Option<ParticipantRole>) -> Self {
        self.role = role;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Page size clamped to `1..=MAX_PAGE_SIZE`.
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    /// Returns true if a transaction between `buyer` and `seller` matches.
    pub fn matches(&self, buyer: UserId, seller: UserId) -> bool {
        match self.role {
            Some(ParticipantRole::Buyer) => buyer == self.participant,
            Some(ParticipantRole::Seller) => seller == self.participant,
            None => buyer == self.participant || seller == self.participant,
        }
    }
}
