//! Document store port.
//!
//! Every read and write of the review service goes through a [`StoreSession`]. A session
//! is an atomic scope: its writes become visible to other sessions on [`StoreSession::commit`]
//! and are discarded on [`StoreSession::abort`] or when the session is dropped uncommitted.

use async_trait::async_trait;
use bson::{Document, Uuid, doc};

use crate::{
    error::ReviewError,
    graphql::model::{
        connection::ReviewConnection,
        order::Order,
        page::PageRequest,
        product::Product,
        rating::{Rating, RatingAggregate},
        review::{Review, ReviewKey, ReviewStatus},
        user::{User, UserStats},
    },
};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

pub type StoreResult<T> = Result<T, ReviewError>;

/// Opens atomic scopes over the document store.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Session: StoreSession;

    /// Starts a session with an open transaction.
    async fn begin(&self) -> StoreResult<Self::Session>;
}

/// Handle of one atomic scope. All participating reads and writes must use it.
#[async_trait]
pub trait StoreSession:
    ReviewCollection + ProductCollection + UserCollection + OrderCollection + Send
{
    /// Makes all writes of this session visible as one unit.
    ///
    /// Fails with `TransactionConflict` if a concurrent session won, in which case nothing
    /// was written.
    async fn commit(&mut self) -> StoreResult<()>;

    /// Discards all writes of this session.
    async fn abort(&mut self) -> StoreResult<()>;
}

/// Filter on the reviews collection.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ReviewFilter {
    pub product_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: Option<ReviewStatus>,
}

impl ReviewFilter {
    pub fn by_product(product_id: Uuid) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    pub fn by_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn with_status(self, status: Option<ReviewStatus>) -> Self {
        Self { status, ..self }
    }

    pub fn matches(&self, review: &Review) -> bool {
        self.product_id.is_none_or(|id| review.product_id == id)
            && self.user_id.is_none_or(|id| review.user_id == id)
            && self.status.is_none_or(|status| review.status == status)
    }

    pub fn to_document(&self) -> Document {
        let mut filter = Document::new();
        if let Some(product_id) = self.product_id {
            filter.insert("product_id", product_id);
        }
        if let Some(user_id) = self.user_id {
            filter.insert("user_id", user_id);
        }
        if let Some(status) = self.status {
            filter.insert("status", status);
        }
        filter
    }
}

impl From<ReviewKey> for Document {
    fn from(key: ReviewKey) -> Self {
        doc! {"user_id": key.user_id, "product_id": key.product_id, "order_id": key.order_id}
    }
}

#[async_trait]
pub trait ReviewCollection {
    /// Inserts a review, failing with `DuplicateReview` if its key is taken.
    async fn insert_review(&mut self, review: &Review) -> StoreResult<()>;

    async fn find_review(&mut self, id: Uuid) -> StoreResult<Option<Review>>;

    async fn find_review_by_key(&mut self, key: ReviewKey) -> StoreResult<Option<Review>>;

    /// Replaces a stored review, failing with `NotFound` if it does not exist.
    async fn replace_review(&mut self, review: &Review) -> StoreResult<()>;

    /// Deletes a review, returning whether it existed.
    async fn delete_review(&mut self, id: Uuid) -> StoreResult<bool>;

    /// Reads one page of matching reviews, newest first.
    async fn find_reviews(
        &mut self,
        filter: ReviewFilter,
        page: PageRequest,
    ) -> StoreResult<ReviewConnection>;

    /// Ratings of all visible reviews of a product.
    async fn visible_ratings(&mut self, product_id: Uuid) -> StoreResult<Vec<Rating>>;
}

#[async_trait]
pub trait ProductCollection {
    async fn find_product(&mut self, id: Uuid) -> StoreResult<Option<Product>>;

    /// Inserts a product with an empty aggregate unless it already exists.
    async fn register_product(&mut self, id: Uuid) -> StoreResult<()>;

    /// Overwrites the aggregate fields, failing with `NotFound` for unknown products.
    async fn write_rating_aggregate(
        &mut self,
        product_id: Uuid,
        aggregate: RatingAggregate,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait UserCollection {
    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>>;

    /// Inserts a user with empty stats unless it already exists.
    async fn register_user(&mut self, id: Uuid) -> StoreResult<()>;

    /// Overwrites the stats of a user, inserting the user if unknown.
    async fn write_user_stats(&mut self, user_id: Uuid, stats: &UserStats) -> StoreResult<()>;
}

#[async_trait]
pub trait OrderCollection {
    async fn find_order(&mut self, id: Uuid) -> StoreResult<Option<Order>>;

    /// Inserts or replaces a fulfilled order.
    async fn register_order(&mut self, order: &Order) -> StoreResult<()>;
}
