//! In-memory document store for development and tests.
//!
//! A session holds the store lock for its whole lifetime and works on a copy of the
//! collections, so sessions are serialized and an uncommitted session leaves no trace.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use bson::Uuid;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    OrderCollection, ProductCollection, ReviewCollection, ReviewFilter, Store, StoreResult,
    StoreSession, UserCollection,
};
use crate::{
    error::ReviewError,
    graphql::model::{
        connection::ReviewConnection,
        order::Order,
        page::PageRequest,
        product::Product,
        rating::{Rating, RatingAggregate},
        review::{Review, ReviewKey},
        user::{User, UserStats},
    },
};

#[derive(Debug, Clone, Default)]
struct Collections {
    /// Reviews in insertion order.
    reviews: Vec<Review>,
    products: HashMap<Uuid, Product>,
    users: HashMap<Uuid, User>,
    orders: HashMap<Uuid, Order>,
}

/// Faults to inject into upcoming sessions.
#[derive(Debug, Default)]
struct Faults {
    aggregate_write_failures: AtomicU32,
    commit_conflicts: AtomicU32,
}

impl Faults {
    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Store keeping all collections in process memory. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<Collections>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` aggregate writes fail with `StoreUnavailable`.
    #[cfg(test)]
    pub fn fail_aggregate_writes(&self, n: u32) {
        self.faults.aggregate_write_failures.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` commits fail with `TransactionConflict`.
    #[cfg(test)]
    pub fn conflict_on_commit(&self, n: u32) {
        self.faults.commit_conflicts.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Session = MemorySession;

    async fn begin(&self) -> StoreResult<MemorySession> {
        let committed = self.collections.clone().lock_owned().await;
        let working = committed.clone();
        Ok(MemorySession {
            committed,
            working,
            faults: self.faults.clone(),
        })
    }
}

/// Session of a [`MemoryStore`], holding the store lock until dropped.
pub struct MemorySession {
    committed: OwnedMutexGuard<Collections>,
    working: Collections,
    faults: Arc<Faults>,
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn commit(&mut self) -> StoreResult<()> {
        if Faults::take(&self.faults.commit_conflicts) {
            self.working = self.committed.clone();
            return Err(ReviewError::TransactionConflict);
        }
        *self.committed = self.working.clone();
        Ok(())
    }

    async fn abort(&mut self) -> StoreResult<()> {
        self.working = self.committed.clone();
        Ok(())
    }
}

#[async_trait]
impl ReviewCollection for MemorySession {
    async fn insert_review(&mut self, review: &Review) -> StoreResult<()> {
        let key = review.key();
        if self.working.reviews.iter().any(|r| r.key() == key) {
            return Err(key.into());
        }
        self.working.reviews.push(review.clone());
        Ok(())
    }

    async fn find_review(&mut self, id: Uuid) -> StoreResult<Option<Review>> {
        Ok(self.working.reviews.iter().find(|r| r._id == id).cloned())
    }

    async fn find_review_by_key(&mut self, key: ReviewKey) -> StoreResult<Option<Review>> {
        Ok(self.working.reviews.iter().find(|r| r.key() == key).cloned())
    }

    async fn replace_review(&mut self, review: &Review) -> StoreResult<()> {
        let stored = self
            .working
            .reviews
            .iter_mut()
            .find(|r| r._id == review._id)
            .ok_or_else(|| ReviewError::not_found("Review", review._id))?;
        *stored = review.clone();
        Ok(())
    }

    async fn delete_review(&mut self, id: Uuid) -> StoreResult<bool> {
        let before = self.working.reviews.len();
        self.working.reviews.retain(|r| r._id != id);
        Ok(self.working.reviews.len() != before)
    }

    async fn find_reviews(
        &mut self,
        filter: ReviewFilter,
        page: PageRequest,
    ) -> StoreResult<ReviewConnection> {
        // Reversed insertion order breaks ties between equal timestamps.
        let mut matching: Vec<&Review> = self
            .working
            .reviews
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total_count = matching.len() as u64;
        let nodes = matching
            .into_iter()
            .skip(usize::try_from(page.skip).unwrap_or(usize::MAX))
            .take(page.first as usize)
            .cloned()
            .collect();
        Ok(ReviewConnection::new(nodes, page.skip, total_count))
    }

    async fn visible_ratings(&mut self, product_id: Uuid) -> StoreResult<Vec<Rating>> {
        Ok(self
            .working
            .reviews
            .iter()
            .filter(|r| r.product_id == product_id && r.is_visible())
            .map(|r| r.rating)
            .collect())
    }
}

#[async_trait]
impl ProductCollection for MemorySession {
    async fn find_product(&mut self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn register_product(&mut self, id: Uuid) -> StoreResult<()> {
        self.working
            .products
            .entry(id)
            .or_insert_with(|| Product::from(id));
        Ok(())
    }

    async fn write_rating_aggregate(
        &mut self,
        product_id: Uuid,
        aggregate: RatingAggregate,
    ) -> StoreResult<()> {
        if Faults::take(&self.faults.aggregate_write_failures) {
            return Err(ReviewError::StoreUnavailable(
                "injected aggregate write failure".to_string(),
            ));
        }
        let product = self
            .working
            .products
            .get_mut(&product_id)
            .ok_or_else(|| ReviewError::not_found("Product", product_id))?;
        product.average_rating = aggregate.average_rating;
        product.review_count = aggregate.review_count;
        Ok(())
    }
}

#[async_trait]
impl UserCollection for MemorySession {
    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn register_user(&mut self, id: Uuid) -> StoreResult<()> {
        self.working.users.entry(id).or_insert_with(|| User::from(id));
        Ok(())
    }

    async fn write_user_stats(&mut self, user_id: Uuid, stats: &UserStats) -> StoreResult<()> {
        self.working
            .users
            .entry(user_id)
            .or_insert_with(|| User::from(user_id))
            .stats = stats.clone();
        Ok(())
    }
}

#[async_trait]
impl OrderCollection for MemorySession {
    async fn find_order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn register_order(&mut self, order: &Order) -> StoreResult<()> {
        self.working.orders.insert(order._id, order.clone());
        Ok(())
    }
}
