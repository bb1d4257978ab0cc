use std::sync::Arc;

use async_trait::async_trait;
use bson::Uuid;
use log::{info, warn};

use super::{
    ProductReviewListing, ReviewService,
    aggregate_updater::{ProductAggregateUpdater, RatingSummary},
    coordinator::TransactionCoordinator,
    input::{NewReviewInput, ReviewPatch, ValidatedSubmission},
    review_store::{ReviewChange, ReviewStore},
    user_stats::UserStatsUpdater,
};
use crate::{
    authentication::{CallerIdentity, authenticated, require_admin},
    config::ServiceConfig,
    error::ReviewError,
    graphql::model::{
        connection::ReviewConnection,
        order::Order,
        page::PageRequest,
        product::Product,
        rating::RatingAggregate,
        review::{Review, ReviewStatus},
        user::User,
    },
    store::{OrderCollection, ProductCollection, Store, StoreResult, StoreSession, UserCollection},
};

/// Orchestrates the review lifecycle on top of a document store.
///
/// Each mutation runs the review write and the recomputation of the product aggregate
/// in one atomic scope. Submissions are validated before the scope is opened, patches
/// only once the caller's rights over the review are established. User statistics are
/// refreshed afterwards in a scope of their own on a best-effort basis.
pub struct RatingAggregationService<S> {
    coordinator: TransactionCoordinator<S>,
    reviews: ReviewStore,
    aggregates: ProductAggregateUpdater,
    user_stats: UserStatsUpdater,
    initial_status: ReviewStatus,
}

impl<S: Store> RatingAggregationService<S> {
    pub fn new(store: Arc<S>, config: ServiceConfig) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(store, config.max_transaction_attempts),
            reviews: ReviewStore,
            aggregates: ProductAggregateUpdater,
            user_stats: UserStatsUpdater,
            initial_status: config.initial_status,
        }
    }

    async fn submit_in<T: StoreSession>(
        &self,
        session: &mut T,
        caller: &CallerIdentity,
        submission: &ValidatedSubmission,
    ) -> StoreResult<(Review, RatingAggregate)> {
        if session.find_product(submission.product_id).await?.is_none() {
            return Err(ReviewError::not_found("Product", submission.product_id));
        }
        let order = session
            .find_order(submission.order_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("Order", submission.order_id))?;
        if order.user_id != caller.user_id {
            return Err(ReviewError::forbidden(format!(
                "order of UUID: `{}` belongs to another user",
                order._id
            )));
        }
        if !order.contains(submission.product_id) {
            return Err(ReviewError::Validation(format!(
                "order of UUID: `{}` does not contain product of UUID: `{}`",
                order._id, submission.product_id
            )));
        }
        let review = submission.to_review(caller.user_id, self.initial_status);
        let review = self.reviews.create(session, review).await?;
        let aggregate = self.aggregates.recompute(session, review.product_id).await?;
        Ok((review, aggregate))
    }

    async fn update_in<T: StoreSession>(
        &self,
        session: &mut T,
        id: Uuid,
        caller: &CallerIdentity,
        patch: &ReviewPatch,
    ) -> StoreResult<ReviewChange> {
        let change = self.reviews.update(session, id, caller, patch).await?;
        if patch.touches_aggregate() {
            self.aggregates
                .recompute(session, change.after.product_id)
                .await?;
        }
        Ok(change)
    }

    async fn delete_in<T: StoreSession>(
        &self,
        session: &mut T,
        id: Uuid,
        caller: &CallerIdentity,
    ) -> StoreResult<(Review, RatingAggregate)> {
        let review = self.reviews.delete(session, id, caller).await?;
        let aggregate = self.aggregates.recompute(session, review.product_id).await?;
        Ok((review, aggregate))
    }

    async fn set_status_in<T: StoreSession>(
        &self,
        session: &mut T,
        id: Uuid,
        status: ReviewStatus,
    ) -> StoreResult<(ReviewChange, RatingAggregate)> {
        let change = self.reviews.set_status(session, id, status).await?;
        let aggregate = self
            .aggregates
            .recompute(session, change.after.product_id)
            .await?;
        Ok((change, aggregate))
    }

    async fn listing_in<T: StoreSession>(
        &self,
        session: &mut T,
        product_id: Uuid,
        page: PageRequest,
    ) -> StoreResult<ProductReviewListing> {
        let summary = self.aggregates.summarize(session, product_id).await?;
        let reviews = self
            .reviews
            .find_by_product(session, product_id, Some(ReviewStatus::Visible), page)
            .await?;
        Ok(ProductReviewListing { summary, reviews })
    }

    /// Recounts the review statistics of a user. Failures are logged, never returned.
    async fn refresh_user_stats(&self, user_id: Uuid) {
        let result = self
            .coordinator
            .run_atomic(|mut session| async move {
                let outcome = self.user_stats.refresh(&mut session, user_id).await;
                (session, outcome)
            })
            .await;
        if let Err(error) = result {
            warn!(
                "Refreshing review stats of user of UUID: `{}` failed: {}",
                user_id, error
            );
        }
    }
}

#[async_trait]
impl<S: Store> ReviewService for RatingAggregationService<S> {
    async fn submit_review(
        &self,
        caller: Option<&CallerIdentity>,
        input: NewReviewInput,
    ) -> Result<Review, ReviewError> {
        let caller = authenticated(caller)?;
        let submission = input.validate()?;
        let submission = &submission;
        let (review, aggregate) = self
            .coordinator
            .run_atomic(|mut session| async move {
                let outcome = self.submit_in(&mut session, caller, submission).await;
                (session, outcome)
            })
            .await?;
        info!(
            "Created review of UUID: `{}` for product of UUID: `{}`, aggregate is now {:?}.",
            review._id, review.product_id, aggregate
        );
        self.refresh_user_stats(review.user_id).await;
        Ok(review)
    }

    async fn update_review(
        &self,
        caller: Option<&CallerIdentity>,
        id: Uuid,
        patch: ReviewPatch,
    ) -> Result<Review, ReviewError> {
        let caller = authenticated(caller)?;
        let patch = &patch;
        let change = self
            .coordinator
            .run_atomic(|mut session| async move {
                let outcome = self.update_in(&mut session, id, caller, patch).await;
                (session, outcome)
            })
            .await?;
        info!(
            "Updated review of UUID: `{}`, rating {} -> {}, status {} -> {}.",
            id,
            change.before.rating.stars(),
            change.after.rating.stars(),
            change.before.status.as_str(),
            change.after.status.as_str()
        );
        Ok(change.after)
    }

    async fn delete_review(
        &self,
        caller: Option<&CallerIdentity>,
        id: Uuid,
    ) -> Result<Review, ReviewError> {
        let caller = authenticated(caller)?;
        let (review, aggregate) = self
            .coordinator
            .run_atomic(|mut session| async move {
                let outcome = self.delete_in(&mut session, id, caller).await;
                (session, outcome)
            })
            .await?;
        info!(
            "Deleted review of UUID: `{}` of product of UUID: `{}`, aggregate is now {:?}.",
            review._id, review.product_id, aggregate
        );
        self.refresh_user_stats(review.user_id).await;
        Ok(review)
    }

    async fn set_visibility(
        &self,
        caller: Option<&CallerIdentity>,
        id: Uuid,
        status: &str,
    ) -> Result<Review, ReviewError> {
        require_admin(caller)?;
        let status: ReviewStatus = status.parse()?;
        let (change, aggregate) = self
            .coordinator
            .run_atomic(|mut session| async move {
                let outcome = self.set_status_in(&mut session, id, status).await;
                (session, outcome)
            })
            .await?;
        info!(
            "Review of UUID: `{}` is now {}, aggregate of product of UUID: `{}` is {:?}.",
            id,
            change.after.status.as_str(),
            change.after.product_id,
            aggregate
        );
        Ok(change.after)
    }

    async fn review(
        &self,
        caller: Option<&CallerIdentity>,
        id: Uuid,
    ) -> Result<Review, ReviewError> {
        let review = self
            .coordinator
            .run_atomic(|mut session| async move {
                let outcome = self.reviews.get(&mut session, id).await;
                (session, outcome)
            })
            .await?;
        let readable =
            review.is_visible() || caller.is_some_and(|c| c.owns_or_moderates(review.user_id));
        if readable {
            Ok(review)
        } else {
            Err(ReviewError::not_found("Review", id))
        }
    }

    async fn product(&self, id: Uuid) -> Result<Product, ReviewError> {
        self.coordinator
            .run_atomic(|mut session| async move {
                let outcome = session.find_product(id).await;
                (session, outcome)
            })
            .await?
            .ok_or_else(|| ReviewError::not_found("Product", id))
    }

    async fn user(&self, id: Uuid) -> Result<User, ReviewError> {
        self.coordinator
            .run_atomic(|mut session| async move {
                let outcome = session.find_user(id).await;
                (session, outcome)
            })
            .await?
            .ok_or_else(|| ReviewError::not_found("User", id))
    }

    async fn product_reviews(
        &self,
        caller: Option<&CallerIdentity>,
        product_id: Uuid,
        status: Option<ReviewStatus>,
        page: PageRequest,
    ) -> Result<ReviewConnection, ReviewError> {
        let status = status.unwrap_or_default();
        if status != ReviewStatus::Visible {
            require_admin(caller)?;
        }
        self.coordinator
            .run_atomic(|mut session| async move {
                let outcome = self
                    .reviews
                    .find_by_product(&mut session, product_id, Some(status), page)
                    .await;
                (session, outcome)
            })
            .await
    }

    async fn user_reviews(
        &self,
        caller: Option<&CallerIdentity>,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<ReviewConnection, ReviewError> {
        let status = if caller.is_some_and(|c| c.owns_or_moderates(user_id)) {
            None
        } else {
            Some(ReviewStatus::Visible)
        };
        self.coordinator
            .run_atomic(|mut session| async move {
                let outcome = self
                    .reviews
                    .find_by_user(&mut session, user_id, status, page)
                    .await;
                (session, outcome)
            })
            .await
    }

    async fn rating_summary(&self, product_id: Uuid) -> Result<RatingSummary, ReviewError> {
        self.coordinator
            .run_atomic(|mut session| async move {
                let outcome = self.aggregates.summarize(&mut session, product_id).await;
                (session, outcome)
            })
            .await
    }

    async fn product_review_listing(
        &self,
        product_id: Uuid,
        page: PageRequest,
    ) -> Result<ProductReviewListing, ReviewError> {
        self.coordinator
            .run_atomic(|mut session| async move {
                let outcome = self.listing_in(&mut session, product_id, page).await;
                (session, outcome)
            })
            .await
    }

    async fn register_product(&self, id: Uuid) -> Result<(), ReviewError> {
        self.coordinator
            .run_atomic(|mut session| async move {
                let outcome = session.register_product(id).await;
                (session, outcome)
            })
            .await
    }

    async fn register_user(&self, id: Uuid) -> Result<(), ReviewError> {
        self.coordinator
            .run_atomic(|mut session| async move {
                let outcome = session.register_user(id).await;
                (session, outcome)
            })
            .await
    }

    async fn register_order(&self, order: Order) -> Result<(), ReviewError> {
        let order = &order;
        self.coordinator
            .run_atomic(|mut session| async move {
                let outcome = session.register_order(order).await;
                (session, outcome)
            })
            .await
    }
}
