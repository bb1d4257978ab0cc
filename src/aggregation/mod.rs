//! Review lifecycle and the rating aggregate it maintains.
//!
//! Every mutation of a review and the recomputation of its product's aggregate run in
//! one atomic scope of the [`TransactionCoordinator`], so the aggregate of a product
//! always reflects exactly its visible reviews between completed operations.

use std::sync::Arc;

use async_trait::async_trait;
use bson::Uuid;

use crate::{
    authentication::CallerIdentity,
    error::ReviewError,
    graphql::model::{
        connection::ReviewConnection,
        order::Order,
        page::PageRequest,
        product::Product,
        review::{Review, ReviewStatus},
        user::User,
    },
};

pub mod aggregate_updater;
pub mod coordinator;
pub mod input;
pub mod review_store;
pub mod service;
pub mod user_stats;

pub use aggregate_updater::RatingSummary;
pub use input::{NewReviewInput, ReviewContent, ReviewPatch};
pub use service::RatingAggregationService;

/// Visible reviews of a product next to the summary they add up to.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductReviewListing {
    pub summary: RatingSummary,
    pub reviews: ReviewConnection,
}

/// Operations of the review service, independent of the store backend.
///
/// The caller is passed explicitly. `None` stands for an unauthenticated request.
#[async_trait]
pub trait ReviewService: Send + Sync {
    /// Creates a verified-purchase review of the caller and updates the product aggregate.
    async fn submit_review(
        &self,
        caller: Option<&CallerIdentity>,
        input: NewReviewInput,
    ) -> Result<Review, ReviewError>;

    /// Applies a partial update. Only the author or an admin may update, only admins may
    /// change the status.
    async fn update_review(
        &self,
        caller: Option<&CallerIdentity>,
        id: Uuid,
        patch: ReviewPatch,
    ) -> Result<Review, ReviewError>;

    /// Deletes a review of the caller, or any review if the caller is an admin.
    async fn delete_review(
        &self,
        caller: Option<&CallerIdentity>,
        id: Uuid,
    ) -> Result<Review, ReviewError>;

    /// Shows or hides a review. Admin only.
    async fn set_visibility(
        &self,
        caller: Option<&CallerIdentity>,
        id: Uuid,
        status: &str,
    ) -> Result<Review, ReviewError>;

    /// Reads a review. Hidden reviews resolve only for their author and admins.
    async fn review(
        &self,
        caller: Option<&CallerIdentity>,
        id: Uuid,
    ) -> Result<Review, ReviewError>;

    async fn product(&self, id: Uuid) -> Result<Product, ReviewError>;

    async fn user(&self, id: Uuid) -> Result<User, ReviewError>;

    /// Lists reviews of a product with the given status, visible if absent.
    ///
    /// Listing non-visible reviews requires an admin.
    async fn product_reviews(
        &self,
        caller: Option<&CallerIdentity>,
        product_id: Uuid,
        status: Option<ReviewStatus>,
        page: PageRequest,
    ) -> Result<ReviewConnection, ReviewError>;

    /// Lists reviews written by a user. Hidden ones are included for the user and admins.
    async fn user_reviews(
        &self,
        caller: Option<&CallerIdentity>,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<ReviewConnection, ReviewError>;

    /// Aggregate and rating histogram of a product.
    async fn rating_summary(&self, product_id: Uuid) -> Result<RatingSummary, ReviewError>;

    /// One page of visible reviews of a product and its rating summary, read in the same
    /// atomic scope.
    async fn product_review_listing(
        &self,
        product_id: Uuid,
        page: PageRequest,
    ) -> Result<ProductReviewListing, ReviewError>;

    async fn register_product(&self, id: Uuid) -> Result<(), ReviewError>;

    async fn register_user(&self, id: Uuid) -> Result<(), ReviewError>;

    async fn register_order(&self, order: Order) -> Result<(), ReviewError>;
}

/// Review service shared between the GraphQL, REST and event endpoints.
pub type SharedReviewService = Arc<dyn ReviewService>;
