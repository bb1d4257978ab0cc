use async_graphql::{Context, ErrorExtensions, Object, Result};
use bson::Uuid;

use super::model::{
    connection::ReviewConnection,
    page::PageRequest,
    product::Product,
    review::{Review, ReviewStatus},
    user::User,
};
use crate::{aggregation::SharedReviewService, authentication::CallerIdentity, error::ReviewError};

/// Describes GraphQL review queries.
pub struct Query;

#[Object]
impl Query {
    /// Entity resolver for user of specific UUID.
    #[graphql(entity)]
    async fn user_entity_resolver<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of user to retrieve.")] id: Uuid,
    ) -> Result<Option<User>> {
        let service = ctx.data::<SharedReviewService>()?;
        optional(service.user(id).await)
    }

    /// Entity resolver for product of specific UUID.
    #[graphql(entity)]
    async fn product_entity_resolver<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of product to retrieve.")] id: Uuid,
    ) -> Result<Option<Product>> {
        let service = ctx.data::<SharedReviewService>()?;
        optional(service.product(id).await)
    }

    /// Entity resolver for review of specific UUID.
    #[graphql(entity)]
    async fn review_entity_resolver<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of review to retrieve.")] id: Uuid,
    ) -> Result<Option<Review>> {
        let service = ctx.data::<SharedReviewService>()?;
        let caller = ctx.data_opt::<CallerIdentity>();
        optional(service.review(caller, id).await)
    }

    /// Retrieves reviews of a product, newest first.
    async fn reviews<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of product whose reviews to retrieve.")] product_id: Uuid,
        #[graphql(desc = "Describes that the `first` N reviews should be retrieved.")]
        first: Option<u32>,
        #[graphql(desc = "Describes how many reviews should be skipped at the beginning.")]
        skip: Option<u64>,
        #[graphql(desc = "Status of reviews to retrieve, `VISIBLE` by default. Others require the admin role.")]
        status: Option<ReviewStatus>,
    ) -> Result<ReviewConnection> {
        let service = ctx.data::<SharedReviewService>()?;
        let caller = ctx.data_opt::<CallerIdentity>();
        service
            .product_reviews(caller, product_id, status, PageRequest::new(skip, first))
            .await
            .map_err(|e| e.extend())
    }

    /// Retrieves review of specific UUID.
    async fn review<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of review to retrieve.")] id: Uuid,
    ) -> Result<Review> {
        let service = ctx.data::<SharedReviewService>()?;
        let caller = ctx.data_opt::<CallerIdentity>();
        service.review(caller, id).await.map_err(|e| e.extend())
    }

    /// Retrieves product of specific UUID with its rating aggregate.
    async fn product<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of product to retrieve.")] id: Uuid,
    ) -> Result<Product> {
        let service = ctx.data::<SharedReviewService>()?;
        service.product(id).await.map_err(|e| e.extend())
    }

    /// Retrieves user of specific UUID with their review statistics.
    async fn user<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of user to retrieve.")] id: Uuid,
    ) -> Result<User> {
        let service = ctx.data::<SharedReviewService>()?;
        service.user(id).await.map_err(|e| e.extend())
    }
}

/// Maps `NotFound` to `None`, since entity resolvers may be asked for objects unknown here.
fn optional<T>(result: Result<T, ReviewError>) -> Result<Option<T>> {
    match result {
        Ok(object) => Ok(Some(object)),
        Err(ReviewError::NotFound { .. }) => Ok(None),
        Err(error) => Err(error.extend()),
    }
}
