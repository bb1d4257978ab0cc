use async_graphql::{Context, ErrorExtensions, Object, Result};
use bson::Uuid;

use super::{
    model::review::Review,
    mutation_input_structs::{CreateReviewInput, SetReviewVisibilityInput, UpdateReviewInput},
};
use crate::{aggregation::SharedReviewService, authentication::CallerIdentity};

/// Describes GraphQL review mutations.
pub struct Mutation;

#[Object]
impl Mutation {
    /// Adds a review of the authenticated user for a product of one of their fulfilled orders.
    async fn create_review<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "CreateReviewInput")] input: CreateReviewInput,
    ) -> Result<Review> {
        let service = ctx.data::<SharedReviewService>()?;
        let caller = ctx.data_opt::<CallerIdentity>();
        service
            .submit_review(caller, input.into())
            .await
            .map_err(|e| e.extend())
    }

    /// Updates a specific review referenced with an UUID.
    async fn update_review<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UpdateReviewInput")] input: UpdateReviewInput,
    ) -> Result<Review> {
        let service = ctx.data::<SharedReviewService>()?;
        let caller = ctx.data_opt::<CallerIdentity>();
        let id = input.id;
        service
            .update_review(caller, id, input.into())
            .await
            .map_err(|e| e.extend())
    }

    /// Deletes review of UUID and returns it.
    async fn delete_review<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "UUID of review to delete.")] id: Uuid,
    ) -> Result<Review> {
        let service = ctx.data::<SharedReviewService>()?;
        let caller = ctx.data_opt::<CallerIdentity>();
        service
            .delete_review(caller, id)
            .await
            .map_err(|e| e.extend())
    }

    /// Shows or hides a review. Requires the admin role.
    async fn set_review_visibility<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "SetReviewVisibilityInput")] input: SetReviewVisibilityInput,
    ) -> Result<Review> {
        let service = ctx.data::<SharedReviewService>()?;
        let caller = ctx.data_opt::<CallerIdentity>();
        service
            .set_visibility(caller, input.id, &input.status)
            .await
            .map_err(|e| e.extend())
    }
}
