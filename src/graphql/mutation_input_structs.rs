use async_graphql::InputObject;
use bson::Uuid;

use crate::aggregation::{NewReviewInput, ReviewContent, ReviewPatch};

#[derive(InputObject)]
pub struct CreateReviewInput {
    /// UUID of product to review.
    pub product_id: Uuid,
    /// UUID of fulfilled order containing the product.
    pub order_id: Uuid,
    /// Rating of review in 1-5 stars.
    pub rating: i64,
    /// Title of review.
    pub title: Option<String>,
    /// Comment of review.
    pub comment: Option<String>,
    /// Image URLs attached to review.
    pub images: Option<Vec<String>>,
}

impl From<CreateReviewInput> for NewReviewInput {
    fn from(input: CreateReviewInput) -> Self {
        NewReviewInput {
            product_id: Some(input.product_id),
            order_id: Some(input.order_id),
            rating: Some(input.rating),
            content: ReviewContent {
                title: input.title,
                comment: input.comment,
                images: input.images,
            },
        }
    }
}

#[derive(InputObject)]
pub struct UpdateReviewInput {
    /// UUID of review to update.
    pub id: Uuid,
    /// Rating of review in 1-5 stars to update.
    pub rating: Option<i64>,
    /// Title of review to update.
    pub title: Option<String>,
    /// Comment of review to update.
    pub comment: Option<String>,
    /// Image URLs of review to update, replacing the current ones.
    pub images: Option<Vec<String>>,
    /// Visibility of review to update, `visible` or `hidden`, admin only.
    pub status: Option<String>,
}

impl From<UpdateReviewInput> for ReviewPatch {
    fn from(input: UpdateReviewInput) -> Self {
        ReviewPatch {
            rating: input.rating,
            content: ReviewContent {
                title: input.title,
                comment: input.comment,
                images: input.images,
            },
            status: input.status,
        }
    }
}

#[derive(InputObject)]
pub struct SetReviewVisibilityInput {
    /// UUID of review to show or hide.
    pub id: Uuid,
    /// New visibility of review, `visible` or `hidden`.
    pub status: String,
}
