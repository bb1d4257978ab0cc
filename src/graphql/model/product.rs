use async_graphql::{ComplexObject, Context, ErrorExtensions, Result, SimpleObject};
use bson::Uuid;
use serde::{Deserialize, Serialize};

use super::{connection::ReviewConnection, page::PageRequest, rating::RatingCount};
use crate::{aggregation::SharedReviewService, authentication::CallerIdentity};

/// Product with its denormalized rating aggregate.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, SimpleObject)]
#[graphql(complex)]
pub struct Product {
    /// UUID of the product.
    #[graphql(name = "id")]
    pub _id: Uuid,
    /// Mean rating of visible reviews rounded to one decimal, `0` without reviews.
    pub average_rating: f64,
    /// Number of visible reviews.
    pub review_count: u64,
}

#[ComplexObject]
impl Product {
    /// Retrieves visible reviews of product, newest first.
    async fn reviews<'a>(
        &self,
        ctx: &Context<'a>,
        #[graphql(desc = "Describes that the `first` N reviews should be retrieved.")]
        first: Option<u32>,
        #[graphql(desc = "Describes how many reviews should be skipped at the beginning.")]
        skip: Option<u64>,
    ) -> Result<ReviewConnection> {
        let service = ctx.data::<SharedReviewService>()?;
        let caller = ctx.data_opt::<CallerIdentity>();
        service
            .product_reviews(caller, self._id, None, PageRequest::new(skip, first))
            .await
            .map_err(|e| e.extend())
    }

    /// Retrieves the number of visible reviews per rating.
    async fn rating_counts<'a>(&self, ctx: &Context<'a>) -> Result<Vec<RatingCount>> {
        let service = ctx.data::<SharedReviewService>()?;
        let summary = service
            .rating_summary(self._id)
            .await
            .map_err(|e| e.extend())?;
        Ok(summary.rating_counts.buckets())
    }
}

impl From<Uuid> for Product {
    fn from(value: Uuid) -> Self {
        Product {
            _id: value,
            average_rating: 0.0,
            review_count: 0,
        }
    }
}
