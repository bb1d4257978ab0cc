use bson::Uuid;
use serde::Serialize;

use crate::{
    error::ReviewError,
    graphql::model::rating::{RatingAggregate, RatingCounts},
    store::{StoreResult, StoreSession},
};

/// Rating aggregate of a product together with its histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average_rating: f64,
    pub review_count: u64,
    pub rating_counts: RatingCounts,
}

/// Recomputes the denormalized `average_rating` and `review_count` of products.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProductAggregateUpdater;

impl ProductAggregateUpdater {
    /// Reads the visible ratings of a product and writes their aggregate back.
    ///
    /// Must run in the same session as the review mutation it follows. Running it twice
    /// without a review change in between writes the same values.
    pub async fn recompute<T: StoreSession>(
        &self,
        session: &mut T,
        product_id: Uuid,
    ) -> StoreResult<RatingAggregate> {
        let ratings = session.visible_ratings(product_id).await?;
        let aggregate = RatingAggregate::from_ratings(ratings);
        session
            .write_rating_aggregate(product_id, aggregate)
            .await?;
        Ok(aggregate)
    }

    /// Reads the stored aggregate of a product and the histogram of its visible ratings.
    pub async fn summarize<T: StoreSession>(
        &self,
        session: &mut T,
        product_id: Uuid,
    ) -> StoreResult<RatingSummary> {
        let product = session
            .find_product(product_id)
            .await?
            .ok_or_else(|| ReviewError::not_found("Product", product_id))?;
        let ratings = session.visible_ratings(product_id).await?;
        Ok(RatingSummary {
            average_rating: product.average_rating,
            review_count: product.review_count,
            rating_counts: RatingCounts::from_ratings(ratings),
        })
    }
}
