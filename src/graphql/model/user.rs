use async_graphql::{ComplexObject, Context, ErrorExtensions, Result, SimpleObject};
use bson::{DateTime, Uuid};
use serde::{Deserialize, Serialize};

use super::{connection::ReviewConnection, page::PageRequest};
use crate::{aggregation::SharedReviewService, authentication::CallerIdentity};

/// A user that writes reviews.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, SimpleObject)]
#[graphql(complex)]
pub struct User {
    /// UUID of the user.
    #[graphql(name = "id")]
    pub _id: Uuid,
    /// Review statistics of the user.
    #[serde(default)]
    pub stats: UserStats,
}

/// Review statistics kept on a user.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default, SimpleObject)]
pub struct UserStats {
    /// Number of reviews written by the user.
    pub total_reviews: u64,
    /// Timestamp of the most recently written review.
    pub last_review_date: Option<DateTime>,
}

#[ComplexObject]
impl User {
    /// Retrieves reviews written by the user, newest first.
    ///
    /// Hidden reviews are only included for the user themself and admins.
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
            .user_reviews(caller, self._id, PageRequest::new(skip, first))
            .await
            .map_err(|e| e.extend())
    }
}

impl From<Uuid> for User {
    fn from(value: Uuid) -> Self {
        User {
            _id: value,
            stats: UserStats::default(),
        }
    }
}
