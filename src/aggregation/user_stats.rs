use bson::Uuid;

use crate::{
    graphql::model::{page::PageRequest, user::UserStats},
    store::{ReviewFilter, StoreResult, StoreSession},
};

/// Keeps the review statistics of users in line with the reviews they authored.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserStatsUpdater;

impl UserStatsUpdater {
    /// Recounts the reviews of a user and stores the count and the newest creation time.
    pub async fn refresh<T: StoreSession>(
        &self,
        session: &mut T,
        user_id: Uuid,
    ) -> StoreResult<UserStats> {
        let newest = session
            .find_reviews(ReviewFilter::by_user(user_id), PageRequest { skip: 0, first: 1 })
            .await?;
        let stats = UserStats {
            total_reviews: newest.total_count,
            last_review_date: newest.nodes.first().map(|review| review.created_at),
        };
        session.write_user_stats(user_id, &stats).await?;
        Ok(stats)
    }
}
