use bson::Uuid;

use super::input::{ReviewPatch, ValidatedPatch};
use crate::{
    authentication::CallerIdentity,
    error::ReviewError,
    graphql::model::{
        connection::ReviewConnection,
        page::PageRequest,
        review::{Review, ReviewStatus},
    },
    store::{ReviewFilter, StoreResult, StoreSession},
};

/// A review before and after a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewChange {
    pub before: Review,
    pub after: Review,
}

/// Owns the canonical set of review records and the rules for mutating them.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReviewStore;

impl ReviewStore {
    /// Persists a new review, failing with `DuplicateReview` if its key is taken.
    pub async fn create<T: StoreSession>(&self, session: &mut T, review: Review) -> StoreResult<Review> {
        if session.find_review_by_key(review.key()).await?.is_some() {
            return Err(review.key().into());
        }
        session.insert_review(&review).await?;
        Ok(review)
    }

    pub async fn get<T: StoreSession>(&self, session: &mut T, id: Uuid) -> StoreResult<Review> {
        session
            .find_review(id)
            .await?
            .ok_or_else(|| ReviewError::not_found("Review", id))
    }

    /// Applies a patch on behalf of `caller`.
    ///
    /// Only the author or an admin may touch a review at all, only admins may change its
    /// status. The patch is validated after both checks, so a caller without rights gets
    /// `Forbidden` whatever the patch contains.
    pub async fn update<T: StoreSession>(
        &self,
        session: &mut T,
        id: Uuid,
        caller: &CallerIdentity,
        patch: &ReviewPatch,
    ) -> StoreResult<ReviewChange> {
        let before = self.get(session, id).await?;
        authorize_modification(caller, &before)?;
        if patch.status.is_some() && !caller.is_admin {
            return Err(ReviewError::forbidden(
                "only admins may change the visibility of a review",
            ));
        }
        let patch = patch.clone().validate()?;
        if patch.is_empty() {
            return Ok(ReviewChange {
                after: before.clone(),
                before,
            });
        }
        let after = patch.apply(before.clone());
        session.replace_review(&after).await?;
        Ok(ReviewChange { before, after })
    }

    /// Changes the status of a review. Callers must have checked the admin capability.
    pub async fn set_status<T: StoreSession>(
        &self,
        session: &mut T,
        id: Uuid,
        status: ReviewStatus,
    ) -> StoreResult<ReviewChange> {
        let patch = ValidatedPatch {
            status: Some(status),
            ..Default::default()
        };
        let before = self.get(session, id).await?;
        let after = patch.apply(before.clone());
        session.replace_review(&after).await?;
        Ok(ReviewChange { before, after })
    }

    /// Deletes a review on behalf of `caller`, returning the deleted record.
    pub async fn delete<T: StoreSession>(
        &self,
        session: &mut T,
        id: Uuid,
        caller: &CallerIdentity,
    ) -> StoreResult<Review> {
        let review = self.get(session, id).await?;
        authorize_modification(caller, &review)?;
        if !session.delete_review(id).await? {
            return Err(ReviewError::not_found("Review", id));
        }
        Ok(review)
    }

    pub async fn find_by_product<T: StoreSession>(
        &self,
        session: &mut T,
        product_id: Uuid,
        status: Option<ReviewStatus>,
        page: PageRequest,
    ) -> StoreResult<ReviewConnection> {
        let filter = ReviewFilter::by_product(product_id).with_status(status);
        session.find_reviews(filter, page).await
    }

    pub async fn find_by_user<T: StoreSession>(
        &self,
        session: &mut T,
        user_id: Uuid,
        status: Option<ReviewStatus>,
        page: PageRequest,
    ) -> StoreResult<ReviewConnection> {
        let filter = ReviewFilter::by_user(user_id).with_status(status);
        session.find_reviews(filter, page).await
    }
}

fn authorize_modification(caller: &CallerIdentity, review: &Review) -> Result<(), ReviewError> {
    if caller.owns_or_moderates(review.user_id) {
        Ok(())
    } else {
        Err(ReviewError::forbidden(format!(
            "review of UUID: `{}` is owned by another user",
            review._id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregation::input::ReviewContent,
        graphql::model::rating::Rating,
        store::{MemoryStore, Store},
    };

    fn review(user_id: Uuid) -> Review {
        let now = bson::DateTime::now();
        Review {
            _id: Uuid::new(),
            user_id,
            product_id: Uuid::new(),
            order_id: Uuid::new(),
            rating: Rating::try_from(3).unwrap(),
            title: "Solid".into(),
            comment: String::new(),
            images: Vec::new(),
            status: ReviewStatus::Visible,
            verified_purchase: true,
            created_at: now,
            last_updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_rejects_second_review_for_same_key() {
        let store = MemoryStore::new();
        let mut session = store.begin().await.unwrap();
        let first = review(Uuid::new());
        let mut second = first.clone();
        second._id = Uuid::new();

        ReviewStore.create(&mut session, first.clone()).await.unwrap();
        assert_eq!(
            ReviewStore.create(&mut session, second).await,
            Err(first.key().into())
        );
    }

    #[tokio::test]
    async fn strangers_cannot_modify_whatever_the_patch() {
        let store = MemoryStore::new();
        let mut session = store.begin().await.unwrap();
        let stored = ReviewStore
            .create(&mut session, review(Uuid::new()))
            .await
            .unwrap();
        let stranger = CallerIdentity::user(Uuid::new());

        for patch in [
            ReviewPatch::default(),
            ReviewPatch {
                rating: Some(1),
                ..Default::default()
            },
            ReviewPatch {
                rating: Some(9),
                ..Default::default()
            },
            ReviewPatch {
                status: Some("bogus".into()),
                ..Default::default()
            },
            ReviewPatch {
                content: ReviewContent {
                    comment: Some("spam".into()),
                    images: Some(vec!["not a url".into()]),
                    ..Default::default()
                },
                ..Default::default()
            },
        ] {
            let result = ReviewStore
                .update(&mut session, stored._id, &stranger, &patch)
                .await;
            assert!(matches!(result, Err(ReviewError::Forbidden(_))));
        }
        assert!(matches!(
            ReviewStore.delete(&mut session, stored._id, &stranger).await,
            Err(ReviewError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn author_cannot_change_status_but_admin_can() {
        let store = MemoryStore::new();
        let mut session = store.begin().await.unwrap();
        let author = Uuid::new();
        let stored = ReviewStore.create(&mut session, review(author)).await.unwrap();
        let hide = ReviewPatch {
            status: Some("hidden".into()),
            ..Default::default()
        };

        let result = ReviewStore
            .update(&mut session, stored._id, &CallerIdentity::user(author), &hide)
            .await;
        assert!(matches!(result, Err(ReviewError::Forbidden(_))));

        let change = ReviewStore
            .update(&mut session, stored._id, &CallerIdentity::admin(Uuid::new()), &hide)
            .await
            .unwrap();
        assert_eq!(change.before.status, ReviewStatus::Visible);
        assert_eq!(change.after.status, ReviewStatus::Hidden);
    }

    #[tokio::test]
    async fn author_patch_is_validated_after_authorization() {
        let store = MemoryStore::new();
        let mut session = store.begin().await.unwrap();
        let author = Uuid::new();
        let stored = ReviewStore.create(&mut session, review(author)).await.unwrap();
        let patch = ReviewPatch {
            rating: Some(9),
            ..Default::default()
        };

        let result = ReviewStore
            .update(&mut session, stored._id, &CallerIdentity::user(author), &patch)
            .await;
        assert_eq!(result, Err(ReviewError::InvalidRating(9)));
        assert_eq!(ReviewStore.get(&mut session, stored._id).await, Ok(stored));
    }

    #[tokio::test]
    async fn unknown_review_is_not_found() {
        let store = MemoryStore::new();
        let mut session = store.begin().await.unwrap();
        let id = Uuid::new();
        let admin = CallerIdentity::admin(Uuid::new());
        assert_eq!(
            ReviewStore.delete(&mut session, id, &admin).await,
            Err(ReviewError::not_found("Review", id))
        );
        assert_eq!(
            ReviewStore
                .set_status(&mut session, id, ReviewStatus::Hidden)
                .await,
            Err(ReviewError::not_found("Review", id))
        );
    }
}
