//! Raw operation inputs and their validated forms.
//!
//! Submissions are validated before an atomic scope is opened. Patches are validated
//! inside the scope once the caller's rights over the review are checked, still before
//! any write.

use bson::{DateTime, Uuid};
use validator::{Validate, ValidationError};

use crate::{
    error::ReviewError,
    graphql::model::{
        rating::Rating,
        review::{Review, ReviewStatus},
    },
};

/// Free text and images of a review.
#[derive(Debug, Clone, Default, PartialEq, Validate)]
pub struct ReviewContent {
    #[validate(length(max = 100))]
    pub title: Option<String>,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
    #[validate(length(max = 5), custom = "validate_image_urls")]
    pub images: Option<Vec<String>>,
}

impl ReviewContent {
    fn checked(self) -> Result<Self, ReviewError> {
        self.validate()
            .map_err(|e| ReviewError::Validation(e.to_string()))?;
        Ok(self)
    }

    fn is_empty(&self) -> bool {
        self.title.is_none() && self.comment.is_none() && self.images.is_none()
    }
}

/// Every image must be an absolute http(s) URL.
fn validate_image_urls(images: &[String]) -> Result<(), ValidationError> {
    let all_valid = images.iter().all(|url| {
        (url.starts_with("https://") || url.starts_with("http://"))
            && validator::validate_url(url.as_str())
    });
    if all_valid {
        Ok(())
    } else {
        Err(ValidationError::new("image_url"))
    }
}

/// Input of a review submission.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReviewInput {
    pub product_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub rating: Option<i64>,
    pub content: ReviewContent,
}

impl NewReviewInput {
    pub fn validate(self) -> Result<ValidatedSubmission, ReviewError> {
        let missing: Vec<&str> = [
            ("productId", self.product_id.is_none()),
            ("orderId", self.order_id.is_none()),
            ("rating", self.rating.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, is_missing)| is_missing.then_some(field))
        .collect();
        match (self.product_id, self.order_id, self.rating) {
            (Some(product_id), Some(order_id), Some(rating)) => Ok(ValidatedSubmission {
                product_id,
                order_id,
                rating: Rating::try_from(rating)?,
                content: self.content.checked()?,
            }),
            _ => Err(ReviewError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Submission whose fields passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSubmission {
    pub product_id: Uuid,
    pub order_id: Uuid,
    pub rating: Rating,
    pub content: ReviewContent,
}

impl ValidatedSubmission {
    /// Builds the review record of `user_id` for a verified purchase.
    pub fn to_review(&self, user_id: Uuid, status: ReviewStatus) -> Review {
        let now = DateTime::now();
        Review {
            _id: Uuid::new(),
            user_id,
            product_id: self.product_id,
            order_id: self.order_id,
            rating: self.rating,
            title: self.content.title.clone().unwrap_or_default(),
            comment: self.content.comment.clone().unwrap_or_default(),
            images: self.content.images.clone().unwrap_or_default(),
            status,
            verified_purchase: true,
            created_at: now,
            last_updated_at: now,
        }
    }
}

/// Partial update of a review. Absent fields stay unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewPatch {
    pub rating: Option<i64>,
    pub content: ReviewContent,
    pub status: Option<String>,
}

impl ReviewPatch {
    /// True if applying the patch can change which ratings count toward the product.
    pub fn touches_aggregate(&self) -> bool {
        self.rating.is_some() || self.status.is_some()
    }

    pub fn validate(self) -> Result<ValidatedPatch, ReviewError> {
        Ok(ValidatedPatch {
            rating: self.rating.map(Rating::try_from).transpose()?,
            status: self.status.as_deref().map(str::parse::<ReviewStatus>).transpose()?,
            content: self.content.checked()?,
        })
    }
}

/// Patch whose fields passed validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedPatch {
    pub rating: Option<Rating>,
    pub content: ReviewContent,
    pub status: Option<ReviewStatus>,
}

impl ValidatedPatch {
    pub fn is_empty(&self) -> bool {
        self.rating.is_none() && self.status.is_none() && self.content.is_empty()
    }

    /// Applies all present fields to `review`.
    pub fn apply(&self, mut review: Review) -> Review {
        if let Some(rating) = self.rating {
            review.rating = rating;
        }
        if let Some(title) = &self.content.title {
            review.title = title.clone();
        }
        if let Some(comment) = &self.content.comment {
            review.comment = comment.clone();
        }
        if let Some(images) = &self.content.images {
            review.images = images.clone();
        }
        if let Some(status) = self.status {
            review.status = status;
        }
        review.last_updated_at = DateTime::now();
        review
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> NewReviewInput {
        NewReviewInput {
            product_id: Some(Uuid::new()),
            order_id: Some(Uuid::new()),
            rating: Some(4),
            content: ReviewContent::default(),
        }
    }

    #[test]
    fn reports_missing_required_fields() {
        let input = NewReviewInput {
            product_id: None,
            rating: None,
            ..submission()
        };
        assert_eq!(
            input.validate(),
            Err(ReviewError::Validation(
                "missing required fields: productId, rating".into()
            ))
        );
    }

    #[test]
    fn rejects_out_of_range_rating() {
        let input = NewReviewInput {
            rating: Some(6),
            ..submission()
        };
        assert_eq!(input.validate(), Err(ReviewError::InvalidRating(6)));
    }

    #[test]
    fn bounds_title_comment_and_images() {
        let too_long_title = ReviewContent {
            title: Some("x".repeat(101)),
            ..Default::default()
        };
        assert!(matches!(too_long_title.checked(), Err(ReviewError::Validation(_))));

        let too_many_images = ReviewContent {
            images: Some(vec!["https://img.example.com/a.png".to_string(); 6]),
            ..Default::default()
        };
        assert!(matches!(too_many_images.checked(), Err(ReviewError::Validation(_))));

        let ok = ReviewContent {
            title: Some("x".repeat(100)),
            comment: Some("Great".into()),
            images: Some(vec!["https://img.example.com/a.png".into()]),
        };
        assert_eq!(ok.clone().checked(), Ok(ok));
    }

    #[test]
    fn rejects_non_http_image_urls() {
        for url in ["not a url", "ftp://img.example.com/a.png", "/relative.png"] {
            let content = ReviewContent {
                images: Some(vec![url.to_string()]),
                ..Default::default()
            };
            assert!(
                matches!(content.checked(), Err(ReviewError::Validation(_))),
                "{url} accepted"
            );
        }
    }

    #[test]
    fn patch_validates_field_by_field() {
        let patch = ReviewPatch {
            status: Some("archived".into()),
            ..Default::default()
        };
        assert_eq!(
            patch.validate(),
            Err(ReviewError::InvalidStatus("archived".into()))
        );

        let patch = ReviewPatch {
            rating: Some(0),
            ..Default::default()
        };
        assert_eq!(patch.validate(), Err(ReviewError::InvalidRating(0)));

        let patch = ReviewPatch {
            status: Some("hidden".into()),
            ..Default::default()
        };
        assert!(patch.touches_aggregate());
        assert!(!patch.validate().unwrap().is_empty());
    }

    #[test]
    fn content_only_patch_does_not_touch_aggregate() {
        let patch = ReviewPatch {
            content: ReviewContent {
                comment: Some("Updated".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(!patch.touches_aggregate());
        assert!(ReviewPatch::default().validate().unwrap().is_empty());
    }
}
