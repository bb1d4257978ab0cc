use std::str::FromStr;

use async_graphql::{Enum, SimpleObject};
use bson::{Bson, Uuid, datetime::DateTime};
use serde::{Deserialize, Serialize};

use super::rating::Rating;
use crate::error::ReviewError;

/// The review of a user for a product bought with a fulfilled order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, SimpleObject)]
pub struct Review {
    /// Review UUID.
    #[graphql(name = "id")]
    pub _id: Uuid,
    /// UUID of the user who wrote the review.
    pub user_id: Uuid,
    /// UUID of the product that review is about.
    pub product_id: Uuid,
    /// UUID of the fulfilled order entitling the user to review the product.
    pub order_id: Uuid,
    /// Rating of review in 1-5 stars.
    pub rating: Rating,
    /// Title of review.
    pub title: String,
    /// Comment of review.
    pub comment: String,
    /// Image URLs attached to review, in display order.
    pub images: Vec<String>,
    /// Visibility of review, only visible reviews count toward product ratings.
    pub status: ReviewStatus,
    /// Flag if review is backed by a fulfilled order containing the product.
    pub verified_purchase: bool,
    /// Timestamp when review was created.
    pub created_at: DateTime,
    /// Timestamp when review was last updated.
    pub last_updated_at: DateTime,
}

impl Review {
    pub fn key(&self) -> ReviewKey {
        ReviewKey {
            user_id: self.user_id,
            product_id: self.product_id,
            order_id: self.order_id,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.status == ReviewStatus::Visible
    }
}

/// Uniqueness key of a review: one review per user, product and order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ReviewKey {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub order_id: Uuid,
}

impl From<ReviewKey> for ReviewError {
    fn from(key: ReviewKey) -> Self {
        ReviewError::DuplicateReview {
            user_id: key.user_id,
            product_id: key.product_id,
            order_id: key.order_id,
        }
    }
}

/// Visibility of a review.
#[derive(Enum, Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    /// Displayed and counted toward the product rating.
    #[default]
    Visible,
    /// Excluded from display and rating, e.g. while awaiting moderation.
    Hidden,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Visible => "visible",
            ReviewStatus::Hidden => "hidden",
        }
    }
}

impl FromStr for ReviewStatus {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "visible" => Ok(ReviewStatus::Visible),
            "hidden" => Ok(ReviewStatus::Hidden),
            _ => Err(ReviewError::InvalidStatus(s.to_string())),
        }
    }
}

impl From<ReviewStatus> for Bson {
    fn from(value: ReviewStatus) -> Self {
        Bson::String(value.as_str().to_string())
    }
}
