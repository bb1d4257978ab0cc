use async_graphql::{InputValueError, InputValueResult, Scalar, ScalarType, SimpleObject, Value};
use bson::Bson;
use serde::{Deserialize, Serialize};

use crate::error::ReviewError;

/// Rating of a review in 1-5 stars.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i32")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn stars(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = ReviewError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(stars) if (Self::MIN..=Self::MAX).contains(&stars) => Ok(Self(stars)),
            _ => Err(ReviewError::InvalidRating(value)),
        }
    }
}

impl From<Rating> for i32 {
    fn from(value: Rating) -> Self {
        i32::from(value.0)
    }
}

impl From<Rating> for Bson {
    fn from(value: Rating) -> Self {
        Bson::Int32(value.into())
    }
}

/// Integer scalar restricted to 1-5 stars.
#[Scalar]
impl ScalarType for Rating {
    fn parse(value: Value) -> InputValueResult<Self> {
        if let Value::Number(number) = &value {
            if let Some(raw) = number.as_i64() {
                return Rating::try_from(raw).map_err(InputValueError::custom);
            }
        }
        Err(InputValueError::expected_type(value))
    }

    fn to_value(&self) -> Value {
        Value::Number(i32::from(*self).into())
    }
}

/// Denormalized rating fields of a product.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct RatingAggregate {
    pub average_rating: f64,
    pub review_count: u64,
}

impl RatingAggregate {
    /// Mean rating rounded half-up to one decimal place, `0` for an empty set.
    ///
    /// Rounding is done on integers so that ties such as `1.25` always round up.
    pub fn from_ratings<I>(ratings: I) -> Self
    where
        I: IntoIterator<Item = Rating>,
    {
        let (sum, count) = ratings
            .into_iter()
            .fold((0u64, 0u64), |(sum, count), rating| {
                (sum + u64::from(rating.stars()), count + 1)
            });
        if count == 0 {
            return Self::default();
        }
        let tenths = (sum * 20 + count) / (2 * count);
        Self {
            average_rating: tenths as f64 / 10.0,
            review_count: count,
        }
    }
}

/// Number of visible reviews with a specific rating.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, SimpleObject)]
pub struct RatingCount {
    /// Rating in 1-5 stars.
    pub rating: u8,
    /// Number of visible reviews with this rating.
    pub count: u64,
}

/// Histogram of visible ratings, one bucket per star.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RatingCounts([u64; 5]);

impl RatingCounts {
    pub fn from_ratings<I>(ratings: I) -> Self
    where
        I: IntoIterator<Item = Rating>,
    {
        let mut buckets = [0u64; 5];
        for rating in ratings {
            buckets[usize::from(rating.stars() - Rating::MIN)] += 1;
        }
        Self(buckets)
    }

    pub fn get(&self, stars: u8) -> u64 {
        match stars {
            Rating::MIN..=Rating::MAX => self.0[usize::from(stars - Rating::MIN)],
            _ => 0,
        }
    }

    pub fn buckets(&self) -> Vec<RatingCount> {
        (Rating::MIN..=Rating::MAX)
            .map(|rating| RatingCount {
                rating,
                count: self.get(rating),
            })
            .collect()
    }
}

/// Serialized as `{"1": n, ..., "5": n}`.
impl Serialize for RatingCounts {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_map(
            (Rating::MIN..=Rating::MAX).map(|stars| (stars.to_string(), self.get(stars))),
        )
    }
}
