//! MongoDB document store.
//!
//! Sessions run multi-document transactions with snapshot reads and majority writes. Two
//! transactions writing the same product aggregate conflict on the product document, so the
//! loser is aborted with a transient error and retried by the coordinator.

use std::collections::HashSet;

use async_trait::async_trait;
use bson::{Document, Uuid, doc};
use futures::TryStreamExt;
use log::warn;
use mongodb::{
    Client, ClientSession, Collection, Database, IndexModel,
    error::{
        Error as MongoError, ErrorKind, TRANSIENT_TRANSACTION_ERROR,
        UNKNOWN_TRANSACTION_COMMIT_RESULT, WriteFailure,
    },
    options::{
        Acknowledgment, ClientOptions, FindOneOptions, FindOptions, IndexOptions, ReadConcern,
        ReplaceOptions, TransactionOptions, UpdateOptions, WriteConcern,
    },
};
use serde::Deserialize;

use super::{
    OrderCollection, ProductCollection, ReviewCollection, ReviewFilter, Store, StoreResult,
    StoreSession, UserCollection,
};
use crate::{
    error::ReviewError,
    graphql::model::{
        connection::ReviewConnection,
        order::Order,
        page::PageRequest,
        product::Product,
        rating::{Rating, RatingAggregate},
        review::{Review, ReviewKey, ReviewStatus},
        user::{User, UserStats},
    },
};

/// Server error code of a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Attempts to commit a transaction whose commit outcome is unknown.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Maps a driver error to the review error taxonomy.
fn store_error(error: MongoError) -> ReviewError {
    error_from_labels(error.labels(), error.to_string())
}

/// Transient transaction errors are conflicts the coordinator retries, anything else
/// means the store is unusable for this operation.
fn error_from_labels(labels: &HashSet<String>, message: String) -> ReviewError {
    if labels.contains(TRANSIENT_TRANSACTION_ERROR) {
        ReviewError::TransactionConflict
    } else {
        ReviewError::StoreUnavailable(message)
    }
}

/// True if a failed commit of the given attempt must be sent again.
fn retries_commit(labels: &HashSet<String>, attempt: u32) -> bool {
    labels.contains(UNKNOWN_TRANSACTION_COMMIT_RESULT) && attempt < MAX_COMMIT_ATTEMPTS
}

fn is_duplicate_key(error: &MongoError) -> bool {
    matches!(
        *error.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Newest first, ties broken by id so pages never overlap.
fn listing_options(page: PageRequest) -> FindOptions {
    FindOptions::builder()
        .sort(doc! {"created_at": -1, "_id": -1})
        .skip(page.skip)
        .limit(i64::from(page.first))
        .build()
}

/// Fields of a product registered without reviews.
fn empty_product_fields() -> Document {
    doc! {"average_rating": 0.0, "review_count": 0_i64}
}

/// Fields of a user registered without reviews.
fn empty_user_fields() -> Document {
    doc! {"stats": {"total_reviews": 0_i64, "last_review_date": null}}
}

/// Store backed by a MongoDB replica set.
#[derive(Clone, Debug)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// Establishes database connection.
    pub async fn connect(uri: &str, database: &str) -> StoreResult<Self> {
        let mut client_options = ClientOptions::parse(uri).await.map_err(store_error)?;
        client_options.app_name = Some("Review".to_string());
        let client = Client::with_options(client_options).map_err(store_error)?;
        let database = client.database(database);
        Ok(Self { client, database })
    }

    fn reviews(&self) -> Collection<Review> {
        self.database.collection::<Review>("reviews")
    }

    /// Creates the unique review key index and the listing index.
    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique_key = IndexModel::builder()
            .keys(doc! {"user_id": 1, "product_id": 1, "order_id": 1})
            .options(IndexOptions::builder().unique(true).build())
            .build();
        let listing = IndexModel::builder()
            .keys(doc! {"product_id": 1, "status": 1, "created_at": -1})
            .build();
        self.reviews()
            .create_indexes([unique_key, listing], None)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl Store for MongoStore {
    type Session = MongoSession;

    async fn begin(&self) -> StoreResult<MongoSession> {
        let mut session = self.client.start_session(None).await.map_err(store_error)?;
        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .build();
        session
            .start_transaction(options)
            .await
            .map_err(store_error)?;
        Ok(MongoSession {
            session,
            reviews: self.reviews(),
            products: self.database.collection::<Product>("products"),
            users: self.database.collection::<User>("users"),
            orders: self.database.collection::<Order>("orders"),
        })
    }
}

/// Relevant part of a review when aggregating ratings.
#[derive(Deserialize)]
struct RatingProjection {
    rating: Rating,
}

/// Session of a [`MongoStore`] with an open transaction.
pub struct MongoSession {
    session: ClientSession,
    reviews: Collection<Review>,
    products: Collection<Product>,
    users: Collection<User>,
    orders: Collection<Order>,
}

#[async_trait]
impl StoreSession for MongoSession {
    async fn commit(&mut self) -> StoreResult<()> {
        let mut attempt = 1;
        loop {
            match self.session.commit_transaction().await {
                Ok(()) => return Ok(()),
                Err(error) if retries_commit(error.labels(), attempt) => {
                    warn!("Commit outcome unknown, retrying commit: {}", error);
                    attempt += 1;
                }
                Err(error) => return Err(store_error(error)),
            }
        }
    }

    async fn abort(&mut self) -> StoreResult<()> {
        self.session.abort_transaction().await.map_err(store_error)
    }
}

#[async_trait]
impl ReviewCollection for MongoSession {
    async fn insert_review(&mut self, review: &Review) -> StoreResult<()> {
        match self
            .reviews
            .insert_one_with_session(review, None, &mut self.session)
            .await
        {
            Ok(_) => Ok(()),
            Err(error) if is_duplicate_key(&error) => Err(review.key().into()),
            Err(error) => Err(store_error(error)),
        }
    }

    async fn find_review(&mut self, id: Uuid) -> StoreResult<Option<Review>> {
        self.reviews
            .find_one_with_session(doc! {"_id": id}, None, &mut self.session)
            .await
            .map_err(store_error)
    }

    async fn find_review_by_key(&mut self, key: ReviewKey) -> StoreResult<Option<Review>> {
        self.reviews
            .find_one_with_session(Document::from(key), None, &mut self.session)
            .await
            .map_err(store_error)
    }

    async fn replace_review(&mut self, review: &Review) -> StoreResult<()> {
        let result = self
            .reviews
            .replace_one_with_session(
                doc! {"_id": review._id},
                review,
                ReplaceOptions::default(),
                &mut self.session,
            )
            .await
            .map_err(store_error)?;
        match result.matched_count {
            0 => Err(ReviewError::not_found("Review", review._id)),
            _ => Ok(()),
        }
    }

    async fn delete_review(&mut self, id: Uuid) -> StoreResult<bool> {
        let result = self
            .reviews
            .delete_one_with_session(doc! {"_id": id}, None, &mut self.session)
            .await
            .map_err(store_error)?;
        Ok(result.deleted_count > 0)
    }

    async fn find_reviews(
        &mut self,
        filter: ReviewFilter,
        page: PageRequest,
    ) -> StoreResult<ReviewConnection> {
        let filter = filter.to_document();
        let total_count = self
            .reviews
            .count_documents_with_session(filter.clone(), None, &mut self.session)
            .await
            .map_err(store_error)?;
        let mut cursor = self
            .reviews
            .find_with_session(filter, listing_options(page), &mut self.session)
            .await
            .map_err(store_error)?;
        let nodes: Vec<Review> = cursor
            .stream(&mut self.session)
            .try_collect()
            .await
            .map_err(store_error)?;
        Ok(ReviewConnection::new(nodes, page.skip, total_count))
    }

    async fn visible_ratings(&mut self, product_id: Uuid) -> StoreResult<Vec<Rating>> {
        let collection = self.reviews.clone_with_type::<RatingProjection>();
        let find_options = FindOptions::builder()
            .projection(doc! {"rating": 1, "_id": 0})
            .build();
        let filter = ReviewFilter::by_product(product_id)
            .with_status(Some(ReviewStatus::Visible))
            .to_document();
        let mut cursor = collection
            .find_with_session(filter, find_options, &mut self.session)
            .await
            .map_err(store_error)?;
        let projections: Vec<RatingProjection> = cursor
            .stream(&mut self.session)
            .try_collect()
            .await
            .map_err(store_error)?;
        Ok(projections.into_iter().map(|p| p.rating).collect())
    }
}

#[async_trait]
impl ProductCollection for MongoSession {
    async fn find_product(&mut self, id: Uuid) -> StoreResult<Option<Product>> {
        self.products
            .find_one_with_session(doc! {"_id": id}, FindOneOptions::default(), &mut self.session)
            .await
            .map_err(store_error)
    }

    async fn register_product(&mut self, id: Uuid) -> StoreResult<()> {
        self.products
            .update_one_with_session(
                doc! {"_id": id},
                doc! {"$setOnInsert": empty_product_fields()},
                UpdateOptions::builder().upsert(true).build(),
                &mut self.session,
            )
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn write_rating_aggregate(
        &mut self,
        product_id: Uuid,
        aggregate: RatingAggregate,
    ) -> StoreResult<()> {
        let result = self
            .products
            .update_one_with_session(
                doc! {"_id": product_id},
                doc! {"$set": {
                    "average_rating": aggregate.average_rating,
                    "review_count": to_i64(aggregate.review_count),
                }},
                None,
                &mut self.session,
            )
            .await
            .map_err(store_error)?;
        match result.matched_count {
            0 => Err(ReviewError::not_found("Product", product_id)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl UserCollection for MongoSession {
    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        self.users
            .find_one_with_session(doc! {"_id": id}, None, &mut self.session)
            .await
            .map_err(store_error)
    }

    async fn register_user(&mut self, id: Uuid) -> StoreResult<()> {
        self.users
            .update_one_with_session(
                doc! {"_id": id},
                doc! {"$setOnInsert": empty_user_fields()},
                UpdateOptions::builder().upsert(true).build(),
                &mut self.session,
            )
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn write_user_stats(&mut self, user_id: Uuid, stats: &UserStats) -> StoreResult<()> {
        self.users
            .update_one_with_session(
                doc! {"_id": user_id},
                doc! {"$set": {
                    "stats.total_reviews": to_i64(stats.total_reviews),
                    "stats.last_review_date": stats.last_review_date,
                }},
                UpdateOptions::builder().upsert(true).build(),
                &mut self.session,
            )
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl OrderCollection for MongoSession {
    async fn find_order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
        self.orders
            .find_one_with_session(doc! {"_id": id}, None, &mut self.session)
            .await
            .map_err(store_error)
    }

    async fn register_order(&mut self, order: &Order) -> StoreResult<()> {
        self.orders
            .replace_one_with_session(
                doc! {"_id": order._id},
                order,
                ReplaceOptions::builder().upsert(true).build(),
                &mut self.session,
            )
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Arc};

    use bson::DateTime;
    use mongodb::error::WriteError;

    use super::*;

    fn labels(labels: &[&str]) -> HashSet<String> {
        labels.iter().map(|label| label.to_string()).collect()
    }

    fn io_error() -> MongoError {
        MongoError::from(ErrorKind::Io(Arc::new(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connection refused",
        ))))
    }

    fn write_error(code: i32) -> MongoError {
        let write_error: WriteError =
            bson::from_document(doc! {"code": code, "errmsg": "write failed"}).unwrap();
        MongoError::from(ErrorKind::Write(WriteFailure::WriteError(write_error)))
    }

    #[test]
    fn transient_transaction_errors_are_conflicts() {
        assert_eq!(
            error_from_labels(&labels(&[TRANSIENT_TRANSACTION_ERROR]), "write conflict".into()),
            ReviewError::TransactionConflict
        );
        assert_eq!(
            error_from_labels(&labels(&["RetryableWriteError"]), "not primary".into()),
            ReviewError::StoreUnavailable("not primary".into())
        );
    }

    #[test]
    fn unlabelled_driver_errors_mean_unavailable_store() {
        let error = io_error();
        assert!(error.labels().is_empty());
        assert!(matches!(
            store_error(error),
            ReviewError::StoreUnavailable(message) if message.contains("connection refused")
        ));
    }

    #[test]
    fn commit_is_retried_only_while_outcome_is_unknown() {
        let unknown = labels(&[UNKNOWN_TRANSACTION_COMMIT_RESULT]);
        assert!(retries_commit(&unknown, 1));
        assert!(retries_commit(&unknown, MAX_COMMIT_ATTEMPTS - 1));
        assert!(!retries_commit(&unknown, MAX_COMMIT_ATTEMPTS));
        assert!(!retries_commit(&labels(&[TRANSIENT_TRANSACTION_ERROR]), 1));
    }

    #[test]
    fn only_code_11000_is_a_duplicate_key() {
        assert!(is_duplicate_key(&write_error(DUPLICATE_KEY_CODE)));
        assert!(!is_duplicate_key(&write_error(112)));
        assert!(!is_duplicate_key(&io_error()));
    }

    #[test]
    fn listing_is_newest_first_and_windowed() {
        let options = listing_options(PageRequest { skip: 20, first: 10 });
        assert_eq!(options.sort, Some(doc! {"created_at": -1, "_id": -1}));
        assert_eq!(options.skip, Some(20));
        assert_eq!(options.limit, Some(10));
    }

    #[test]
    fn registered_documents_read_back_empty() {
        let id = Uuid::new();
        let mut product = empty_product_fields();
        product.insert("_id", id);
        assert_eq!(bson::from_document::<Product>(product).unwrap(), Product::from(id));

        let mut user = empty_user_fields();
        user.insert("_id", id);
        let user: User = bson::from_document(user).unwrap();
        assert_eq!(user.stats, UserStats::default());
    }

    #[test]
    fn aggregate_counters_stored_as_int64_read_as_unsigned() {
        let id = Uuid::new();
        let product: Product = bson::from_document(doc! {
            "_id": id,
            "average_rating": 4.5,
            "review_count": to_i64(2),
        })
        .unwrap();
        assert_eq!(product.review_count, 2);

        let user: User = bson::from_document(doc! {
            "_id": id,
            "stats": {"total_reviews": to_i64(7), "last_review_date": DateTime::from_millis(0)},
        })
        .unwrap();
        assert_eq!(user.stats.total_reviews, 7);
        assert_eq!(user.stats.last_review_date, Some(DateTime::from_millis(0)));

        let without_stats: User = bson::from_document(doc! {"_id": id}).unwrap();
        assert_eq!(without_stats.stats, UserStats::default());
        assert_eq!(to_i64(u64::MAX), i64::MAX);
    }

    #[test]
    fn reviews_round_trip_through_bson() {
        let now = DateTime::now();
        let review = Review {
            _id: Uuid::new(),
            user_id: Uuid::new(),
            product_id: Uuid::new(),
            order_id: Uuid::new(),
            rating: Rating::try_from(4).unwrap(),
            title: "Sturdy".into(),
            comment: "Holds up well.".into(),
            images: vec!["https://img.example.com/1.png".into()],
            status: ReviewStatus::Hidden,
            verified_purchase: true,
            created_at: now,
            last_updated_at: now,
        };

        let document = bson::to_document(&review).unwrap();
        assert_eq!(document.get_str("status").unwrap(), "hidden");
        assert_eq!(document.get_i32("rating").unwrap(), 4);
        assert_eq!(bson::from_document::<Review>(document).unwrap(), review);

        let order = Order {
            _id: Uuid::new(),
            user_id: review.user_id,
            product_ids: vec![review.product_id],
        };
        let document = bson::to_document(&order).unwrap();
        assert_eq!(bson::from_document::<Order>(document).unwrap(), order);
    }

    #[test]
    fn rating_projection_reads_stored_ratings() {
        let projection: RatingProjection = bson::from_document(doc! {"rating": 5}).unwrap();
        assert_eq!(projection.rating, Rating::try_from(5).unwrap());
        assert!(bson::from_document::<RatingProjection>(doc! {"rating": 7}).is_err());
    }
}
