//! REST endpoints of the review service.

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, State},
    http::{HeaderMap, StatusCode},
    routing::{get, put},
};
use bson::{DateTime, Uuid};
use serde::{Deserialize, Serialize};

use crate::{
    aggregation::{
        NewReviewInput, ProductReviewListing, ReviewContent, ReviewPatch, SharedReviewService,
    },
    authentication::{CallerIdentity, require_admin},
    error::ReviewError,
    graphql::model::{
        connection::ReviewConnection, page::PageRequest, rating::RatingCounts, review::Review,
    },
};

/// JSON request body whose rejections render as `VALIDATION_ERROR`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ReviewError))]
pub struct JsonBody<T>(pub T);

/// Path parameters whose rejections render as `VALIDATION_ERROR`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ReviewError))]
pub struct Path<T>(pub T);

/// Query string whose rejections render as `VALIDATION_ERROR`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ReviewError))]
pub struct Query<T>(pub T);

/// Review as rendered by the REST endpoints.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub id: String,
    pub user_id: String,
    pub product_id: String,
    pub order_id: String,
    pub rating: u8,
    pub title: String,
    pub comment: String,
    pub images: Vec<String>,
    pub status: &'static str,
    pub verified_purchase: bool,
    pub created_at: String,
    pub last_updated_at: String,
}

impl From<Review> for ReviewResponse {
    fn from(review: Review) -> Self {
        Self {
            id: review._id.to_string(),
            user_id: review.user_id.to_string(),
            product_id: review.product_id.to_string(),
            order_id: review.order_id.to_string(),
            rating: review.rating.stars(),
            title: review.title,
            comment: review.comment,
            images: review.images,
            status: review.status.as_str(),
            verified_purchase: review.verified_purchase,
            created_at: rfc3339(review.created_at),
            last_updated_at: rfc3339(review.last_updated_at),
        }
    }
}

fn rfc3339(timestamp: DateTime) -> String {
    timestamp
        .try_to_rfc3339_string()
        .unwrap_or_else(|_| timestamp.timestamp_millis().to_string())
}

/// One page of reviews.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPage {
    pub reviews: Vec<ReviewResponse>,
    pub page: u64,
    pub limit: u32,
    pub total_count: u64,
    pub has_next_page: bool,
}

impl ProductReviewsResponse {
    fn new(listing: ProductReviewListing, request: PageRequest) -> Self {
        Self {
            page: ReviewPage::new(listing.reviews, request),
            average_rating: listing.summary.average_rating,
            review_count: listing.summary.review_count,
            rating_counts: listing.summary.rating_counts,
        }
    }
}

impl ReviewPage {
    fn new(connection: ReviewConnection, request: PageRequest) -> Self {
        Self {
            reviews: connection.nodes.into_iter().map(ReviewResponse::from).collect(),
            page: request.skip / u64::from(request.first) + 1,
            limit: request.first,
            total_count: connection.total_count,
            has_next_page: connection.has_next_page,
        }
    }
}

/// Visible reviews of a product together with its rating aggregate.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProductReviewsResponse {
    #[serde(flatten)]
    pub page: ReviewPage,
    pub average_rating: f64,
    pub review_count: u64,
    pub rating_counts: RatingCounts,
}

#[derive(Deserialize, Debug)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProductReviewsParams {
    pub product_id: Option<uuid::Uuid>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdminReviewParams {
    pub review_id: Option<uuid::Uuid>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReviewBody {
    pub product_id: Option<uuid::Uuid>,
    pub order_id: Option<uuid::Uuid>,
    pub rating: Option<i64>,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub images: Option<Vec<String>>,
}

impl From<SubmitReviewBody> for NewReviewInput {
    fn from(body: SubmitReviewBody) -> Self {
        NewReviewInput {
            product_id: body.product_id.map(bson_uuid),
            order_id: body.order_id.map(bson_uuid),
            rating: body.rating,
            content: ReviewContent {
                title: body.title,
                comment: body.comment,
                images: body.images,
            },
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReviewBody {
    pub rating: Option<i64>,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub images: Option<Vec<String>>,
    pub status: Option<String>,
}

impl From<UpdateReviewBody> for ReviewPatch {
    fn from(body: UpdateReviewBody) -> Self {
        ReviewPatch {
            rating: body.rating,
            content: ReviewContent {
                title: body.title,
                comment: body.comment,
                images: body.images,
            },
            status: body.status,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct VisibilityBody {
    pub status: Option<String>,
}

fn bson_uuid(id: uuid::Uuid) -> Uuid {
    Uuid::from_bytes(id.into_bytes())
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ReviewError> {
    value.ok_or_else(|| ReviewError::Validation(format!("missing required fields: {}", field)))
}

/// Returns the router serving the review REST endpoints.
pub fn router(service: SharedReviewService) -> Router {
    Router::new()
        .route("/reviews", get(list_product_reviews).post(submit_review))
        .route(
            "/reviews/{id}",
            get(get_review).put(update_review).delete(delete_review),
        )
        .route(
            "/admin/reviews",
            put(set_review_visibility).delete(admin_delete_review),
        )
        .route("/users/{id}/reviews", get(list_user_reviews))
        .with_state(service)
}

async fn submit_review(
    State(service): State<SharedReviewService>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<SubmitReviewBody>,
) -> Result<(StatusCode, Json<ReviewResponse>), ReviewError> {
    let caller = CallerIdentity::from_headers(&headers);
    let review = service.submit_review(caller.as_ref(), body.into()).await?;
    Ok((StatusCode::CREATED, Json(review.into())))
}

async fn list_product_reviews(
    State(service): State<SharedReviewService>,
    Query(params): Query<ProductReviewsParams>,
) -> Result<Json<ProductReviewsResponse>, ReviewError> {
    let product_id = bson_uuid(required(params.product_id, "productId")?);
    let request = PageRequest::from_page(params.page, params.limit);
    let listing = service.product_review_listing(product_id, request).await?;
    Ok(Json(ProductReviewsResponse::new(listing, request)))
}

async fn get_review(
    State(service): State<SharedReviewService>,
    headers: HeaderMap,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<ReviewResponse>, ReviewError> {
    let caller = CallerIdentity::from_headers(&headers);
    let review = service.review(caller.as_ref(), bson_uuid(id)).await?;
    Ok(Json(review.into()))
}

async fn update_review(
    State(service): State<SharedReviewService>,
    headers: HeaderMap,
    Path(id): Path<uuid::Uuid>,
    JsonBody(body): JsonBody<UpdateReviewBody>,
) -> Result<Json<ReviewResponse>, ReviewError> {
    let caller = CallerIdentity::from_headers(&headers);
    let review = service
        .update_review(caller.as_ref(), bson_uuid(id), body.into())
        .await?;
    Ok(Json(review.into()))
}

async fn delete_review(
    State(service): State<SharedReviewService>,
    headers: HeaderMap,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<ReviewResponse>, ReviewError> {
    let caller = CallerIdentity::from_headers(&headers);
    let review = service.delete_review(caller.as_ref(), bson_uuid(id)).await?;
    Ok(Json(review.into()))
}

async fn set_review_visibility(
    State(service): State<SharedReviewService>,
    headers: HeaderMap,
    Query(params): Query<AdminReviewParams>,
    JsonBody(body): JsonBody<VisibilityBody>,
) -> Result<Json<ReviewResponse>, ReviewError> {
    let caller = CallerIdentity::from_headers(&headers);
    require_admin(caller.as_ref())?;
    let id = bson_uuid(required(params.review_id, "reviewId")?);
    let status = required(body.status, "status")?;
    let review = service.set_visibility(caller.as_ref(), id, &status).await?;
    Ok(Json(review.into()))
}

async fn admin_delete_review(
    State(service): State<SharedReviewService>,
    headers: HeaderMap,
    Query(params): Query<AdminReviewParams>,
) -> Result<Json<ReviewResponse>, ReviewError> {
    let caller = CallerIdentity::from_headers(&headers);
    require_admin(caller.as_ref())?;
    let id = bson_uuid(required(params.review_id, "reviewId")?);
    let review = service.delete_review(caller.as_ref(), id).await?;
    Ok(Json(review.into()))
}

async fn list_user_reviews(
    State(service): State<SharedReviewService>,
    headers: HeaderMap,
    Path(id): Path<uuid::Uuid>,
    Query(params): Query<PageParams>,
) -> Result<Json<ReviewPage>, ReviewError> {
    let caller = CallerIdentity::from_headers(&headers);
    let request = PageRequest::from_page(params.page, params.limit);
    let connection = service
        .user_reviews(caller.as_ref(), bson_uuid(id), request)
        .await?;
    Ok(Json(ReviewPage::new(connection, request)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        aggregation::RatingAggregationService,
        authentication::AUTHORIZED_USER_HEADER,
        config::ServiceConfig,
        graphql::model::order::Order,
        store::MemoryStore,
    };

    struct Harness {
        app: Router,
        service: SharedReviewService,
        product_id: Uuid,
    }

    impl Harness {
        async fn new() -> Self {
            let service: SharedReviewService = Arc::new(RatingAggregationService::new(
                Arc::new(MemoryStore::new()),
                ServiceConfig::default(),
            ));
            let product_id = Uuid::new();
            service.register_product(product_id).await.unwrap();
            Self {
                app: router(service.clone()),
                service,
                product_id,
            }
        }

        async fn order_for(&self, user_id: Uuid) -> Uuid {
            let order_id = Uuid::new();
            self.service
                .register_order(Order {
                    _id: order_id,
                    user_id,
                    product_ids: vec![self.product_id],
                })
                .await
                .unwrap();
            order_id
        }

        async fn send(
            &self,
            method: &str,
            uri: &str,
            caller: Option<(Uuid, &str)>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some((id, role)) = caller {
                request = request.header(
                    AUTHORIZED_USER_HEADER,
                    json!({"id": id.to_string(), "roles": [role]}).to_string(),
                );
            }
            let body = match body {
                Some(body) => {
                    request = request.header("content-type", "application/json");
                    Body::from(body.to_string())
                }
                None => Body::empty(),
            };
            let response = self
                .app
                .clone()
                .oneshot(request.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, json)
        }

        async fn submit(&self, user_id: Uuid, rating: i64) -> Value {
            let order_id = self.order_for(user_id).await;
            let body = json!({
                "productId": self.product_id.to_string(),
                "orderId": order_id.to_string(),
                "rating": rating,
                "title": "Works",
                "images": ["https://img.example.com/1.png"]
            });
            let (status, review) = self
                .send("POST", "/reviews", Some((user_id, "buyer")), Some(body))
                .await;
            assert_eq!(status, StatusCode::CREATED, "{review}");
            review
        }

        async fn listing(&self) -> Value {
            let uri = format!("/reviews?productId={}&page=1&limit=10", self.product_id);
            let (status, listing) = self.send("GET", &uri, None, None).await;
            assert_eq!(status, StatusCode::OK, "{listing}");
            listing
        }
    }

    #[tokio::test]
    async fn submitted_reviews_show_up_with_aggregate_and_histogram() {
        let harness = Harness::new().await;
        let review = harness.submit(Uuid::new(), 5).await;
        assert_eq!(review["rating"], json!(5));
        assert_eq!(review["status"], json!("visible"));
        assert_eq!(review["verifiedPurchase"], json!(true));
        harness.submit(Uuid::new(), 4).await;

        let listing = harness.listing().await;
        assert_eq!(listing["averageRating"], json!(4.5));
        assert_eq!(listing["reviewCount"], json!(2));
        assert_eq!(listing["totalCount"], json!(2));
        assert_eq!(listing["page"], json!(1));
        assert_eq!(
            listing["ratingCounts"],
            json!({"1": 0, "2": 0, "3": 0, "4": 1, "5": 1})
        );
        assert_eq!(listing["reviews"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn submission_errors_map_to_statuses() {
        let harness = Harness::new().await;
        let user_id = Uuid::new();
        let order_id = harness.order_for(user_id).await;
        let body = |rating: Value| {
            json!({
                "productId": harness.product_id.to_string(),
                "orderId": order_id.to_string(),
                "rating": rating
            })
        };

        let (status, error) = harness
            .send("POST", "/reviews", None, Some(body(json!(3))))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error["error"], json!("UNAUTHORIZED"));

        let (status, error) = harness
            .send("POST", "/reviews", Some((user_id, "buyer")), Some(body(json!(0))))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], json!("INVALID_RATING"));

        let (status, error) = harness
            .send("POST", "/reviews", Some((user_id, "buyer")), Some(body(Value::Null)))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], json!("VALIDATION_ERROR"));

        let (status, _) = harness
            .send("POST", "/reviews", Some((user_id, "buyer")), Some(body(json!(3))))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, error) = harness
            .send("POST", "/reviews", Some((user_id, "buyer")), Some(body(json!(3))))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], json!("DUPLICATE_REVIEW"));
    }

    #[tokio::test]
    async fn authors_edit_and_strangers_are_forbidden() {
        let harness = Harness::new().await;
        let author = Uuid::new();
        let review = harness.submit(author, 2).await;
        let uri = format!("/reviews/{}", review["id"].as_str().unwrap());

        let (status, _) = harness
            .send("PUT", &uri, Some((Uuid::new(), "buyer")), Some(json!({"rating": 5})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = harness.send("DELETE", &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, updated) = harness
            .send("PUT", &uri, Some((author, "buyer")), Some(json!({"rating": 5})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["rating"], json!(5));
        assert_eq!(harness.listing().await["averageRating"], json!(5.0));

        let (status, _) = harness.send("DELETE", &uri, Some((author, "buyer")), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, error) = harness.send("GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["error"], json!("NOT_FOUND"));
        assert_eq!(harness.listing().await["reviewCount"], json!(0));
    }

    #[tokio::test]
    async fn admin_routes_moderate_reviews() {
        let harness = Harness::new().await;
        let author = Uuid::new();
        let admin = Uuid::new();
        let review = harness.submit(author, 3).await;
        let uri = format!("/admin/reviews?reviewId={}", review["id"].as_str().unwrap());

        let (status, _) = harness
            .send("PUT", &uri, Some((author, "buyer")), Some(json!({"status": "hidden"})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, error) = harness
            .send("PUT", &uri, Some((admin, "admin")), Some(json!({"status": "archived"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], json!("INVALID_STATUS"));

        let (status, hidden) = harness
            .send("PUT", &uri, Some((admin, "admin")), Some(json!({"status": "hidden"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(hidden["status"], json!("hidden"));
        let listing = harness.listing().await;
        assert_eq!(listing["reviewCount"], json!(0));
        assert_eq!(listing["totalCount"], json!(0));

        let user_uri = format!("/users/{}/reviews", author);
        let (_, own) = harness.send("GET", &user_uri, Some((author, "buyer")), None).await;
        assert_eq!(own["totalCount"], json!(1));
        let (_, public) = harness.send("GET", &user_uri, None, None).await;
        assert_eq!(public["totalCount"], json!(0));

        let (status, _) = harness.send("DELETE", &uri, Some((author, "buyer")), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = harness.send("DELETE", &uri, Some((admin, "admin")), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = harness.send("DELETE", &uri, Some((admin, "admin")), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listing_requires_product_id() {
        let harness = Harness::new().await;
        let (status, error) = harness.send("GET", "/reviews", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], json!("VALIDATION_ERROR"));
    }

    #[tokio::test]
    async fn malformed_requests_are_structured_validation_errors() {
        let harness = Harness::new().await;
        let user_id = Uuid::new();
        let order_id = harness.order_for(user_id).await;
        let fractional = json!({
            "productId": harness.product_id.to_string(),
            "orderId": order_id.to_string(),
            "rating": 4.5
        });

        let (status, error) = harness
            .send("POST", "/reviews", Some((user_id, "buyer")), Some(fractional))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], json!("VALIDATION_ERROR"));
        assert!(error["message"].is_string());

        let (status, error) = harness
            .send(
                "PUT",
                "/reviews/not-a-uuid",
                Some((user_id, "buyer")),
                Some(json!({"rating": 5})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], json!("VALIDATION_ERROR"));

        let uri = format!("/reviews?productId={}&page=first", harness.product_id);
        let (status, error) = harness.send("GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], json!("VALIDATION_ERROR"));
        assert_eq!(harness.listing().await["reviewCount"], json!(0));
    }
}
