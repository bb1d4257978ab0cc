use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use bson::Uuid;
use log::{debug, warn};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{aggregation::SharedReviewService, error::ReviewError, graphql::model::order::Order};

const PUBSUB_NAME: &str = "pubsub";
const TOPIC_EVENT_ROUTE: &str = "/on-topic-event";
const PRODUCT_CREATED_TOPIC: &str = "catalog/product/created";
const USER_CREATED_TOPIC: &str = "user/user/created";
const ORDER_FULFILLED_TOPIC: &str = "order/order/fulfilled";

/// Data to send to Dapr in order to describe a subscription.
#[derive(Serialize, Debug, PartialEq)]
pub struct Pubsub {
    #[serde(rename(serialize = "pubsubName"))]
    pub pubsubname: String,
    pub topic: String,
    pub route: String,
}

impl Pubsub {
    fn on_topic_event(topic: &str) -> Self {
        Self {
            pubsubname: PUBSUB_NAME.to_string(),
            topic: topic.to_string(),
            route: TOPIC_EVENT_ROUTE.to_string(),
        }
    }
}

/// Reponse data to send to Dapr when receiving an event.
#[derive(Serialize, Debug)]
pub struct TopicEventResponse {
    pub status: u8,
}

/// Default status is `0` -> Ok, according to Dapr specs.
impl Default for TopicEventResponse {
    fn default() -> Self {
        Self { status: 0 }
    }
}

/// Relevant part of Dapr event wrapped in a cloud envelope.
#[derive(Deserialize, Debug)]
pub struct Event<T> {
    pub topic: String,
    pub data: T,
}

/// Relevant part of product and user creation event data.
#[derive(Deserialize, Debug)]
pub struct EventData {
    pub id: Uuid,
}

/// Relevant part of order fulfillment event data.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderEventData {
    /// Order UUID.
    pub id: Uuid,
    /// UUID of the user who placed the order.
    pub user_id: Uuid,
    /// UUIDs of the ordered products.
    pub product_ids: Vec<Uuid>,
}

impl From<OrderEventData> for Order {
    fn from(data: OrderEventData) -> Self {
        Order {
            _id: data.id,
            user_id: data.user_id,
            product_ids: data.product_ids,
        }
    }
}

/// Returns Router that establishes connection to Dapr.
///
/// Adds endpoints to define pub/sub interaction with Dapr.
pub fn router(service: SharedReviewService) -> Router {
    Router::new()
        .route("/dapr/subscribe", get(list_topic_subscriptions))
        .route(TOPIC_EVENT_ROUTE, post(on_topic_event))
        .with_state(service)
}

/// HTTP endpoint to list topic subsciptions.
pub async fn list_topic_subscriptions() -> Json<Vec<Pubsub>> {
    Json(
        [USER_CREATED_TOPIC, PRODUCT_CREATED_TOPIC, ORDER_FULFILLED_TOPIC]
            .into_iter()
            .map(Pubsub::on_topic_event)
            .collect(),
    )
}

/// HTTP endpoint to receive events.
///
/// * `service` - Review service registering the announced objects.
/// * `event` - Event handled by endpoint.
pub async fn on_topic_event(
    State(service): State<SharedReviewService>,
    Json(event): Json<Event<Value>>,
) -> Result<Json<TopicEventResponse>, StatusCode> {
    debug!("{:?}", event);

    let registered = match event.topic.as_str() {
        USER_CREATED_TOPIC => {
            let data: EventData = parse_event_data(event.data)?;
            service.register_user(data.id).await
        }
        PRODUCT_CREATED_TOPIC => {
            let data: EventData = parse_event_data(event.data)?;
            service.register_product(data.id).await
        }
        ORDER_FULFILLED_TOPIC => {
            let data: OrderEventData = parse_event_data(event.data)?;
            service.register_order(data.into()).await
        }
        topic => {
            warn!("Received event of unsubscribed topic: `{}`.", topic);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    registered.map_err(|e: ReviewError| {
        warn!("Handling event of topic: `{}` failed: {}", event.topic, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(TopicEventResponse::default()))
}

fn parse_event_data<T: DeserializeOwned>(data: Value) -> Result<T, StatusCode> {
    serde_json::from_value(data).map_err(|e| {
        warn!("Rejected malformed event data: {}", e);
        StatusCode::BAD_REQUEST
    })
}
