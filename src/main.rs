use std::{
    fs::{self, File},
    io::Write,
    sync::Arc,
};

use anyhow::{Context, bail};
use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Router,
    extract::State,
    http::HeaderMap,
    response::{self, IntoResponse},
    routing::get,
};
use clap::Parser;
use log::info;
use simple_logger::SimpleLogger;
use tokio::net::TcpListener;

mod aggregation;
mod authentication;
mod config;
mod error;
mod graphql;
mod http;
mod store;

use aggregation::{RatingAggregationService, SharedReviewService};
use authentication::CallerIdentity;
use config::{Args, StoreKind};
use graphql::{ReviewSchema, build_schema, schema_sdl};
use store::{MemoryStore, MongoStore};

/// Builds the GraphiQL frontend.
async fn graphiql() -> impl IntoResponse {
    response::Html(GraphiQLSource::build().endpoint("/").finish())
}

/// Describes the handler for GraphQL requests.
///
/// Parses the "Authorized-User" header and writes the caller identity in the context data
/// of the specific request. Then executes the GraphQL schema with the request.
async fn graphql_handler(
    State(schema): State<ReviewSchema>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let mut req = req.into_inner();
    if let Some(caller) = CallerIdentity::from_headers(&headers) {
        req = req.data(caller);
    }
    schema.execute(req).await.into()
}

/// Activates logger and parses arguments for optional schema generation. Otherwise starts the
/// GraphQL, REST and Dapr server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    SimpleLogger::new().with_level(args.log_level).init()?;

    if args.generate_schema {
        fs::create_dir_all("./schemas")?;
        let mut file = File::create("./schemas/review.graphql")?;
        file.write_all(schema_sdl().as_bytes())?;
        info!("GraphQL schema: ./schemas/review.graphql was successfully generated!");
        return Ok(());
    }
    let service = build_service(&args).await?;
    start_service(service, args.port).await
}

/// Connects the configured store and builds the review service on top of it.
async fn build_service(args: &Args) -> anyhow::Result<SharedReviewService> {
    let config = args.service_config();
    let service: SharedReviewService = match args.store {
        StoreKind::Mongo => {
            let Some(uri) = args.mongodb_uri.as_deref() else {
                bail!("$MONGODB_URI is not set.");
            };
            let store = MongoStore::connect(uri, &args.database)
                .await
                .context("Connecting to MongoDB failed")?;
            store
                .ensure_indexes()
                .await
                .context("Creating MongoDB indexes failed")?;
            Arc::new(RatingAggregationService::new(Arc::new(store), config))
        }
        StoreKind::Memory => {
            info!("Using in-memory store, data is lost on shutdown.");
            Arc::new(RatingAggregationService::new(
                Arc::new(MemoryStore::new()),
                config,
            ))
        }
    };
    Ok(service)
}

/// Starts review service on the given port.
async fn start_service(service: SharedReviewService, port: u16) -> anyhow::Result<()> {
    let schema = build_schema(service.clone());

    let graphiql = Router::new()
        .route("/", get(graphiql).post(graphql_handler))
        .with_state(schema);
    let app = Router::new()
        .merge(graphiql)
        .merge(http::review_routes::router(service.clone()))
        .merge(http::event_service::router(service));

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("GraphiQL IDE: http://0.0.0.0:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
