use async_graphql::{EmptySubscription, SDLExportOptions, Schema, extensions::Logger};

use crate::aggregation::SharedReviewService;

pub mod model;
pub mod mutation;
pub mod mutation_input_structs;
pub mod query;

use mutation::Mutation;
use query::Query;

pub type ReviewSchema = Schema<Query, Mutation, EmptySubscription>;

/// Builds the federated schema with the review service in its context data.
pub fn build_schema(service: SharedReviewService) -> ReviewSchema {
    Schema::build(Query, Mutation, EmptySubscription)
        .extension(Logger)
        .data(service)
        .enable_federation()
        .finish()
}

/// Renders the schema in federation SDL.
pub fn schema_sdl() -> String {
    let schema = Schema::build(Query, Mutation, EmptySubscription)
        .enable_federation()
        .finish();
    schema.sdl_with_options(SDLExportOptions::new().federation())
}
