use async_graphql::SimpleObject;

use super::review::Review;

/// A connection of reviews.
#[derive(Debug, SimpleObject, Clone, PartialEq)]
#[graphql(shareable)]
pub struct ReviewConnection {
    /// The resulting entities.
    pub nodes: Vec<Review>,
    /// Whether this connection has a next page.
    pub has_next_page: bool,
    /// The total amount of items in this connection.
    pub total_count: u64,
}

impl ReviewConnection {
    /// Wraps one page of `total_count` matching reviews that started at `skip`.
    pub fn new(nodes: Vec<Review>, skip: u64, total_count: u64) -> Self {
        let has_next_page = skip + (nodes.len() as u64) < total_count;
        Self {
            nodes,
            has_next_page,
            total_count,
        }
    }
}
