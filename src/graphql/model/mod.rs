pub mod connection;
pub mod order;
pub mod page;
pub mod product;
pub mod rating;
pub mod review;
pub mod user;
