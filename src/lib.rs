pub mod address;
pub mod captions;
pub mod config;
pub mod error;
pub mod folders;
pub mod http;
pub mod images;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod retry;
pub mod scrapers;
pub mod storage;
