pub mod chat;
pub mod events;
pub mod facts;
pub mod models;
pub mod request;
pub mod service;
