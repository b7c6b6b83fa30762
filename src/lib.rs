//! Folio: a community blog of posts, groups, comments and author follow feeds.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
