//! HTTP access to the upstream release feed

pub mod client;
