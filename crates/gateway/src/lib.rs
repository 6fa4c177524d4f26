//! HTTP surface and configuration for the kube gateway server

pub mod api;
pub mod config;
