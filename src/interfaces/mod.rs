//! Inbound adapters. The HTTP API is the only one.

pub mod http;
