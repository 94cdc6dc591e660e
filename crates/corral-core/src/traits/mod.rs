// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for Corral plugins.
//!
//! All adapters implement the base [`PluginAdapter`] trait plus one
//! specialized trait for their role in the pipeline.

pub mod adapter;
pub mod processor;
pub mod store;
pub mod transport;

pub use adapter::PluginAdapter;
pub use processor::{HeartbeatSink, ProcessorAdapter};
pub use store::BatchStore;
pub use transport::TransportAdapter;
