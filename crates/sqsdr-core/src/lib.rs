//! # sqsdr-core
//!
//! Core library for moving messages between AWS SQS queues without losing them.
//!
//! Messages are received in batches, split between two sinks by a chooser,
//! and only deleted from their source queue once a sink has confirmed them.
//!
//! ## Features
//!
//! - **Redrive**: Move every message, or only those matching a filter, to another queue
//! - **Dump**: Write every message of a queue to disk while leaving the queue intact
//! - **Filtering**: Match message bodies with a regular expression, optionally after
//!   narrowing JSON bodies down with a JMESPath expression
//! - **Send**: Push raw message bodies into a queue in batches
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sqsdr::{FilterChooser, QueueRef, Redrive, SqsQueueService};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> sqsdr::Result<()> {
//! let config = aws_config::from_env().load().await;
//! let service = Arc::new(SqsQueueService::from_config(config));
//!
//! let source = QueueRef::resolve("orders-dlq", service.clone()).await?;
//! let destination = QueueRef::resolve("orders", service).await?;
//!
//! Redrive::new(source, destination)
//!     .with_filter(FilterChooser::new(Some("detail.type"), "OrderPlaced")?)
//!     .redrive(&CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod chooser;
mod client;
mod dump;
mod error;
mod fallthrough;
mod handler;
pub mod memory;
mod message;
mod pipeline;
mod poller;
mod redrive;
mod send;
mod sink;
mod sqs;

pub use chooser::*;
pub use client::*;
pub use dump::*;
pub use error::*;
pub use fallthrough::*;
pub use handler::*;
pub use message::*;
pub use pipeline::*;
pub use poller::{Poller, PollerConfig};
pub use redrive::*;
pub use send::*;
pub use sink::*;
pub use sqs::*;
