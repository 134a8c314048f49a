//! # StreamWeave Pipeline
//!
//! Fan-out/fan-in concurrent pipelines over tokio channels.
//!
//! A [`Pipeline`] chains user-supplied transforms ("stages") so that items
//! flow from an input stream through every stage to a final drain. Each stage
//! can be replicated across several concurrent workers that read the same
//! upstream stream; their outputs are merged back into one stream before the
//! next stage.
//!
//! ## Key Features
//!
//! - **Fan-Out**: Any stage can run on N workers sharing one input stream
//! - **Fan-In**: [`merge_streams`] combines any number of streams, closing the
//!   result exactly once after every input is drained
//! - **Filtering**: A transform returning `None` drops the item
//! - **Completion Signal**: [`Pipeline::run`] returns immediately with a
//!   [`Completion`] that fires once the run has fully drained
//! - **Reusable**: One pipeline can be run many times, concurrently
//! - **Extensible**: Raw stages plug arbitrary stream-to-stream functions in
//!
//! Order is preserved end to end only when every stage has fan-out 1.
//!
//! ## Quick Start
//!
//! ```rust
//! use streamweave_pipeline::Pipeline;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), streamweave_pipeline::PipelineError> {
//! let mut pipeline = Pipeline::new();
//! pipeline
//!   .add_stage(|x: i32| Some(x + 1))
//!   .add_stage_with_fan_out(|x: i32| (x % 2 == 0).then_some(x), 3);
//!
//! let (tx, rx) = mpsc::channel(16);
//! let completion = pipeline.run(rx);
//! for n in 0..10 {
//!   tx.send(n).await.ok();
//! }
//! drop(tx);
//!
//! let report = completion.wait().await?;
//! assert_eq!(report.items_drained, 5);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Completion signal and run state for pipeline runs.
pub mod completion;
/// Pipeline configuration.
pub mod config;
/// Errors reported by pipeline runs.
pub mod error;
/// Fan-in of several streams into one.
pub mod merge;
/// Pipeline construction and execution.
pub mod pipeline;
mod run;
/// Pipeline stages: fanned transforms and raw stream functions.
pub mod stage;
/// Stream primitives built on tokio channels.
pub mod stream;
/// The per-item transform seam.
pub mod transform;
/// Workers applying a transform to one stream.
pub mod worker;

pub use completion::{Completion, RunReport, RunState};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use merge::{merge_streams, merge_streams_with_capacity};
pub use pipeline::Pipeline;
pub use stage::{RawStageFn, Stage};
pub use stream::SharedReceiver;
pub use transform::{Transform, async_transform_fn, transform_fn};

#[cfg(test)]
mod error_test;
#[cfg(test)]
mod stage_test;
#[cfg(test)]
mod worker_test;
