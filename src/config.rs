//! # Pipeline Configuration
//!
//! Settings shared by every run of a [`Pipeline`](crate::pipeline::Pipeline).
//!
//! The configuration holds a display name used in logs and
//! the capacity of every channel the core creates while wiring a run. Stream
//! capacity is the only backpressure knob the engine offers; a full channel
//! suspends its producer until a consumer makes room.
//!
//! ## Example
//!
//! ```rust
//! use std::num::NonZeroUsize;
//! use streamweave_pipeline::config::PipelineConfig;
//!
//! let config = PipelineConfig::default()
//!   .with_name("ingest".to_string())
//!   .with_channel_capacity(NonZeroUsize::new(32).unwrap());
//! assert_eq!(config.name(), Some("ingest".to_string()));
//! assert_eq!(config.channel_capacity().get(), 32);
//! ```

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// Channel capacity used when none is configured.
///
/// A single slot keeps hand-off between neighbouring tasks close to a
/// rendezvous: a producer can run at most one item ahead of its consumer.
pub const DEFAULT_CHANNEL_CAPACITY: NonZeroUsize = NonZeroUsize::MIN;

/// Configuration for a pipeline and every run started from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Optional name for identifying the pipeline in logs.
  pub name: Option<String>,
  /// Capacity of each channel created by the core during a run.
  pub channel_capacity: NonZeroUsize,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      name: None,
      channel_capacity: DEFAULT_CHANNEL_CAPACITY,
    }
  }
}

impl PipelineConfig {
  /// Sets the name for this pipeline configuration.
  ///
  /// # Arguments
  ///
  /// * `name` - The name to assign to the pipeline.
  pub fn with_name(mut self, name: String) -> Self {
    self.name = Some(name);
    self
  }

  /// Sets the capacity of the channels created for each run.
  ///
  /// # Arguments
  ///
  /// * `capacity` - Number of items a channel buffers before its producer suspends.
  pub fn with_channel_capacity(mut self, capacity: NonZeroUsize) -> Self {
    self.channel_capacity = capacity;
    self
  }

  /// Returns the current name, if set.
  pub fn name(&self) -> Option<String> {
    self.name.clone()
  }

  /// Returns the configured channel capacity.
  pub fn channel_capacity(&self) -> NonZeroUsize {
    self.channel_capacity
  }

  /// Name used in log spans when no explicit name was configured.
  pub(crate) fn display_name(&self) -> &str {
    self.name.as_deref().unwrap_or("pipeline")
  }
}
