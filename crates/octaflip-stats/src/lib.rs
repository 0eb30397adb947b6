//! Small statistics toolkit used by the training safeguards.
//!
//! - [`descriptive`]: summary of a batch of values (min, max, mean, median, deviation)
//! - [`window`]: bounded rolling window over the most recent values
//! - [`trend`]: least-squares slope of a series
//!
//! # Example
//!
//! ```
//! use octaflip_stats::{trend, window::RollingWindow};
//!
//! let mut losses = RollingWindow::new(3);
//! for loss in [9.0, 7.0, 5.0, 3.0] {
//!     losses.push(loss);
//! }
//! assert_eq!(losses.mean(), Some(5.0));
//! assert!(trend::slope(losses.iter()).unwrap() < 0.0);
//! ```

pub mod descriptive;
pub mod trend;
pub mod window;
