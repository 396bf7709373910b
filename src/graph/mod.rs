//! Commit graph model and range resolution.
//!
//! [`CommitGraph`] is a read-only view over a [`GitRepository`](crate::storage::GitRepository);
//! [`RangeResolver`] uses it to work out which commits need replaying.
//!
//! ```ignore
//! use git_upstream::graph::{CommitGraph, RangeResolver};
//!
//! let graph = CommitGraph::new(repo);
//! let upstream = graph.resolve("upstream/master")?;
//! let head = graph.resolve("master")?;
//!
//! let range = RangeResolver::new(graph).resolve(upstream, head, None)?;
//! for commit in &range {
//!     println!("{} {}", commit.id.short(), commit.subject());
//! }
//! ```

mod error;
mod model;
mod range;

pub use error::{GraphError, GraphResult};
pub use model::{CommitGraph, CommitRange};
pub use range::RangeResolver;
