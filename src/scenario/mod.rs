//! Scenario verification.
//!
//! A scenario describes a small commit graph in YAML, builds it in a
//! throwaway repository, runs the replay against it (in process or through
//! the `git-upstream` binary) and checks the commits that come out.
//!
//! ```text
//!   YAML ──► ScenarioDescription ──► build_graph ──► ScenarioRepo
//!                                                        │ run(invocation)
//!                                                        ▼
//!                                   assert_matches ◄── ActualGraph
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use git_upstream::scenario::{build_graph, ReplayInvocation, ScenarioDescription};
//!
//! let description = ScenarioDescription::from_file("tests/scenarios/basic.yaml")?;
//! let scenario = build_graph(&description)?;
//! scenario.verify(&ReplayInvocation::Direct)?;
//! ```

mod builder;
mod description;
mod error;
mod matcher;
mod runner;

pub use builder::{build_graph, reverse_toposort, ScenarioRepo};
pub use description::{
    copy_source, ExpectedError, Expectations, ParentRef, ReplaySpec, ScenarioDescription, ScenarioMode, HEAD_ROLE,
    UPSTREAM_ROLE,
};
pub use error::{ScenarioError, ScenarioResult};
pub use matcher::{assert_matches, ActualGraph};
pub use runner::ReplayInvocation;
