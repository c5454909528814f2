//! CVS data structures and export algorithms
//!
//! This module contains the model the merge phase hands over and the
//! algorithms that turn it into a stream plan:
//!
//! - `atom`: name interning and Bloom fingerprints
//! - `authors`: author identities and timezone resolution
//! - `dag`: file revisions, commits, branch heads, tags
//! - `fileops`: per-commit Modify/Delete computation and path ordering
//! - `matcher`: parent-link resolution between a commit and its parent
//! - `planner`: commit ordering (fast and canonical)

pub mod atom;
pub mod authors;
pub mod dag;
pub mod fileops;
pub mod matcher;
pub mod planner;
