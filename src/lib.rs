//! An HTTP-accessed revision store for text configuration and script
//! resources.
//!
//! Each named repository maps a URL prefix onto a local directory; every
//! write creates a new immutable revision, and symbolic tags select
//! revisions for read-back. The revision engine itself lives in the
//! `filedepot-revision` crate; this crate routes HTTP requests onto it.

pub mod discovery;
pub mod repository;
pub mod service;
pub mod visibility;
