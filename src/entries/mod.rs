//! Storage of sessions is organized through [store::EntryStore].
//! The basic idea is:
//!  - Every session ever recorded lives in one mapping from a local calendar day to the sessions
//!    of that day.
//!  - The mapping is persisted as a whole through an [repository::EntryRepository], by default a
//!    single JSON file.
//!  - [cases::DailyCases] is the list a front end displays and edits, it talks to the store.

pub mod cases;
pub mod entities;
pub mod repository;
pub mod store;
