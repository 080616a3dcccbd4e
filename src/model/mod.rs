//! Domain types. Records follow the `Core` / `New` / stored-with-ID pattern:
//! `FooCore` holds the data, `NewFoo` is a `FooCore` awaiting insertion, and
//! `Foo` (or `FooRecord`) carries the assigned `_id`.

pub mod api;
pub mod assertion;
pub mod blob;
pub mod candidate;
pub mod consent;
pub mod enrollment;
pub mod id;
pub mod password;
pub mod session;
pub mod token;
pub mod vote;
pub mod voter;
