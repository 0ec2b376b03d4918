//! [`ImportTarget`](super::ImportTarget) implementations, one per data type.

mod class;
mod grade;
mod inventory;
mod student;
mod teacher;
mod transaction;
mod user;
