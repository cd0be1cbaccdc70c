//! Hand-written SQL mapping the `user` and `role` tables onto the model structs.
//! Every function runs on a caller-supplied connection so it can take part in a
//! [`DbSession`](crate::database::DbSession) transaction.

pub mod roles;
pub mod users;
