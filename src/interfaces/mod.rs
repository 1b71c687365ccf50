//! Input/output adapters for the command-line front end.

pub mod json;
