//! Integration tests for the `io` module.

mod io;
