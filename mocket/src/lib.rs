//! A fake SQL driver backend for tests.
//!
//! Code under test talks to a [`Conn`] as if it were a database. Every
//! statement is matched against the expectations registered in a
//! [`Catcher`], and answered with their canned rows, affected-row count,
//! error or simulated connection failure.
//!
//! # Usage
//!
//! Register expectations on a shared catcher:
//!
//! ```ignore
//! let catcher = Arc::new(mocket::Catcher::new());
//! catcher.register(
//!     Expectation::new()
//!         .with_query("SELECT * FROM users")
//!         .with_reply([record! { "id" => 1, "name" => "a" }]),
//! );
//! ```
//!
//! Hand a connection to the code under test, and reset the catcher between
//! tests:
//!
//! ```ignore
//! let conn = mocket::Conn::new(catcher.clone());
//! let mut cursor = conn.query("SELECT * FROM users", &[])?;
//! ...
//! catcher.reset();
//! ```
//!
//! Queries that match no expectation get an empty result rather than an
//! error; [`Catcher::misses`] counts them. Use [`Catcher::strict`] to make
//! them fail instead.

pub mod catcher;
pub mod conn;
pub mod driver;
pub mod error;
pub mod fault;
pub mod result;
pub mod rows;
pub mod statement;
mod substitution;
pub mod value;

pub use self::catcher::*;
pub use self::conn::*;
pub use self::driver::*;
pub use self::error::*;
pub use self::fault::*;
pub use self::result::*;
pub use self::rows::*;
pub use self::statement::*;
pub use self::value::*;
