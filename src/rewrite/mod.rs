//! The rewriter contract: a per-session [`Rewriter`] produced by a shared
//! [`RewriterFactory`], each implementing two pure string transforms.

use crate::errors::RewriteError;

pub mod lua;
pub mod substring;

/// Per-session query rewriter. Holds whatever state a session's rewriter
/// needs (e.g. a Lua interpreter); a fresh one is created per connection so
/// sessions never share interpreter state.
pub trait Rewriter: Send {
    /// Rewrite the SQL text of a simple `Query` message.
    fn rewrite_query(&mut self, sql: &str) -> Result<String, RewriteError>;

    /// Rewrite the SQL text of an extended-query `Parse` message.
    fn rewrite_parse(&mut self, sql: &str) -> Result<String, RewriteError>;
}

/// Shared across all sessions; produces one [`Rewriter`] per accepted
/// connection.
pub trait RewriterFactory: Send + Sync {
    fn new_rewriter(&self) -> Result<Box<dyn Rewriter>, RewriteError>;
}
