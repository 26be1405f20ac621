//! Wire protocol: framing constants, the startup handshake, and the two
//! frontend message types the proxy parses (`Query`, `Parse`). Everything
//! else moves through the proxy as opaque bytes.

pub mod constants;
pub mod frontend;
pub mod notice;
pub mod socket;

pub use frontend::{encode_query, read_frontend_message, FrontendMessage, ParseMessage, RawMessage};
pub use notice::{line_diff, rewrite_failed_notice, rewritten_notice};
pub use socket::{read_exact, read_message_header, write_all};
pub use startup::{read_startup, StartupRequest};

mod startup;
