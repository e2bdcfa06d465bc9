#![forbid(unsafe_code)]
#![deny(
    clippy::dbg_macro,
    missing_copy_implementations,
    rustdoc::missing_crate_level_docs,
    missing_debug_implementations,
    nonstandard_style,
    unused_qualifications
)]

/*!
# The http implementation for the crow server library

This crate contains the byte-level request parser, the request and response
value types, and the response head writer that the connection layer drives.
It does not open sockets or dispatch to handlers; that is the job of
`crow-server` and `crow` respectively.
*/

mod error;
pub use error::{Error, ParseError, Result};

mod method;
pub use method::Method;

mod status;
pub use status::Status;

mod version;
pub use version::Version;

mod headers;
pub use headers::{HeaderName, HeaderValue, HeaderValues, Headers, KnownHeaderName};

mod query_string;
pub use query_string::QueryString;

mod state;
pub use state::StateMap;

mod parser;
pub use parser::{HttpParser, ParserKind, ParserSink, RequestParser};

mod request;
pub use request::Request;

mod response;
pub use response::{Deferral, Response, StaticFile, content_type_for_path};

mod head;
pub use head::{CONTINUE_RESPONSE, HeadContext, encode_head, finalize, response_has_body};

mod transport;
pub use transport::Transport;

mod http_config;
pub use http_config::HttpConfig;

/// Default value of the `Server` header.
pub const SERVER: &str = concat!("Crow/", env!("CARGO_PKG_VERSION"));
