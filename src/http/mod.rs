//! Minimal HTTP/1.1 server for the setup portal.
//!
//! Requests are read byte by byte ([`reader`]), parsed into [`HttpRequest`]
//! ([`request`]), routed to a [`Handler`] and answered with an
//! [`HttpResponse`] ([`response`]). Every response closes the connection.

pub mod reader;
pub mod request;
pub mod response;
pub mod server;

pub use request::{
    parse_form, percent_decode, read_request, HttpRequest, RequestError, MAX_BODY_LEN, MAX_HEADERS,
};
pub use response::{HttpResponse, StatusCode};
pub use server::{dispatch, handle_connection, Handler, HandlerResult, HttpServer};
