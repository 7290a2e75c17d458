//! A blocking FastCGI client: frames one request as FastCGI records, sends it to an
//! application server such as php-fpm, and streams the response back out.
//!
//! ```no_run
//! use fastcgi_client::Session;
//!
//! # fn main() -> fastcgi_client::Result<()> {
//! let mut session = Session::new();
//! session.connect("127.0.0.1", 9000)?;
//! session.begin_request()?;
//! session.send_param("SCRIPT_FILENAME", "/var/www/index.php")?;
//! session.send_param("REQUEST_METHOD", "GET")?;
//! session.end_params()?;
//! session.end_body()?;
//!
//! let mut response = Vec::new();
//! session.drain(|bytes| response.extend_from_slice(bytes))?;
//! session.close();
//! # Ok(())
//! # }
//! ```

extern crate byteorder;
extern crate bytes;
#[macro_use] extern crate enum_primitive;
#[macro_use] extern crate log;
extern crate thiserror;

mod config;
mod error;
mod lowlevel;
mod s11n;
mod session;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use lowlevel::{RecordHeader, BeginRequest, EndRequest, encode_header, encode_begin_request,
                   encode_name_value, encode_record, name_value_size};
pub use s11n::{FASTCGI_VERSION, HEADER_LEN, MAX_CONTENT_LENGTH, FCGI_KEEP_CONN, RecordType, Role,
               ProtocolStatus};
pub use session::{Session, State};
