use super::s11n::Role;

/// Per-session settings, fixed before the begin-request record goes out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Identifier carried in every record header of the request. Zero is reserved for
    /// management records.
    pub request_id: u16,
    pub role: Role,
    /// Ask the server to keep the connection open once the response completes.
    ///
    /// When this is off the server closes the connection after END_REQUEST, which is what ends
    /// `Session::drain`. When it is on, `drain` stops at the END_REQUEST for this request instead.
    pub keep_connection: bool,
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig {
            request_id: 1,
            role: Role::Responder,
            keep_connection: false,
        }
    }
}

impl SessionConfig {
    pub fn with_request_id(mut self, request_id: u16) -> SessionConfig {
        self.request_id = request_id;
        self
    }

    pub fn with_role(mut self, role: Role) -> SessionConfig {
        self.role = role;
        self
    }

    pub fn with_keep_connection(mut self, keep_connection: bool) -> SessionConfig {
        self.keep_connection = keep_connection;
        self
    }
}
