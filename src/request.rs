//! The one request the probe ever sends.

/// Path of the status document on the uplink server.
pub const STATUS_PATH: &str = "/satellite_uplink_status.txt";

/// The request written after every successful handshake.
pub const STATUS_REQUEST: &str = concat!(
    "GET /satellite_uplink_status.txt HTTP/1.1\r\n",
    "Host: localhost\r\n",
    "Connection: close\r\n",
    "\r\n"
);
