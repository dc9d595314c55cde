//! Outbound command strings
//!
//! Every request to the miniserver is a plain text frame. The handshake
//! commands are fixed strings; control commands address a device by
//! identifier.

use minilink_core::Uuid;

/// Request the challenge key for authentication.
pub const GET_KEY: &str = "jdev/sys/getkey";

/// Namespace prefix of authenticate requests and their echoed replies.
pub const AUTHENTICATE_PREFIX: &str = "authenticate/";

/// Query the structure-file version timestamp.
pub const CONFIG_VERSION: &str = "jdev/sps/LoxAPPversion3";

/// Substring the version reply's control name is matched against.
pub const CONFIG_VERSION_MATCH: &str = "dev/sps/LoxAPPversion3";

/// Enable server-side binary status push.
pub const ENABLE_STATUS_UPDATE: &str = "jdev/sps/enablebinstatusupdate";

/// Keepalive ping.
pub const KEEPALIVE: &str = "keepalive";

/// Query the miniserver firmware version.
pub const FIRMWARE_VERSION: &str = "jdev/cfg/version";

/// Authenticate with a hex HMAC digest.
pub fn authenticate(digest: &str) -> String {
    format!("{AUTHENTICATE_PREFIX}{digest}")
}

/// Command a control: `jdev/sps/io/{uuid}/{state}`.
pub fn io_command(uuid: &Uuid, state: &str) -> String {
    format!("jdev/sps/io/{uuid}/{state}")
}

/// Query the current status of all outputs of a control.
pub fn io_status(uuid: &Uuid) -> String {
    io_command(uuid, "all")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_command_addresses_by_identifier() {
        let uuid = Uuid::from("0f86a2fe-0378-3b08-ffffb2d4efc8b5b6");
        assert_eq!(
            io_command(&uuid, "on"),
            "jdev/sps/io/0f86a2fe-0378-3b08-ffffb2d4efc8b5b6/on"
        );
        assert_eq!(
            io_status(&uuid),
            "jdev/sps/io/0f86a2fe-0378-3b08-ffffb2d4efc8b5b6/all"
        );
    }

    #[test]
    fn authenticate_prefixes_digest() {
        assert_eq!(authenticate("abc123"), "authenticate/abc123");
    }
}
