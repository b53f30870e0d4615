use kernelmux_relay::RelayError;

// Exit code constants aligned with rsfulmen/DDR-0002 semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

/// Map a fatal relay error to the process exit code.
pub fn code_for(err: &RelayError) -> i32 {
    match err {
        RelayError::Config(_) => USAGE,
        RelayError::Connection { .. } => TRANSPORT_ERROR,
        RelayError::UnknownChannel { .. } | RelayError::MissingPayload => DATA_INVALID,
        RelayError::Subprocess(_) => FAILURE,
        RelayError::Internal(_) => INTERNAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_map_to_usage() {
        let err = RelayError::Config("missing issuer address".into());
        assert_eq!(code_for(&err), USAGE);
    }

    #[test]
    fn protocol_violations_map_to_data_invalid() {
        let err = RelayError::UnknownChannel { tag: "hb".into() };
        assert_eq!(code_for(&err), DATA_INVALID);
        assert_eq!(code_for(&RelayError::MissingPayload), DATA_INVALID);
    }
}
