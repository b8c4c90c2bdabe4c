//! User-Agent string sent by the default HTTP transport.

/// Product token every request identifies itself with.
const PRODUCT: &str = "bulkfetch";

/// Default User-Agent for download requests (identifies the tool and version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_crate_version() {
        let ua = default_user_agent();
        assert_eq!(
            ua.strip_prefix("bulkfetch/"),
            Some(env!("CARGO_PKG_VERSION")),
            "unexpected user agent: {ua}"
        );
    }
}
