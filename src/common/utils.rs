//! Utility functions for revealpoll

/// Map an `http(s)://` base URL to its `ws(s)://` counterpart with `path`
/// appended.
pub fn websocket_url(base: &str, path: &str) -> crate::Result<String> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| crate::Error::InvalidConfig(format!("bad server url {}: {}", base, e)))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(crate::Error::InvalidConfig(format!(
                "unsupported scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| crate::Error::InvalidConfig(format!("cannot rewrite scheme of {}", base)))?;
    Ok(join_path(url.as_str(), path))
}

/// Join a base URL and an absolute path without doubling the slash
pub fn join_path(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
