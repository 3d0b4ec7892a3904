use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

// Adds the protocol scheme to an ICE server URL when it is missing
pub fn add_ice_url_scheme(url: &str, has_credentials: bool) -> String {
    let url = url.trim();
    if ["stun:", "stuns:", "turn:", "turns:"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
    {
        return url.to_string();
    }

    // Anything with a scheme we don't know is left for validation to reject
    if url.contains("://") {
        return url.to_string();
    }

    // Credentials only make sense for a relay
    let scheme = if has_credentials { "turn:" } else { "stun:" };
    format!("{}{}", scheme, url)
}
