use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// MQTT client id: префикс + случайный hex, как у мобильного клиента (`rn-…`)
pub fn client_id(prefix: &str) -> String {
    format!("{}{}", prefix, random_id())
}

// Добавляет схему к URL ICE сервера, если она отсутствует.
// Используем только STUN, поэтому по умолчанию подставляем "stun:".
pub fn with_ice_url_scheme(url: &str) -> String {
    if url.starts_with("stun:")
        || url.starts_with("stuns:")
        || url.starts_with("turn:")
        || url.starts_with("turns:")
    {
        url.to_string()
    } else {
        format!("stun:{}", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_has_prefix_and_hex_suffix() {
        let id = client_id("rn-");
        assert!(id.starts_with("rn-"));
        assert_eq!(id.len(), 3 + 16);
        assert!(id[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn scheme_is_added_only_when_missing() {
        assert_eq!(with_ice_url_scheme("stun.l.google.com:19302"), "stun:stun.l.google.com:19302");
        assert_eq!(with_ice_url_scheme("stun:host:3478"), "stun:host:3478");
        assert_eq!(with_ice_url_scheme("turn:host:3478"), "turn:host:3478");
    }
}
