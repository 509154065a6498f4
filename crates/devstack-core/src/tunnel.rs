use serde::{Deserialize, Serialize};

/// Env key that receives the tunnel's public URL.
pub const TUNNEL_URL_KEY: &str = "NGROK_URL";

/// Written when the tunnel answered but exposed no https endpoint.
pub const TUNNEL_URL_PLACEHOLDER: &str = "https://your-tunnel-url.ngrok-free.app";

/// Path the gateway posts webhook events to, relative to the public URL.
pub const WEBHOOK_PATH: &str = "/webhook/whatsapp";

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Response of the tunnel client's local inspection API (`/api/tunnels`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunnelList {
    #[serde(default)]
    pub tunnels: Vec<TunnelEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelEntry {
    pub public_url: String,
    pub proto: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TunnelList {
    pub fn parse(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    pub fn first_https(&self) -> Option<&TunnelEntry> {
        self.tunnels.iter().find(|t| t.proto == "https")
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Public URL of the first `https` tunnel in a descriptor response.
///
/// Returns `None` for malformed JSON or when no entry declares `https`.
pub fn extract_https_url(body: &str) -> Option<String> {
    let list = TunnelList::parse(body).ok()?;
    list.first_https().map(|t| t.public_url.clone())
}

/// Webhook endpoint the gateway should call for a given public URL.
pub fn webhook_url(public_url: &str) -> String {
    format!("{}{WEBHOOK_PATH}", public_url.trim_end_matches('/'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_https_over_http() {
        let body = r#"{"tunnels":[{"proto":"http","public_url":"http://x"},{"proto":"https","public_url":"https://y"}]}"#;
        assert_eq!(extract_https_url(body), Some("https://y".to_string()));
    }

    #[test]
    fn picks_first_https_entry() {
        let body = r#"{"tunnels":[
            {"proto":"https","public_url":"https://first.ngrok-free.app","name":"command_line"},
            {"proto":"https","public_url":"https://second.ngrok-free.app"}
        ]}"#;
        assert_eq!(
            extract_https_url(body).as_deref(),
            Some("https://first.ngrok-free.app")
        );
    }

    #[test]
    fn no_https_entry_yields_none() {
        let body = r#"{"tunnels":[{"proto":"http","public_url":"http://x"}]}"#;
        assert_eq!(extract_https_url(body), None);
        assert_eq!(extract_https_url(r#"{"tunnels":[]}"#), None);
    }

    #[test]
    fn malformed_body_yields_none() {
        assert_eq!(extract_https_url("<html>ngrok</html>"), None);
        assert_eq!(extract_https_url(""), None);
    }

    #[test]
    fn missing_tunnels_field_is_empty_list() {
        let list = TunnelList::parse(r#"{"uri":"/api/tunnels"}"#).unwrap();
        assert!(list.tunnels.is_empty());
    }

    #[test]
    fn webhook_url_joins_path() {
        assert_eq!(
            webhook_url("https://abc123.ngrok-free.app"),
            "https://abc123.ngrok-free.app/webhook/whatsapp"
        );
        assert_eq!(
            webhook_url("https://abc123.ngrok-free.app/"),
            "https://abc123.ngrok-free.app/webhook/whatsapp"
        );
    }
}
