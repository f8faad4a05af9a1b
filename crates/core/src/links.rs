//! Client config card generation.
//!
//! Builds the share text for a provisioned endpoint: a TLS and a non-TLS
//! `vless://` URI plus a Clash proxy block. The three connection methods
//! differ only in how server, SNI and Host header are derived from the
//! endpoint hostname and the user-supplied host.

use uuid::Uuid;

use crate::storage::registry::Worker;

/// How the client should reach the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMethod {
    /// Connect to a bug host, TLS and Host header stay on the endpoint.
    Ws { bug: String },
    /// Connect to the endpoint, SNI and Host header carry the chosen name.
    Sni { host: String },
    /// Connect to a front host, SNI carries `{front}.{endpoint}`.
    Wildcard { front: String },
}

/// Rendered share card for one endpoint.
#[derive(Debug, Clone)]
pub struct ConfigCard {
    pub remark: String,
    pub vless_tls: String,
    pub vless_ntls: String,
    pub clash: String,
}

/// Build a card with a caller-chosen UUID. Deterministic for tests.
pub fn build_card(endpoint: &Worker, method: &LinkMethod, uuid: &Uuid) -> ConfigCard {
    let subdomain = endpoint.subdomain.as_str();
    let remark = format!("{} {}", endpoint.flag, endpoint.worker_name);

    let (server, sni, host, path) = match method {
        LinkMethod::Ws { bug } => (
            bug.clone(),
            subdomain.to_string(),
            subdomain.to_string(),
            format!("/{}-443", subdomain),
        ),
        LinkMethod::Sni { host } => (subdomain.to_string(), host.clone(), host.clone(), "/".to_string()),
        LinkMethod::Wildcard { front } => {
            let fronted = format!("{}.{}", front, subdomain);
            (front.clone(), fronted.clone(), fronted, "/".to_string())
        }
    };

    let enc_path = urlencoding::encode(&path);
    let enc_remark = urlencoding::encode(&remark);

    let vless_tls = format!(
        "vless://{}@{}:443?encryption=none&security=tls&sni={}&type=ws&host={}&path={}#{}",
        uuid, server, sni, host, enc_path, enc_remark
    );
    let vless_ntls = format!(
        "vless://{}@{}:80?encryption=none&security=none&type=ws&host={}&path={}#{}",
        uuid, server, host, enc_path, enc_remark
    );

    let clash = format!(
        "- name: {remark}\n  server: {server}\n  port: 443\n  type: vless\n  uuid: {uuid}\n  cipher: none\n  tls: true\n  skip-cert-verify: true\n  network: ws\n  servername: {sni}\n  ws-opts:\n    path: {path}\n    headers:\n      Host: {host}\n    udp: true"
    );

    ConfigCard {
        remark,
        vless_tls,
        vless_ntls,
        clash,
    }
}

/// Build a card with a fresh random UUID.
pub fn new_card(endpoint: &Worker, method: &LinkMethod) -> ConfigCard {
    build_card(endpoint, method, &Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn endpoint() -> Worker {
        Worker {
            id: 1,
            subdomain: "vless-sg1.abcd.workers.dev".to_string(),
            account_id: 1,
            worker_name: "vless-sg1".to_string(),
            kind: "vless".to_string(),
            country_code: "ID".to_string(),
            flag: "🇮🇩".to_string(),
        }
    }

    fn uuid() -> Uuid {
        Uuid::parse_str("c9f0a8a6-8e25-4f2f-9a3d-111111111111").unwrap()
    }

    #[test]
    fn ws_method_routes_through_the_bug_host() {
        let card = build_card(
            &endpoint(),
            &LinkMethod::Ws {
                bug: "104.17.3.81".to_string(),
            },
            &uuid(),
        );
        assert_eq!(
            card.vless_tls,
            "vless://c9f0a8a6-8e25-4f2f-9a3d-111111111111@104.17.3.81:443\
             ?encryption=none&security=tls&sni=vless-sg1.abcd.workers.dev\
             &type=ws&host=vless-sg1.abcd.workers.dev\
             &path=%2Fvless-sg1.abcd.workers.dev-443\
             #%F0%9F%87%AE%F0%9F%87%A9%20vless-sg1"
        );
        assert!(card.vless_ntls.starts_with("vless://c9f0a8a6-8e25-4f2f-9a3d-111111111111@104.17.3.81:80?"));
        assert!(card.vless_ntls.contains("security=none"));
        assert!(!card.vless_ntls.contains("sni="));
    }

    #[test]
    fn sni_method_keeps_the_endpoint_as_server() {
        let card = build_card(
            &endpoint(),
            &LinkMethod::Sni {
                host: "quiz.vidio.com".to_string(),
            },
            &uuid(),
        );
        assert!(card.vless_tls.contains("@vless-sg1.abcd.workers.dev:443"));
        assert!(card.vless_tls.contains("sni=quiz.vidio.com"));
        assert!(card.vless_tls.contains("host=quiz.vidio.com"));
        assert!(card.vless_tls.contains("path=%2F#"));
    }

    #[test]
    fn wildcard_method_prefixes_the_front_host() {
        let card = build_card(
            &endpoint(),
            &LinkMethod::Wildcard {
                front: "m.udemy.com".to_string(),
            },
            &uuid(),
        );
        assert!(card.vless_tls.contains("@m.udemy.com:443"));
        assert!(card.vless_tls.contains("sni=m.udemy.com.vless-sg1.abcd.workers.dev"));
        assert!(card.clash.contains("servername: m.udemy.com.vless-sg1.abcd.workers.dev"));
    }

    #[test]
    fn clash_block_carries_the_unencoded_path() {
        let card = build_card(
            &endpoint(),
            &LinkMethod::Ws {
                bug: "104.17.3.81".to_string(),
            },
            &uuid(),
        );
        assert!(card.clash.starts_with("- name: 🇮🇩 vless-sg1\n"));
        assert!(card.clash.contains("    path: /vless-sg1.abcd.workers.dev-443\n"));
        assert!(card.clash.contains("      Host: vless-sg1.abcd.workers.dev\n"));
        assert!(card.clash.ends_with("    udp: true"));
    }
}
