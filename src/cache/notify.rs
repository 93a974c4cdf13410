//! Push notifications and notification clicks

use serde::{Deserialize, Serialize};

const DEFAULT_TITLE: &str = "ComunidadeFlix";
const DEFAULT_BODY: &str = "Nova atualização disponível!";
const DEFAULT_URL: &str = "/";
const ICON: &str = "/icons/icon-192x192.png";
const BADGE: &str = "/icons/icon-72x72.png";
const VIBRATE: [u32; 3] = [100, 50, 100];

/// Action id that dismisses without opening anything
pub const ACTION_CLOSE: &str = "close";
/// Action id that opens the target page
pub const ACTION_EXPLORE: &str = "explore";

/// Button shown on a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// Notification ready to be shown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub url: String,
    pub actions: Vec<NotificationAction>,
}

/// Optional fields a push payload may carry
#[derive(Debug, Default, Deserialize)]
struct PushPayload {
    title: Option<String>,
    body: Option<String>,
    url: Option<String>,
}

impl Notification {
    /// Build a notification from a push payload.
    ///
    /// JSON payloads may override title, body and url. A non-JSON payload is
    /// used as the body text; a missing payload yields the defaults.
    pub fn from_push(payload: Option<&[u8]>) -> Self {
        let parsed = match payload {
            None => PushPayload::default(),
            Some(bytes) => serde_json::from_slice::<PushPayload>(bytes).unwrap_or_else(|_| {
                let text = String::from_utf8_lossy(bytes).trim().to_string();
                PushPayload {
                    body: (!text.is_empty()).then_some(text),
                    ..PushPayload::default()
                }
            }),
        };

        Self {
            title: parsed.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: parsed.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
            icon: ICON.to_string(),
            badge: BADGE.to_string(),
            vibrate: VIBRATE.to_vec(),
            url: parsed.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
            actions: vec![
                NotificationAction {
                    action: ACTION_EXPLORE.to_string(),
                    title: "Ver agora".to_string(),
                    icon: ICON.to_string(),
                },
                NotificationAction {
                    action: ACTION_CLOSE.to_string(),
                    title: "Fechar".to_string(),
                    icon: ICON.to_string(),
                },
            ],
        }
    }
}

/// An open page controlled by the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientWindow {
    pub id: String,
    pub url: String,
}

/// What a notification click should do
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClickDecision {
    Dismiss,
    Focus { client_id: String },
    Open { url: String },
}

/// Decide the click outcome: `close` dismisses, otherwise focus a client
/// already showing the target, otherwise open a new window at it.
pub fn resolve_click(
    action: Option<&str>,
    target: Option<&str>,
    origin: &reqwest::Url,
    clients: &[ClientWindow],
) -> ClickDecision {
    if action == Some(ACTION_CLOSE) {
        return ClickDecision::Dismiss;
    }

    let target = target.unwrap_or(DEFAULT_URL);
    let absolute = origin
        .join(target)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| target.to_string());

    match clients.iter().find(|c| c.url == absolute) {
        Some(client) => ClickDecision::Focus {
            client_id: client.id.clone(),
        },
        None => ClickDecision::Open { url: absolute },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> reqwest::Url {
        reqwest::Url::parse("http://localhost:3000").unwrap()
    }

    #[test]
    fn test_defaults_without_payload() {
        let n = Notification::from_push(None);
        assert_eq!(n.title, "ComunidadeFlix");
        assert_eq!(n.url, "/");
        assert_eq!(n.actions.len(), 2);
        assert_eq!(n.actions[0].action, "explore");
        assert_eq!(n.actions[1].action, "close");
    }

    #[test]
    fn test_json_payload_overrides() {
        let n = Notification::from_push(Some(
            br#"{"title":"Nova aula","body":"Juros compostos","url":"/course/42"}"#,
        ));
        assert_eq!(n.title, "Nova aula");
        assert_eq!(n.body, "Juros compostos");
        assert_eq!(n.url, "/course/42");
    }

    #[test]
    fn test_text_payload_becomes_body() {
        let n = Notification::from_push(Some(b"Live at 8pm"));
        assert_eq!(n.title, "ComunidadeFlix");
        assert_eq!(n.body, "Live at 8pm");
    }

    #[test]
    fn test_click_close_dismisses() {
        let decision = resolve_click(Some("close"), Some("/app"), &origin(), &[]);
        assert_eq!(decision, ClickDecision::Dismiss);
    }

    #[test]
    fn test_click_focuses_matching_client() {
        let clients = vec![
            ClientWindow {
                id: "a".into(),
                url: "http://localhost:3000/".into(),
            },
            ClientWindow {
                id: "b".into(),
                url: "http://localhost:3000/course/42".into(),
            },
        ];
        let decision = resolve_click(Some("explore"), Some("/course/42"), &origin(), &clients);
        assert_eq!(
            decision,
            ClickDecision::Focus {
                client_id: "b".into()
            }
        );
    }

    #[test]
    fn test_click_opens_window_when_no_match() {
        let decision = resolve_click(None, None, &origin(), &[]);
        assert_eq!(
            decision,
            ClickDecision::Open {
                url: "http://localhost:3000/".into()
            }
        );
    }
}
