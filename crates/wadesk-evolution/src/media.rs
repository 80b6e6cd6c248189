//! Remote media lookup through `chat/getBase64FromMediaMessage`.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use tracing::{debug, warn};
use wadesk_core::config::EvolutionConfig;
use wadesk_core::types::MediaType;
use wadesk_media::error::Result as MediaResult;
use wadesk_media::RemoteMediaLookup;

use crate::client::EvolutionClient;
use crate::error::EvolutionError;

const MEDIA_ROUTE: &str = "chat/getBase64FromMediaMessage";

/// Request body identifying a message by its provider key.
pub fn media_request(message_id: &str, remote_jid: &str, media_type: MediaType) -> Value {
    json!({
        "message": {
            "key": {
                "id": message_id,
                "remoteJid": remote_jid,
            }
        },
        "convertToMp4": media_type == MediaType::Video,
    })
}

/// A loadable reference from a media response: `mediaUrl` when the gateway
/// stores media externally, otherwise a data URI from `base64` + `mimetype`.
///
/// A `base64` field that does not decode is ignored.
pub fn parse_media_response(body: &Value, media_type: MediaType) -> Option<String> {
    if let Some(url) = body
        .get("mediaUrl")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|u| !u.is_empty())
    {
        return Some(url.to_string());
    }

    let b64 = body
        .get("base64")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|b| !b.is_empty())?;
    if let Err(e) = base64::engine::general_purpose::STANDARD.decode(b64) {
        warn!(error = %e, "media response carried invalid base64");
        return None;
    }
    let mime = body
        .get("mimetype")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| media_type.default_mime());
    Some(format!("data:{mime};base64,{b64}"))
}

impl EvolutionClient {
    pub async fn fetch_media(
        &self,
        api: &EvolutionConfig,
        message_id: &str,
        remote_jid: &str,
        media_type: MediaType,
    ) -> Result<Option<String>, EvolutionError> {
        let body = media_request(message_id, remote_jid, media_type);
        match self.post(api, MEDIA_ROUTE, &body).await {
            Ok(resp) => {
                let found = parse_media_response(&resp, media_type);
                debug!(message_id, found = found.is_some(), "evolution media lookup");
                Ok(found)
            }
            // The gateway answers 400/404 while it has no media for the key yet.
            Err(EvolutionError::Api {
                status: 400 | 404,
                message,
            }) => {
                debug!(message_id, %message, "evolution has no media for message");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RemoteMediaLookup for EvolutionClient {
    async fn find_media(
        &self,
        api: &EvolutionConfig,
        message_id: &str,
        remote_jid: &str,
        media_type: MediaType,
    ) -> MediaResult<Option<String>> {
        Ok(self.fetch_media(api, message_id, remote_jid, media_type).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = media_request("3EB0AA", "5511999998888@s.whatsapp.net", MediaType::Video);
        assert_eq!(body["message"]["key"]["id"], "3EB0AA");
        assert_eq!(body["message"]["key"]["remoteJid"], "5511999998888@s.whatsapp.net");
        assert_eq!(body["convertToMp4"], true);
        assert_eq!(media_request("x", "y", MediaType::Audio)["convertToMp4"], false);
    }

    #[test]
    fn media_url_wins() {
        let body = json!({"mediaUrl": "https://s3.example.com/a.jpg", "base64": "AAAA"});
        assert_eq!(
            parse_media_response(&body, MediaType::Image).as_deref(),
            Some("https://s3.example.com/a.jpg")
        );
    }

    #[test]
    fn base64_becomes_data_uri() {
        let body = json!({"base64": "T2dnUwAC", "mimetype": "audio/ogg; codecs=opus"});
        assert_eq!(
            parse_media_response(&body, MediaType::Audio).as_deref(),
            Some("data:audio/ogg; codecs=opus;base64,T2dnUwAC")
        );
        let body = json!({"base64": "/9j/4AAQ"});
        assert_eq!(
            parse_media_response(&body, MediaType::Image).as_deref(),
            Some("data:image/jpeg;base64,/9j/4AAQ")
        );
    }

    #[test]
    fn garbage_is_not_media() {
        assert!(parse_media_response(&json!({"base64": "not base64!!"}), MediaType::Image).is_none());
        assert!(parse_media_response(&json!({"mediaUrl": "  "}), MediaType::Image).is_none());
        assert!(parse_media_response(&Value::Null, MediaType::Image).is_none());
    }
}
