use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mailbox::{
    AttachmentPart, MailboxClient, MailboxError, MailboxLabel, Message, MessageHeader,
    MessageRef, QueryFilter,
};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users";
const REDACTED_BODY_MAX_LEN: usize = 200;

/// Gmail REST client bound to one mailbox and an already-issued access token.
#[derive(Debug, Clone)]
pub struct GmailMailbox {
    client: Client,
    api_base: String,
    user_id: String,
    access_token: String,
}

impl GmailMailbox {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: GMAIL_API_BASE.to_string(),
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_base, self.user_id, path)
    }

    pub async fn list_labels(&self) -> Result<Vec<MailboxLabel>, MailboxError> {
        let request = self.client.get(self.url("labels"));
        let list: GmailLabelList = self.send_json(request, "list labels").await?;
        Ok(list
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|label| MailboxLabel {
                id: label.id,
                name: label.name,
                label_type: label.label_type,
            })
            .collect())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        action: &str,
    ) -> Result<T, MailboxError> {
        let body = self.send(request, action).await?;
        serde_json::from_str(&body)
            .map_err(|error| MailboxError::Decode(format!("{action}: {error}")))
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<String, MailboxError> {
        let response = request
            .bearer_auth(&self.access_token)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|error| MailboxError::Transient(format!("{action}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| MailboxError::Transient(format!("read {action} response: {error}")))?;

        if status.is_success() {
            return Ok(body);
        }

        Err(classify_failure(status, action, &body))
    }
}

fn classify_failure(status: StatusCode, action: &str, body: &str) -> MailboxError {
    let detail = format!(
        "{action}: status={status} body={}",
        redact_response_body(body)
    );
    match status {
        StatusCode::NOT_FOUND => MailboxError::NotFound(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MailboxError::Permission(detail),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            MailboxError::Transient(detail)
        }
        status if status.is_server_error() => MailboxError::Transient(detail),
        _ => MailboxError::Rejected(detail),
    }
}

fn redact_response_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= REDACTED_BODY_MAX_LEN {
        return trimmed.to_string();
    }

    let mut cut = REDACTED_BODY_MAX_LEN;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…[truncated {} bytes]", &trimmed[..cut], trimmed.len())
}

/// Gmail emits base64url, sometimes with padding.
fn decode_attachment_data(data: &str) -> Result<Vec<u8>, MailboxError> {
    URL_SAFE_NO_PAD
        .decode(data.trim().trim_end_matches('='))
        .map_err(|error| MailboxError::Decode(format!("base64url attachment data: {error}")))
}

fn map_gmail_message(message: GmailMessage) -> Message {
    let headers = message
        .payload
        .headers
        .clone()
        .unwrap_or_default()
        .into_iter()
        .map(|header| MessageHeader {
            name: header.name,
            value: header.value,
        })
        .collect();

    let mut attachments = Vec::new();
    collect_attachments(&message.payload, &mut attachments);

    Message {
        id: message.id,
        headers,
        attachments,
    }
}

fn collect_attachments(payload: &GmailPayload, out: &mut Vec<AttachmentPart>) {
    let filename = payload.filename.as_deref().unwrap_or("");
    if !filename.is_empty() {
        if let Some(body) = &payload.body {
            if let Some(attachment_id) = body.attachment_id.as_deref().filter(|id| !id.is_empty()) {
                out.push(AttachmentPart {
                    filename: filename.to_string(),
                    attachment_id: attachment_id.to_string(),
                    size: body.size.unwrap_or(0),
                });
            }
        }
    }

    for part in payload.parts.as_deref().unwrap_or_default() {
        collect_attachments(part, out);
    }
}

#[async_trait(?Send)]
impl MailboxClient for GmailMailbox {
    async fn list_candidate_messages(
        &self,
        filter: &QueryFilter,
        folder_labels: &[String],
    ) -> Result<Vec<MessageRef>, MailboxError> {
        let query = filter.to_query_string();
        let mut request = self.client.get(self.url("messages")).query(&[("q", &query)]);
        for label in folder_labels {
            request = request.query(&[("labelIds", label)]);
        }

        let list: GmailMessageList = self.send_json(request, "list messages").await?;
        let refs: Vec<MessageRef> = list
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|stub| MessageRef { id: stub.id })
            .collect();
        debug!(query = %query, candidates = refs.len(), "listed candidate messages");
        Ok(refs)
    }

    async fn fetch_message(&self, id: &str) -> Result<Message, MailboxError> {
        let request = self
            .client
            .get(self.url(&format!("messages/{id}")))
            .query(&[("format", "full")]);
        let message: GmailMessage = self.send_json(request, "get message").await?;
        Ok(map_gmail_message(message))
    }

    async fn fetch_attachment_bytes(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailboxError> {
        let request = self.client.get(self.url(&format!(
            "messages/{message_id}/attachments/{attachment_id}"
        )));
        let body: GmailAttachmentBody = self.send_json(request, "get attachment").await?;
        let data = body.data.ok_or_else(|| {
            MailboxError::Decode(format!(
                "attachment {attachment_id} on message {message_id} has no data"
            ))
        })?;
        decode_attachment_data(&data)
    }

    async fn apply_label_delta(
        &self,
        message_id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), MailboxError> {
        let payload = GmailModifyRequest {
            add_label_ids: add.to_vec(),
            remove_label_ids: remove.to_vec(),
        };
        let request = self
            .client
            .post(self.url(&format!("messages/{message_id}/modify")))
            .json(&payload);
        self.send(request, "modify message labels").await?;
        Ok(())
    }
}

// --- Gmail API payloads ---

#[derive(Debug, Clone, Serialize)]
struct GmailModifyRequest {
    #[serde(rename = "addLabelIds")]
    add_label_ids: Vec<String>,
    #[serde(rename = "removeLabelIds")]
    remove_label_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailMessageList {
    messages: Option<Vec<GmailMessageStub>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailMessageStub {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailMessage {
    id: String,
    payload: GmailPayload,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailPayload {
    headers: Option<Vec<GmailHeader>>,
    body: Option<GmailBody>,
    parts: Option<Vec<GmailPayload>>,
    filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailBody {
    size: Option<u64>,
    #[serde(rename = "attachmentId")]
    attachment_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailAttachmentBody {
    data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailLabelList {
    labels: Option<Vec<GmailLabel>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailLabel {
    id: String,
    name: String,
    #[serde(rename = "type")]
    label_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{decode_attachment_data, map_gmail_message, GmailMailbox, GmailMessage};
    use crate::mailbox::{MailboxClient, MailboxError, QueryFilter};

    fn mailbox(server: &MockServer) -> GmailMailbox {
        GmailMailbox::new("me", "test-token").with_api_base(format!("{}/gmail/v1/users", server.uri()))
    }

    #[test]
    fn nested_attachment_parts_flatten_in_document_order() {
        let payload = json!({
            "id": "msg-attach",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    { "name": "From", "value": "reports@example.com" },
                    { "name": "Date", "value": "Wed, 01 Jan 2026 12:00:00 +0000" }
                ],
                "body": { "size": 0 },
                "parts": [
                    {
                        "mimeType": "multipart/alternative",
                        "filename": "",
                        "body": { "size": 0 },
                        "parts": [
                            { "mimeType": "text/plain", "filename": "", "body": { "size": 5, "data": "aGVsbG8" } }
                        ]
                    },
                    {
                        "mimeType": "application/pdf",
                        "filename": "cover.pdf",
                        "body": { "size": 1200, "attachmentId": "att-pdf" }
                    },
                    {
                        "mimeType": "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                        "filename": "Pick Up Request.xlsx",
                        "body": { "size": 5400, "attachmentId": "att-xlsx" }
                    }
                ]
            }
        });

        let message: GmailMessage = serde_json::from_value(payload).expect("deserialize message");
        let mapped = map_gmail_message(message);

        assert_eq!(mapped.id, "msg-attach");
        assert_eq!(mapped.headers.len(), 2);
        assert_eq!(mapped.attachments.len(), 2);
        assert_eq!(mapped.attachments[0].filename, "cover.pdf");
        assert_eq!(mapped.attachments[1].attachment_id, "att-xlsx");
        assert_eq!(mapped.attachments[1].size, 5400);
    }

    #[test]
    fn attachment_data_decodes_with_or_without_padding() {
        assert_eq!(decode_attachment_data("aGVsbG8").expect("unpadded"), b"hello");
        assert_eq!(decode_attachment_data("aGVsbG8=").expect("padded"), b"hello");
        assert!(matches!(
            decode_attachment_data("***"),
            Err(MailboxError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn lists_candidates_with_query_and_folder_label() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(query_param(
                "q",
                "from:reports@example.com has:attachment subject:\"Pick Up Request\"",
            ))
            .and(query_param("labelIds", "INBOX"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [
                    { "id": "m1", "threadId": "t1" },
                    { "id": "m2", "threadId": "t2" }
                ],
                "resultSizeEstimate": 2
            })))
            .expect(1)
            .mount(&server)
            .await;

        let refs = mailbox(&server)
            .list_candidate_messages(
                &QueryFilter::new("reports@example.com", "Pick Up Request"),
                &["INBOX".to_string()],
            )
            .await
            .expect("list candidates");

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].id, "m1");
    }

    #[tokio::test]
    async fn empty_listing_yields_no_candidates() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultSizeEstimate": 0
            })))
            .mount(&server)
            .await;

        let refs = mailbox(&server)
            .list_candidate_messages(&QueryFilter::new("a@example.com", "x"), &[])
            .await
            .expect("list candidates");
        assert!(refs.is_empty());
    }

    #[tokio::test]
    async fn modify_posts_add_and_remove_sets() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/m1/modify"))
            .and(body_json(json!({
                "addLabelIds": ["Label_failed"],
                "removeLabelIds": ["UNREAD", "IMPORTANT", "INBOX"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "m1",
                "labelIds": ["Label_failed"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        mailbox(&server)
            .apply_label_delta(
                "m1",
                &["Label_failed".to_string()],
                &[
                    "UNREAD".to_string(),
                    "IMPORTANT".to_string(),
                    "INBOX".to_string(),
                ],
            )
            .await
            .expect("modify labels");
    }

    #[tokio::test]
    async fn status_codes_map_to_error_kinds() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{\"error\":\"not found\"}"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/locked/modify"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/busy/modify"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = mailbox(&server);
        assert!(matches!(
            client.fetch_message("gone").await,
            Err(MailboxError::NotFound(_))
        ));
        assert!(matches!(
            client.apply_label_delta("locked", &[], &[]).await,
            Err(MailboxError::Permission(_))
        ));
        assert!(matches!(
            client.apply_label_delta("busy", &[], &[]).await,
            Err(MailboxError::Transient(_))
        ));
    }

    #[tokio::test]
    async fn fetches_and_decodes_attachment_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages/m1/attachments/att-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "size": 5,
                "data": "aGVsbG8="
            })))
            .expect(1)
            .mount(&server)
            .await;

        let bytes = mailbox(&server)
            .fetch_attachment_bytes("m1", "att-1")
            .await
            .expect("fetch attachment");
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn lists_mailbox_labels() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "labels": [
                    { "id": "INBOX", "name": "INBOX", "type": "system" },
                    { "id": "Label_7", "name": "pickup/processed", "type": "user" }
                ]
            })))
            .mount(&server)
            .await;

        let labels = mailbox(&server).list_labels().await.expect("list labels");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[1].id, "Label_7");
        assert_eq!(labels[1].label_type.as_deref(), Some("user"));
    }
}
