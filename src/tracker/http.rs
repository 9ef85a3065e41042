use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;

use super::announcer::AnnounceParams;
use super::error::TrackerError;
use super::response::AnnounceResult;
use crate::bencode::{decode, Value};

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// The HTTP(S) tracker dialect.
///
/// Announces are GET requests; the response is a bencoded dictionary.
/// When the tracker hands out a `tracker id`, it is remembered and
/// echoed back as `trackerid` on every later announce.
pub(super) struct HttpDialect {
    client: Client,
    url: String,
    tracker_id: Option<Bytes>,
}

impl HttpDialect {
    pub(super) fn new(url: &str) -> Result<Self, TrackerError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(TrackerError::Http)?;

        Ok(Self {
            client,
            url: url.to_string(),
            tracker_id: None,
        })
    }

    pub(super) async fn announce(
        &mut self,
        params: &AnnounceParams,
    ) -> Result<(AnnounceResult, u32), TrackerError> {
        let url = format!("{}?{}", self.url, self.build_query(params));

        let response = self.client.get(&url).send().await?;
        let body = response.bytes().await?;

        self.parse_response(&body)
    }

    fn build_query(&self, params: &AnnounceParams) -> String {
        let mut query = format!(
            "info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&numwant={}&compact=1",
            url_encode(&params.info_hash),
            url_encode(&params.peer_id),
            params.port,
            params.uploaded,
            params.downloaded,
            params.left,
            params.numwant,
        );

        let event = params.event.as_str();
        if !event.is_empty() {
            query.push_str("&event=");
            query.push_str(event);
        }

        if let Some(tracker_id) = &self.tracker_id {
            query.push_str("&trackerid=");
            query.push_str(&url_encode(tracker_id));
        }

        query
    }

    fn parse_response(&mut self, body: &[u8]) -> Result<(AnnounceResult, u32), TrackerError> {
        let value = decode(body)?;
        if value.as_dict().is_none() {
            return Err(TrackerError::Protocol(
                "tracker response is not a dictionary".into(),
            ));
        }

        if let Some(reason) = value.get(b"failure reason").and_then(Value::as_str) {
            return Err(TrackerError::Failure(reason.to_string()));
        }

        let complete = required_integer(&value, "complete")? as u32;
        let incomplete = required_integer(&value, "incomplete")? as u32;
        let interval = required_integer(&value, "interval")? as u32;

        let peer_data = value
            .get(b"peers")
            .ok_or_else(|| TrackerError::Protocol("missing response field: peers".into()))?
            .as_bytes()
            .ok_or_else(|| TrackerError::Protocol("invalid response field: peers".into()))?
            .clone();

        if let Some(tracker_id) = value.get(b"tracker id") {
            let tracker_id = tracker_id
                .as_bytes()
                .ok_or_else(|| TrackerError::Protocol("invalid response field: tracker id".into()))?;
            self.tracker_id = Some(tracker_id.clone());
        }

        let result = AnnounceResult {
            complete,
            incomplete,
            peer_data,
        };

        Ok((result, interval))
    }
}

fn required_integer(value: &Value, field: &str) -> Result<i64, TrackerError> {
    value
        .get(field.as_bytes())
        .ok_or_else(|| TrackerError::Protocol(format!("missing response field: {}", field)))?
        .as_integer()
        .ok_or_else(|| TrackerError::Protocol(format!("invalid response field: {}", field)))
}

/// Percent-encodes raw bytes for a query string; unreserved characters
/// pass through unchanged.
fn url_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::new(), |mut out, &b| {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{:02X}", b);
        }
        out
    })
}
