//! Request routing and JSON bodies of the card reader API

use crate::core::error::CardError;
use crate::core::orchestrator::{self, AuthSettings, CardInfo, DataRecord};
use crate::core::transport::{CardTransport, TransportError};
use hyper::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const CARDS_PATH: &str = "/api/cardreader/cards";
pub const PROVISION_PATH: &str = "/api/cardreader/provision";
pub const DATA_PATH: &str = "/api/cardreader/data";

pub const STATUS_SUCCESS: &str = "SUCCESS";
pub const STATUS_ERROR: &str = "ERROR";

/// Response status and JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: StatusCode,
    pub body: serde_json::Value,
}

impl ApiReply {
    fn ok<B: Serialize>(body: &B) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self {
                status: StatusCode::OK,
                body,
            },
            Err(err) => Self::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialize response: {err}"),
            ),
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: serde_json::json!({
                "Status": STATUS_ERROR,
                "Message": message.into(),
            }),
        }
    }
}

impl From<CardError> for ApiReply {
    fn from(err: CardError) -> Self {
        let status = match &err {
            CardError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CardError::AuthenticationFailed => StatusCode::FORBIDDEN,
            CardError::NoReaderDetected | CardError::ReaderUnavailable(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        log::warn!("Request failed with {status}: {err}");
        Self::error(status, err.to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageResponse {
    pub status: &'static str,
    pub message: String,
}

/// Body of a successful card scan
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CardResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "RID")]
    pub rid: String,
    pub card_type: String,
    pub reader_name: String,
}

impl From<CardInfo> for CardResponse {
    fn from(info: CardInfo) -> Self {
        Self {
            status: STATUS_SUCCESS,
            message: "Card found".to_string(),
            rid: info.attributes.vendor().to_string(),
            card_type: info.attributes.card_type().to_string(),
            id: info.uid,
            reader_name: info.reader,
        }
    }
}

/// Body of a successful data read or write
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(rename = "CardUID")]
    pub card_uid: String,
    pub card_reader: String,
    pub data_length: usize,
    pub content: String,
}

impl DataResponse {
    fn new(record: DataRecord, message: &str) -> Self {
        Self {
            status: STATUS_SUCCESS,
            message: message.to_string(),
            card_uid: record.uid,
            card_reader: record.reader,
            data_length: record.length,
            content: record.content,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisionRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WriteRequest {
    pub data: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReadRequest {
    pub card_reader: Option<String>,
    pub data_length: Option<usize>,
}

impl ReadRequest {
    /// Read parameters from a query string (`CardReader`, `DataLength`)
    fn from_query(query: &str) -> Result<Self, CardError> {
        let mut request = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.to_ascii_lowercase().as_str() {
                "cardreader" => request.card_reader = Some(value.into_owned()),
                "datalength" => {
                    let length = value.parse().map_err(|_| {
                        CardError::InvalidRequest(format!("invalid DataLength: '{value}'"))
                    })?;
                    request.data_length = Some(length);
                }
                _ => {}
            }
        }
        Ok(request)
    }
}

fn parse_body<B: DeserializeOwned + Default>(body: &[u8]) -> Result<B, CardError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(B::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| CardError::InvalidRequest(format!("malformed JSON body: {err}")))
}

fn require(field: Option<String>, name: &str) -> Result<String, CardError> {
    field
        .filter(|value| !value.is_empty())
        .ok_or_else(|| CardError::InvalidRequest(format!("missing {name}")))
}

/// Dispatch one request.
///
/// Request validation runs before `open_transport`, so a rejected request
/// never touches the PC/SC subsystem.
pub fn route<T, F>(
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
    auth: &AuthSettings,
    open_transport: F,
) -> ApiReply
where
    T: CardTransport,
    F: FnOnce() -> Result<T, TransportError>,
{
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    log::info!("{method} {path}");

    let result = match (path, method) {
        (CARDS_PATH, &Method::GET) => get_cards(auth, open_transport),
        (PROVISION_PATH, &Method::POST) => post_provision(body, auth, open_transport),
        (DATA_PATH, &Method::POST) => post_data(body, auth, open_transport),
        (DATA_PATH, &Method::GET) => get_data(query, body, auth, open_transport),
        (CARDS_PATH | PROVISION_PATH | DATA_PATH, _) => {
            return ApiReply::error(
                StatusCode::METHOD_NOT_ALLOWED,
                format!("Method {method} not allowed on {path}"),
            )
        }
        _ => return ApiReply::error(StatusCode::NOT_FOUND, format!("Unknown path: {path}")),
    };

    result.unwrap_or_else(ApiReply::from)
}

fn get_cards<T, F>(auth: &AuthSettings, open_transport: F) -> Result<ApiReply, CardError>
where
    T: CardTransport,
    F: FnOnce() -> Result<T, TransportError>,
{
    let transport = open_transport()?;
    let info = orchestrator::scan_cards(&transport, auth)?;
    Ok(ApiReply::ok(&CardResponse::from(info)))
}

fn post_provision<T, F>(
    body: &[u8],
    auth: &AuthSettings,
    open_transport: F,
) -> Result<ApiReply, CardError>
where
    T: CardTransport,
    F: FnOnce() -> Result<T, TransportError>,
{
    let request: ProvisionRequest = parse_body(body)?;
    let user_id = require(request.user_id, "UserId")?;
    orchestrator::validate_length(user_id.len())?;

    let transport = open_transport()?;
    orchestrator::provision(&transport, &user_id, auth)?;
    Ok(ApiReply::ok(&MessageResponse {
        status: STATUS_SUCCESS,
        message: "User identifier provisioned".to_string(),
    }))
}

fn post_data<T, F>(body: &[u8], auth: &AuthSettings, open_transport: F) -> Result<ApiReply, CardError>
where
    T: CardTransport,
    F: FnOnce() -> Result<T, TransportError>,
{
    let request: WriteRequest = parse_body(body)?;
    let data = require(request.data, "Data")?;
    orchestrator::validate_length(data.len())?;

    let transport = open_transport()?;
    let record = orchestrator::write_data(&transport, &data, auth)?;
    Ok(ApiReply::ok(&DataResponse::new(record, "Data written")))
}

fn get_data<T, F>(
    query: Option<&str>,
    body: &[u8],
    auth: &AuthSettings,
    open_transport: F,
) -> Result<ApiReply, CardError>
where
    T: CardTransport,
    F: FnOnce() -> Result<T, TransportError>,
{
    let mut request: ReadRequest = parse_body(body)?;
    if let Some(query) = query {
        // Body fields win; the query only fills what the body left out
        let from_query = ReadRequest::from_query(query)?;
        request.card_reader = request.card_reader.or(from_query.card_reader);
        request.data_length = request.data_length.or(from_query.data_length);
    }

    let length = request
        .data_length
        .ok_or_else(|| CardError::InvalidRequest("missing DataLength".to_string()))?;
    orchestrator::validate_length(length)?;
    let target = request.card_reader.filter(|name| !name.is_empty());

    let transport = open_transport()?;
    let record = orchestrator::read_data(&transport, target.as_deref(), length, auth)?;
    Ok(ApiReply::ok(&DataResponse::new(record, "Data read")))
}
