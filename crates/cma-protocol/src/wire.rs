use rmp_serde::{decode, encode};
use thiserror::Error;

use crate::{City, Request, ServerPacket};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode error: {0}")]
    Encode(#[from] encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] decode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn serialize_requests(requests: &[Request]) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(requests)?)
}

pub fn deserialize_requests(bytes: &[u8]) -> Result<Vec<Request>, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_server_packets(packets: &[ServerPacket]) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(packets)?)
}

pub fn deserialize_server_packets(bytes: &[u8]) -> Result<Vec<ServerPacket>, WireError> {
    Ok(decode::from_slice(bytes)?)
}

// JSON variants (debugging dumps)

pub fn serialize_city_json(city: &City) -> Result<String, WireError> {
    Ok(serde_json::to_string(city)?)
}

pub fn deserialize_city_json(json: &str) -> Result<City, WireError> {
    Ok(serde_json::from_str(json)?)
}
