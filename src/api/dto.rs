use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::model::order::{decode_base58_32, Order, Side, TokenId};

/// Wire shape for an order: 64-bit fields travel as strings to survive JSON's float precision
/// limits; pubkeys travel as base58. Mirrors the source payload's "stringified bigint" convention.
#[derive(Debug, Deserialize, Serialize)]
pub struct OrderDto {
    pub salt: String,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub market: String,
    #[serde(rename = "tokenId")]
    pub token_id: u8,
    #[serde(rename = "makerAmount")]
    pub maker_amount: String,
    #[serde(rename = "takerAmount")]
    pub taker_amount: String,
    pub expiration: String,
    pub nonce: String,
    #[serde(rename = "feeRateBps")]
    pub fee_rate_bps: u16,
    pub side: u8,
}

#[derive(Debug, thiserror::Error)]
pub enum DtoError {
    #[error("malformed field: {0}")]
    BadField(&'static str),
}

impl TryFrom<&OrderDto> for Order {
    type Error = DtoError;

    fn try_from(dto: &OrderDto) -> Result<Self, Self::Error> {
        Ok(Order {
            salt: dto.salt.parse().map_err(|_| DtoError::BadField("salt"))?,
            maker: Pubkey::from_str(&dto.maker).map_err(|_| DtoError::BadField("maker"))?,
            signer: Pubkey::from_str(&dto.signer).map_err(|_| DtoError::BadField("signer"))?,
            taker: Pubkey::from_str(&dto.taker).map_err(|_| DtoError::BadField("taker"))?,
            market: Pubkey::from_str(&dto.market).map_err(|_| DtoError::BadField("market"))?,
            token_id: TokenId::from_u8(dto.token_id).ok_or(DtoError::BadField("tokenId"))?,
            maker_amount: dto.maker_amount.parse().map_err(|_| DtoError::BadField("makerAmount"))?,
            taker_amount: dto.taker_amount.parse().map_err(|_| DtoError::BadField("takerAmount"))?,
            expiration: dto.expiration.parse().map_err(|_| DtoError::BadField("expiration"))?,
            nonce: dto.nonce.parse().map_err(|_| DtoError::BadField("nonce"))?,
            fee_rate_bps: dto.fee_rate_bps,
            side: Side::from_u8(dto.side).ok_or(DtoError::BadField("side"))?,
        })
    }
}

impl From<&Order> for OrderDto {
    fn from(order: &Order) -> Self {
        Self {
            salt: order.salt.to_string(),
            maker: order.maker.to_string(),
            signer: order.signer.to_string(),
            taker: order.taker.to_string(),
            market: order.market.to_string(),
            token_id: order.token_id as u8,
            maker_amount: order.maker_amount.to_string(),
            taker_amount: order.taker_amount.to_string(),
            expiration: order.expiration.to_string(),
            nonce: order.nonce.to_string(),
            fee_rate_bps: order.fee_rate_bps,
            side: order.side as u8,
        }
    }
}

/// `signature` may arrive as base58, hex, or a raw byte array — the source payload didn't
/// commit to one encoding, so intake accepts all three.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SignatureDto {
    Encoded(String),
    Bytes(Vec<u8>),
}

impl SignatureDto {
    pub fn decode(&self) -> Result<[u8; 64], DtoError> {
        let bytes = match self {
            SignatureDto::Bytes(b) => b.clone(),
            SignatureDto::Encoded(s) => {
                if let Ok(b) = bs58::decode(s).into_vec() {
                    if b.len() == 64 {
                        b
                    } else {
                        hex_decode(s)?
                    }
                } else {
                    hex_decode(s)?
                }
            }
        };
        if bytes.len() != 64 {
            return Err(DtoError::BadField("signature"));
        }
        let mut sig = [0u8; 64];
        sig.copy_from_slice(&bytes);
        Ok(sig)
    }
}

fn hex_decode(s: &str) -> Result<Vec<u8>, DtoError> {
    hex::decode(s.trim_start_matches("0x")).map_err(|_| DtoError::BadField("signature"))
}

#[derive(Debug, Deserialize)]
pub struct SubmitOrderRequest {
    pub order: OrderDto,
    pub signature: SignatureDto,
}

#[derive(Debug, Serialize)]
pub struct SubmitOrderResponse {
    #[serde(rename = "orderHash")]
    pub order_hash: String,
    pub status: &'static str,
    pub order: OrderDto,
}

#[derive(Debug, Deserialize)]
pub struct OperatorMatchRequest {
    #[serde(rename = "takerOrder")]
    pub taker_order: SubmitOrderRequest,
    #[serde(rename = "makerOrders")]
    pub maker_orders: Vec<SubmitOrderRequest>,
    #[serde(rename = "takerFillAmount")]
    pub taker_fill_amount: Option<String>,
    #[serde(rename = "makerFillAmounts")]
    pub maker_fill_amounts: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub exists: bool,
    #[serde(rename = "isFilledOrCancelled")]
    pub is_filled_or_cancelled: bool,
    pub remaining: u64,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct NonceResponse {
    pub nonce: u64,
}

pub fn decode_hash_param(s: &str) -> Result<crate::model::OrderHash, DtoError> {
    decode_base58_32(s).map_err(|_| DtoError::BadField("orderHash"))
}
