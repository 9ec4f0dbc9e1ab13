use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Domain separator mixed into every order hash, per the on-chain program's signing scheme.
pub const DOMAIN_SEPARATOR: &[u8] = b"Catallaxyz Exchange v1";

/// Fixed-point scale used for all price computations (6 decimal places).
pub const PRICE_SCALE: u64 = 1_000_000;

/// Maximum fee rate, in basis points (10%).
pub const MAX_FEE_RATE_BPS: u16 = 1_000;

/// Maximum number of maker legs a single settlement batch may carry.
pub const MAX_MATCH_LEGS: usize = 5;

/// 32-byte order fingerprint — the primary key for all signed-order storage.
pub type OrderHash = [u8; 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TokenId {
    Quote = 0,
    Yes = 1,
    No = 2,
}

impl TokenId {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(TokenId::Quote),
            1 => Some(TokenId::Yes),
            2 => Some(TokenId::No),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

impl Side {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Side::Buy),
            1 => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// A limit order as it is signed by a maker. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub salt: u64,
    pub maker: Pubkey,
    pub signer: Pubkey,
    pub taker: Pubkey,
    pub market: Pubkey,
    pub token_id: TokenId,
    pub maker_amount: u64,
    pub taker_amount: u64,
    pub expiration: i64,
    pub nonce: u64,
    pub fee_rate_bps: u16,
    pub side: Side,
}

impl Order {
    /// Canonical serialized size in bytes. Any deviation from this layout is a protocol break.
    pub const SERIALIZED_SIZE: usize = 8 + 32 + 32 + 32 + 32 + 1 + 8 + 8 + 8 + 8 + 2 + 1;

    /// `true` when the order accepts any counterparty.
    pub fn is_public(&self) -> bool {
        self.taker == Pubkey::default()
    }

    /// Canonical little-endian byte layout, fields in declaration order.
    pub fn serialize(&self) -> [u8; Order::SERIALIZED_SIZE] {
        let mut buf = [0u8; Order::SERIALIZED_SIZE];
        let mut off = 0usize;

        buf[off..off + 8].copy_from_slice(&self.salt.to_le_bytes());
        off += 8;
        buf[off..off + 32].copy_from_slice(self.maker.as_ref());
        off += 32;
        buf[off..off + 32].copy_from_slice(self.signer.as_ref());
        off += 32;
        buf[off..off + 32].copy_from_slice(self.taker.as_ref());
        off += 32;
        buf[off..off + 32].copy_from_slice(self.market.as_ref());
        off += 32;
        buf[off] = self.token_id as u8;
        off += 1;
        buf[off..off + 8].copy_from_slice(&self.maker_amount.to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.taker_amount.to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.expiration.to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.nonce.to_le_bytes());
        off += 8;
        buf[off..off + 2].copy_from_slice(&self.fee_rate_bps.to_le_bytes());
        off += 2;
        buf[off] = self.side as u8;
        off += 1;

        debug_assert_eq!(off, Order::SERIALIZED_SIZE);
        buf
    }

    /// Parses the canonical layout back into an `Order`. Inverse of `serialize`.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != Order::SERIALIZED_SIZE {
            return Err(CodecError::BadLength(bytes.len()));
        }
        let mut off = 0usize;
        let salt = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
        let maker = Pubkey::try_from(&bytes[off..off + 32]).map_err(|_| CodecError::BadField("maker"))?;
        off += 32;
        let signer = Pubkey::try_from(&bytes[off..off + 32]).map_err(|_| CodecError::BadField("signer"))?;
        off += 32;
        let taker = Pubkey::try_from(&bytes[off..off + 32]).map_err(|_| CodecError::BadField("taker"))?;
        off += 32;
        let market = Pubkey::try_from(&bytes[off..off + 32]).map_err(|_| CodecError::BadField("market"))?;
        off += 32;
        let token_id = TokenId::from_u8(bytes[off]).ok_or(CodecError::BadField("tokenId"))?;
        off += 1;
        let maker_amount = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
        let taker_amount = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
        let expiration = i64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
        let nonce = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
        let fee_rate_bps = u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap());
        off += 2;
        let side = Side::from_u8(bytes[off]).ok_or(CodecError::BadField("side"))?;
        off += 1;
        debug_assert_eq!(off, Order::SERIALIZED_SIZE);

        Ok(Order {
            salt,
            maker,
            signer,
            taker,
            market,
            token_id,
            maker_amount,
            taker_amount,
            expiration,
            nonce,
            fee_rate_bps,
            side,
        })
    }

    /// `SHA-256(domain ‖ serialize(order))` — the order fingerprint, primary key for storage.
    pub fn hash(&self) -> OrderHash {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_SEPARATOR);
        hasher.update(self.serialize());
        hasher.finalize().into()
    }

    /// Rejects structurally invalid orders. Does not check expiry, signature, or nonce.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.fee_rate_bps > MAX_FEE_RATE_BPS {
            return Err(ValidationError::FeeTooHigh(self.fee_rate_bps));
        }
        if self.maker_amount == 0 {
            return Err(ValidationError::ZeroMakerAmount);
        }
        if self.taker_amount == 0 {
            return Err(ValidationError::ZeroTakerAmount);
        }
        Ok(())
    }

    /// `expiration > 0 && expiration < now_seconds`.
    pub fn is_expired(&self, now_seconds: i64) -> bool {
        self.expiration > 0 && self.expiration < now_seconds
    }

    /// Price in `PRICE_SCALE` (10^6) fixed-point, floor-divided.
    ///
    /// BUY:  `makerAmount * PRICE_SCALE / takerAmount` (maker pays quote, wants token).
    /// SELL: `takerAmount * PRICE_SCALE / makerAmount` (maker gives token, wants quote).
    pub fn price(&self) -> u64 {
        let (num, den) = match self.side {
            Side::Buy => (self.maker_amount, self.taker_amount),
            Side::Sell => (self.taker_amount, self.maker_amount),
        };
        if den == 0 {
            return 0;
        }
        ((num as u128 * PRICE_SCALE as u128) / den as u128) as u64
    }
}

/// `(Order, signature)` — the unit that gets hashed, verified, and stored.
#[derive(Debug, Clone, Copy)]
pub struct SignedOrder {
    pub order: Order,
    pub signature: [u8; 64],
}

impl SignedOrder {
    pub const SERIALIZED_SIZE: usize = Order::SERIALIZED_SIZE + 64;

    pub fn order_hash(&self) -> OrderHash {
        self.order.hash()
    }

    /// Verifies `signature` against `signer`'s Ed25519 public key over the order hash's preimage.
    pub fn verify(&self) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.order.signer.to_bytes()) else {
            return false;
        };
        let signature = Signature::from_bytes(&self.signature);
        let mut message = Vec::with_capacity(DOMAIN_SEPARATOR.len() + Order::SERIALIZED_SIZE);
        message.extend_from_slice(DOMAIN_SEPARATOR);
        message.extend_from_slice(&self.order.serialize());
        verifying_key.verify(&message, &signature).is_ok()
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("expected {} bytes, got {0}", Order::SERIALIZED_SIZE)]
    BadLength(usize),
    #[error("malformed field: {0}")]
    BadField(&'static str),
}

/// Structural validation failures — fatal for the intake request, never retried.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("feeRateBps {0} exceeds maximum of {MAX_FEE_RATE_BPS}")]
    FeeTooHigh(u16),
    #[error("makerAmount must be nonzero")]
    ZeroMakerAmount,
    #[error("takerAmount must be nonzero")]
    ZeroTakerAmount,
}

/// Encodes a 32-byte fingerprint (order hash, pubkey, etc.) as base58.
pub fn encode_base58(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decodes a base58 string into exactly 32 bytes.
pub fn decode_base58_32(s: &str) -> Result<[u8; 32], bs58::decode::Error> {
    let mut out = [0u8; 32];
    let decoded = bs58::decode(s).into_vec()?;
    if decoded.len() != 32 {
        return Err(bs58::decode::Error::BufferTooSmall);
    }
    out.copy_from_slice(&decoded);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_pubkey(seed: u8) -> Pubkey {
        let mut bytes = [0u8; 32];
        bytes[0] = seed;
        Pubkey::from(bytes)
    }

    fn sample_order() -> Order {
        Order {
            salt: 42,
            maker: random_pubkey(1),
            signer: random_pubkey(1),
            taker: Pubkey::default(),
            market: random_pubkey(2),
            token_id: TokenId::Yes,
            maker_amount: 500_000,
            taker_amount: 1_000_000,
            expiration: 0,
            nonce: 0,
            fee_rate_bps: 0,
            side: Side::Buy,
        }
    }

    #[test]
    fn round_trip_encoding() {
        let order = sample_order();
        let bytes = order.serialize();
        assert_eq!(bytes.len(), Order::SERIALIZED_SIZE);
        let parsed = Order::deserialize(&bytes).unwrap();
        assert_eq!(parsed, order);
    }

    #[test]
    fn hash_is_stable_across_calls() {
        let order = sample_order();
        assert_eq!(order.hash(), order.hash());
    }

    #[test]
    fn buy_price_formula() {
        let order = Order {
            maker_amount: 500_000,
            taker_amount: 1_000_000,
            side: Side::Buy,
            ..sample_order()
        };
        assert_eq!(order.price(), 500_000);
    }

    #[test]
    fn sell_price_formula() {
        let order = Order {
            maker_amount: 1_000_000,
            taker_amount: 600_000,
            side: Side::Sell,
            ..sample_order()
        };
        assert_eq!(order.price(), 600_000);
    }

    #[test]
    fn fee_rate_boundary() {
        let mut order = sample_order();
        order.fee_rate_bps = 1000;
        assert!(order.validate().is_ok());
        order.fee_rate_bps = 1001;
        assert!(matches!(order.validate(), Err(ValidationError::FeeTooHigh(1001))));
    }

    #[test]
    fn expiration_boundary() {
        let order = sample_order();
        assert!(!order.is_expired(1_000)); // expiration == 0 never expires
        let expiring = Order { expiration: 1_000, ..order };
        assert!(!expiring.is_expired(999));
        assert!(expiring.is_expired(1_001));
    }

    #[test]
    fn zero_amounts_rejected() {
        let order = Order { maker_amount: 0, ..sample_order() };
        assert!(matches!(order.validate(), Err(ValidationError::ZeroMakerAmount)));
        let order = Order { taker_amount: 0, ..sample_order() };
        assert!(matches!(order.validate(), Err(ValidationError::ZeroTakerAmount)));
    }

    #[test]
    fn base58_round_trip() {
        let order = sample_order();
        let hash = order.hash();
        let encoded = encode_base58(&hash);
        let decoded = decode_base58_32(&encoded).unwrap();
        assert_eq!(decoded, hash);
    }
}
