//! TSIG-style transaction authentication for DNS messages.
//!
//! A keyed digest over the message and a shared secret is carried as a
//! pseudo-record at the end of the additional section, binding a response
//! to the query it answers and to a signing time window.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use ring::hmac;
use thiserror::Error;
use tracing::{debug, warn};

use crate::dns::{
    Message, ParseError,
    common::{self, read_u16},
    constants::Rcode,
    enums::{RecordClass, RecordType},
    resource::ResourceRecord,
};

/// Default clock-skew window, in seconds.
pub const DEFAULT_FUDGE: u16 = 300;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TsigAlgorithm {
    #[default]
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl TsigAlgorithm {
    /// Algorithm name as it appears on the wire (without the root dot).
    pub fn name(&self) -> &'static str {
        match self {
            TsigAlgorithm::HmacSha256 => "hmac-sha256",
            TsigAlgorithm::HmacSha384 => "hmac-sha384",
            TsigAlgorithm::HmacSha512 => "hmac-sha512",
        }
    }

    fn hmac_algorithm(&self) -> hmac::Algorithm {
        match self {
            TsigAlgorithm::HmacSha256 => hmac::HMAC_SHA256,
            TsigAlgorithm::HmacSha384 => hmac::HMAC_SHA384,
            TsigAlgorithm::HmacSha512 => hmac::HMAC_SHA512,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().trim_end_matches('.') {
            "hmac-sha256" => Some(TsigAlgorithm::HmacSha256),
            "hmac-sha384" => Some(TsigAlgorithm::HmacSha384),
            "hmac-sha512" => Some(TsigAlgorithm::HmacSha512),
            _ => None,
        }
    }
}

/// A shared-secret key identified by name.
#[derive(Clone, Debug)]
pub struct TsigKey {
    /// Canonical (lowercase, no trailing dot) key name.
    pub name: String,
    pub algorithm: TsigAlgorithm,
    /// Shared secret, base64 encoded.
    pub secret: String,
}

impl TsigKey {
    pub fn new(name: &str, algorithm: TsigAlgorithm, secret: &str) -> Self {
        Self {
            name: name.to_lowercase().trim_end_matches('.').to_string(),
            algorithm,
            secret: secret.to_string(),
        }
    }

    fn labels(&self) -> Vec<String> {
        self.name.split('.').map(|s| s.to_string()).collect()
    }

    fn hmac_key(&self) -> Result<hmac::Key, TsigError> {
        let secret = BASE64
            .decode(&self.secret)
            .map_err(|e| TsigError::BadSecret(e.to_string()))?;
        Ok(hmac::Key::new(self.algorithm.hmac_algorithm(), &secret))
    }
}

#[derive(Debug, Clone, Error)]
pub enum TsigError {
    #[error("message already carries an authentication record")]
    AlreadySigned,
    #[error("invalid authentication record: {0}")]
    InvalidRecord(&'static str),
    #[error("key secret is not valid base64: {0}")]
    BadSecret(String),
    #[error("failed to encode message: {0}")]
    Encode(#[from] ParseError),
}

/// Verification outcome. Never an error path: a failed verification is a
/// status the caller reports alongside the answer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Authentic,
    Unsigned,
    BadKey,
    BadTime { skew: i64 },
    BadSig,
}

impl std::fmt::Display for VerifyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyOutcome::Authentic => write!(f, "authentic"),
            VerifyOutcome::Unsigned => write!(f, "unsigned"),
            VerifyOutcome::BadKey => write!(f, "bad key"),
            VerifyOutcome::BadTime { skew } => write!(f, "bad time (skew {}s)", skew),
            VerifyOutcome::BadSig => write!(f, "bad signature"),
        }
    }
}

impl VerifyOutcome {
    pub fn is_authentic(&self) -> bool {
        matches!(self, VerifyOutcome::Authentic)
    }
}

/// The RDATA of an authentication record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TsigData {
    /// Algorithm name, dotted form.
    pub algorithm: String,
    /// Signing time, seconds since the Unix epoch (48-bit on the wire).
    pub time_signed: u64,
    pub fudge: u16,
    pub mac: Vec<u8>,
    pub original_id: u16,
    pub error: u16,
    pub other: Vec<u8>,
}

impl TsigData {
    /// Parse TSIG RDATA:
    /// algorithm name / time signed (48-bit) / fudge / MAC length + MAC /
    /// original id / error / other length + other data.
    pub fn parse(rdata: &[u8]) -> Result<Self, TsigError> {
        let (algorithm_labels, offset) = common::read_name(rdata, 0)
            .map_err(|_| TsigError::InvalidRecord("bad algorithm name"))?;
        let algorithm = algorithm_labels.join(".");

        if rdata.len() < offset + 10 {
            return Err(TsigError::InvalidRecord("RDATA too short"));
        }

        let mut time_bytes = [0u8; 8];
        time_bytes[2..8].copy_from_slice(&rdata[offset..offset + 6]);
        let time_signed = u64::from_be_bytes(time_bytes);
        let offset = offset + 6;

        let (fudge, offset) = read_u16(rdata, offset).map_err(short)?;
        let (mac_size, offset) = read_u16(rdata, offset).map_err(short)?;
        let mac_end = offset + mac_size as usize;
        if rdata.len() < mac_end + 6 {
            return Err(TsigError::InvalidRecord("RDATA too short for MAC"));
        }
        let mac = rdata[offset..mac_end].to_vec();

        let (original_id, offset) = read_u16(rdata, mac_end).map_err(short)?;
        let (error, offset) = read_u16(rdata, offset).map_err(short)?;
        let (other_len, offset) = read_u16(rdata, offset).map_err(short)?;
        let other_end = offset + other_len as usize;
        if rdata.len() < other_end {
            return Err(TsigError::InvalidRecord("RDATA too short for other data"));
        }
        let other = rdata[offset..other_end].to_vec();

        Ok(Self {
            algorithm,
            time_signed,
            fudge,
            mac,
            original_id,
            error,
            other,
        })
    }

    fn build(&self) -> Result<Vec<u8>, TsigError> {
        let mut rdata = Vec::new();
        write_wire_name(&self.algorithm, &mut rdata)?;
        rdata.extend_from_slice(&self.time_signed.to_be_bytes()[2..]);
        rdata.extend_from_slice(&self.fudge.to_be_bytes());
        rdata.extend_from_slice(&(self.mac.len() as u16).to_be_bytes());
        rdata.extend_from_slice(&self.mac);
        rdata.extend_from_slice(&self.original_id.to_be_bytes());
        rdata.extend_from_slice(&self.error.to_be_bytes());
        rdata.extend_from_slice(&(self.other.len() as u16).to_be_bytes());
        rdata.extend_from_slice(&self.other);
        Ok(rdata)
    }

    /// dig-style rendering: algorithm, signing time (UTC), fudge, MAC,
    /// original id, error.
    pub fn describe(&self) -> String {
        let time = DateTime::<Utc>::from_timestamp(self.time_signed as i64, 0)
            .map(|t| t.format("%Y%m%d%H%M%S").to_string())
            .unwrap_or_else(|| self.time_signed.to_string());
        format!(
            "{}. {} {} {} {} {}",
            self.algorithm.trim_end_matches('.'),
            time,
            self.fudge,
            BASE64.encode(&self.mac),
            self.original_id,
            Rcode::name(self.error as u8)
        )
    }
}

fn short(_: ParseError) -> TsigError {
    TsigError::InvalidRecord("RDATA too short")
}

fn write_wire_name(name: &str, out: &mut Vec<u8>) -> Result<(), TsigError> {
    let labels: Vec<String> = name
        .trim_end_matches('.')
        .split('.')
        .map(|s| s.to_string())
        .collect();
    common::write_name_bytes(&labels, out).map_err(|_| TsigError::InvalidRecord("bad name"))
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Digest input: the wire bytes of the message without its authentication
/// record, followed by the record variables in canonical order.
fn digest_input(wire: &[u8], key: &TsigKey, data: &TsigData) -> Result<Vec<u8>, TsigError> {
    let mut input = Vec::with_capacity(wire.len() + 64);
    input.extend_from_slice(wire);

    write_wire_name(&key.name, &mut input)?;
    input.extend_from_slice(&u16::from(RecordClass::ANY).to_be_bytes());
    input.extend_from_slice(&0u32.to_be_bytes());
    write_wire_name(&data.algorithm, &mut input)?;
    input.extend_from_slice(&data.time_signed.to_be_bytes()[2..]);
    input.extend_from_slice(&data.fudge.to_be_bytes());
    input.extend_from_slice(&data.error.to_be_bytes());
    input.extend_from_slice(&(data.other.len() as u16).to_be_bytes());
    input.extend_from_slice(&data.other);

    Ok(input)
}

/// Sign `message` with `key`, appending the authentication record to the
/// additional section. Returns the signed copy.
pub fn sign(
    message: &Message,
    key: &TsigKey,
    time_signed: u64,
    fudge: u16,
) -> Result<Message, TsigError> {
    if tsig_record(message).is_some() {
        return Err(TsigError::AlreadySigned);
    }

    let mut data = TsigData {
        algorithm: key.algorithm.name().to_string(),
        time_signed,
        fudge,
        mac: Vec::new(),
        original_id: message.header.id,
        error: 0,
        other: Vec::new(),
    };

    let wire = message.serialize()?;
    let input = digest_input(&wire, key, &data)?;
    let tag = hmac::sign(&key.hmac_key()?, &input);
    data.mac = tag.as_ref().to_vec();
    debug!("signed message id={} with key {}", message.header.id, key.name);

    let record = ResourceRecord {
        labels: key.labels(),
        rtype: RecordType::TSIG,
        rclass: RecordClass::ANY,
        ttl: 0,
        rdata: data.build()?,
        parsed_rdata: Some(data.describe()),
    };

    let mut signed = message.clone();
    signed.additionals.push(record);
    signed.header.arcount += 1;
    Ok(signed)
}

/// Verify the authentication record on `message` against `key`.
///
/// The digest is recomputed over the message with the record stripped and
/// the original query id substituted, so a signature lifted from a
/// different exchange does not verify. The MAC comparison is constant-time.
pub fn verify(message: &Message, key: &TsigKey, original_id: u16, now: u64) -> VerifyOutcome {
    let Some(position) = message
        .additionals
        .iter()
        .position(|rr| rr.rtype == RecordType::TSIG)
    else {
        return VerifyOutcome::Unsigned;
    };
    if position + 1 != message.additionals.len() {
        warn!("authentication record is not the final additional record");
        return VerifyOutcome::BadSig;
    }

    let record = &message.additionals[position];
    let Ok(data) = TsigData::parse(&record.rdata) else {
        return VerifyOutcome::BadSig;
    };

    if record.name().to_lowercase() != key.name {
        debug!("response signed with unknown key {}", record.name());
        return VerifyOutcome::BadKey;
    }
    if TsigAlgorithm::from_name(&data.algorithm) != Some(key.algorithm) {
        debug!("response signed with algorithm {}", data.algorithm);
        return VerifyOutcome::BadKey;
    }

    let mut stripped = message.clone();
    stripped.additionals.pop();
    stripped.header.arcount = stripped.additionals.len() as u16;
    stripped.header.id = original_id;

    let Ok(wire) = stripped.serialize() else {
        return VerifyOutcome::BadSig;
    };
    let Ok(input) = digest_input(&wire, key, &data) else {
        return VerifyOutcome::BadSig;
    };
    let Ok(hmac_key) = key.hmac_key() else {
        return VerifyOutcome::BadKey;
    };
    if hmac::verify(&hmac_key, &input, &data.mac).is_err() {
        warn!("authentication digest mismatch for key {}", key.name);
        return VerifyOutcome::BadSig;
    }

    let skew = now as i64 - data.time_signed as i64;
    if skew.abs() > data.fudge as i64 {
        warn!("signing time outside the permitted window: {}s", skew);
        return VerifyOutcome::BadTime { skew };
    }

    VerifyOutcome::Authentic
}

/// The authentication record of a message, if present.
pub fn tsig_record(message: &Message) -> Option<&ResourceRecord> {
    message
        .additionals
        .iter()
        .find(|rr| rr.rtype == RecordType::TSIG)
}
