use bitstream_io::{BitWrite, BitWriter, Endianness};

use super::ParseError;

/// Maximum length of a single label in octets.
pub const MAX_LABEL_LEN: usize = 63;
/// Maximum encoded length of a full domain name in octets.
pub const MAX_NAME_LEN: usize = 255;
/// Upper bound on compression pointer chases while decoding one name.
pub const MAX_POINTER_JUMPS: usize = 8;

pub trait PacketComponent {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;

    fn write_name<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        labels: &[String],
    ) -> Result<(), ParseError> {
        let mut buf = Vec::new();
        write_name_bytes(labels, &mut buf)?;
        writer.write_bytes(&buf)?;
        Ok(())
    }
}

/// Encode a label sequence as an uncompressed wire-format name, including
/// the terminating zero-length label.
pub fn write_name_bytes(labels: &[String], out: &mut Vec<u8>) -> Result<(), ParseError> {
    let mut name_len = 1usize;
    for label in labels {
        if label.is_empty() {
            continue;
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(ParseError::MalformedName("label exceeds 63 octets"));
        }
        name_len += label.len() + 1;
        if name_len > MAX_NAME_LEN {
            return Err(ParseError::MalformedName("name exceeds 255 octets"));
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    Ok(())
}

/// Decode a wire-format name starting at `start`, following compression
/// pointers. Returns the labels and the offset just past the name as it
/// appears at `start` (past the first pointer, when one is present).
///
/// A pointer may only reference an offset strictly before its own position,
/// so chains cannot loop; the jump cap bounds work on hostile input.
pub fn read_name(buf: &[u8], start: usize) -> Result<(Vec<String>, usize), ParseError> {
    let mut labels = Vec::new();
    let mut offset = start;
    let mut name_len = 1usize;
    let mut end = None;
    let mut jumps = 0usize;

    loop {
        let len = *buf.get(offset).ok_or(ParseError::TruncatedMessage)? as usize;

        if len & 0xC0 == 0xC0 {
            let low = *buf.get(offset + 1).ok_or(ParseError::TruncatedMessage)?;
            let target = ((len & 0x3F) << 8) | low as usize;
            if target >= offset {
                return Err(ParseError::MalformedName(
                    "compression pointer does not point backwards",
                ));
            }
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return Err(ParseError::MalformedName("too many compression pointers"));
            }
            if end.is_none() {
                end = Some(offset + 2);
            }
            offset = target;
            continue;
        }

        if len == 0 {
            offset += 1;
            break;
        }

        if len > MAX_LABEL_LEN {
            return Err(ParseError::MalformedName("label exceeds 63 octets"));
        }
        name_len += len + 1;
        if name_len > MAX_NAME_LEN {
            return Err(ParseError::MalformedName("name exceeds 255 octets"));
        }

        let label_end = offset + 1 + len;
        if label_end > buf.len() {
            return Err(ParseError::TruncatedMessage);
        }
        let label = String::from_utf8(buf[offset + 1..label_end].to_vec())
            .map_err(|_| ParseError::MalformedName("label is not valid UTF-8"))?;
        labels.push(label);
        offset = label_end;
    }

    Ok((labels, end.unwrap_or(offset)))
}

pub fn read_u16(buf: &[u8], offset: usize) -> Result<(u16, usize), ParseError> {
    if offset + 2 > buf.len() {
        return Err(ParseError::TruncatedMessage);
    }
    Ok((
        u16::from_be_bytes([buf[offset], buf[offset + 1]]),
        offset + 2,
    ))
}

pub fn read_u32(buf: &[u8], offset: usize) -> Result<(u32, usize), ParseError> {
    if offset + 4 > buf.len() {
        return Err(ParseError::TruncatedMessage);
    }
    Ok((
        u32::from_be_bytes([
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ]),
        offset + 4,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trip() {
        let labels = vec!["example".to_string(), "com".to_string()];
        let mut buf = Vec::new();
        write_name_bytes(&labels, &mut buf).unwrap();
        assert_eq!(buf, b"\x07example\x03com\x00");

        let (parsed, end) = read_name(&buf, 0).unwrap();
        assert_eq!(parsed, labels);
        assert_eq!(end, buf.len());
    }

    #[test]
    fn oversized_label_rejected_on_encode() {
        let labels = vec!["a".repeat(64)];
        let mut buf = Vec::new();
        assert_eq!(
            write_name_bytes(&labels, &mut buf),
            Err(ParseError::MalformedName("label exceeds 63 octets"))
        );
    }

    #[test]
    fn oversized_name_rejected_on_encode() {
        let labels: Vec<String> = (0..5).map(|_| "a".repeat(63)).collect();
        let mut buf = Vec::new();
        assert_eq!(
            write_name_bytes(&labels, &mut buf),
            Err(ParseError::MalformedName("name exceeds 255 octets"))
        );
    }

    #[test]
    fn self_pointer_rejected() {
        let buf = [0xC0, 0x00];
        assert_eq!(
            read_name(&buf, 0),
            Err(ParseError::MalformedName(
                "compression pointer does not point backwards"
            ))
        );
    }
}
