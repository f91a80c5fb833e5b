use std::net::{Ipv4Addr, Ipv6Addr};

use bitstream_io::{BitWrite, BitWriter, Endianness};

use super::{
    ParseError,
    common::{self, PacketComponent},
    enums::{RecordClass, RecordType},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceRecord {
    pub labels: Vec<String>,
    pub rtype: RecordType,
    pub rclass: RecordClass,
    pub ttl: u32,
    /// Uncompressed wire-format RDATA. Names embedded in the RDATA of known
    /// types are flattened on decode so the record is self-contained.
    pub rdata: Vec<u8>,
    /// Human-readable rendering of the RDATA for known types.
    pub parsed_rdata: Option<String>,
}

impl ResourceRecord {
    pub fn name(&self) -> String {
        self.labels.join(".")
    }

    /// Decode one resource record starting at `offset`; returns the record
    /// and the offset just past it. `buf` is the full message so that
    /// compression pointers inside the RDATA can be chased.
    pub fn read_at(buf: &[u8], offset: usize) -> Result<(Self, usize), ParseError> {
        let (labels, offset) = common::read_name(buf, offset)?;
        let (rtype, offset) = common::read_u16(buf, offset)?;
        let (rclass, offset) = common::read_u16(buf, offset)?;
        let (ttl, offset) = common::read_u32(buf, offset)?;
        let (rdlength, offset) = common::read_u16(buf, offset)?;

        let rdata_end = offset + rdlength as usize;
        if rdata_end > buf.len() {
            return Err(ParseError::TruncatedMessage);
        }

        let rtype: RecordType = rtype.into();
        let (rdata, parsed_rdata) = decode_rdata(rtype, buf, offset, rdata_end)?;

        Ok((
            Self {
                labels,
                rtype,
                rclass: rclass.into(),
                ttl,
                rdata,
                parsed_rdata,
            },
            rdata_end,
        ))
    }

    /// RDATA rendering for display: the parsed form when known, otherwise
    /// the RFC 3597 generic encoding.
    pub fn rdata_display(&self) -> String {
        match &self.parsed_rdata {
            Some(s) => s.clone(),
            None => format!("\\# {} {}", self.rdata.len(), hex::encode(&self.rdata)),
        }
    }
}

impl PacketComponent for ResourceRecord {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        self.write_name(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.rtype.into())?;
        writer.write_var::<u16>(16, self.rclass.into())?;
        writer.write_var::<u32>(32, self.ttl)?;
        writer.write_var::<u16>(16, self.rdata.len() as u16)?;
        writer.write_bytes(&self.rdata)?;
        Ok(())
    }
}

/// Decode the RDATA of a record of type `rtype` occupying
/// `buf[offset..rdata_end]`. Returns the flattened RDATA bytes and a
/// human-readable form for known types. Unknown types are carried verbatim.
fn decode_rdata(
    rtype: RecordType,
    buf: &[u8],
    offset: usize,
    rdata_end: usize,
) -> Result<(Vec<u8>, Option<String>), ParseError> {
    let raw = &buf[offset..rdata_end];

    match rtype {
        RecordType::A => {
            if raw.len() != 4 {
                return Ok((raw.to_vec(), None));
            }
            let addr = Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]);
            Ok((raw.to_vec(), Some(addr.to_string())))
        }
        RecordType::AAAA => {
            if raw.len() != 16 {
                return Ok((raw.to_vec(), None));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(raw);
            Ok((raw.to_vec(), Some(Ipv6Addr::from(octets).to_string())))
        }
        RecordType::NS | RecordType::CNAME | RecordType::PTR => {
            let (labels, end) = common::read_name(buf, offset)?;
            check_rdata_end(end, rdata_end)?;
            let mut flat = Vec::new();
            common::write_name_bytes(&labels, &mut flat)?;
            let display = format!("{}.", labels.join("."));
            Ok((flat, Some(display)))
        }
        RecordType::MX => {
            let (preference, after) = common::read_u16(buf, offset)?;
            let (labels, end) = common::read_name(buf, after)?;
            check_rdata_end(end, rdata_end)?;
            let mut flat = preference.to_be_bytes().to_vec();
            common::write_name_bytes(&labels, &mut flat)?;
            let display = format!("{} {}.", preference, labels.join("."));
            Ok((flat, Some(display)))
        }
        RecordType::SRV => {
            let (priority, after) = common::read_u16(buf, offset)?;
            let (weight, after) = common::read_u16(buf, after)?;
            let (port, after) = common::read_u16(buf, after)?;
            let (labels, end) = common::read_name(buf, after)?;
            check_rdata_end(end, rdata_end)?;
            let mut flat = Vec::new();
            flat.extend_from_slice(&priority.to_be_bytes());
            flat.extend_from_slice(&weight.to_be_bytes());
            flat.extend_from_slice(&port.to_be_bytes());
            common::write_name_bytes(&labels, &mut flat)?;
            let display = format!("{} {} {} {}.", priority, weight, port, labels.join("."));
            Ok((flat, Some(display)))
        }
        RecordType::SOA => {
            let (mname, after) = common::read_name(buf, offset)?;
            let (rname, after) = common::read_name(buf, after)?;
            let (serial, after) = common::read_u32(buf, after)?;
            let (refresh, after) = common::read_u32(buf, after)?;
            let (retry, after) = common::read_u32(buf, after)?;
            let (expire, after) = common::read_u32(buf, after)?;
            let (minimum, end) = common::read_u32(buf, after)?;
            check_rdata_end(end, rdata_end)?;
            let mut flat = Vec::new();
            common::write_name_bytes(&mname, &mut flat)?;
            common::write_name_bytes(&rname, &mut flat)?;
            for v in [serial, refresh, retry, expire, minimum] {
                flat.extend_from_slice(&v.to_be_bytes());
            }
            let display = format!(
                "{}. {}. {} {} {} {} {}",
                mname.join("."),
                rname.join("."),
                serial,
                refresh,
                retry,
                expire,
                minimum
            );
            Ok((flat, Some(display)))
        }
        RecordType::TXT => {
            let mut strings = Vec::new();
            let mut pos = offset;
            while pos < rdata_end {
                let len = buf[pos] as usize;
                pos += 1;
                if pos + len > rdata_end {
                    return Err(ParseError::InvalidRdata("character string overruns RDATA"));
                }
                strings.push(format!(
                    "\"{}\"",
                    String::from_utf8_lossy(&buf[pos..pos + len])
                ));
                pos += len;
            }
            Ok((raw.to_vec(), Some(strings.join(" "))))
        }
        RecordType::TSIG => {
            let parsed = crate::tsig::TsigData::parse(raw).ok().map(|d| d.describe());
            Ok((raw.to_vec(), parsed))
        }
        _ => Ok((raw.to_vec(), None)),
    }
}

fn check_rdata_end(end: usize, rdata_end: usize) -> Result<(), ParseError> {
    if end != rdata_end {
        return Err(ParseError::InvalidRdata(
            "RDATA does not fill its declared length",
        ));
    }
    Ok(())
}
