pub mod common;
pub mod constants;
pub mod enums;
pub mod header;
pub mod question;
pub mod resource;

use std::fmt;

use bitstream_io::{BigEndian, BitReader, BitWriter};
use thiserror::Error;
use tracing::{debug, trace};

use common::PacketComponent;
use constants::{Opcode, Rcode};
use enums::RecordType;
use header::Header;
use question::Question;
use resource::ResourceRecord;

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("message truncated: buffer ends before the declared records")]
    TruncatedMessage,
    #[error("malformed name: {0}")]
    MalformedName(&'static str),
    #[error("malformed RDATA: {0}")]
    InvalidRdata(&'static str),
    #[error("header counts disagree with section contents")]
    CountMismatch,
    #[error("invalid bit stream: {0}")]
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ParseError::TruncatedMessage
        } else {
            ParseError::InvalidBitStream(e.to_string())
        }
    }
}

impl Message {
    /// Build a recursion-desired query for one question.
    pub fn query(id: u16, labels: Vec<String>, qtype: RecordType) -> Self {
        Self {
            header: Header {
                id,
                rd: true,
                qdcount: 1,
                ..Header::default()
            },
            questions: vec![Question::new(labels, qtype)],
            ..Self::default()
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        trace!("parsing DNS message, size: {} bytes", buf.len());
        if buf.len() < 12 {
            return Err(ParseError::TruncatedMessage);
        }

        let mut message = Message::default();
        let mut reader = BitReader::<_, BigEndian>::new(&buf[0..12]);
        message.header.read(&mut reader)?;
        debug!(
            "parsed header: id={}, qr={}, opcode={}, questions={}",
            message.header.id, message.header.qr, message.header.opcode, message.header.qdcount
        );

        let mut offset = 12;
        for _ in 0..message.header.qdcount {
            let (question, next) = Question::read_at(buf, offset)?;
            message.questions.push(question);
            offset = next;
        }
        for _ in 0..message.header.ancount {
            let (record, next) = ResourceRecord::read_at(buf, offset)?;
            message.answers.push(record);
            offset = next;
        }
        for _ in 0..message.header.nscount {
            let (record, next) = ResourceRecord::read_at(buf, offset)?;
            message.authorities.push(record);
            offset = next;
        }
        for _ in 0..message.header.arcount {
            let (record, next) = ResourceRecord::read_at(buf, offset)?;
            message.additionals.push(record);
            offset = next;
        }

        if offset != buf.len() {
            return Err(ParseError::CountMismatch);
        }

        Ok(message)
    }

    /// Serialize to wire format. Names are written uncompressed so the
    /// byte output doubles as the authentication digest input.
    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        if self.header.qdcount as usize != self.questions.len()
            || self.header.ancount as usize != self.answers.len()
            || self.header.nscount as usize != self.authorities.len()
            || self.header.arcount as usize != self.additionals.len()
        {
            return Err(ParseError::CountMismatch);
        }

        let mut buf = Vec::new();
        let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);

        self.header.write(&mut writer)?;
        for question in self.questions.iter() {
            question.write(&mut writer)?;
        }
        for answer in self.answers.iter() {
            answer.write(&mut writer)?;
        }
        for authority in self.authorities.iter() {
            authority.write(&mut writer)?;
        }
        for additional in self.additionals.iter() {
            additional.write(&mut writer)?;
        }

        Ok(buf)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;
        writeln!(
            f,
            ";; ->>HEADER<<- opcode: {}, status: {}, id: {}",
            Opcode::name(h.opcode),
            Rcode::name(h.rcode),
            h.id
        )?;

        let mut flags = Vec::new();
        if h.qr {
            flags.push("qr");
        }
        if h.aa {
            flags.push("aa");
        }
        if h.tc {
            flags.push("tc");
        }
        if h.rd {
            flags.push("rd");
        }
        if h.ra {
            flags.push("ra");
        }
        writeln!(
            f,
            ";; flags: {}; QUERY: {}, ANSWER: {}, AUTHORITY: {}, ADDITIONAL: {}",
            flags.join(" "),
            h.qdcount,
            h.ancount,
            h.nscount,
            h.arcount
        )?;

        if !self.questions.is_empty() {
            writeln!(f, "\n;; QUESTION SECTION:")?;
            for q in &self.questions {
                writeln!(f, ";{}.\t\t{}\t{}", q.name(), q.qclass, q.qtype)?;
            }
        }

        for (title, records) in [
            ("ANSWER", &self.answers),
            ("AUTHORITY", &self.authorities),
            ("ADDITIONAL", &self.additionals),
        ] {
            if records.is_empty() {
                continue;
            }
            writeln!(f, "\n;; {} SECTION:", title)?;
            for rr in records {
                writeln!(
                    f,
                    "{}.\t{}\t{}\t{}\t{}",
                    rr.name(),
                    rr.ttl,
                    rr.rclass,
                    rr.rtype,
                    rr.rdata_display()
                )?;
            }
        }

        Ok(())
    }
}
