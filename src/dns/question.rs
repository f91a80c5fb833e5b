use bitstream_io::{BitWrite, BitWriter, Endianness};

use super::{
    ParseError,
    common::{self, PacketComponent},
    enums::{RecordClass, RecordType},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub labels: Vec<String>,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

impl Question {
    pub fn new(labels: Vec<String>, qtype: RecordType) -> Self {
        Self {
            labels,
            qtype,
            qclass: RecordClass::IN,
        }
    }

    pub fn name(&self) -> String {
        self.labels.join(".")
    }

    /// Decode one question entry starting at `offset`; returns the entry and
    /// the offset just past it.
    pub fn read_at(buf: &[u8], offset: usize) -> Result<(Self, usize), ParseError> {
        let (labels, offset) = common::read_name(buf, offset)?;
        let (qtype, offset) = common::read_u16(buf, offset)?;
        let (qclass, offset) = common::read_u16(buf, offset)?;
        Ok((
            Self {
                labels,
                qtype: qtype.into(),
                qclass: qclass.into(),
            },
            offset,
        ))
    }
}

impl PacketComponent for Question {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        self.write_name(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.qtype.into())?;
        writer.write_var::<u16>(16, self.qclass.into())?;
        Ok(())
    }
}
