//! DNS wire message parsing and construction.
//!
//! One `Message` is a complete PDU: header, question section, and the
//! answer/authority/additional record sections. Decoding never returns a
//! partial message; encoding is deterministic and writes names
//! uncompressed.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str;

use thiserror::Error;

const HEADER_LEN: usize = 12;

/// Longest encoded name, in octets including label length bytes.
const MAX_NAME_LEN: usize = 255;

/// Response bit in the header flags.
pub const FLAG_REPLY: u16 = 0x8000;

/// Authoritative-answer bit in the header flags.
pub const FLAG_AUTHORITATIVE: u16 = 0x0400;

/// Why a buffer could not be decoded into a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer ended before a field or a declared item was complete.
    #[error("message truncated")]
    Truncated,
    /// A field contradicts the bytes around it.
    #[error("malformed message: {0}")]
    Malformed(&'static str),
}

/// Record and query type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Other(u16),
}

impl RecordType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::Ns,
            5 => RecordType::Cname,
            6 => RecordType::Soa,
            12 => RecordType::Ptr,
            15 => RecordType::Mx,
            16 => RecordType::Txt,
            28 => RecordType::Aaaa,
            other => RecordType::Other(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Soa => 6,
            RecordType::Ptr => 12,
            RecordType::Mx => 15,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Other(other) => other,
        }
    }
}

/// Record and query class codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordClass {
    In,
    Other(u16),
}

impl RecordClass {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => RecordClass::In,
            other => RecordClass::Other(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            RecordClass::In => 1,
            RecordClass::Other(other) => other,
        }
    }
}

/// One entry of the question section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

/// Typed record data. The wire type field is derived from the variant, so
/// data and type can never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    /// IPv4 host address.
    A(Ipv4Addr),
    /// IPv6 host address.
    Aaaa(Ipv6Addr),
    /// Any type this codec does not interpret, kept as raw bytes.
    Other { rtype: u16, bytes: Vec<u8> },
}

impl RData {
    /// Wire type code this data encodes under.
    pub fn record_type(&self) -> RecordType {
        match self {
            RData::A(_) => RecordType::A,
            RData::Aaaa(_) => RecordType::Aaaa,
            RData::Other { rtype, .. } => RecordType::from_u16(*rtype),
        }
    }
}

/// One resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub class: RecordClass,
    pub ttl: u32,
    pub rdata: RData,
}

/// A complete wire message. Section counts in the header are derived from
/// the vector lengths at encode time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub id: u16,
    pub flags: u16,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub additionals: Vec<Record>,
}

impl Message {
    /// Decode a wire message from raw bytes.
    ///
    /// Bytes past the end of the declared sections are ignored. Section
    /// vectors grow item by item, so a header declaring counts the buffer
    /// cannot back fails on the first missing byte instead of sizing an
    /// allocation from the lie.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(bytes);

        let id = reader.read_u16()?;
        let flags = reader.read_u16()?;
        let qdcount = reader.read_u16()?;
        let ancount = reader.read_u16()?;
        let nscount = reader.read_u16()?;
        let arcount = reader.read_u16()?;

        let mut questions = Vec::new();
        for _ in 0..qdcount {
            questions.push(decode_question(&mut reader)?);
        }

        let mut answers = Vec::new();
        for _ in 0..ancount {
            answers.push(decode_record(&mut reader)?);
        }

        let mut authorities = Vec::new();
        for _ in 0..nscount {
            authorities.push(decode_record(&mut reader)?);
        }

        let mut additionals = Vec::new();
        for _ in 0..arcount {
            additionals.push(decode_record(&mut reader)?);
        }

        Ok(Self {
            id,
            flags,
            questions,
            answers,
            authorities,
            additionals,
        })
    }

    /// Encode the message to wire format bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 64);

        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&(self.questions.len() as u16).to_be_bytes());
        buf.extend_from_slice(&(self.answers.len() as u16).to_be_bytes());
        buf.extend_from_slice(&(self.authorities.len() as u16).to_be_bytes());
        buf.extend_from_slice(&(self.additionals.len() as u16).to_be_bytes());

        for question in &self.questions {
            write_name(&mut buf, &question.name);
            buf.extend_from_slice(&question.qtype.to_u16().to_be_bytes());
            buf.extend_from_slice(&question.qclass.to_u16().to_be_bytes());
        }

        for record in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.additionals)
        {
            write_record(&mut buf, record);
        }

        buf
    }
}

/// Byte cursor over an immutable buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Truncated)?;
        if end > self.buf.len() {
            return Err(DecodeError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Read a label-sequence name into dotted form.
fn read_name(reader: &mut Reader) -> Result<String, DecodeError> {
    let mut name = String::new();
    let mut wire_len = 0usize;

    loop {
        let len = reader.read_u8()? as usize;
        if len == 0 {
            break;
        }
        // The two high bits mark compression pointers, which this codec
        // never emits and does not accept.
        if len & 0xC0 != 0 {
            return Err(DecodeError::Malformed("compressed or reserved label"));
        }
        wire_len += 1 + len;
        if wire_len > MAX_NAME_LEN {
            return Err(DecodeError::Malformed("name exceeds 255 octets"));
        }
        let label = reader
            .take(len)
            .map_err(|_| DecodeError::Malformed("label length exceeds buffer"))?;
        let label =
            str::from_utf8(label).map_err(|_| DecodeError::Malformed("label is not UTF-8"))?;
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(label);
    }

    Ok(name)
}

fn write_name(buf: &mut Vec<u8>, name: &str) {
    if !name.is_empty() {
        for label in name.split('.') {
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
    }
    buf.push(0);
}

fn decode_question(reader: &mut Reader) -> Result<Question, DecodeError> {
    let name = read_name(reader)?;
    let qtype = RecordType::from_u16(reader.read_u16()?);
    let qclass = RecordClass::from_u16(reader.read_u16()?);

    Ok(Question {
        name,
        qtype,
        qclass,
    })
}

fn decode_record(reader: &mut Reader) -> Result<Record, DecodeError> {
    let name = read_name(reader)?;
    let rtype = reader.read_u16()?;
    let class = RecordClass::from_u16(reader.read_u16()?);
    let ttl = reader.read_u32()?;
    let rdlen = reader.read_u16()? as usize;
    let bytes = reader.take(rdlen)?;

    let rdata = match rtype {
        1 => {
            let octets: [u8; 4] = bytes
                .try_into()
                .map_err(|_| DecodeError::Malformed("A record data must be 4 bytes"))?;
            RData::A(Ipv4Addr::from(octets))
        }
        28 => {
            let octets: [u8; 16] = bytes
                .try_into()
                .map_err(|_| DecodeError::Malformed("AAAA record data must be 16 bytes"))?;
            RData::Aaaa(Ipv6Addr::from(octets))
        }
        other => RData::Other {
            rtype: other,
            bytes: bytes.to_vec(),
        },
    };

    Ok(Record {
        name,
        class,
        ttl,
        rdata,
    })
}

fn write_record(buf: &mut Vec<u8>, record: &Record) {
    write_name(buf, &record.name);
    buf.extend_from_slice(&record.rdata.record_type().to_u16().to_be_bytes());
    buf.extend_from_slice(&record.class.to_u16().to_be_bytes());
    buf.extend_from_slice(&record.ttl.to_be_bytes());

    match &record.rdata {
        RData::A(addr) => {
            buf.extend_from_slice(&4u16.to_be_bytes());
            buf.extend_from_slice(&addr.octets());
        }
        RData::Aaaa(addr) => {
            buf.extend_from_slice(&16u16.to_be_bytes());
            buf.extend_from_slice(&addr.octets());
        }
        RData::Other { bytes, .. } => {
            buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
            buf.extend_from_slice(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a raw query packet by hand, header through question section.
    fn query_bytes(id: u16, domain: &str) -> Vec<u8> {
        let mut packet = Vec::with_capacity(512);

        packet.extend_from_slice(&id.to_be_bytes());
        packet.extend_from_slice(&[0x01, 0x00]); // Flags: standard query
        packet.extend_from_slice(&[0x00, 0x01]); // Questions: 1
        packet.extend_from_slice(&[0x00, 0x00]); // Answer RRs: 0
        packet.extend_from_slice(&[0x00, 0x00]); // Authority RRs: 0
        packet.extend_from_slice(&[0x00, 0x00]); // Additional RRs: 0

        for label in domain.split('.') {
            packet.push(label.len() as u8);
            packet.extend_from_slice(label.as_bytes());
        }
        packet.push(0x00);

        packet.extend_from_slice(&[0x00, 0x01]); // Type: A
        packet.extend_from_slice(&[0x00, 0x01]); // Class: IN

        packet
    }

    #[test]
    fn decode_parses_query() {
        let message = Message::decode(&query_bytes(0x1234, "example.com")).unwrap();

        assert_eq!(message.id, 0x1234);
        assert_eq!(message.questions.len(), 1);
        assert_eq!(message.questions[0].name, "example.com");
        assert_eq!(message.questions[0].qtype, RecordType::A);
        assert_eq!(message.questions[0].qclass, RecordClass::In);
        assert!(message.answers.is_empty());
        assert!(message.authorities.is_empty());
        assert!(message.additionals.is_empty());
    }

    #[test]
    fn round_trip_is_lossless() {
        let message = Message {
            id: 0xbeef,
            flags: FLAG_REPLY | FLAG_AUTHORITATIVE,
            questions: vec![Question {
                name: "example.com".to_string(),
                qtype: RecordType::A,
                qclass: RecordClass::In,
            }],
            answers: vec![
                Record {
                    name: "example.com".to_string(),
                    class: RecordClass::In,
                    ttl: 300,
                    rdata: RData::A(Ipv4Addr::new(127, 0, 0, 1)),
                },
                Record {
                    name: "example.com".to_string(),
                    class: RecordClass::In,
                    ttl: 60,
                    rdata: RData::Aaaa(Ipv6Addr::LOCALHOST),
                },
            ],
            authorities: vec![],
            additionals: vec![Record {
                name: String::new(),
                class: RecordClass::Other(254),
                ttl: 0,
                rdata: RData::Other {
                    rtype: 41,
                    bytes: vec![0xde, 0xad],
                },
            }],
        };

        let decoded = Message::decode(&message.encode()).unwrap();

        assert_eq!(decoded, message);
    }

    #[test]
    fn encode_counts_match_sections() {
        let message = Message {
            id: 1,
            flags: 0,
            questions: vec![Question {
                name: "a.example".to_string(),
                qtype: RecordType::Mx,
                qclass: RecordClass::In,
            }],
            answers: vec![Record {
                name: "a.example".to_string(),
                class: RecordClass::In,
                ttl: 1,
                rdata: RData::A(Ipv4Addr::new(10, 0, 0, 1)),
            }],
            authorities: vec![],
            additionals: vec![],
        };

        let bytes = message.encode();

        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 1); // questions
        assert_eq!(u16::from_be_bytes([bytes[6], bytes[7]]), 1); // answers
        assert_eq!(u16::from_be_bytes([bytes[8], bytes[9]]), 0); // authorities
        assert_eq!(u16::from_be_bytes([bytes[10], bytes[11]]), 0); // additionals
    }

    #[test]
    fn decode_empty_buffer_is_truncated() {
        assert_eq!(Message::decode(&[]), Err(DecodeError::Truncated));
    }

    #[test]
    fn decode_short_header_is_truncated() {
        let bytes = query_bytes(1, "example.com");

        assert_eq!(Message::decode(&bytes[..7]), Err(DecodeError::Truncated));
    }

    #[test]
    fn decode_count_past_buffer_is_truncated() {
        // Header claims three questions but only one is present.
        let mut bytes = query_bytes(0x1234, "example.com");
        bytes[5] = 3;

        assert_eq!(Message::decode(&bytes), Err(DecodeError::Truncated));
    }

    #[test]
    fn decode_label_overrun_is_malformed() {
        let mut bytes = query_bytes(1, "example.com");
        // Inflate the first label length past the end of the packet.
        bytes[12] = 0x3f;

        assert!(matches!(
            Message::decode(&bytes),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn decode_compression_pointer_is_malformed() {
        let mut bytes = query_bytes(1, "example.com");
        bytes[12] = 0xc0;

        assert!(matches!(
            Message::decode(&bytes),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn decode_wrong_a_record_width_is_malformed() {
        let message = Message {
            id: 7,
            flags: 0,
            questions: vec![],
            answers: vec![Record {
                name: "example.com".to_string(),
                class: RecordClass::In,
                ttl: 0,
                rdata: RData::Other {
                    rtype: 1,
                    bytes: vec![1, 2, 3],
                },
            }],
            authorities: vec![],
            additionals: vec![],
        };

        assert!(matches!(
            Message::decode(&message.encode()),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let mut bytes = query_bytes(0x1234, "example.com");
        bytes.extend_from_slice(&[0xff; 8]);

        let message = Message::decode(&bytes).unwrap();

        assert_eq!(message.id, 0x1234);
        assert_eq!(message.questions.len(), 1);
    }

    #[test]
    fn unknown_type_and_class_round_trip() {
        let message = Message {
            id: 2,
            flags: 0,
            questions: vec![Question {
                name: "example.com".to_string(),
                qtype: RecordType::Other(4242),
                qclass: RecordClass::Other(9),
            }],
            answers: vec![],
            authorities: vec![],
            additionals: vec![],
        };

        let decoded = Message::decode(&message.encode()).unwrap();

        assert_eq!(decoded, message);
    }

    #[test]
    fn root_name_round_trips() {
        let message = Message {
            id: 3,
            flags: 0,
            questions: vec![Question {
                name: String::new(),
                qtype: RecordType::Ns,
                qclass: RecordClass::In,
            }],
            answers: vec![],
            authorities: vec![],
            additionals: vec![],
        };

        let decoded = Message::decode(&message.encode()).unwrap();

        assert_eq!(decoded.questions[0].name, "");
    }
}
