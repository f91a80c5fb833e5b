use gjallar::dns::{Message, ParseError, enums::RecordType};

// Response with two answers whose names lean on compression: the second
// record's owner and its CNAME target both point into the first record's
// owner name.
const COMPRESSED_ANSWERS: &[u8] = &[
    0x00, 0x00, // Transaction ID
    0x81, 0x80, // Flags: response, RD, RA
    0x00, 0x00, // QDCOUNT = 0
    0x00, 0x02, // ANCOUNT = 2
    0x00, 0x00, // NSCOUNT = 0
    0x00, 0x00, // ARCOUNT = 0
    // Answer 1: example.com A 1.2.3.4
    0x07, b'e', b'x', b'a', b'm', b'p', b'l', b'e', // "example" (offset 12)
    0x03, b'c', b'o', b'm', 0x00, // "com" (offset 20) + root
    0x00, 0x01, // Type: A
    0x00, 0x01, // Class: IN
    0x00, 0x00, 0x00, 0x3C, // TTL = 60
    0x00, 0x04, // RDLENGTH = 4
    0x01, 0x02, 0x03, 0x04, // 1.2.3.4
    // Answer 2: test.com CNAME target.com, both names ending in a pointer
    // to ".com" at offset 20
    0x04, b't', b'e', b's', b't', // "test"
    0xC0, 0x14, // pointer to offset 20
    0x00, 0x05, // Type: CNAME
    0x00, 0x01, // Class: IN
    0x00, 0x00, 0x00, 0x3C, // TTL = 60
    0x00, 0x09, // RDLENGTH = 9
    0x06, b't', b'a', b'r', b'g', b'e', b't', // "target"
    0xC0, 0x14, // pointer to ".com"
];

#[test]
fn pointer_into_earlier_name_is_followed() {
    let message = Message::parse(COMPRESSED_ANSWERS).expect("failed to parse");

    assert_eq!(message.answers.len(), 2);

    let first = &message.answers[0];
    assert_eq!(first.name(), "example.com");
    assert_eq!(first.rtype, RecordType::A);
    assert_eq!(first.parsed_rdata.as_deref(), Some("1.2.3.4"));

    let second = &message.answers[1];
    assert_eq!(second.name(), "test.com");
    assert_eq!(second.rtype, RecordType::CNAME);
    assert_eq!(second.parsed_rdata.as_deref(), Some("target.com."));
}

#[test]
fn compressed_rdata_is_flattened() {
    let message = Message::parse(COMPRESSED_ANSWERS).expect("failed to parse");

    // The CNAME target is rewritten without pointers, so the record is
    // self-contained and survives re-encoding.
    assert_eq!(message.answers[1].rdata, b"\x06target\x03com\x00");

    let reparsed = Message::parse(&message.serialize().unwrap()).unwrap();
    assert_eq!(message, reparsed);
}

fn question_with_name(name_bytes: &[u8]) -> Vec<u8> {
    let mut bytes = vec![
        0x00, 0x00, 0x01, 0x00, // ID, flags
        0x00, 0x01, // QDCOUNT = 1
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    bytes.extend_from_slice(name_bytes);
    bytes.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // A, IN
    bytes
}

#[test]
fn self_pointer_is_rejected() {
    // Pointer at offset 12 targeting offset 12.
    let bytes = question_with_name(&[0xC0, 0x0C]);
    assert_eq!(
        Message::parse(&bytes),
        Err(ParseError::MalformedName(
            "compression pointer does not point backwards"
        ))
    );
}

#[test]
fn forward_pointer_is_rejected() {
    // Pointer at offset 12 targeting offset 32, ahead of itself.
    let bytes = question_with_name(&[0xC0, 0x20]);
    assert_eq!(
        Message::parse(&bytes),
        Err(ParseError::MalformedName(
            "compression pointer does not point backwards"
        ))
    );
}

#[test]
fn pointer_chain_is_capped() {
    // A ladder of pointers, each pointing at the previous rung, with the
    // question name at the top. Every hop is strictly backwards, so only
    // the jump cap stops the chase.
    let mut bytes = vec![
        0x00, 0x00, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    bytes.push(0x00); // offset 12: root name, the chain's base
    for rung in 0..10u16 {
        // offset 13 + 2*rung: pointer to the previous rung
        let target = if rung == 0 { 12 } else { 13 + 2 * (rung - 1) };
        bytes.push(0xC0 | (target >> 8) as u8);
        bytes.push((target & 0xFF) as u8);
    }
    // Question name: pointer to the topmost rung (offset 31).
    bytes.extend_from_slice(&[0xC0, 31]);
    bytes.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);

    assert_eq!(
        Message::parse(&bytes),
        Err(ParseError::MalformedName("too many compression pointers"))
    );
}

#[test]
fn oversized_label_is_rejected_on_decode() {
    let mut name = vec![64u8];
    name.extend_from_slice(&[b'a'; 64]);
    name.push(0);
    let bytes = question_with_name(&name);
    assert_eq!(
        Message::parse(&bytes),
        Err(ParseError::MalformedName("label exceeds 63 octets"))
    );
}

#[test]
fn oversized_name_is_rejected_on_decode() {
    // Five 63-octet labels push the encoded name past 255 octets.
    let mut name = Vec::new();
    for _ in 0..5 {
        name.push(63u8);
        name.extend_from_slice(&[b'a'; 63]);
    }
    name.push(0);
    let bytes = question_with_name(&name);
    assert_eq!(
        Message::parse(&bytes),
        Err(ParseError::MalformedName("name exceeds 255 octets"))
    );
}
