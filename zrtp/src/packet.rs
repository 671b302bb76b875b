use arrayvec::ArrayVec;
use crc::{Crc, CRC_32_ISCSI};

use crate::config::AlgorithmId;
use crate::proto::*;
use crate::result::MalformedPacket;

/// A ZRTP identifier.
pub type Zid = [u8; ZID_SIZE];
/// Algorithm identifiers offered in a Hello, for one category.
pub type AlgorithmList = ArrayVec<AlgorithmId, MAX_ALGORITHMS>;

const CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Every ZRTP message kind we can send or receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Hello,
    HelloAck,
    Commit,
    DhPart1,
    DhPart2,
    Confirm1,
    Confirm2,
    Conf2Ack,
    Error,
    ErrorAck,
    GoClear,
    ClearAck,
    Ping,
    PingAck,
}

impl MessageType {
    const ALL: [MessageType; 14] = [
        Self::Hello,
        Self::HelloAck,
        Self::Commit,
        Self::DhPart1,
        Self::DhPart2,
        Self::Confirm1,
        Self::Confirm2,
        Self::Conf2Ack,
        Self::Error,
        Self::ErrorAck,
        Self::GoClear,
        Self::ClearAck,
        Self::Ping,
        Self::PingAck,
    ];

    /// The 8 byte type block identifying this message on the wire.
    pub const fn block(&self) -> &'static [u8; 8] {
        match self {
            Self::Hello => b"Hello   ",
            Self::HelloAck => b"HelloACK",
            Self::Commit => b"Commit  ",
            Self::DhPart1 => b"DHPart1 ",
            Self::DhPart2 => b"DHPart2 ",
            Self::Confirm1 => b"Confirm1",
            Self::Confirm2 => b"Confirm2",
            Self::Conf2Ack => b"Conf2ACK",
            Self::Error => b"Error   ",
            Self::ErrorAck => b"ErrorACK",
            Self::GoClear => b"GoClear ",
            Self::ClearAck => b"ClearACK",
            Self::Ping => b"Ping    ",
            Self::PingAck => b"PingACK ",
        }
    }

    pub fn from_block(block: &[u8]) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| &t.block()[..] == block)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub version: [u8; 4],
    pub client_id: [u8; CLIENT_ID_SIZE],
    pub h3: [u8; HASH_IMAGE_SIZE],
    pub zid: Zid,
    pub signature_capable: bool,
    pub mitm: bool,
    pub passive: bool,
    pub hashes: AlgorithmList,
    pub ciphers: AlgorithmList,
    pub auth_tags: AlgorithmList,
    pub key_agreements: AlgorithmList,
    pub sas_types: AlgorithmList,
    pub mac: [u8; MAC_SIZE],
}

/// A DH mode Commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub h2: [u8; HASH_IMAGE_SIZE],
    pub zid: Zid,
    pub hash: AlgorithmId,
    pub cipher: AlgorithmId,
    pub auth_tag: AlgorithmId,
    pub key_agreement: AlgorithmId,
    pub sas: AlgorithmId,
    pub hvi: [u8; HVI_SIZE],
    pub mac: [u8; MAC_SIZE],
}

/// Body shared by DHPart1 and DHPart2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhPart {
    pub h1: [u8; HASH_IMAGE_SIZE],
    pub rs1_id: [u8; SECRET_ID_SIZE],
    pub rs2_id: [u8; SECRET_ID_SIZE],
    pub aux_id: [u8; SECRET_ID_SIZE],
    pub pbx_id: [u8; SECRET_ID_SIZE],
    pub public_value: Vec<u8>,
    pub mac: [u8; MAC_SIZE],
}

/// Body shared by Confirm1 and Confirm2. `encrypted` holds a `ConfirmBody` under AES-CFB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirm {
    pub mac: [u8; MAC_SIZE],
    pub iv: [u8; 16],
    pub encrypted: Vec<u8>,
}

/// Decrypted part of a Confirm message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmBody {
    pub h0: [u8; HASH_IMAGE_SIZE],
    pub enrollment: bool,
    pub sas_verified: bool,
    pub allow_clear: bool,
    pub disclosure: bool,
    pub cache_expiration: u32,
    /// Signature block, a multiple of 4 bytes long. Empty unless the peer signs its SAS hash.
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    pub version: [u8; 4],
    pub endpoint_hash: [u8; ENDPOINT_HASH_SIZE],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingAck {
    pub version: [u8; 4],
    pub endpoint_hash: [u8; ENDPOINT_HASH_SIZE],
    pub received_endpoint_hash: [u8; ENDPOINT_HASH_SIZE],
    pub received_ssrc: u32,
}

/// A decoded ZRTP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello(Hello),
    HelloAck,
    Commit(Commit),
    DhPart1(DhPart),
    DhPart2(DhPart),
    Confirm1(Confirm),
    Confirm2(Confirm),
    Conf2Ack,
    Error(u32),
    ErrorAck,
    GoClear([u8; MAC_SIZE]),
    ClearAck,
    Ping(Ping),
    PingAck(PingAck),
}

/// Bounds checked cursor over an attacker controlled buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], MalformedPacket> {
        if self.remaining() < n {
            return Err(MalformedPacket::Truncated);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], MalformedPacket> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, MalformedPacket> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn algorithm(&mut self) -> Result<AlgorithmId, MalformedPacket> {
        Ok(AlgorithmId(self.array()?))
    }

    fn algorithms(&mut self, count: usize) -> Result<AlgorithmList, MalformedPacket> {
        let mut list = AlgorithmList::new();
        for _ in 0..count {
            list.try_push(self.algorithm()?).map_err(|_| MalformedPacket::InvalidField)?;
        }
        Ok(list)
    }

    fn finish(&self) -> Result<(), MalformedPacket> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(MalformedPacket::LengthMismatch)
        }
    }
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Hello(_) => MessageType::Hello,
            Self::HelloAck => MessageType::HelloAck,
            Self::Commit(_) => MessageType::Commit,
            Self::DhPart1(_) => MessageType::DhPart1,
            Self::DhPart2(_) => MessageType::DhPart2,
            Self::Confirm1(_) => MessageType::Confirm1,
            Self::Confirm2(_) => MessageType::Confirm2,
            Self::Conf2Ack => MessageType::Conf2Ack,
            Self::Error(_) => MessageType::Error,
            Self::ErrorAck => MessageType::ErrorAck,
            Self::GoClear(_) => MessageType::GoClear,
            Self::ClearAck => MessageType::ClearAck,
            Self::Ping(_) => MessageType::Ping,
            Self::PingAck(_) => MessageType::PingAck,
        }
    }

    /// Encode this message, header included.
    ///
    /// Variable length fields (DH public values, Confirm bodies) must be a multiple of 4 bytes long,
    /// as the length field counts 32-bit words.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(&PREAMBLE.to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(self.message_type().block());
        match self {
            Self::Hello(h) => {
                out.extend_from_slice(&h.version);
                out.extend_from_slice(&h.client_id);
                out.extend_from_slice(&h.h3);
                out.extend_from_slice(&h.zid);
                let mut flags = 0u8;
                if h.signature_capable {
                    flags |= FLAG_SIGNATURE_CAPABLE;
                }
                if h.mitm {
                    flags |= FLAG_MITM;
                }
                if h.passive {
                    flags |= FLAG_PASSIVE;
                }
                out.push(flags);
                out.push(h.hashes.len() as u8);
                out.push(((h.ciphers.len() as u8) << 4) | h.auth_tags.len() as u8);
                out.push(((h.key_agreements.len() as u8) << 4) | h.sas_types.len() as u8);
                for list in [&h.hashes, &h.ciphers, &h.auth_tags, &h.key_agreements, &h.sas_types] {
                    for id in list.iter() {
                        out.extend_from_slice(&id.0);
                    }
                }
                out.extend_from_slice(&h.mac);
            }
            Self::Commit(c) => {
                out.extend_from_slice(&c.h2);
                out.extend_from_slice(&c.zid);
                for id in [c.hash, c.cipher, c.auth_tag, c.key_agreement, c.sas] {
                    out.extend_from_slice(&id.0);
                }
                out.extend_from_slice(&c.hvi);
                out.extend_from_slice(&c.mac);
            }
            Self::DhPart1(d) | Self::DhPart2(d) => {
                debug_assert_eq!(d.public_value.len() % 4, 0);
                out.extend_from_slice(&d.h1);
                out.extend_from_slice(&d.rs1_id);
                out.extend_from_slice(&d.rs2_id);
                out.extend_from_slice(&d.aux_id);
                out.extend_from_slice(&d.pbx_id);
                out.extend_from_slice(&d.public_value);
                out.extend_from_slice(&d.mac);
            }
            Self::Confirm1(c) | Self::Confirm2(c) => {
                debug_assert_eq!(c.encrypted.len() % 4, 0);
                out.extend_from_slice(&c.mac);
                out.extend_from_slice(&c.iv);
                out.extend_from_slice(&c.encrypted);
            }
            Self::Error(code) => out.extend_from_slice(&code.to_be_bytes()),
            Self::GoClear(mac) => out.extend_from_slice(mac),
            Self::Ping(p) => {
                out.extend_from_slice(&p.version);
                out.extend_from_slice(&p.endpoint_hash);
            }
            Self::PingAck(p) => {
                out.extend_from_slice(&p.version);
                out.extend_from_slice(&p.endpoint_hash);
                out.extend_from_slice(&p.received_endpoint_hash);
                out.extend_from_slice(&p.received_ssrc.to_be_bytes());
            }
            Self::HelloAck | Self::Conf2Ack | Self::ErrorAck | Self::ClearAck => {}
        }
        let words = (out.len() / 4) as u16;
        out[2..4].copy_from_slice(&words.to_be_bytes());
        out
    }

    /// Decode a message, header included. `data` must hold exactly one message.
    pub fn decode(data: &[u8]) -> Result<Message, MalformedPacket> {
        if data.len() < MESSAGE_HEADER_SIZE {
            return Err(MalformedPacket::Truncated);
        }
        if u16::from_be_bytes([data[0], data[1]]) != PREAMBLE {
            return Err(MalformedPacket::BadPreamble);
        }
        let length = u16::from_be_bytes([data[2], data[3]]) as usize * 4;
        if length > data.len() {
            return Err(MalformedPacket::Truncated);
        } else if length != data.len() {
            return Err(MalformedPacket::LengthMismatch);
        }
        let message_type = MessageType::from_block(&data[4..MESSAGE_HEADER_SIZE]).ok_or(MalformedPacket::UnknownType)?;
        let mut r = Reader::new(&data[MESSAGE_HEADER_SIZE..]);
        let message = match message_type {
            MessageType::Hello => {
                let version = r.array()?;
                let client_id = r.array()?;
                let h3 = r.array()?;
                let zid = r.array()?;
                let [flags, hc, ca, ks]: [u8; 4] = r.array()?;
                let counts = [hc & 0x0f, ca >> 4, ca & 0x0f, ks >> 4, ks & 0x0f];
                if counts.iter().any(|c| *c as usize > MAX_ALGORITHMS) {
                    return Err(MalformedPacket::InvalidField);
                }
                Message::Hello(Hello {
                    version,
                    client_id,
                    h3,
                    zid,
                    signature_capable: flags & FLAG_SIGNATURE_CAPABLE != 0,
                    mitm: flags & FLAG_MITM != 0,
                    passive: flags & FLAG_PASSIVE != 0,
                    hashes: r.algorithms(counts[0] as usize)?,
                    ciphers: r.algorithms(counts[1] as usize)?,
                    auth_tags: r.algorithms(counts[2] as usize)?,
                    key_agreements: r.algorithms(counts[3] as usize)?,
                    sas_types: r.algorithms(counts[4] as usize)?,
                    mac: r.array()?,
                })
            }
            MessageType::Commit => Message::Commit(Commit {
                h2: r.array()?,
                zid: r.array()?,
                hash: r.algorithm()?,
                cipher: r.algorithm()?,
                auth_tag: r.algorithm()?,
                key_agreement: r.algorithm()?,
                sas: r.algorithm()?,
                hvi: r.array()?,
                mac: r.array()?,
            }),
            MessageType::DhPart1 | MessageType::DhPart2 => {
                let h1 = r.array()?;
                let rs1_id = r.array()?;
                let rs2_id = r.array()?;
                let aux_id = r.array()?;
                let pbx_id = r.array()?;
                let pv_len = r.remaining().checked_sub(MAC_SIZE).ok_or(MalformedPacket::Truncated)?;
                if pv_len == 0 {
                    return Err(MalformedPacket::InvalidField);
                }
                let part = DhPart { h1, rs1_id, rs2_id, aux_id, pbx_id, public_value: r.take(pv_len)?.to_vec(), mac: r.array()? };
                if message_type == MessageType::DhPart1 {
                    Message::DhPart1(part)
                } else {
                    Message::DhPart2(part)
                }
            }
            MessageType::Confirm1 | MessageType::Confirm2 => {
                let mac = r.array()?;
                let iv = r.array()?;
                if r.remaining() < CONFIRM_BODY_SIZE {
                    return Err(MalformedPacket::Truncated);
                }
                let confirm = Confirm { mac, iv, encrypted: r.take(r.remaining())?.to_vec() };
                if message_type == MessageType::Confirm1 {
                    Message::Confirm1(confirm)
                } else {
                    Message::Confirm2(confirm)
                }
            }
            MessageType::Error => Message::Error(r.u32()?),
            MessageType::GoClear => Message::GoClear(r.array()?),
            MessageType::Ping => Message::Ping(Ping { version: r.array()?, endpoint_hash: r.array()? }),
            MessageType::PingAck => Message::PingAck(PingAck {
                version: r.array()?,
                endpoint_hash: r.array()?,
                received_endpoint_hash: r.array()?,
                received_ssrc: r.u32()?,
            }),
            MessageType::HelloAck => Message::HelloAck,
            MessageType::Conf2Ack => Message::Conf2Ack,
            MessageType::ErrorAck => Message::ErrorAck,
            MessageType::ClearAck => Message::ClearAck,
        };
        r.finish()?;
        Ok(message)
    }
}

impl ConfirmBody {
    pub fn encode(&self) -> Vec<u8> {
        debug_assert_eq!(self.signature.len() % 4, 0);
        let sig_words = (self.signature.len() / 4) as u16;
        let mut flags = 0u8;
        if self.enrollment {
            flags |= FLAG_ENROLLMENT;
        }
        if self.sas_verified {
            flags |= FLAG_SAS_VERIFIED;
        }
        if self.allow_clear {
            flags |= FLAG_ALLOW_CLEAR;
        }
        if self.disclosure {
            flags |= FLAG_DISCLOSURE;
        }
        let mut out = Vec::with_capacity(CONFIRM_BODY_SIZE + self.signature.len());
        out.extend_from_slice(&self.h0);
        out.push(0);
        out.push((sig_words >> 8) as u8 & 0x01);
        out.push(sig_words as u8);
        out.push(flags);
        out.extend_from_slice(&self.cache_expiration.to_be_bytes());
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn decode(data: &[u8]) -> Result<ConfirmBody, MalformedPacket> {
        let mut r = Reader::new(data);
        let h0 = r.array()?;
        let [_, sig_hi, sig_lo, flags]: [u8; 4] = r.array()?;
        let sig_words = (((sig_hi & 0x01) as usize) << 8) | sig_lo as usize;
        let cache_expiration = r.u32()?;
        let signature = r.take(sig_words * 4)?.to_vec();
        r.finish()?;
        Ok(ConfirmBody {
            h0,
            enrollment: flags & FLAG_ENROLLMENT != 0,
            sas_verified: flags & FLAG_SAS_VERIFIED != 0,
            allow_clear: flags & FLAG_ALLOW_CLEAR != 0,
            disclosure: flags & FLAG_DISCLOSURE != 0,
            cache_expiration,
            signature,
        })
    }
}

/// The RTP-like header in front of every ZRTP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketHeader {
    pub sequence: u16,
    pub ssrc: u32,
}

/// Wrap an encoded message into a packet ready for the transport.
pub fn encode_packet(header: PacketHeader, message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(PACKET_HEADER_SIZE + message.len() + CRC_SIZE);
    out.push(PACKET_FIRST_BYTE);
    out.push(0);
    out.extend_from_slice(&header.sequence.to_be_bytes());
    out.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    out.extend_from_slice(&header.ssrc.to_be_bytes());
    out.extend_from_slice(message);
    // CRC-32c goes on the wire in the reflected (SCTP) byte order.
    let crc = CRC32C.checksum(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Validate the framing and CRC of a packet, returning its header and the message inside.
pub fn decode_packet(packet: &[u8]) -> Result<(PacketHeader, &[u8]), MalformedPacket> {
    if packet.len() < MIN_PACKET_SIZE {
        return Err(MalformedPacket::Truncated);
    }
    if packet[0] >> 4 != PACKET_FIRST_BYTE >> 4 {
        return Err(MalformedPacket::InvalidField);
    }
    if u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]) != MAGIC_COOKIE {
        return Err(MalformedPacket::BadMagicCookie);
    }
    let (body, crc) = packet.split_at(packet.len() - CRC_SIZE);
    if CRC32C.checksum(body).to_le_bytes() != crc {
        return Err(MalformedPacket::BadCrc);
    }
    let header = PacketHeader {
        sequence: u16::from_be_bytes([packet[2], packet[3]]),
        ssrc: u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]),
    };
    Ok((header, &body[PACKET_HEADER_SIZE..]))
}

/// Cheap check to demultiplex ZRTP from RTP on a shared port. Does not validate the CRC.
pub fn is_zrtp_packet(packet: &[u8]) -> bool {
    packet.len() >= MIN_PACKET_SIZE
        && packet[0] >> 4 == PACKET_FIRST_BYTE >> 4
        && packet[4..8] == MAGIC_COOKIE.to_be_bytes()
}

/// Overwrite the trailing MAC of an encoded message.
pub(crate) fn set_trailing_mac(message: &mut [u8], mac: &[u8; MAC_SIZE]) {
    let n = message.len();
    message[n - MAC_SIZE..].copy_from_slice(mac);
}

/// The part of an encoded message covered by its trailing MAC.
pub(crate) fn mac_covered(message: &[u8]) -> &[u8] {
    &message[..message.len().saturating_sub(MAC_SIZE)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&[u8; 4]]) -> AlgorithmList {
        list.iter().map(|id| AlgorithmId::new(id)).collect()
    }

    fn sample_hello() -> Hello {
        Hello {
            version: ZRTP_VERSION,
            client_id: *b"unit test client",
            h3: [3; 32],
            zid: [9; 12],
            signature_capable: false,
            mitm: false,
            passive: true,
            hashes: ids(&[b"S384", b"S256"]),
            ciphers: ids(&[b"AES3"]),
            auth_tags: ids(&[b"HS80", b"HS32"]),
            key_agreements: ids(&[b"EC38", b"DH3k", b"EC25"]),
            sas_types: ids(&[b"B32 "]),
            mac: [0xaa; 8],
        }
    }

    fn all_messages() -> Vec<Message> {
        let dh = DhPart {
            h1: [1; 32],
            rs1_id: [2; 8],
            rs2_id: [3; 8],
            aux_id: [4; 8],
            pbx_id: [5; 8],
            public_value: vec![6; 64],
            mac: [7; 8],
        };
        let confirm = Confirm { mac: [1; 8], iv: [2; 16], encrypted: vec![3; 40] };
        vec![
            Message::Hello(sample_hello()),
            Message::HelloAck,
            Message::Commit(Commit {
                h2: [2; 32],
                zid: [1; 12],
                hash: AlgorithmId::new(b"S256"),
                cipher: AlgorithmId::new(b"AES1"),
                auth_tag: AlgorithmId::new(b"HS32"),
                key_agreement: AlgorithmId::new(b"EC25"),
                sas: AlgorithmId::new(b"B32 "),
                hvi: [8; 32],
                mac: [9; 8],
            }),
            Message::DhPart1(dh.clone()),
            Message::DhPart2(DhPart { public_value: vec![6; 96], ..dh }),
            Message::Confirm1(confirm.clone()),
            Message::Confirm2(confirm),
            Message::Conf2Ack,
            Message::Error(ERROR_BAD_CONFIRM_MAC),
            Message::ErrorAck,
            Message::GoClear([4; 8]),
            Message::ClearAck,
            Message::Ping(Ping { version: ZRTP_VERSION, endpoint_hash: [5; 8] }),
            Message::PingAck(PingAck {
                version: ZRTP_VERSION,
                endpoint_hash: [5; 8],
                received_endpoint_hash: [6; 8],
                received_ssrc: 0xdeadbeef,
            }),
        ]
    }

    #[test]
    fn every_message_kind_round_trips() {
        for message in all_messages() {
            let encoded = message.encode();
            assert_eq!(encoded.len() % 4, 0);
            if let Message::DhPart1(d) | Message::DhPart2(d) = &message {
                assert_eq!(encoded.len(), DH_PART_FIXED_SIZE + d.public_value.len());
            }
            let decoded = Message::decode(&encoded).unwrap();
            assert_eq!(decoded, message);
            assert_eq!(decoded.encode(), encoded);
        }
    }

    #[test]
    fn hello_layout_matches_rfc() {
        let encoded = Message::Hello(sample_hello()).encode();
        assert_eq!(HELLO_FIXED_SIZE, 88);
        assert_eq!(encoded.len(), HELLO_FIXED_SIZE + 9 * 4);
        assert_eq!(&encoded[0..2], &[0x50, 0x5a]);
        assert_eq!(u16::from_be_bytes([encoded[2], encoded[3]]) as usize * 4, encoded.len());
        assert_eq!(&encoded[4..12], b"Hello   ");
        assert_eq!(&encoded[12..16], b"1.10");
        // Flag word: P set, hc=2, cc=1, ac=2, kc=3, sc=1.
        assert_eq!(&encoded[76..80], &[0x10, 0x02, 0x12, 0x31]);
        assert_eq!(&encoded[80..84], b"S384");
    }

    #[test]
    fn commit_layout_matches_rfc() {
        let encoded = all_messages()[2].encode();
        assert_eq!(encoded.len(), COMMIT_SIZE);
        assert_eq!(COMMIT_SIZE, 116);
        assert_eq!(&encoded[2..4], &29u16.to_be_bytes());
    }

    #[test]
    fn confirm_body_round_trips() {
        let body = ConfirmBody {
            h0: [7; 32],
            enrollment: false,
            sas_verified: true,
            allow_clear: true,
            disclosure: false,
            cache_expiration: CACHE_EXPIRATION_NEVER,
            signature: Vec::new(),
        };
        let encoded = body.encode();
        assert_eq!(encoded.len(), CONFIRM_BODY_SIZE);
        assert_eq!(encoded[35], FLAG_SAS_VERIFIED | FLAG_ALLOW_CLEAR);
        assert_eq!(ConfirmBody::decode(&encoded).unwrap(), body);
    }

    #[test]
    fn malformed_messages_are_rejected() {
        let encoded = Message::Hello(sample_hello()).encode();
        assert_eq!(Message::decode(&encoded[..8]), Err(MalformedPacket::Truncated));
        assert_eq!(Message::decode(&encoded[..encoded.len() - 4]), Err(MalformedPacket::Truncated));

        let mut bad = encoded.clone();
        bad[0] = 0;
        assert_eq!(Message::decode(&bad), Err(MalformedPacket::BadPreamble));

        let mut bad = encoded.clone();
        bad[4..12].copy_from_slice(b"Bogus   ");
        assert_eq!(Message::decode(&bad), Err(MalformedPacket::UnknownType));

        let mut bad = encoded.clone();
        bad.extend_from_slice(&[0; 4]);
        assert_eq!(Message::decode(&bad), Err(MalformedPacket::LengthMismatch));

        // Algorithm counts that disagree with the message length.
        let mut bad = encoded.clone();
        bad[79] = 0x30;
        assert_eq!(Message::decode(&bad), Err(MalformedPacket::LengthMismatch));

        let mut bad = encoded;
        bad[77] = 0x08;
        assert_eq!(Message::decode(&bad), Err(MalformedPacket::InvalidField));
    }

    #[test]
    fn arbitrary_input_never_panics() {
        let mut seed = 0x1234_5678u32;
        for len in 0..200 {
            let mut buf = Vec::with_capacity(len);
            for _ in 0..len {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                buf.push((seed >> 16) as u8);
            }
            if len >= 4 {
                buf[0] = 0x50;
                buf[1] = 0x5a;
                let words = (len / 4) as u16;
                buf[2..4].copy_from_slice(&words.to_be_bytes());
            }
            let _ = Message::decode(&buf);
            let _ = ConfirmBody::decode(&buf);
            let _ = decode_packet(&buf);
        }
    }

    #[test]
    fn packet_framing_and_crc() {
        let message = Message::HelloAck.encode();
        let packet = encode_packet(PacketHeader { sequence: 7, ssrc: 0x01020304 }, &message);
        assert_eq!(&packet[..2], &[0x10, 0x00]);
        assert_eq!(&packet[4..8], b"ZRTP");
        assert!(is_zrtp_packet(&packet));

        let (header, inner) = decode_packet(&packet).unwrap();
        assert_eq!(header, PacketHeader { sequence: 7, ssrc: 0x01020304 });
        assert_eq!(inner, &message[..]);

        let mut corrupted = packet.clone();
        corrupted[20] ^= 0x01;
        assert_eq!(decode_packet(&corrupted), Err(MalformedPacket::BadCrc));

        let mut not_zrtp = packet;
        not_zrtp[5] = b'X';
        assert_eq!(decode_packet(&not_zrtp), Err(MalformedPacket::BadMagicCookie));
    }

    #[test]
    fn crc32c_check_value() {
        assert_eq!(CRC32C.checksum(b"123456789"), 0xe306_9283);
    }
}
