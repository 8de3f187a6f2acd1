//! SA parameter model
//!
//! Callers fill an [`SaParams`], hand it to [`super::SaBuilder`], and
//! read the offset outputs back after a successful build. The
//! protocol-specific part is a tagged enum ([`ProtocolParams`]) so the
//! per-protocol passes are matched exhaustively instead of downcast
//! from an untyped extension pointer.

use zeroize::Zeroizing;

use crate::error::{invalid, BuilderResult};

/// Processing direction of the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Encrypt / generate (egress).
    Outbound,
    /// Decrypt / verify (ingress).
    Inbound,
}

impl Direction {
    /// Lower-case name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Outbound => "outbound",
            Direction::Inbound => "inbound",
        }
    }
}

/// Cipher algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoAlgo {
    /// No encryption.
    Null,
    /// DES (64-bit key).
    Des,
    /// Triple DES (192-bit key).
    TripleDes,
    /// ARCFOUR stream cipher.
    Arc4,
    /// AES with a 128, 192 or 256-bit key.
    Aes,
    /// Kasumi (wireless).
    Kasumi,
    /// SNOW 3G (wireless).
    Snow,
    /// ZUC (wireless).
    Zuc,
    /// ChaCha20 with a 128 or 256-bit key.
    ChaCha20,
    /// SM4.
    Sm4,
    /// Vendor-defined block cipher slot 0.
    Bc0,
}

/// Cipher feedback / counter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CryptoMode {
    Ecb,
    Cbc,
    Ofb,
    Cfb,
    Cfb1,
    Cfb8,
    Ctr,
    /// Integer counter mode (full-word counter).
    Icm,
    Ccm,
    Gcm,
    Gmac,
    /// ARC4, no state kept between packets.
    Stateless,
    /// ARC4, state persisted in the SA.
    Stateful,
    Xts,
    XtsStateful,
    /// Wireless algorithm without a feedback mode.
    Basic,
    /// Kasumi f8.
    F8,
    /// SNOW UEA2.
    Uea2,
    /// ZUC EEA3.
    Eea3,
    /// ChaCha20 with a 32-bit counter.
    ChaChaCtr32,
    /// ChaCha20 with a 64-bit counter.
    ChaChaCtr64,
}

/// Where the engine obtains the IV for each packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvSrc {
    /// Builder picks the protocol default.
    Default,
    /// IV stored in the SA record.
    Sa,
    /// Engine PRNG.
    Prng,
    /// IV taken from the input packet.
    Input,
    /// IV supplied in the per-packet token.
    Token,
    /// IV derived from the sequence number.
    Seq,
    /// Salt XORed with the sequence number (RFC 8750 style).
    XorSeq,
    /// No IV transmitted; wholly derived at both ends.
    Implicit,
}

/// Authentication algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AuthAlgo {
    Null,
    HashMd5,
    HashSha1,
    HashSha2_224,
    HashSha2_256,
    HashSha2_384,
    HashSha2_512,
    HashSm3,
    HashSha3_224,
    HashSha3_256,
    HashSha3_384,
    HashSha3_512,
    KeyedHashSha3_224,
    KeyedHashSha3_256,
    KeyedHashSha3_384,
    KeyedHashSha3_512,
    SslMacMd5,
    SslMacSha1,
    HmacMd5,
    HmacSha1,
    HmacSha2_224,
    HmacSha2_256,
    HmacSha2_384,
    HmacSha2_512,
    HmacSm3,
    HmacSha3_224,
    HmacSha3_256,
    HmacSha3_384,
    HmacSha3_512,
    XcbcMac,
    Cmac128,
    Cmac192,
    Cmac256,
    AesCcm,
    AesGcm,
    AesGmac,
    KasumiF9,
    SnowUia2,
    ZucEia3,
    Poly1305,
    KeyedPoly1305,
}

/// SSL/TLS/DTLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TlsVersion {
    Ssl3_0,
    Tls1_0,
    Tls1_1,
    Tls1_2,
    Tls1_3,
    Dtls1_0,
    Dtls1_2,
}

impl TlsVersion {
    /// On-the-wire version field value.
    pub fn wire_value(&self) -> u16 {
        match self {
            TlsVersion::Ssl3_0 => 0x0300,
            TlsVersion::Tls1_0 => 0x0301,
            TlsVersion::Tls1_1 => 0x0302,
            TlsVersion::Tls1_2 => 0x0303,
            TlsVersion::Tls1_3 => 0x0304,
            TlsVersion::Dtls1_0 => 0xfeff,
            TlsVersion::Dtls1_2 => 0xfefd,
        }
    }

    /// True for the datagram variants.
    pub fn is_dtls(&self) -> bool {
        matches!(self, TlsVersion::Dtls1_0 | TlsVersion::Dtls1_2)
    }
}

/// Generic per-SA flags ([`SaParams::flags`]).
pub mod flags {
    /// Input packet uses a gather list.
    pub const GATHER: u32 = 1 << 0;
    /// Output packet uses a scatter list.
    pub const SCATTER: u32 = 1 << 1;
    /// Suppress header processing.
    pub const SUPPRESS_HDRPROC: u32 = 1 << 2;
    /// Do not copy the header to the output.
    pub const SUPPRESS_HEADER: u32 = 1 << 3;
    /// Do not copy the payload to the output.
    pub const SUPPRESS_PAYLOAD: u32 = 1 << 4;
    /// Save the final IV back into the SA.
    pub const IV_SAVE: u32 = 1 << 5;
    /// Persist the ARC4 state after each packet.
    pub const ARC4_STATE_SAVE: u32 = 1 << 6;
    /// Load an externally supplied ARC4 state at SA-build time.
    pub const ARC4_STATE_LOAD: u32 = 1 << 7;
    /// Load an intermediate hash digest from the SA.
    pub const HASH_LOAD: u32 = 1 << 8;
    /// Store the (intermediate) hash digest into the SA.
    pub const HASH_SAVE: u32 = 1 << 9;
    /// Digest is an intermediate, not a final value.
    pub const HASH_INTERMEDIATE: u32 = 1 << 10;
    /// Copy the IV to the output packet (and into the hash).
    pub const COPY_IV: u32 = 1 << 11;
    /// Redirect the result to another interface.
    pub const REDIRECT: u32 = 1 << 12;
}

/// IPsec ESP flags ([`IpsecParams::ipsec_flags`]).
pub mod ipsec_flags {
    /// ESP protocol (required; AH is not supported).
    pub const ESP: u32 = 1 << 0;
    /// AH protocol (rejected by the builder).
    pub const AH: u32 = 1 << 1;
    /// Tunnel mode.
    pub const TUNNEL: u32 = 1 << 2;
    /// Transport mode.
    pub const TRANSPORT: u32 = 1 << 3;
    /// Outer header is IPv4.
    pub const IPV4: u32 = 1 << 4;
    /// Outer header is IPv6.
    pub const IPV6: u32 = 1 << 5;
    /// 64-bit extended sequence numbers.
    pub const LONG_SEQ: u32 = 1 << 6;
    /// Disable anti-replay checking.
    pub const NO_ANTI_REPLAY: u32 = 1 << 7;
    /// 32-bit replay mask.
    pub const MASK_32: u32 = 1 << 8;
    /// 128-bit replay mask.
    pub const MASK_128: u32 = 1 << 9;
    /// 256-bit replay mask.
    pub const MASK_256: u32 = 1 << 10;
    /// 384-bit replay mask.
    pub const MASK_384: u32 = 1 << 11;
    /// Force the fixed sequence-number offsets.
    pub const FIXED_SEQ_OFFSET: u32 = 1 << 12;
    /// Append the sequence number to the output packet.
    pub const APPEND_SEQNUM: u32 = 1 << 13;
    /// Firmware constructs/strips the IP headers.
    pub const PROCESS_IP_HEADERS: u32 = 1 << 14;
    /// UDP-encapsulated ESP (NAT traversal).
    pub const NATT: u32 = 1 << 15;
    /// Decrement the tunnel TTL/hop limit.
    pub const DEC_TTL: u32 = 1 << 16;
    /// Clear the IPv4 don't-fragment bit.
    pub const CLEAR_DF: u32 = 1 << 17;
    /// Set the IPv4 don't-fragment bit.
    pub const SET_DF: u32 = 1 << 18;
    /// Replace DSCP in the inner header.
    pub const REPLACE_DSCP: u32 = 1 << 19;
    /// Clear ECN bits in the inner header.
    pub const CLEAR_ECN: u32 = 1 << 20;
    /// Transport-mode NAT address rewrite.
    pub const TRANSPORT_NAT: u32 = 1 << 21;
    /// Apply the precomputed checksum delta for internal NAT.
    pub const CHECKSUM_FIX: u32 = 1 << 22;
    /// Record is used through the XFRM offload API.
    pub const XFRM_API: u32 = 1 << 23;
}

/// SSL/TLS/DTLS flags ([`SslTlsParams::ssltls_flags`]).
pub mod ssltls_flags {
    /// Disable DTLS anti-replay checking.
    pub const NO_ANTI_REPLAY: u32 = 1 << 0;
    /// 32-bit DTLS replay mask.
    pub const MASK_32: u32 = 1 << 1;
    /// 128-bit DTLS replay mask.
    pub const MASK_128: u32 = 1 << 2;
    /// Force the fixed sequence-number offsets.
    pub const FIXED_SEQ_OFFSET: u32 = 1 << 3;
    /// DTLS carried over CAPWAP.
    pub const CAPWAP: u32 = 1 << 4;
    /// Outer header is IPv6.
    pub const IPV6: u32 = 1 << 5;
    /// Firmware processes the IP/UDP headers.
    pub const PROCESS_IP_HEADERS: u32 = 1 << 6;
    /// Headers stay in plaintext ahead of the record.
    pub const PLAINTEXT_HEADERS: u32 = 1 << 7;
}

/// Basic-protocol flags ([`BasicParams::basic_flags`]).
pub mod basic_flags {
    /// Strip and check the ICV on inbound hash operations.
    pub const EXTRACT_ICV: u32 = 1 << 0;
    /// Hash first, then encrypt hash and payload together.
    pub const ENCRYPT_AFTER_HASH: u32 = 1 << 1;
    /// Record is used through the XFRM offload API.
    pub const XFRM_API: u32 = 1 << 2;
    /// The first packet carries the raw HMAC key and stores the
    /// inner/outer precomputes into the record.
    pub const HMAC_PRECOMPUTE: u32 = 1 << 3;
}

/// MACsec flags ([`MacSecParams::macsec_flags`]).
pub mod macsec_flags {
    /// End station bit in the SecTAG.
    pub const ES: u32 = 1 << 0;
    /// SCI present in the SecTAG.
    pub const SC: u32 = 1 << 1;
    /// Single copy broadcast bit in the SecTAG.
    pub const SCB: u32 = 1 << 2;
}

/// SRTP flags ([`SrtpParams::srtp_flags`]).
pub mod srtp_flags {
    /// Transform protects SRTCP rather than SRTP.
    pub const SRTCP: u32 = 1 << 0;
    /// A master key identifier is carried in each packet.
    pub const INCLUDE_MKI: u32 = 1 << 1;
}

/// Basic (raw crypto/hash) protocol extension.
#[derive(Debug, Clone, Default)]
pub struct BasicParams {
    /// See [`basic_flags`].
    pub basic_flags: u32,
    /// Block count preset for intermediate digests.
    pub digest_block_count: u16,
    /// Truncated ICV length in bytes (0 for the algorithm default).
    pub icv_byte_count: usize,
    /// Wireless `FRESH` salt value.
    pub fresh: u32,
    /// Wireless bearer identity (0..=32).
    pub bearer: u8,
    /// Wireless direction bit (0 or 1).
    pub direction_bit: u8,
    /// Header-processing context reference passed to firmware.
    pub context_ref: u32,
}

/// IPsec ESP protocol extension.
#[derive(Debug, Clone, Default)]
pub struct IpsecParams {
    /// See [`ipsec_flags`].
    pub ipsec_flags: u32,
    /// Security Parameter Index, already in network order.
    pub spi: u32,
    /// Initial sequence number (low half).
    pub seq_num: u32,
    /// Initial extended sequence number (high half).
    pub seq_num_hi: u32,
    /// Initial replay mask content, up to 128 bits.
    pub seq_mask: [u32; 4],
    /// Pad alignment override in bytes (0 for the cipher default).
    pub pad_alignment: u8,
    /// ICV length in bytes for the AEAD modes (8, 12 or 16; 0 = 16).
    pub icv_byte_count: usize,
    /// UDP source port for NAT-T encapsulation.
    pub natt_src_port: u16,
    /// UDP destination port for NAT-T encapsulation.
    pub natt_dest_port: u16,
    /// Header-processing context reference passed to firmware.
    pub context_ref: u32,
    /// TTL/hop limit for constructed tunnel headers.
    pub ttl: u8,
    /// DSCP value for constructed tunnel headers.
    pub dscp: u8,
    /// Anti-replay mask width in bits (0 = derive from flags).
    pub sequence_mask_bit_count: u32,
    /// Tunnel/NAT source address (4 or 16 bytes).
    pub src_ip_addr: Option<Vec<u8>>,
    /// Tunnel/NAT destination address (4 or 16 bytes).
    pub dest_ip_addr: Option<Vec<u8>>,
    /// Pre-NAT source address for checksum deltas.
    pub orig_src_ip_addr: Option<Vec<u8>>,
    /// Pre-NAT destination address for checksum deltas.
    pub orig_dest_ip_addr: Option<Vec<u8>>,
}

/// SSL/TLS/DTLS protocol extension.
#[derive(Debug, Clone)]
pub struct SslTlsParams {
    /// See [`ssltls_flags`].
    pub ssltls_flags: u32,
    /// Protocol version.
    pub version: TlsVersion,
    /// DTLS epoch.
    pub epoch: u16,
    /// Initial sequence number (low half).
    pub seq_num: u32,
    /// Initial sequence number (high half; 16 bits used for DTLS).
    pub seq_num_hi: u32,
    /// Initial DTLS replay mask content, up to 384 bits.
    pub seq_mask: [u32; 12],
    /// Pad alignment override in bytes (0 for the cipher default).
    pub pad_alignment: u8,
    /// Header-processing context reference passed to firmware.
    pub context_ref: u32,
    /// DTLS anti-replay mask width in bits (0 = derive from flags).
    pub sequence_mask_bit_count: u32,
    /// Truncated ICV length in bytes (0 for the algorithm default).
    pub icv_byte_count: usize,
}

/// MACsec protocol extension.
#[derive(Debug, Clone)]
pub struct MacSecParams {
    /// See [`macsec_flags`].
    pub macsec_flags: u32,
    /// Secure Channel Identifier.
    pub sci: [u8; 8],
    /// Association Number (0..=3).
    pub an: u8,
    /// Initial packet number.
    pub seq_num: u32,
    /// Inbound replay window size.
    pub replay_window: u32,
    /// Confidentiality offset in bytes.
    pub conf_offset: u8,
    /// Header-processing context reference passed to firmware.
    pub context_ref: u32,
}

/// SRTP/SRTCP protocol extension.
#[derive(Debug, Clone, Default)]
pub struct SrtpParams {
    /// See [`srtp_flags`].
    pub srtp_flags: u32,
    /// Master key identifier, transmitted when `INCLUDE_MKI` is set.
    pub mki: u32,
    /// ICV length in bytes verified on inbound packets.
    pub icv_byte_count: usize,
}

/// Protocol-specific parameter extension, tagged by protocol family.
#[derive(Debug, Clone)]
pub enum ProtocolParams {
    /// Raw crypto/hash operations.
    Basic(BasicParams),
    /// IPsec ESP.
    Ipsec(IpsecParams),
    /// SSL/TLS/DTLS records.
    SslTls(SslTlsParams),
    /// MACsec frames.
    MacSec(MacSecParams),
    /// SRTP/SRTCP packets.
    Srtp(SrtpParams),
}

impl ProtocolParams {
    /// Lower-case protocol family name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolParams::Basic(_) => "basic",
            ProtocolParams::Ipsec(_) => "esp",
            ProtocolParams::SslTls(_) => "ssltls",
            ProtocolParams::MacSec(_) => "macsec",
            ProtocolParams::Srtp(_) => "srtp",
        }
    }
}

/// Word offsets and counts written back by a successful build.
///
/// These locate the mutable fields inside the finished record; the
/// token-context compiler consumes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaOffsets {
    /// Final control word 0.
    pub cw0: u32,
    /// Final control word 1.
    pub cw1: u32,
    /// Inner digest / first key-derived field.
    pub digest0: usize,
    /// Outer digest.
    pub digest1: usize,
    /// Sequence number.
    pub seq_num: usize,
    /// Replay mask.
    pub seq_mask: usize,
    /// IV / nonce area.
    pub iv: usize,
    /// ARC4 i/j pointer word.
    pub ij_ptr: usize,
    /// ARC4 state pointer word.
    pub arc4_state: usize,
    /// Sequence number size in words.
    pub seq_num_words: usize,
    /// Replay mask size in words.
    pub seq_mask_words: usize,
    /// IV area size in words.
    pub iv_words: usize,
}

/// Parameters describing one security transform.
///
/// Key material is owned and zeroized on drop. The `offsets` field is
/// an output, filled in by [`super::SaBuilder::build_sa`].
#[derive(Debug, Clone)]
pub struct SaParams {
    /// Protocol family and its specific parameters.
    pub protocol: ProtocolParams,
    /// Processing direction.
    pub direction: Direction,
    /// Generic flags, see [`flags`].
    pub flags: u32,
    /// Cipher algorithm.
    pub crypto_algo: CryptoAlgo,
    /// Cipher mode.
    pub crypto_mode: CryptoMode,
    /// IV source policy.
    pub iv_src: IvSrc,
    /// Algorithm-specific parameter (BC0 round selector).
    pub crypto_parameter: u8,
    /// Cipher key. Required whenever `crypto_algo` is not `Null`.
    pub key: Option<Zeroizing<Vec<u8>>>,
    /// Inner digest / first authentication key.
    pub auth_key1: Option<Zeroizing<Vec<u8>>>,
    /// Outer digest / second authentication key.
    pub auth_key2: Option<Zeroizing<Vec<u8>>>,
    /// Third authentication key (XCBC K3).
    pub auth_key3: Option<Zeroizing<Vec<u8>>>,
    /// Authentication algorithm.
    pub auth_algo: AuthAlgo,
    /// IV bytes when `iv_src` is `Sa` (ARC4 state array for state load).
    pub iv: Option<Vec<u8>>,
    /// Nonce/salt bytes for the counter modes.
    pub nonce: Option<Vec<u8>>,
    /// Caller-chosen word offset of an external ARC4 state record
    /// (0 to co-locate it after the SA).
    pub offset_arc4_state_record: usize,
    /// Target interface for the `REDIRECT` flag.
    pub redirect_interface: u8,
    /// Offsets written back by the build.
    pub offsets: SaOffsets,
}

impl SaParams {
    fn new(protocol: ProtocolParams, direction: Direction) -> Self {
        SaParams {
            protocol,
            direction,
            flags: 0,
            crypto_algo: CryptoAlgo::Null,
            crypto_mode: CryptoMode::Basic,
            iv_src: IvSrc::Default,
            crypto_parameter: 0,
            key: None,
            auth_key1: None,
            auth_key2: None,
            auth_key3: None,
            auth_algo: AuthAlgo::Null,
            iv: None,
            nonce: None,
            offset_arc4_state_record: 0,
            redirect_interface: 0,
            offsets: SaOffsets::default(),
        }
    }

    /// Start an IPsec ESP transform.
    ///
    /// `mode` must be exactly one of [`ipsec_flags::TUNNEL`] or
    /// [`ipsec_flags::TRANSPORT`]; `ip_version` exactly one of
    /// [`ipsec_flags::IPV4`] or [`ipsec_flags::IPV6`]. The SPI must be
    /// non-zero.
    pub fn init_esp(
        spi: u32,
        mode: u32,
        ip_version: u32,
        direction: Direction,
    ) -> BuilderResult<Self> {
        if spi == 0 {
            return Err(invalid("ESP requires a non-zero SPI"));
        }
        if mode != ipsec_flags::TUNNEL && mode != ipsec_flags::TRANSPORT {
            return Err(invalid("ESP mode must be tunnel or transport"));
        }
        if ip_version != ipsec_flags::IPV4 && ip_version != ipsec_flags::IPV6 {
            return Err(invalid("ESP IP version must be IPv4 or IPv6"));
        }
        let ext = IpsecParams {
            ipsec_flags: ipsec_flags::ESP | mode | ip_version,
            spi,
            seq_mask: [1, 0, 0, 0],
            natt_src_port: 4500,
            natt_dest_port: 4500,
            ttl: 240,
            ..IpsecParams::default()
        };
        Ok(SaParams::new(ProtocolParams::Ipsec(ext), direction))
    }

    /// Start a Basic (raw crypto/hash) transform.
    pub fn init_basic(direction: Direction) -> Self {
        SaParams::new(ProtocolParams::Basic(BasicParams::default()), direction)
    }

    /// Start an SSL/TLS/DTLS record transform.
    pub fn init_ssltls(version: TlsVersion, direction: Direction) -> Self {
        let ext = SslTlsParams {
            ssltls_flags: 0,
            version,
            epoch: 0,
            seq_num: 0,
            seq_num_hi: 0,
            seq_mask: [0; 12],
            pad_alignment: 0,
            context_ref: 0,
            sequence_mask_bit_count: 0,
            icv_byte_count: 0,
        };
        SaParams::new(ProtocolParams::SslTls(ext), direction)
    }

    /// Start a MACsec transform for the given secure channel and
    /// association number (0..=3).
    pub fn init_macsec(sci: [u8; 8], an: u8, direction: Direction) -> BuilderResult<Self> {
        if an > 3 {
            return Err(invalid("MACsec association number out of range"));
        }
        let ext = MacSecParams {
            macsec_flags: 0,
            sci,
            an,
            seq_num: 0,
            replay_window: 0,
            conf_offset: 0,
            context_ref: 0,
        };
        Ok(SaParams::new(ProtocolParams::MacSec(ext), direction))
    }

    /// Start an SRTP/SRTCP transform.
    pub fn init_srtp(direction: Direction) -> Self {
        SaParams::new(ProtocolParams::Srtp(SrtpParams::default()), direction)
    }

    /// Select AES-CBC with the given key (16, 24 or 32 bytes).
    pub fn set_aes_cbc(&mut self, key: &[u8]) {
        self.crypto_algo = CryptoAlgo::Aes;
        self.crypto_mode = CryptoMode::Cbc;
        self.key = Some(Zeroizing::new(key.to_vec()));
    }

    /// Select AES-CTR with the given key and 4-byte nonce.
    pub fn set_aes_ctr(&mut self, key: &[u8], nonce: &[u8]) {
        self.crypto_algo = CryptoAlgo::Aes;
        self.crypto_mode = CryptoMode::Ctr;
        self.key = Some(Zeroizing::new(key.to_vec()));
        self.nonce = Some(nonce.to_vec());
    }

    /// Select AES-GCM with the given key and 4-byte salt.
    pub fn set_aes_gcm(&mut self, key: &[u8], salt: &[u8]) {
        self.crypto_algo = CryptoAlgo::Aes;
        self.crypto_mode = CryptoMode::Gcm;
        self.auth_algo = AuthAlgo::AesGcm;
        self.key = Some(Zeroizing::new(key.to_vec()));
        self.nonce = Some(salt.to_vec());
    }

    /// Select HMAC-SHA1 from precomputed inner/outer digests (20 bytes
    /// each).
    pub fn set_hmac_sha1(&mut self, inner: &[u8], outer: &[u8]) {
        self.auth_algo = AuthAlgo::HmacSha1;
        self.auth_key1 = Some(Zeroizing::new(inner.to_vec()));
        self.auth_key2 = Some(Zeroizing::new(outer.to_vec()));
    }

    /// Select HMAC-SHA2-256 from precomputed inner/outer digests
    /// (32 bytes each).
    pub fn set_hmac_sha2_256(&mut self, inner: &[u8], outer: &[u8]) {
        self.auth_algo = AuthAlgo::HmacSha2_256;
        self.auth_key1 = Some(Zeroizing::new(inner.to_vec()));
        self.auth_key2 = Some(Zeroizing::new(outer.to_vec()));
    }

    /// Cipher key bytes, or an error naming the missing material.
    pub(crate) fn key_bytes(&self) -> BuilderResult<&[u8]> {
        self.key
            .as_deref()
            .map(|k| k.as_slice())
            .ok_or_else(|| invalid("cipher key material missing"))
    }

    /// Nonce bytes with a minimum length check.
    pub(crate) fn nonce_bytes(&self, min_len: usize) -> BuilderResult<&[u8]> {
        match self.nonce.as_deref() {
            Some(n) if n.len() >= min_len => Ok(n),
            Some(_) => Err(invalid("nonce too short for the selected mode")),
            None => Err(invalid("nonce material missing")),
        }
    }

    /// IV bytes with a minimum length check.
    pub(crate) fn iv_bytes(&self, min_len: usize) -> BuilderResult<&[u8]> {
        match self.iv.as_deref() {
            Some(iv) if iv.len() >= min_len => Ok(iv),
            Some(_) => Err(invalid("IV too short for the selected mode")),
            None => Err(invalid("IV material missing")),
        }
    }
}
