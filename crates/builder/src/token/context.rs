//! Token context compilation
//!
//! A token context condenses one SA's parameters into the handful of
//! values the per-packet emitter needs: the engine protocol selector,
//! header-processing code, IV and ICV geometry, sequence/replay offsets
//! into the record and the salts that enter each token verbatim. The
//! context is compiled once, after the SA record has been built, and
//! the SA parameters may be discarded afterwards.

use crate::error::{invalid, unsupported, BuilderResult};
use crate::logging;
use crate::sa::extended as fw;
use crate::sa::params::{
    basic_flags, flags, ipsec_flags, srtp_flags, ssltls_flags, AuthAlgo, BasicParams, CryptoAlgo,
    CryptoMode, Direction, IpsecParams, IvSrc, ProtocolParams, SaParams, SrtpParams, SslTlsParams,
    TlsVersion,
};
use crate::sa::{ipsec, ssltls};

/// Engine protocol selector compiled into the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum TokenProtocol {
    EspOut,
    EspIn,
    EspCcmOut,
    EspCcmIn,
    EspGcmOut,
    EspGcmIn,
    EspGmacOut,
    EspGmacIn,
    EspChaChaPolyOut,
    EspChaChaPolyIn,
    SslTlsOut,
    SslTlsIn,
    SslTlsGcmOut,
    SslTlsGcmIn,
    SslTlsCcmOut,
    SslTlsCcmIn,
    SslTlsChaChaPolyOut,
    SslTlsChaChaPolyIn,
    Tls13GcmOut,
    Tls13GcmIn,
    Tls13CcmOut,
    Tls13CcmIn,
    Tls13ChaChaPolyOut,
    Tls13ChaChaPolyIn,
    BasicBypass,
    BasicCrypto,
    BasicHash,
    BasicCryptHash,
    BasicHashEnc,
    BasicDecHash,
    BasicCcmOut,
    BasicCcmIn,
    BasicGcmOut,
    BasicGcmIn,
    BasicGmacOut,
    BasicGmacIn,
    BasicChaChaPolyOut,
    BasicChaChaPolyIn,
    BasicXtsCrypto,
    BasicKasumiHash,
    BasicSnowHash,
    BasicZucHash,
    BasicHmacPrecompute,
    BasicHmacCtxPrepare,
    SrtpOut,
    SrtpIn,
}

/// How each packet's IV is obtained and placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum IvHandling {
    OutboundCbc,
    InboundCbc,
    OutboundCtr,
    InboundCtr,
    OutboundToken2Words,
    OutboundToken4Words,
    CopyToken2Words,
    CopyToken4Words,
    Outbound2Words,
    Outbound4Words,
    CopyCbc,
    CopyCtr,
    KasumiF8,
    SnowUea2,
    ZucEea3,
    TokenSrtp,
}

/// Which context fields the engine writes back after each packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum UpdateHandling {
    Null,
    Arc4,
    Iv2,
    Iv4,
    Block,
}

/// Lifecycle of a compiled context.
///
/// A context built from an SA whose HMAC digests were deferred starts
/// in `PendingPrecompute`: it temporarily targets the key-precompute
/// protocol and stashes the real protocol fields. [`TokenContext::advance`]
/// restores them after the precompute packet has been emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextState {
    /// The context emits its real protocol.
    Ready,
    /// The next token carries the raw HMAC key; the stashed fields
    /// take over afterwards.
    PendingPrecompute {
        /// Real protocol selector.
        protocol: TokenProtocol,
        /// Real header-processing code.
        header_proto: u8,
        /// Real IV handling.
        iv_handling: IvHandling,
        /// Token-header-word field bits (22..=29), cleared while pending.
        header_fields: u32,
    },
}

// Per-flow flag bits carried in the context.
pub(crate) const ESP_FLAG_CLEAR_DF: u32 = 1 << 0;
pub(crate) const ESP_FLAG_SET_DF: u32 = 1 << 1;
pub(crate) const ESP_FLAG_REPLACE_DSCP: u32 = 1 << 2;
pub(crate) const ESP_FLAG_CLEAR_ECN: u32 = 1 << 3;
pub(crate) const ESP_FLAG_NAT: u32 = 1 << 4;
pub(crate) const DTLS_FLAG_CAPWAP: u32 = 1 << 5;
pub(crate) const DTLS_FLAG_PLAINTEXT_HDR: u32 = 1 << 6;

/// Per-SA state consumed by the per-packet token emitter.
#[derive(Debug, Clone)]
pub struct TokenContext {
    /// Ready, or pending an HMAC-precompute packet.
    pub state: ContextState,
    /// Engine protocol selector.
    pub protocol: TokenProtocol,
    /// Header-processing protocol code (firmware contract).
    pub header_proto: u8,
    /// Base token header word; per-packet bits are ORed in.
    pub token_header_word: u32,
    /// IV acquisition and placement.
    pub iv_handling: IvHandling,
    /// Context write-back selection.
    pub update_handling: UpdateHandling,
    /// Cipher pad block size in bytes (1 for stream/counter modes).
    pub pad_block_byte_count: u32,
    /// IV bytes that appear explicitly in the packet.
    pub iv_byte_count: u32,
    /// ICV bytes appended/verified.
    pub icv_byte_count: u32,
    /// Word offset of the sequence number in the record.
    pub seq_offset: usize,
    /// Word offset of the IV (or ARC4 i/j word) in the record.
    pub iv_offset: usize,
    /// Word offset of the digest area (precompute path).
    pub digest_offset: usize,
    /// Digest size in words (hash state save and precompute).
    pub digest_word_count: u32,
    /// Extended-sequence marker; protocol-specific overload.
    pub ext_seq: u32,
    /// Anti-replay mask size in words; protocol-specific overload.
    pub anti_replay: u32,
    /// Final control word 0 from the built record.
    pub cw0: u32,
    /// Final control word 1 from the built record.
    pub cw1: u32,
    /// CCM salt word, wireless bearer/fresh word, or basic IV
    /// instruction parameter.
    pub ccm_salt: u32,
    /// `ESP_FLAG_*` / `DTLS_FLAG_*` bits.
    pub esp_flags: u32,
    /// TTL for constructed tunnel headers.
    pub ttl: u8,
    /// DSCP for constructed tunnel headers.
    pub dscp: u8,
    /// NAT-T UDP ports, packed in wire order.
    pub natt_ports: u32,
    /// Tunnel/NAT source then destination address bytes.
    pub tunnel_ip: [u8; 32],
    /// SRTP salt key words, XORed into each IV.
    pub salt_key: [u32; 4],
}

impl TokenContext {
    /// Restore the stashed protocol fields after the precompute packet.
    ///
    /// Returns true when the context actually switched.
    pub fn advance(&mut self) -> bool {
        match std::mem::replace(&mut self.state, ContextState::Ready) {
            ContextState::PendingPrecompute {
                protocol,
                header_proto,
                iv_handling,
                header_fields,
            } => {
                self.protocol = protocol;
                self.header_proto = header_proto;
                self.iv_handling = iv_handling;
                self.token_header_word |= header_fields << 22;
                true
            }
            ContextState::Ready => false,
        }
    }

    /// True while the context still targets the precompute protocol.
    pub fn is_pending(&self) -> bool {
        matches!(self.state, ContextState::PendingPrecompute { .. })
    }

    /// Advance the caller's packet identifier.
    ///
    /// Only outbound IPv4 tunnel header construction consumes the
    /// identifier (it becomes the IPv4 ID field), so it only moves for
    /// those contexts.
    pub fn next_pkt_id(&self, pkt_id: &mut u16) {
        if self.header_proto == fw::HDR_IPV4_OUT_TUNNEL
            || self.header_proto == fw::HDR_IPV4_OUT_TUNNEL + fw::HDR_NATT_OFFSET
        {
            *pkt_id = pkt_id.wrapping_add(1);
        }
    }
}

/// Size of a serialized context in 32-bit words.
pub fn context_word_count() -> usize {
    (std::mem::size_of::<TokenContext>() + 3) / 4
}

/// Compile a token context from built SA parameters.
///
/// The SA must have gone through [`crate::sa::SaBuilder::build_sa`]
/// first; the compiler reads the offsets and final control words the
/// build wrote back.
pub fn build_context(params: &SaParams) -> BuilderResult<TokenContext> {
    let mut ctx = TokenContext {
        state: ContextState::Ready,
        protocol: TokenProtocol::BasicBypass,
        header_proto: fw::HDR_BYPASS,
        token_header_word: fw::HEADER_DEFAULT,
        iv_handling: IvHandling::OutboundCbc,
        update_handling: UpdateHandling::Null,
        pad_block_byte_count: 1,
        iv_byte_count: 0,
        icv_byte_count: 0,
        seq_offset: 0,
        iv_offset: 0,
        digest_offset: 0,
        digest_word_count: 0,
        ext_seq: 0,
        anti_replay: 0,
        cw0: params.offsets.cw0,
        cw1: params.offsets.cw1,
        ccm_salt: 0,
        esp_flags: 0,
        ttl: 0,
        dscp: 0,
        natt_ports: 0,
        tunnel_ip: [0; 32],
        salt_key: [0; 4],
    };

    match &params.protocol {
        ProtocolParams::Ipsec(ext) => fill_ipsec(params, ext, &mut ctx)?,
        ProtocolParams::SslTls(ext) => fill_ssltls(params, ext, &mut ctx)?,
        ProtocolParams::Basic(ext) => fill_basic(params, ext, &mut ctx)?,
        ProtocolParams::Srtp(ext) => fill_srtp(params, ext, &mut ctx)?,
        ProtocolParams::MacSec(_) => {
            return Err(unsupported("MACsec frames are classified inline, not tokenized"))
        }
    }

    if ctx.protocol != TokenProtocol::BasicHmacPrecompute
        && params.offsets.digest1 != 0
        && params.auth_key2.is_none()
    {
        // HMAC digests were deferred at SA build time. The first packet
        // through this context carries the raw key and stores the
        // precomputes; the stashed fields take over afterwards.
        ctx.state = ContextState::PendingPrecompute {
            protocol: ctx.protocol,
            header_proto: ctx.header_proto,
            iv_handling: ctx.iv_handling,
            header_fields: (ctx.token_header_word >> 22) & 0xff,
        };
        ctx.protocol = TokenProtocol::BasicHmacCtxPrepare;
        ctx.header_proto = fw::HDR_BYPASS;
        ctx.iv_handling = IvHandling::InboundCtr;
        // Clear the field bits so no IV is taken from the key token.
        ctx.token_header_word &= 0xc03f_ffff;
        ctx.digest_word_count = (params.offsets.digest1 - params.offsets.digest0) as u32;
        ctx.digest_offset = params.offsets.digest0;
    }

    logging::log_token_context(
        ctx.protocol as u8,
        ctx.header_proto,
        ctx.icv_byte_count as usize,
        ctx.iv_byte_count as usize,
    );
    Ok(ctx)
}

fn fill_ipsec(
    params: &SaParams,
    ext: &IpsecParams,
    ctx: &mut TokenContext,
) -> BuilderResult<()> {
    if ext.ipsec_flags & ipsec_flags::ESP == 0 {
        if ext.ipsec_flags & ipsec_flags::AH != 0 {
            return Err(unsupported("AH transforms are not supported"));
        }
        return Err(invalid("IPsec context requires the ESP flag"));
    }

    ctx.ext_seq = 0;
    ctx.anti_replay = if ext.ipsec_flags & ipsec_flags::NO_ANTI_REPLAY != 0 {
        0
    } else {
        1
    };

    if params.direction == Direction::Outbound {
        ctx.protocol = TokenProtocol::EspOut;
        ctx.pad_block_byte_count = 4;
        ctx.iv_handling = IvHandling::OutboundCbc;
        if ext.ipsec_flags & ipsec_flags::LONG_SEQ != 0 {
            ctx.ext_seq = 1;
        }
    } else {
        ctx.protocol = TokenProtocol::EspIn;
        ctx.pad_block_byte_count = 4;
        ctx.token_header_word |= fw::HEADER_PAD_VERIFY;
        ctx.iv_handling = IvHandling::InboundCbc;
        if ext.ipsec_flags & ipsec_flags::LONG_SEQ != 0 {
            ctx.ext_seq = 1;
        }
        if ctx.ext_seq == 0
            && params.offsets.seq_num + 2 == params.offsets.seq_mask
            && ctx.anti_replay != 0
        {
            // No extended sequence number on the wire, but the record
            // uses the fixed seqnum/mask layout, so the context update
            // behaves as if there were one.
            ctx.ext_seq = 2;
        }
        ctx.anti_replay *= ipsec::mask_bit_count(ext) / 32;
    }
    ctx.seq_offset = params.offsets.seq_num;

    match params.crypto_algo {
        CryptoAlgo::Null => ctx.iv_byte_count = 0,
        CryptoAlgo::Des | CryptoAlgo::TripleDes => {
            ctx.iv_byte_count = 8;
            ctx.pad_block_byte_count = 8;
        }
        CryptoAlgo::Aes | CryptoAlgo::Sm4 | CryptoAlgo::Bc0 => {
            if params.crypto_mode == CryptoMode::Cbc {
                ctx.iv_byte_count = 16;
                ctx.pad_block_byte_count = 16;
            } else {
                ctx.iv_handling = if params.direction == Direction::Outbound {
                    IvHandling::OutboundCtr
                } else {
                    IvHandling::InboundCtr
                };
                ctx.iv_byte_count = if params.iv_src == IvSrc::Implicit { 0 } else { 8 };
            }
        }
        CryptoAlgo::ChaCha20 => {
            ctx.iv_handling = if params.direction == Direction::Outbound {
                IvHandling::OutboundCtr
            } else {
                IvHandling::InboundCtr
            };
            ctx.iv_byte_count = if params.iv_src == IvSrc::Implicit { 0 } else { 8 };
        }
        _ => return Err(invalid("unsupported cipher for ESP tokens")),
    }

    // Inbound and outbound counter modes have a single IV source,
    // handled above. Outbound CBC still has a choice.
    if params.crypto_mode == CryptoMode::Cbc
        && params.direction == Direction::Outbound
        && params.crypto_algo != CryptoAlgo::Null
    {
        set_outbound_cbc_iv_source(params, ctx)?;
    }

    if params.direction == Direction::Outbound
        && (ext.pad_alignment as u32) > ctx.pad_block_byte_count
        && ext.pad_alignment as u32 <= 256
    {
        ctx.pad_block_byte_count = ext.pad_alignment as u32;
    }

    match params.auth_algo {
        AuthAlgo::Null => {
            ctx.icv_byte_count = 0;
            ctx.ext_seq = 0;
        }
        AuthAlgo::HmacMd5 | AuthAlgo::HmacSha1 | AuthAlgo::XcbcMac | AuthAlgo::Cmac128 => {
            ctx.icv_byte_count = 12;
        }
        AuthAlgo::HmacSha2_224 | AuthAlgo::HmacSha2_256 | AuthAlgo::HmacSm3 => {
            ctx.icv_byte_count = 16;
        }
        AuthAlgo::HmacSha2_384 => ctx.icv_byte_count = 24,
        AuthAlgo::HmacSha2_512 => ctx.icv_byte_count = 32,
        AuthAlgo::AesCcm | AuthAlgo::AesGcm | AuthAlgo::AesGmac => {
            ctx.icv_byte_count = match ext.icv_byte_count {
                8 | 12 | 16 => ext.icv_byte_count as u32,
                _ => 16,
            };
            match params.auth_algo {
                AuthAlgo::AesCcm => {
                    ctx.protocol = if params.direction == Direction::Outbound {
                        TokenProtocol::EspCcmOut
                    } else {
                        TokenProtocol::EspCcmIn
                    };
                    let nonce = params.nonce_bytes(3)?;
                    ctx.ccm_salt = ((nonce[0] as u32) << 8)
                        | ((nonce[1] as u32) << 16)
                        | ((nonce[2] as u32) << 24)
                        | fw::CCM_FLAG_ADATA_L4
                        | ((ctx.icv_byte_count - 2) * 4);
                }
                AuthAlgo::AesGcm => {
                    ctx.protocol = if params.direction == Direction::Outbound {
                        TokenProtocol::EspGcmOut
                    } else {
                        TokenProtocol::EspGcmIn
                    };
                }
                AuthAlgo::AesGmac => {
                    ctx.protocol = if params.direction == Direction::Outbound {
                        TokenProtocol::EspGmacOut
                    } else {
                        TokenProtocol::EspGmacIn
                    };
                }
                _ => unreachable!(),
            }
        }
        AuthAlgo::Poly1305 => {
            ctx.icv_byte_count = 16;
            ctx.protocol = if params.direction == Direction::Outbound {
                TokenProtocol::EspChaChaPolyOut
            } else {
                TokenProtocol::EspChaChaPolyIn
            };
        }
        _ => return Err(invalid("unsupported authentication algorithm for ESP tokens")),
    }

    fill_ipsec_header_processing(params, ext, ctx)
}

/// Header-processing fields: protocol code, tunnel addresses, NAT-T
/// ports and the DF/DSCP/ECN flag bits.
fn fill_ipsec_header_processing(
    params: &SaParams,
    ext: &IpsecParams,
    ctx: &mut TokenContext,
) -> BuilderResult<()> {
    let ipv6 = ext.ipsec_flags & ipsec_flags::IPV6 != 0;
    let tunnel = ext.ipsec_flags & ipsec_flags::TUNNEL != 0;
    let process = ext.ipsec_flags & ipsec_flags::PROCESS_IP_HEADERS != 0;

    let mut header_proto = if params.direction == Direction::Outbound {
        match (ipv6, process, tunnel) {
            (false, true, true) => fw::HDR_IPV4_OUT_TUNNEL,
            (false, true, false) => fw::HDR_IPV4_OUT_TRANSP,
            (false, false, _) => fw::HDR_IPV4_OUT_TRANSP_HDRBYPASS,
            (true, true, true) => fw::HDR_IPV6_OUT_TUNNEL,
            (true, true, false) => fw::HDR_IPV6_OUT_TRANSP,
            (true, false, _) => fw::HDR_IPV6_OUT_TRANSP_HDRBYPASS,
        }
    } else {
        if process {
            ctx.token_header_word |= fw::HEADER_UPD_HDR;
        }
        match (ipv6, process, tunnel) {
            (false, true, true) => fw::HDR_IPV4_IN_TUNNEL,
            (false, true, false) => fw::HDR_IPV4_IN_TRANSP,
            (false, false, _) => fw::HDR_IPV4_IN_TRANSP_HDRBYPASS,
            (true, true, true) => fw::HDR_IPV6_IN_TUNNEL,
            (true, true, false) => fw::HDR_IPV6_IN_TRANSP,
            (true, false, _) => fw::HDR_IPV6_IN_TRANSP_HDRBYPASS,
        }
    };
    if ext.ipsec_flags & ipsec_flags::NATT != 0 {
        header_proto += fw::HDR_NATT_OFFSET;
    }
    ctx.header_proto = header_proto;

    ctx.ttl = ext.ttl;
    ctx.dscp = ext.dscp;
    ctx.natt_ports = ((ext.natt_src_port >> 8) as u32)
        | (((ext.natt_src_port & 0xff) as u32) << 8)
        | (((ext.natt_dest_port & 0xff00) as u32) << 8)
        | (((ext.natt_dest_port & 0xff) as u32) << 24);

    if ext.ipsec_flags & ipsec_flags::CLEAR_DF != 0 {
        ctx.esp_flags |= ESP_FLAG_CLEAR_DF;
    }
    if ext.ipsec_flags & ipsec_flags::SET_DF != 0 {
        ctx.esp_flags |= ESP_FLAG_SET_DF;
    }
    if ext.ipsec_flags & ipsec_flags::REPLACE_DSCP != 0 {
        ctx.esp_flags |= ESP_FLAG_REPLACE_DSCP;
    }
    if ext.ipsec_flags & ipsec_flags::CLEAR_ECN != 0 {
        ctx.esp_flags |= ESP_FLAG_CLEAR_ECN;
    }

    let out_tunnel = header_proto == fw::HDR_IPV4_OUT_TUNNEL
        || header_proto == fw::HDR_IPV6_OUT_TUNNEL
        || header_proto == fw::HDR_IPV4_OUT_TUNNEL + fw::HDR_NATT_OFFSET
        || header_proto == fw::HDR_IPV6_OUT_TUNNEL + fw::HDR_NATT_OFFSET;
    let transp_nat = (header_proto == fw::HDR_IPV4_OUT_TRANSP + fw::HDR_NATT_OFFSET
        || header_proto == fw::HDR_IPV4_IN_TRANSP + fw::HDR_NATT_OFFSET
        || header_proto == fw::HDR_IPV6_OUT_TRANSP + fw::HDR_NATT_OFFSET
        || header_proto == fw::HDR_IPV6_IN_TRANSP + fw::HDR_NATT_OFFSET)
        && ext.ipsec_flags & ipsec_flags::TRANSPORT_NAT != 0;

    if out_tunnel || transp_nat {
        let addr_len = if ipv6 && !transp_nat { 16 } else { 4 };
        match (ext.src_ip_addr.as_deref(), ext.dest_ip_addr.as_deref()) {
            (Some(src), Some(dst)) if src.len() >= addr_len && dst.len() >= addr_len => {
                ctx.tunnel_ip[..addr_len].copy_from_slice(&src[..addr_len]);
                ctx.tunnel_ip[addr_len..2 * addr_len].copy_from_slice(&dst[..addr_len]);
            }
            _ => return Err(invalid("tunnel address missing or too short")),
        }
        if transp_nat {
            ctx.esp_flags |= ESP_FLAG_NAT;
        }
    }
    Ok(())
}

fn fill_ssltls(
    params: &SaParams,
    ext: &SslTlsParams,
    ctx: &mut TokenContext,
) -> BuilderResult<()> {
    let tls13 = ext.version == TlsVersion::Tls1_3;
    ctx.ext_seq = 0;
    ctx.anti_replay = 1;

    if params.direction == Direction::Outbound {
        ctx.protocol = TokenProtocol::SslTlsOut;
        ctx.pad_block_byte_count = 1;
        ctx.iv_handling = IvHandling::OutboundCbc;
    } else {
        ctx.protocol = TokenProtocol::SslTlsIn;
        ctx.pad_block_byte_count = 1;
        if params.crypto_algo != CryptoAlgo::Null && params.crypto_algo != CryptoAlgo::Arc4 {
            ctx.token_header_word |= fw::HEADER_PAD_VERIFY;
        }
        ctx.iv_handling = IvHandling::InboundCbc;
    }
    ctx.seq_offset = params.offsets.seq_num;

    match params.crypto_algo {
        CryptoAlgo::Null => ctx.iv_byte_count = 0,
        CryptoAlgo::Arc4 => {
            ctx.iv_byte_count = 0;
            ctx.update_handling = UpdateHandling::Arc4;
            ctx.iv_offset = params.offsets.ij_ptr;
        }
        CryptoAlgo::Des | CryptoAlgo::TripleDes => {
            ctx.iv_byte_count = 8;
            ctx.pad_block_byte_count = 8;
            ctx.update_handling = UpdateHandling::Iv2;
            ctx.iv_offset = params.offsets.iv;
        }
        CryptoAlgo::Aes | CryptoAlgo::Sm4 | CryptoAlgo::Bc0 => match params.crypto_mode {
            CryptoMode::Gcm => {
                ctx.iv_byte_count = 8;
                ctx.iv_offset = params.offsets.iv;
                if params.direction == Direction::Outbound {
                    ctx.iv_handling = IvHandling::OutboundCtr;
                    ctx.protocol = if tls13 {
                        TokenProtocol::Tls13GcmOut
                    } else {
                        TokenProtocol::SslTlsGcmOut
                    };
                } else {
                    ctx.iv_handling = IvHandling::InboundCtr;
                    ctx.protocol = if tls13 {
                        TokenProtocol::Tls13GcmIn
                    } else {
                        TokenProtocol::SslTlsGcmIn
                    };
                }
            }
            CryptoMode::Ccm => {
                ctx.iv_byte_count = 8;
                ctx.iv_offset = params.offsets.iv;
                if params.direction == Direction::Outbound {
                    ctx.iv_handling = IvHandling::OutboundCtr;
                    ctx.protocol = if tls13 {
                        TokenProtocol::Tls13CcmOut
                    } else {
                        TokenProtocol::SslTlsCcmOut
                    };
                } else {
                    ctx.iv_handling = IvHandling::InboundCtr;
                    ctx.protocol = if tls13 {
                        TokenProtocol::Tls13CcmIn
                    } else {
                        TokenProtocol::SslTlsCcmIn
                    };
                }
                ctx.icv_byte_count = match ext.icv_byte_count {
                    0 => 16,
                    8 | 16 => ext.icv_byte_count as u32,
                    _ => return Err(invalid("TLS AES-CCM tag length must be 8 or 16")),
                };
                ctx.ccm_salt = fw::CCM_FLAG_ADATA_L3 | ((ctx.icv_byte_count - 2) * 4);
            }
            _ => {
                ctx.iv_byte_count = 16;
                ctx.pad_block_byte_count = 16;
                ctx.update_handling = UpdateHandling::Iv4;
                ctx.iv_offset = params.offsets.iv;
            }
        },
        CryptoAlgo::ChaCha20 => {
            ctx.iv_byte_count = 0;
            if params.direction == Direction::Outbound {
                ctx.protocol = if tls13 {
                    TokenProtocol::Tls13ChaChaPolyOut
                } else {
                    TokenProtocol::SslTlsChaChaPolyOut
                };
            } else {
                ctx.protocol = if tls13 {
                    TokenProtocol::Tls13ChaChaPolyIn
                } else {
                    TokenProtocol::SslTlsChaChaPolyIn
                };
            }
        }
        _ => return Err(invalid("unsupported cipher for TLS tokens")),
    }

    if params.crypto_mode == CryptoMode::Cbc
        && params.direction == Direction::Outbound
        && params.crypto_algo != CryptoAlgo::Null
    {
        set_outbound_cbc_iv_source(params, ctx)?;
    }

    // SSL 3.0 and TLS 1.0 do not carry the IV in the record; later CBC
    // versions do, which switches the write-back to whole-block mode.
    if ext.version == TlsVersion::Ssl3_0 || ext.version == TlsVersion::Tls1_0 {
        ctx.iv_byte_count = 0;
    } else if ctx.update_handling == UpdateHandling::Iv2
        || ctx.update_handling == UpdateHandling::Iv4
    {
        ctx.update_handling = UpdateHandling::Block;
    }

    if ext.version.is_dtls() {
        if ext.ssltls_flags & ssltls_flags::CAPWAP != 0 {
            ctx.esp_flags |= DTLS_FLAG_CAPWAP;
        }
        ctx.ext_seq = if ext.ssltls_flags & ssltls_flags::NO_ANTI_REPLAY != 0 {
            1
        } else {
            1 + ssltls::mask_bit_count(ext) / 32
        };
        if ext.ssltls_flags & ssltls_flags::PROCESS_IP_HEADERS != 0 {
            let ipv6 = ext.ssltls_flags & ssltls_flags::IPV6 != 0;
            let capwap = ext.ssltls_flags & ssltls_flags::CAPWAP != 0;
            ctx.header_proto = if params.direction == Direction::Outbound {
                match (ipv6, capwap) {
                    (false, false) => fw::HDR_IPV4_OUT_DTLS,
                    (false, true) => fw::HDR_IPV4_OUT_DTLS_CAPWAP,
                    (true, false) => fw::HDR_IPV6_OUT_DTLS,
                    (true, true) => fw::HDR_IPV6_OUT_DTLS_CAPWAP,
                }
            } else {
                if ext.ssltls_flags & ssltls_flags::PLAINTEXT_HEADERS != 0 {
                    ctx.esp_flags |= DTLS_FLAG_PLAINTEXT_HDR;
                }
                match (ipv6, capwap) {
                    (false, false) => fw::HDR_IPV4_IN_DTLS,
                    (false, true) => fw::HDR_IPV4_IN_DTLS_CAPWAP,
                    (true, false) => fw::HDR_IPV6_IN_DTLS,
                    (true, true) => fw::HDR_IPV6_IN_DTLS_CAPWAP,
                }
            };
        }
    }

    // anti_replay doubles as the hash-version marker; SSL 3.0 records
    // clear it.
    if ext.version == TlsVersion::Ssl3_0 {
        ctx.anti_replay = 0;
    }

    match params.auth_algo {
        AuthAlgo::HmacMd5 | AuthAlgo::SslMacMd5 => ctx.icv_byte_count = 16,
        AuthAlgo::HmacSha1 | AuthAlgo::SslMacSha1 => ctx.icv_byte_count = 20,
        AuthAlgo::HmacSha2_224 => ctx.icv_byte_count = 28,
        AuthAlgo::HmacSha2_256 | AuthAlgo::HmacSm3 => ctx.icv_byte_count = 32,
        AuthAlgo::HmacSha2_384 => ctx.icv_byte_count = 48,
        AuthAlgo::HmacSha2_512 => ctx.icv_byte_count = 64,
        AuthAlgo::AesGcm => ctx.icv_byte_count = 16,
        AuthAlgo::AesCcm => {} // set with the salt above
        AuthAlgo::Poly1305 => ctx.icv_byte_count = 16,
        _ => return Err(invalid("unsupported authentication algorithm for TLS tokens")),
    }
    if ext.icv_byte_count != 0 && (ext.icv_byte_count as u32) < ctx.icv_byte_count {
        ctx.icv_byte_count = ext.icv_byte_count as u32;
    }
    Ok(())
}

fn fill_basic(
    params: &SaParams,
    ext: &BasicParams,
    ctx: &mut TokenContext,
) -> BuilderResult<()> {
    if params.crypto_algo != CryptoAlgo::Null {
        if params.auth_algo == AuthAlgo::Null {
            ctx.protocol = TokenProtocol::BasicCrypto;
        } else if ext.basic_flags & basic_flags::ENCRYPT_AFTER_HASH != 0 {
            if params.direction == Direction::Outbound {
                ctx.protocol = TokenProtocol::BasicHashEnc;
            } else {
                ctx.protocol = TokenProtocol::BasicDecHash;
                ctx.token_header_word |= fw::HEADER_PAD_VERIFY;
            }
        } else if params.crypto_algo == CryptoAlgo::ChaCha20 {
            ctx.protocol = if params.direction == Direction::Outbound {
                TokenProtocol::BasicChaChaPolyOut
            } else {
                TokenProtocol::BasicChaChaPolyIn
            };
        } else {
            ctx.protocol = TokenProtocol::BasicCryptHash;
        }

        match params.crypto_algo {
            CryptoAlgo::Arc4 => {
                ctx.iv_byte_count = 0;
                if params.crypto_mode != CryptoMode::Stateless {
                    ctx.update_handling = UpdateHandling::Arc4;
                }
                ctx.iv_offset = params.offsets.ij_ptr;
            }
            CryptoAlgo::Des | CryptoAlgo::TripleDes => {
                ctx.iv_byte_count = 8;
                ctx.pad_block_byte_count = 8;
                ctx.update_handling = UpdateHandling::Iv2;
                ctx.iv_offset = params.offsets.iv;
            }
            CryptoAlgo::Aes | CryptoAlgo::Sm4 | CryptoAlgo::Bc0 => {
                ctx.iv_byte_count = 16;
                ctx.pad_block_byte_count = 16;
                ctx.update_handling = UpdateHandling::Iv4;
                ctx.iv_offset = params.offsets.iv;
            }
            CryptoAlgo::Kasumi => {
                ctx.iv_byte_count = 8;
                ctx.pad_block_byte_count = 8;
                ctx.iv_handling = IvHandling::KasumiF8;
                ctx.iv_offset = params.offsets.iv;
            }
            CryptoAlgo::Snow => {
                ctx.iv_byte_count = 16;
                ctx.iv_handling = IvHandling::SnowUea2;
                ctx.iv_offset = params.offsets.iv;
            }
            CryptoAlgo::Zuc => {
                ctx.iv_byte_count = 16;
                ctx.iv_handling = IvHandling::ZucEea3;
                ctx.iv_offset = params.offsets.iv;
            }
            CryptoAlgo::ChaCha20 => {
                ctx.iv_byte_count = 16;
            }
            CryptoAlgo::Null => unreachable!(),
        }

        match params.crypto_mode {
            CryptoMode::Ecb => {
                ctx.iv_byte_count = 0;
                ctx.iv_handling = IvHandling::OutboundCbc;
                ctx.update_handling = UpdateHandling::Null;
            }
            CryptoMode::Basic
            | CryptoMode::Cbc
            | CryptoMode::Icm
            | CryptoMode::Cfb
            | CryptoMode::Ofb
            | CryptoMode::Xts
            | CryptoMode::XtsStateful
            | CryptoMode::ChaChaCtr32
            | CryptoMode::ChaChaCtr64 => {
                if params.crypto_mode == CryptoMode::Basic {
                    ctx.iv_handling = IvHandling::OutboundCbc;
                    if params.crypto_algo == CryptoAlgo::Kasumi {
                        ctx.iv_byte_count = 0;
                        ctx.update_handling = UpdateHandling::Null;
                        return finish_basic_auth(params, ext, ctx);
                    }
                    ctx.pad_block_byte_count = 1;
                } else if params.crypto_mode == CryptoMode::Icm {
                    ctx.pad_block_byte_count = 1;
                } else if params.crypto_mode == CryptoMode::Xts
                    || params.crypto_mode == CryptoMode::XtsStateful
                {
                    ctx.pad_block_byte_count = 1;
                    ctx.protocol = TokenProtocol::BasicXtsCrypto;
                }

                match params.iv_src {
                    IvSrc::Token => {
                        ctx.update_handling = UpdateHandling::Null;
                        let copy = params.flags & flags::COPY_IV != 0;
                        if ctx.iv_byte_count == 8 {
                            ctx.iv_handling = if copy {
                                IvHandling::CopyToken2Words
                            } else {
                                IvHandling::OutboundToken2Words
                            };
                            ctx.token_header_word |= fw::HEADER_IV_TOKEN_2WORDS;
                        } else {
                            ctx.iv_handling = if copy {
                                IvHandling::CopyToken4Words
                            } else {
                                IvHandling::OutboundToken4Words
                            };
                            ctx.token_header_word |= fw::HEADER_IV_TOKEN_4WORDS;
                        }
                        ctx.iv_byte_count = 0;
                    }
                    IvSrc::Input => {
                        ctx.update_handling = UpdateHandling::Null;
                        ctx.iv_handling = if params.flags & flags::COPY_IV != 0 {
                            IvHandling::CopyCbc
                        } else {
                            IvHandling::InboundCbc
                        };
                    }
                    _ => {
                        if params.iv_src == IvSrc::Prng {
                            ctx.token_header_word |= fw::HEADER_IV_PRNG;
                            ctx.update_handling = UpdateHandling::Null;
                        }
                        if params.flags & flags::COPY_IV != 0 {
                            ctx.iv_handling = if ctx.iv_byte_count == 8 {
                                IvHandling::Outbound2Words
                            } else {
                                IvHandling::Outbound4Words
                            };
                        }
                        ctx.iv_byte_count = 0;
                    }
                }
            }
            CryptoMode::Ctr | CryptoMode::Ccm | CryptoMode::Gcm | CryptoMode::Gmac => {
                ctx.pad_block_byte_count = 1;
                ctx.update_handling = UpdateHandling::Null;
                match params.iv_src {
                    IvSrc::Token => {
                        ctx.iv_byte_count = 0;
                        ctx.iv_handling = if params.flags & flags::COPY_IV != 0 {
                            IvHandling::CopyToken4Words
                        } else {
                            IvHandling::OutboundToken4Words
                        };
                        ctx.token_header_word |= fw::HEADER_IV_TOKEN_4WORDS;
                    }
                    IvSrc::Input => {
                        ctx.iv_byte_count = 8;
                        ctx.iv_handling = if params.flags & flags::COPY_IV != 0 {
                            IvHandling::CopyCtr
                        } else {
                            IvHandling::InboundCtr
                        };
                    }
                    _ => {
                        ctx.iv_byte_count = 0;
                        if params.flags & flags::COPY_IV != 0 {
                            ctx.iv_handling = IvHandling::OutboundCtr;
                        }
                    }
                }
            }
            CryptoMode::F8 | CryptoMode::Uea2 | CryptoMode::Eea3 => {
                ctx.pad_block_byte_count = 1;
                ctx.ccm_salt = ((ext.bearer as u32) << 3) | ((ext.direction_bit as u32) << 2);
                ctx.token_header_word |= if ctx.iv_byte_count == 8 {
                    fw::HEADER_IV_TOKEN_2WORDS
                } else {
                    fw::HEADER_IV_TOKEN_4WORDS
                };
                ctx.iv_byte_count = 0;
            }
            _ => {}
        }
    } else if params.auth_algo == AuthAlgo::Null {
        ctx.protocol = TokenProtocol::BasicBypass;
    } else if ext.basic_flags & basic_flags::HMAC_PRECOMPUTE != 0 && params.offsets.digest1 != 0 {
        ctx.protocol = TokenProtocol::BasicHmacPrecompute;
    } else {
        ctx.protocol = TokenProtocol::BasicHash;
    }

    finish_basic_auth(params, ext, ctx)
}

/// Authentication half of the basic context: digest geometry, copy
/// markers and the per-algorithm protocol overrides.
fn finish_basic_auth(
    params: &SaParams,
    ext: &BasicParams,
    ctx: &mut TokenContext,
) -> BuilderResult<()> {
    if params.auth_algo == AuthAlgo::Null {
        return Ok(());
    }

    if params.flags & (flags::HASH_SAVE | flags::HASH_INTERMEDIATE) != 0 {
        // The hash state will be stored; seq_offset doubles as its
        // record offset for basic operations.
        ctx.seq_offset = params.offsets.digest0;
    }
    if params.crypto_algo == CryptoAlgo::Null {
        // ext_seq doubles as the copy-payload marker.
        if params.flags & flags::SUPPRESS_PAYLOAD == 0 {
            ctx.ext_seq = 1;
        }
    } else if params.flags & flags::SUPPRESS_HEADER == 0 {
        // ...or the copy-header marker for combined operations.
        ctx.ext_seq = 1;
    }

    match params.auth_algo {
        AuthAlgo::HashMd5 => {
            ctx.icv_byte_count = 16;
            ctx.digest_word_count = 16 + 4;
        }
        AuthAlgo::HmacMd5 => {
            ctx.icv_byte_count = 16;
            ctx.digest_word_count = 4;
        }
        AuthAlgo::HashSha1 => {
            ctx.icv_byte_count = 20;
            ctx.digest_word_count = 16 + 5;
        }
        AuthAlgo::HmacSha1 => {
            ctx.icv_byte_count = 20;
            ctx.digest_word_count = 5;
        }
        AuthAlgo::HashSha2_224 => {
            ctx.icv_byte_count = 32;
            ctx.digest_word_count = 16 + 8;
        }
        AuthAlgo::HmacSha2_224 => {
            ctx.icv_byte_count = 32;
            ctx.digest_word_count = 8;
        }
        AuthAlgo::HashSha2_256 | AuthAlgo::HashSm3 => {
            ctx.icv_byte_count = 32;
            ctx.digest_word_count = 16 + 8;
        }
        AuthAlgo::HmacSha2_256 | AuthAlgo::HmacSm3 => {
            ctx.icv_byte_count = 32;
            ctx.digest_word_count = 8;
        }
        AuthAlgo::HashSha2_384 => {
            ctx.icv_byte_count = 64;
            ctx.digest_word_count = 16 + 16;
        }
        AuthAlgo::HmacSha2_384 => {
            ctx.icv_byte_count = if ext.basic_flags & basic_flags::ENCRYPT_AFTER_HASH != 0 {
                48
            } else {
                64
            };
            ctx.digest_word_count = 16;
        }
        AuthAlgo::HashSha2_512 => {
            ctx.icv_byte_count = 64;
            ctx.digest_word_count = 16 + 16;
        }
        AuthAlgo::HmacSha2_512 => {
            ctx.icv_byte_count = 64;
            ctx.digest_word_count = 16;
        }
        AuthAlgo::HashSha3_224 | AuthAlgo::HmacSha3_224 | AuthAlgo::KeyedHashSha3_224 => {
            ctx.icv_byte_count = 28;
            ctx.digest_word_count = 7;
        }
        AuthAlgo::HashSha3_256 | AuthAlgo::HmacSha3_256 | AuthAlgo::KeyedHashSha3_256 => {
            ctx.icv_byte_count = 32;
            ctx.digest_word_count = 8;
        }
        AuthAlgo::HashSha3_384 | AuthAlgo::HmacSha3_384 | AuthAlgo::KeyedHashSha3_384 => {
            ctx.icv_byte_count = 48;
            ctx.digest_word_count = 12;
        }
        AuthAlgo::HashSha3_512 | AuthAlgo::HmacSha3_512 | AuthAlgo::KeyedHashSha3_512 => {
            ctx.icv_byte_count = 64;
            ctx.digest_word_count = 16;
        }
        AuthAlgo::XcbcMac | AuthAlgo::Cmac128 | AuthAlgo::Cmac192 | AuthAlgo::Cmac256 => {
            ctx.icv_byte_count = 16;
            ctx.digest_word_count = 4;
        }
        AuthAlgo::AesCcm => {
            ctx.protocol = if params.direction == Direction::Outbound {
                TokenProtocol::BasicCcmOut
            } else {
                TokenProtocol::BasicCcmIn
            };
            ctx.icv_byte_count = 16;
            ctx.digest_word_count = 4;
            // The truncation applies before the salt is formed.
            if ext.icv_byte_count != 0 && (ext.icv_byte_count as u32) < ctx.icv_byte_count {
                ctx.icv_byte_count = ext.icv_byte_count as u32;
            }
            let nonce = params.nonce_bytes(3)?;
            ctx.ccm_salt = ((nonce[0] as u32) << 8)
                | ((nonce[1] as u32) << 16)
                | ((nonce[2] as u32) << 24)
                | fw::CCM_FLAG_ADATA_L4
                | ((ctx.icv_byte_count - 2) * 4);
        }
        AuthAlgo::AesGcm => {
            ctx.protocol = if params.direction == Direction::Outbound {
                TokenProtocol::BasicGcmOut
            } else {
                TokenProtocol::BasicGcmIn
            };
            ctx.icv_byte_count = 16;
            ctx.digest_word_count = 4;
        }
        AuthAlgo::AesGmac => {
            ctx.protocol = if params.direction == Direction::Outbound {
                TokenProtocol::BasicGmacOut
            } else {
                TokenProtocol::BasicGmacIn
            };
            ctx.icv_byte_count = 16;
            ctx.digest_word_count = 4;
        }
        AuthAlgo::KasumiF9 => {
            ctx.protocol = TokenProtocol::BasicKasumiHash;
            ctx.icv_byte_count = 4;
            ctx.digest_word_count = 4;
            ctx.ccm_salt = ext.fresh;
        }
        AuthAlgo::SnowUia2 => {
            ctx.protocol = TokenProtocol::BasicSnowHash;
            ctx.icv_byte_count = 4;
            ctx.digest_word_count = 4;
            ctx.ccm_salt = ext.fresh;
        }
        AuthAlgo::ZucEia3 => {
            ctx.protocol = TokenProtocol::BasicZucHash;
            ctx.icv_byte_count = 4;
            ctx.digest_word_count = 4;
            ctx.ccm_salt = (ext.bearer as u32) << 3;
        }
        AuthAlgo::Poly1305 | AuthAlgo::KeyedPoly1305 => {
            ctx.icv_byte_count = 16;
            ctx.digest_word_count = 4;
        }
        _ => return Err(invalid("unsupported authentication algorithm for basic tokens")),
    }

    if ext.icv_byte_count != 0 && (ext.icv_byte_count as u32) < ctx.icv_byte_count {
        ctx.icv_byte_count = ext.icv_byte_count as u32;
    }
    // anti_replay doubles as the extract-and-verify ICV length.
    if ext.basic_flags & basic_flags::EXTRACT_ICV != 0
        || (matches!(
            params.auth_algo,
            AuthAlgo::AesCcm | AuthAlgo::AesGcm | AuthAlgo::AesGmac
        ) && ctx.seq_offset == 0)
    {
        ctx.anti_replay = ctx.icv_byte_count;
    }
    Ok(())
}

fn fill_srtp(params: &SaParams, ext: &SrtpParams, ctx: &mut TokenContext) -> BuilderResult<()> {
    // The salt key words overlay the CW0/CW1/salt area, so SRTP leaves
    // those context fields untouched.
    ctx.protocol = if params.direction == Direction::Outbound {
        TokenProtocol::SrtpOut
    } else {
        TokenProtocol::SrtpIn
    };
    ctx.icv_byte_count = ext.icv_byte_count as u32;

    if params.crypto_algo != CryptoAlgo::Null {
        ctx.iv_handling = IvHandling::TokenSrtp;
        ctx.iv_byte_count = 16;
        ctx.token_header_word |= fw::HEADER_IV_TOKEN_4WORDS;
        let salt = params.nonce_bytes(14)?;
        for i in 0..3 {
            ctx.salt_key[i] = (salt[4 * i] as u32)
                | ((salt[4 * i + 1] as u32) << 8)
                | ((salt[4 * i + 2] as u32) << 16)
                | ((salt[4 * i + 3] as u32) << 24);
        }
        ctx.salt_key[3] = (salt[12] as u32) | ((salt[13] as u32) << 8);
    } else {
        ctx.iv_handling = IvHandling::OutboundCbc;
        ctx.iv_byte_count = 0;
    }

    ctx.ext_seq = if ext.srtp_flags & srtp_flags::SRTCP != 0 { 4 } else { 0 };
    ctx.anti_replay = if ext.srtp_flags & srtp_flags::INCLUDE_MKI != 0 {
        4
    } else {
        0
    };
    Ok(())
}

/// Outbound CBC IV source selection, shared by ESP and TLS.
fn set_outbound_cbc_iv_source(params: &SaParams, ctx: &mut TokenContext) -> BuilderResult<()> {
    match params.iv_src {
        IvSrc::Default | IvSrc::Prng => ctx.token_header_word |= fw::HEADER_IV_PRNG,
        IvSrc::Sa => {}
        IvSrc::Token => {
            if ctx.iv_byte_count == 8 {
                ctx.iv_handling = IvHandling::OutboundToken2Words;
                ctx.token_header_word |= fw::HEADER_IV_TOKEN_2WORDS;
            } else {
                ctx.iv_handling = IvHandling::OutboundToken4Words;
                ctx.token_header_word |= fw::HEADER_IV_TOKEN_4WORDS;
            }
        }
        _ => return Err(invalid("unsupported IV source for outbound CBC")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_esp_outbound_cbc_context() {
        let mut params = SaParams::init_esp(
            0x1000,
            ipsec_flags::TUNNEL,
            ipsec_flags::IPV4,
            Direction::Outbound,
        )
        .unwrap();
        params.set_aes_cbc(&[0u8; 16]);
        params.set_hmac_sha1(&[0u8; 20], &[0u8; 20]);
        params.offsets.seq_num = 17;
        params.offsets.digest0 = 6;
        params.offsets.digest1 = 11;

        let ctx = build_context(&params).unwrap();
        assert_eq!(ctx.protocol, TokenProtocol::EspOut);
        assert_eq!(ctx.state, ContextState::Ready);
        assert_eq!(ctx.pad_block_byte_count, 16);
        assert_eq!(ctx.iv_byte_count, 16);
        assert_eq!(ctx.icv_byte_count, 12);
        assert_eq!(ctx.seq_offset, 17);
        // Default IV source resolves to the PRNG.
        assert_ne!(ctx.token_header_word & fw::HEADER_IV_PRNG, 0);
        // Tunnel without header processing bypasses header construction.
        assert_eq!(ctx.header_proto, fw::HDR_IPV4_OUT_TRANSP_HDRBYPASS);
        let mut id = 7u16;
        ctx.next_pkt_id(&mut id);
        assert_eq!(id, 7);
    }

    #[test]
    fn test_esp_inbound_fixed_layout_acts_extended() {
        let mut params = SaParams::init_esp(
            0x1000,
            ipsec_flags::TUNNEL,
            ipsec_flags::IPV4,
            Direction::Inbound,
        )
        .unwrap();
        params.set_aes_gcm(&[0u8; 16], &[0u8; 4]);
        params.offsets.seq_num = 32;
        params.offsets.seq_mask = 34;

        let ctx = build_context(&params).unwrap();
        assert_eq!(ctx.protocol, TokenProtocol::EspGcmIn);
        // Adjacent seqnum/mask means the fixed layout; the context
        // update behaves as if an extended sequence number existed.
        assert_eq!(ctx.ext_seq, 2);
        // Default 64-bit mask.
        assert_eq!(ctx.anti_replay, 2);
        assert_ne!(ctx.token_header_word & fw::HEADER_PAD_VERIFY, 0);
    }

    #[test]
    fn test_esp_tunnel_header_processing_requires_addresses() {
        let mut params = SaParams::init_esp(
            0x1000,
            ipsec_flags::TUNNEL,
            ipsec_flags::IPV4,
            Direction::Outbound,
        )
        .unwrap();
        params.set_aes_gcm(&[0u8; 16], &[0u8; 4]);
        let ProtocolParams::Ipsec(ext) = &mut params.protocol else {
            unreachable!();
        };
        ext.ipsec_flags |= ipsec_flags::PROCESS_IP_HEADERS;
        assert!(build_context(&params).is_err());

        let ProtocolParams::Ipsec(ext) = &mut params.protocol else {
            unreachable!();
        };
        ext.src_ip_addr = Some(vec![192, 168, 1, 1]);
        ext.dest_ip_addr = Some(vec![10, 0, 0, 1]);
        let ctx = build_context(&params).unwrap();
        assert_eq!(ctx.header_proto, fw::HDR_IPV4_OUT_TUNNEL);
        assert_eq!(&ctx.tunnel_ip[..8], &[192, 168, 1, 1, 10, 0, 0, 1]);
        let mut id = 0xffffu16;
        ctx.next_pkt_id(&mut id);
        assert_eq!(id, 0);
    }

    #[test]
    fn test_tls13_chachapoly_codes() {
        let mut params = SaParams::init_ssltls(TlsVersion::Tls1_3, Direction::Inbound);
        params.crypto_algo = CryptoAlgo::ChaCha20;
        params.crypto_mode = CryptoMode::ChaChaCtr32;
        params.auth_algo = AuthAlgo::Poly1305;
        let ctx = build_context(&params).unwrap();
        assert_eq!(ctx.protocol, TokenProtocol::Tls13ChaChaPolyIn);
        assert_eq!(ctx.iv_byte_count, 0);
        assert_eq!(ctx.icv_byte_count, 16);
    }

    #[test]
    fn test_dtls_replay_words_in_ext_seq() {
        let mut params = SaParams::init_ssltls(TlsVersion::Dtls1_2, Direction::Inbound);
        params.set_aes_gcm(&[0u8; 16], &[0u8; 4]);
        let ProtocolParams::SslTls(ext) = &mut params.protocol else {
            unreachable!();
        };
        ext.ssltls_flags |= ssltls_flags::MASK_128;
        let ctx = build_context(&params).unwrap();
        assert_eq!(ctx.protocol, TokenProtocol::SslTlsGcmIn);
        assert_eq!(ctx.ext_seq, 1 + 4);
    }

    #[test]
    fn test_pending_precompute_and_advance() {
        let mut params = SaParams::init_basic(Direction::Outbound);
        params.auth_algo = AuthAlgo::HmacSha1;
        params.offsets.digest0 = 2;
        params.offsets.digest1 = 7;

        let mut ctx = build_context(&params).unwrap();
        assert!(ctx.is_pending());
        assert_eq!(ctx.protocol, TokenProtocol::BasicHmacCtxPrepare);
        assert_eq!(ctx.header_proto, fw::HDR_BYPASS);
        assert_eq!(ctx.digest_word_count, 5);
        assert_eq!(ctx.digest_offset, 2);

        assert!(ctx.advance());
        assert_eq!(ctx.protocol, TokenProtocol::BasicHash);
        assert!(!ctx.is_pending());
        assert!(!ctx.advance());
    }

    #[test]
    fn test_srtp_salt_keys() {
        let mut params = SaParams::init_srtp(Direction::Outbound);
        params.crypto_algo = CryptoAlgo::Aes;
        params.crypto_mode = CryptoMode::Icm;
        params.key = Some(zeroize::Zeroizing::new(vec![0u8; 16]));
        params.nonce = Some((0u8..14).collect());
        let ProtocolParams::Srtp(ext) = &mut params.protocol else {
            unreachable!();
        };
        ext.srtp_flags |= srtp_flags::INCLUDE_MKI;
        ext.icv_byte_count = 10;

        let ctx = build_context(&params).unwrap();
        assert_eq!(ctx.protocol, TokenProtocol::SrtpOut);
        assert_eq!(ctx.iv_handling, IvHandling::TokenSrtp);
        assert_eq!(ctx.salt_key[0], 0x03020100);
        assert_eq!(ctx.salt_key[3], 0x00000d0c);
        assert_eq!(ctx.anti_replay, 4);
        assert_eq!(ctx.icv_byte_count, 10);
    }

    #[test]
    fn test_macsec_has_no_token_path() {
        let params = SaParams::init_macsec([0; 8], 0, Direction::Outbound).unwrap();
        assert!(build_context(&params).is_err());
    }

    #[test]
    fn test_context_word_count_covers_struct() {
        assert!(context_word_count() * 4 >= std::mem::size_of::<TokenContext>());
    }
}
