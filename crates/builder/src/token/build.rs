//! Per-packet token generation
//!
//! A token is a short program of 32-bit instruction words telling the
//! packet engine how to walk one packet: which byte ranges feed the
//! cipher and the hash, what to insert or strip, what to verify and
//! which record fields to update afterwards. Instructions carry their
//! opcode in the top nibble, a 9-bit instruction field, two status
//! bits and a 17-bit length, and inline data words may follow an
//! INSERT. The pre-encoded verify/context words in
//! [`crate::sa::extended`] use the same encoding.

use crate::error::{invalid, BuilderError, BuilderResult};
use crate::logging;
use crate::sa::extended as fw;

use super::context::{IvHandling, TokenContext, TokenProtocol};

/// Per-packet option flags for [`TokenParams::packet_flags`].
pub mod packet_flags {
    /// Finalize the hash at the end of this packet.
    pub const HASH_FINAL: u32 = 1 << 0;
    /// This packet starts a fresh hash state.
    pub const HASH_FIRST: u32 = 1 << 1;
    /// Load the ARC4 state from the record.
    pub const ARC4_LOAD: u32 = 1 << 2;
    /// Store the ARC4 state back to the record.
    pub const ARC4_SAVE: u32 = 1 << 3;
    /// Initialize the ARC4 state from the key.
    pub const ARC4_INIT: u32 = 1 << 4;
    /// Reload the counter-mode IV for this packet.
    pub const CTR_INIT: u32 = 1 << 5;
    /// Append the digest to the output instead of storing it.
    pub const HASH_APPEND: u32 = 1 << 6;
    /// Reinitialize the XTS tweak.
    pub const XTS_INIT: u32 = 1 << 7;
    /// Keep the outer headers on inbound tunnel packets.
    pub const KEEP_OUTER: u32 = 1 << 8;
    /// Copy the IPv6 flow label into a constructed tunnel header.
    pub const COPY_FLOWLABEL: u32 = 1 << 9;
    /// Route the encrypted output to the alternate destination.
    pub const ENC_LAST_DEST: u32 = 1 << 10;
}

/// Per-packet inputs for [`build_token`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenParams<'a> {
    /// See [`packet_flags`].
    pub packet_flags: u32,
    /// Bytes at the start of the packet passed through untouched.
    pub bypass_byte_count: u32,
    /// Next-header byte (ESP) or pad byte value (wireless hashes).
    pub pad_byte: u8,
    /// Replay window size hint, SRTP rollover counter or SRTCP index.
    pub additional_value: u32,
    /// Per-packet IV, for contexts that take the IV from the token.
    pub iv: Option<&'a [u8]>,
    /// Associated data for basic AEAD operations (up to 64 bytes).
    pub aad: Option<&'a [u8]>,
}

/// What [`build_token`] produced, everything the caller needs to fill
/// the command descriptor.
#[derive(Debug, Clone, Copy)]
pub struct TokenDescriptor {
    /// Instruction words written.
    pub word_count: usize,
    /// Token header word for the command descriptor, including the
    /// input packet length.
    pub header_word: u32,
    /// Pad bytes the engine will append (outbound block modes).
    pub pad_byte_count: u32,
    /// Expected output packet length in bytes.
    pub output_byte_count: u32,
}

// Instruction encoding. Opcode in bits 28..=31, instruction field in
// bits 19..=27, status in bits 17..=18, length in bits 0..=16.
const OP_DIRECTION: u32 = 0x00000000;
const OP_INSERT: u32 = 0x20000000;
const OP_RETRIEVE: u32 = 0x40000000;
const OP_CTX_ACCESS: u32 = 0xe0000000;

// Instruction-field bits, pre-shifted into position.
const INS_TYPE_OUTPUT: u32 = 0x01000000;
const INS_TYPE_HASH: u32 = 0x02000000;
const INS_TYPE_CRYPTO: u32 = 0x04000000;
const INS_LAST: u32 = 0x08000000;

// Instruction-field origin selectors, pre-shifted.
const INS_ORIGIN_TOKEN: u32 = 0x00b00000;
const INS_ORIGIN_PAD: u32 = 0x00980000;
const INS_ORIGIN_SPI_SEQ: u32 = 0x00900000;
const INS_ORIGIN_SEQ_HI: u32 = 0x00a80000;
const INS_ORIGIN_IV: u32 = 0x00a00000;
const INS_HASH_DIGEST: u32 = 0x00e00000;

// Status bits.
const STAT_LAST_HASH: u32 = 0x00020000;
const STAT_LAST_PACKET: u32 = 0x00040000;

// Token header word bits added per packet.
const HEADER_C: u32 = 0x02000000;
const HEADER_U: u32 = 0x00800000;

// Per-packet option bits carried in the first context-control word.
const PERPKT_HASH_FIRST: u32 = 0x10;
const PERPKT_HASH_NO_FINAL: u32 = 0x20;
const PERPKT_CTR_INIT: u32 = 0x40;
const PERPKT_ARC4_INIT: u32 = 0x80;
const PERPKT_HASH_STORE: u32 = 0x40;
const PERPKT_HASH_CMPRKEY: u32 = 0x80;

const MAX_AAD_BYTES: usize = 64;
const CTX_WORDS_PER_INSTRUCTION: u32 = 15;

const LEN_MASK: u32 = 0x0001ffff;

/// Upper bound on the token size in words for any packet on this
/// context. Constant per context, so the caller can allocate once.
pub fn token_word_count(ctx: &TokenContext) -> usize {
    let iv_words = ((ctx.iv_byte_count as usize) + 3) / 4;
    let digest_words = 2 * ctx.digest_word_count as usize;
    let store_instructions =
        (digest_words + CTX_WORDS_PER_INSTRUCTION as usize - 1) / CTX_WORDS_PER_INSTRUCTION as usize;
    let aad_allowance = match ctx.protocol {
        TokenProtocol::BasicCcmOut
        | TokenProtocol::BasicCcmIn
        | TokenProtocol::BasicGcmOut
        | TokenProtocol::BasicGcmIn
        | TokenProtocol::BasicGmacOut
        | TokenProtocol::BasicGmacIn => MAX_AAD_BYTES / 4 + 1,
        _ => 0,
    };
    16 + iv_words.max(4) + store_instructions + aad_allowance
}

struct TokenWriter<'a> {
    words: &'a mut [u32],
    cursor: usize,
}

impl<'a> TokenWriter<'a> {
    fn new(words: &'a mut [u32]) -> Self {
        TokenWriter { words, cursor: 0 }
    }

    fn op(&mut self, word: u32) {
        self.words[self.cursor] = word;
        self.cursor += 1;
    }

    /// Inline data words after an INSERT, packed little-endian like
    /// the key material in the record.
    fn data(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(4) {
            let mut word = 0u32;
            for (i, b) in chunk.iter().enumerate() {
                word |= (*b as u32) << (8 * i);
            }
            self.words[self.cursor] = word;
            self.cursor += 1;
        }
    }
}

fn direction(len: u32, instructions: u32, stat: u32) -> u32 {
    OP_DIRECTION | instructions | stat | (len & LEN_MASK)
}

fn insert(len: u32, instructions: u32, stat: u32) -> u32 {
    OP_INSERT | instructions | stat | (len & LEN_MASK)
}

fn retrieve(len: u32, instructions: u32, stat: u32) -> u32 {
    OP_RETRIEVE | instructions | stat | (len & LEN_MASK)
}

/// Store `count` words of engine state at record word `offset`.
fn ctx_store(offset: usize, count: u32) -> u32 {
    OP_CTX_ACCESS | (count << 24) | 0x00560000 | (offset as u32 & LEN_MASK)
}

/// Round `size` up to a multiple of `block` (a power of two).
fn padded_size(size: u32, block: u32) -> u32 {
    (size + block - 1) & !(block - 1)
}

/// ESP trailer pad bytes: the payload plus the pad-length and
/// next-header bytes must fill whole cipher blocks.
fn esp_pad_bytes(payload: u32, block: u32) -> u32 {
    padded_size(payload + 2, block) - payload
}

/// TLS pad bytes in MAC-then-encrypt mode: payload, ICV and the
/// pad-length byte fill whole blocks. The explicit IV occupies its own
/// blocks and never changes the remainder.
fn tls_pad_bytes(payload: u32, iv: u32, icv: u32, block: u32) -> u32 {
    padded_size(payload + 1 + iv + icv, block) - payload - icv - iv
}

/// Per-packet option bits, or 0 when the packet needs none.
fn per_packet_options(ctx: &TokenContext, flags: u32, packet_len: u32) -> u32 {
    if ctx.protocol == TokenProtocol::BasicHmacPrecompute
        || ctx.protocol == TokenProtocol::BasicHmacCtxPrepare
    {
        let key_limit = if ctx.digest_word_count == 16 { 128 } else { 64 };
        let mut options = PERPKT_HASH_FIRST;
        if packet_len > key_limit {
            options |= PERPKT_HASH_CMPRKEY;
        }
        if ctx.protocol == TokenProtocol::BasicHmacCtxPrepare {
            options |= PERPKT_HASH_STORE;
        }
        return options;
    }
    let mut options = 0;
    if flags & packet_flags::HASH_FIRST != 0 {
        options |= PERPKT_HASH_FIRST;
    }
    if flags & packet_flags::HASH_FINAL == 0
        && flags & (packet_flags::HASH_FIRST | packet_flags::HASH_APPEND) != 0
    {
        options |= PERPKT_HASH_NO_FINAL;
    }
    if flags & packet_flags::CTR_INIT != 0 {
        options |= PERPKT_CTR_INIT;
    }
    if flags & (packet_flags::ARC4_INIT | packet_flags::XTS_INIT) != 0 {
        options |= PERPKT_ARC4_INIT;
    }
    options
}

/// Engine U-word, carried when the packet needs one.
fn u_word(ctx: &TokenContext, params: &TokenParams<'_>) -> Option<u32> {
    match ctx.protocol {
        TokenProtocol::EspIn
        | TokenProtocol::EspCcmIn
        | TokenProtocol::EspGcmIn
        | TokenProtocol::EspGmacIn
        | TokenProtocol::EspChaChaPolyIn => match ctx.anti_replay * 32 {
            64 => Some(0x00200000),
            128 => Some(0x00400000),
            256 => Some(0x00600000),
            512 => Some(0x00800000),
            _ => None,
        },
        TokenProtocol::BasicSnowHash | TokenProtocol::BasicZucHash => {
            Some(params.pad_byte as u32)
        }
        _ => None,
    }
}

/// IV bytes consumed from the front of the packet input.
fn input_iv_bytes(ctx: &TokenContext) -> u32 {
    match ctx.iv_handling {
        IvHandling::InboundCbc
        | IvHandling::InboundCtr
        | IvHandling::CopyCbc
        | IvHandling::CopyCtr => ctx.iv_byte_count,
        _ => 0,
    }
}

/// True when the input IV is copied through to the output.
fn copies_input_iv(ctx: &TokenContext) -> bool {
    matches!(ctx.iv_handling, IvHandling::CopyCbc | IvHandling::CopyCtr)
}

/// IV bytes the token or the record inserts into the output.
fn inserted_iv_bytes(ctx: &TokenContext) -> u32 {
    match ctx.iv_handling {
        IvHandling::OutboundToken2Words
        | IvHandling::CopyToken2Words
        | IvHandling::Outbound2Words => 8,
        IvHandling::OutboundToken4Words
        | IvHandling::CopyToken4Words
        | IvHandling::Outbound4Words => 16,
        IvHandling::OutboundCbc | IvHandling::OutboundCtr => ctx.iv_byte_count,
        _ => 0,
    }
}

fn iv_data<'a>(ctx: &TokenContext, params: &TokenParams<'a>) -> BuilderResult<&'a [u8]> {
    match params.iv {
        Some(iv) if iv.len() >= ctx.iv_byte_count as usize => {
            Ok(&iv[..ctx.iv_byte_count as usize])
        }
        Some(_) => Err(invalid("per-packet IV too short")),
        None => Err(invalid("context takes the IV from the token but none was given")),
    }
}

/// Build the instruction token for one packet.
///
/// `packet` is the input packet as the engine will see it; only its
/// length and, for SRTP, its header fields are read. The output buffer
/// must hold at least [`token_word_count`] words.
pub fn build_token(
    ctx: &TokenContext,
    packet: &[u8],
    params: &TokenParams<'_>,
    out: &mut [u32],
) -> BuilderResult<TokenDescriptor> {
    let required = token_word_count(ctx);
    if out.len() < required {
        return Err(BuilderError::BufferTooShort {
            required,
            available: out.len(),
        });
    }
    let packet_len = packet.len() as u32;
    if packet_len == 0 || packet_len > LEN_MASK {
        return Err(invalid("packet length out of range"));
    }
    if params.bypass_byte_count >= packet_len {
        return Err(invalid("bypass exceeds the packet"));
    }

    let mut w = TokenWriter::new(out);
    let mut header_word = ctx.token_header_word | packet_len;

    let options = per_packet_options(ctx, params.packet_flags, packet_len);
    if options != 0 {
        // Two context-control words override the record per packet.
        header_word |= HEADER_C;
        w.op(options);
        w.op(0);
    }
    if let Some(u) = u_word(ctx, params) {
        header_word |= HEADER_U;
        w.op(u);
    }

    let mut pad_byte_count = 0;
    let output_byte_count;

    match ctx.protocol {
        TokenProtocol::EspOut
        | TokenProtocol::EspCcmOut
        | TokenProtocol::EspGcmOut
        | TokenProtocol::EspGmacOut
        | TokenProtocol::EspChaChaPolyOut => {
            let bypass = params.bypass_byte_count;
            let payload = packet_len - bypass;
            pad_byte_count = esp_pad_bytes(payload, ctx.pad_block_byte_count);
            if bypass > 0 {
                w.op(direction(bypass, INS_TYPE_OUTPUT, 0));
            }
            // SPI and sequence number from the record, hashed and sent.
            w.op(insert(
                8,
                INS_ORIGIN_SPI_SEQ | INS_TYPE_HASH | INS_TYPE_OUTPUT,
                0,
            ));
            emit_outbound_iv(ctx, params, &mut w)?;
            w.op(direction(
                payload,
                INS_TYPE_CRYPTO | INS_TYPE_HASH | INS_TYPE_OUTPUT | INS_LAST,
                0,
            ));
            // Generated padding, then pad-length and next-header bytes
            // from the token.
            if pad_byte_count > 2 {
                w.op(insert(
                    pad_byte_count - 2,
                    INS_ORIGIN_PAD | INS_TYPE_CRYPTO | INS_TYPE_HASH | INS_TYPE_OUTPUT,
                    0,
                ));
            }
            w.op(insert(
                2,
                INS_ORIGIN_TOKEN | INS_TYPE_CRYPTO | INS_TYPE_HASH | INS_TYPE_OUTPUT,
                STAT_LAST_HASH,
            ));
            w.data(&[(pad_byte_count - 2) as u8, params.pad_byte]);
            if ctx.ext_seq == 1 {
                // Extended sequence number: hashed only, from the record.
                w.op(insert(4, INS_ORIGIN_SEQ_HI | INS_TYPE_HASH, 0));
            }
            if ctx.icv_byte_count > 0 {
                w.op(insert(
                    ctx.icv_byte_count,
                    INS_HASH_DIGEST | INS_TYPE_OUTPUT,
                    STAT_LAST_PACKET,
                ));
            }
            w.op(fw::CTX_OUT_SEQNUM + ((ctx.ext_seq + 1) << 24) + ctx.seq_offset as u32);
            output_byte_count =
                packet_len + 8 + ctx.iv_byte_count + pad_byte_count + ctx.icv_byte_count;
        }

        TokenProtocol::EspIn
        | TokenProtocol::EspCcmIn
        | TokenProtocol::EspGcmIn
        | TokenProtocol::EspGmacIn
        | TokenProtocol::EspChaChaPolyIn => {
            let bypass = params.bypass_byte_count;
            let overhead = bypass + 8 + ctx.iv_byte_count + ctx.icv_byte_count;
            if packet_len <= overhead {
                return Err(invalid("packet too short for the ESP overhead"));
            }
            let payload = packet_len - overhead;
            if bypass > 0 {
                w.op(direction(bypass, INS_TYPE_OUTPUT, 0));
            }
            // SPI and sequence number feed the hash and are stripped.
            w.op(direction(8, INS_TYPE_HASH, 0));
            if ctx.ext_seq == 1 {
                w.op(insert(4, INS_ORIGIN_SEQ_HI | INS_TYPE_HASH, 0));
            }
            if ctx.iv_byte_count > 0 {
                w.op(direction(ctx.iv_byte_count, INS_TYPE_CRYPTO, 0));
            }
            w.op(direction(
                payload,
                INS_TYPE_CRYPTO | INS_TYPE_HASH | INS_TYPE_OUTPUT | INS_LAST,
                0,
            ));
            let mut verify = fw::VERIFY_PADSPI;
            if ctx.icv_byte_count > 0 {
                w.op(retrieve(ctx.icv_byte_count, INS_HASH_DIGEST, STAT_LAST_HASH));
                verify += fw::VERIFY_BIT_H + ctx.icv_byte_count;
            }
            if ctx.anti_replay > 0 {
                verify += fw::VERIFY_BIT_SEQ;
            }
            w.op(verify);
            if ctx.icv_byte_count > 0 && ctx.anti_replay > 0 {
                let seq = ctx.seq_offset as u32;
                if ctx.ext_seq != 0 {
                    if ctx.anti_replay > 12 {
                        w.op(fw::CTX_SEQNUM + seq);
                    } else {
                        w.op(fw::CTX_SEQNUM + ((2 + ctx.anti_replay) << 24) + seq);
                    }
                } else {
                    w.op(fw::CTX_INSEQNUM + ((1 + ctx.anti_replay) << 24) + seq);
                }
            }
            output_byte_count = bypass + payload;
        }

        TokenProtocol::SslTlsOut
        | TokenProtocol::SslTlsGcmOut
        | TokenProtocol::SslTlsCcmOut
        | TokenProtocol::SslTlsChaChaPolyOut
        | TokenProtocol::Tls13GcmOut
        | TokenProtocol::Tls13CcmOut
        | TokenProtocol::Tls13ChaChaPolyOut => {
            let bypass = params.bypass_byte_count;
            let payload = packet_len - bypass;
            if ctx.pad_block_byte_count > 1 {
                pad_byte_count =
                    tls_pad_bytes(payload, ctx.iv_byte_count, ctx.icv_byte_count,
                        ctx.pad_block_byte_count);
            }
            if bypass > 0 {
                w.op(direction(bypass, INS_TYPE_OUTPUT, 0));
            }
            // Sequence number and reconstructed record header feed the
            // MAC; the header alone goes on the wire.
            w.op(insert(13, INS_ORIGIN_SPI_SEQ | INS_TYPE_HASH, 0));
            w.op(insert(5, INS_ORIGIN_SPI_SEQ | INS_TYPE_OUTPUT, 0));
            emit_outbound_iv(ctx, params, &mut w)?;
            w.op(direction(
                payload,
                INS_TYPE_CRYPTO | INS_TYPE_HASH | INS_TYPE_OUTPUT | INS_LAST,
                0,
            ));
            w.op(insert(
                ctx.icv_byte_count,
                INS_HASH_DIGEST | INS_TYPE_CRYPTO | INS_TYPE_OUTPUT,
                STAT_LAST_HASH
                    | if pad_byte_count == 0 {
                        STAT_LAST_PACKET
                    } else {
                        0
                    },
            ));
            if pad_byte_count > 0 {
                w.op(insert(
                    pad_byte_count,
                    INS_ORIGIN_PAD | INS_TYPE_CRYPTO | INS_TYPE_OUTPUT,
                    STAT_LAST_PACKET,
                ));
            }
            w.op(sequence_update(ctx));
            output_byte_count =
                packet_len + 5 + ctx.iv_byte_count + ctx.icv_byte_count + pad_byte_count;
        }

        TokenProtocol::SslTlsIn
        | TokenProtocol::SslTlsGcmIn
        | TokenProtocol::SslTlsCcmIn
        | TokenProtocol::SslTlsChaChaPolyIn
        | TokenProtocol::Tls13GcmIn
        | TokenProtocol::Tls13CcmIn
        | TokenProtocol::Tls13ChaChaPolyIn => {
            let payload = tls_payload_size(ctx, packet_len, params.bypass_byte_count)?;
            if params.bypass_byte_count > 0 {
                w.op(direction(params.bypass_byte_count, INS_TYPE_OUTPUT, 0));
            }
            w.op(insert(8, INS_ORIGIN_SPI_SEQ | INS_TYPE_HASH, 0));
            // Record header: hashed with the true length, stripped from
            // the output.
            w.op(direction(5, INS_TYPE_HASH, 0));
            if ctx.esp_flags & super::context::DTLS_FLAG_CAPWAP != 0 {
                w.op(direction(4, INS_TYPE_OUTPUT, 0));
            }
            if ctx.iv_byte_count > 0 {
                w.op(direction(ctx.iv_byte_count, INS_TYPE_CRYPTO, 0));
            }
            w.op(direction(
                payload,
                INS_TYPE_CRYPTO | INS_TYPE_HASH | INS_TYPE_OUTPUT | INS_LAST,
                0,
            ));
            w.op(retrieve(ctx.icv_byte_count, INS_HASH_DIGEST, STAT_LAST_HASH));
            let pad_verified = ctx.token_header_word & fw::HEADER_PAD_VERIFY != 0
                && ctx.pad_block_byte_count > 1;
            let mut verify = if pad_verified {
                fw::VERIFY_PAD
            } else {
                fw::VERIFY_NONE
            };
            verify += fw::VERIFY_BIT_H + ctx.icv_byte_count;
            if is_dtls(ctx) && ctx.anti_replay > 0 {
                verify += fw::VERIFY_BIT_SEQ;
            }
            w.op(verify);
            w.op(sequence_update(ctx));
            output_byte_count = params.bypass_byte_count + payload;
        }

        TokenProtocol::BasicBypass => {
            w.op(direction(
                packet_len,
                INS_TYPE_OUTPUT | INS_LAST,
                STAT_LAST_HASH | STAT_LAST_PACKET,
            ));
            output_byte_count = packet_len;
        }

        TokenProtocol::BasicCrypto | TokenProtocol::BasicXtsCrypto => {
            let bypass = params.bypass_byte_count;
            let input_iv = input_iv_bytes(ctx);
            if packet_len <= bypass + input_iv {
                return Err(invalid("packet too short for the leading IV"));
            }
            if bypass > 0 {
                w.op(direction(bypass, INS_TYPE_OUTPUT, 0));
            }
            emit_outbound_iv(ctx, params, &mut w)?;
            w.op(direction(
                packet_len - bypass - input_iv,
                INS_TYPE_CRYPTO | INS_TYPE_OUTPUT | INS_LAST,
                STAT_LAST_HASH | STAT_LAST_PACKET,
            ));
            emit_state_store(ctx, params, &mut w);
            output_byte_count = packet_len + inserted_iv_bytes(ctx)
                - if copies_input_iv(ctx) { 0 } else { input_iv };
        }

        TokenProtocol::BasicHash
        | TokenProtocol::BasicKasumiHash
        | TokenProtocol::BasicSnowHash
        | TokenProtocol::BasicZucHash => {
            emit_basic_hash(ctx, params, packet_len, &mut w)?;
            let copied = if ctx.ext_seq != 0 {
                // The extracted ICV, when present, is verified and
                // dropped from the copy.
                packet_len - ctx.anti_replay.min(packet_len)
            } else {
                params.bypass_byte_count
            };
            let append =
                params.packet_flags & packet_flags::HASH_APPEND != 0 || ctx.seq_offset == 0;
            output_byte_count = copied
                + if ctx.anti_replay == 0 && append {
                    ctx.icv_byte_count
                } else {
                    0
                };
        }

        TokenProtocol::BasicCryptHash
        | TokenProtocol::BasicHashEnc
        | TokenProtocol::BasicDecHash
        | TokenProtocol::BasicChaChaPolyOut
        | TokenProtocol::BasicChaChaPolyIn
        | TokenProtocol::BasicCcmOut
        | TokenProtocol::BasicCcmIn
        | TokenProtocol::BasicGcmOut
        | TokenProtocol::BasicGcmIn
        | TokenProtocol::BasicGmacOut
        | TokenProtocol::BasicGmacIn => {
            let bypass = params.bypass_byte_count;
            let inbound = matches!(
                ctx.protocol,
                TokenProtocol::BasicDecHash
                    | TokenProtocol::BasicChaChaPolyIn
                    | TokenProtocol::BasicCcmIn
                    | TokenProtocol::BasicGcmIn
                    | TokenProtocol::BasicGmacIn
            );
            if bypass > 0 {
                let header_type = if ctx.ext_seq != 0 {
                    INS_TYPE_HASH | INS_TYPE_OUTPUT
                } else {
                    INS_TYPE_OUTPUT
                };
                w.op(direction(bypass, header_type, 0));
            }
            if let Some(aad) = params.aad {
                if aad.len() > MAX_AAD_BYTES {
                    return Err(invalid("associated data limited to 64 bytes"));
                }
                if !aad.is_empty() {
                    w.op(insert(aad.len() as u32, INS_ORIGIN_TOKEN | INS_TYPE_HASH, 0));
                    w.data(aad);
                }
            }
            emit_outbound_iv(ctx, params, &mut w)?;
            let input_iv = input_iv_bytes(ctx);
            if packet_len <= bypass + input_iv {
                return Err(invalid("packet too short for the leading IV"));
            }
            let mut payload = packet_len - bypass - input_iv;
            if inbound {
                if payload <= ctx.anti_replay {
                    return Err(invalid("packet too short for the ICV"));
                }
                payload -= ctx.anti_replay;
            }
            w.op(direction(
                payload,
                INS_TYPE_CRYPTO | INS_TYPE_HASH | INS_TYPE_OUTPUT | INS_LAST,
                0,
            ));
            let out_iv = inserted_iv_bytes(ctx)
                + if copies_input_iv(ctx) { input_iv } else { 0 };
            if inbound && ctx.anti_replay > 0 {
                w.op(retrieve(ctx.anti_replay, INS_HASH_DIGEST, STAT_LAST_HASH));
                w.op(fw::VERIFY_NONE + fw::VERIFY_BIT_H + ctx.anti_replay);
                output_byte_count = bypass + out_iv + payload;
            } else {
                w.op(insert(
                    ctx.icv_byte_count,
                    INS_HASH_DIGEST | INS_TYPE_OUTPUT,
                    STAT_LAST_HASH | STAT_LAST_PACKET,
                ));
                output_byte_count = bypass + out_iv + payload + ctx.icv_byte_count;
            }
            emit_state_store(ctx, params, &mut w);
        }

        TokenProtocol::BasicHmacPrecompute | TokenProtocol::BasicHmacCtxPrepare => {
            // The packet is the raw HMAC key; the digests land in the
            // record's precompute area.
            w.op(direction(
                packet_len,
                INS_TYPE_HASH | INS_LAST,
                STAT_LAST_HASH | STAT_LAST_PACKET,
            ));
            let mut remaining = 2 * ctx.digest_word_count;
            let mut offset = ctx.digest_offset;
            while remaining > 0 {
                let count = remaining.min(CTX_WORDS_PER_INSTRUCTION);
                w.op(ctx_store(offset, count));
                offset += count as usize;
                remaining -= count;
            }
            output_byte_count = 0;
        }

        TokenProtocol::SrtpOut | TokenProtocol::SrtpIn => {
            output_byte_count = emit_srtp(ctx, params, packet, &mut w)?;
        }
    }

    let descriptor = TokenDescriptor {
        word_count: w.cursor,
        header_word,
        pad_byte_count,
        output_byte_count,
    };
    debug_assert!(descriptor.word_count <= required);
    logging::log_token_built(descriptor.word_count, packet.len());
    Ok(descriptor)
}

fn is_dtls(ctx: &TokenContext) -> bool {
    // DTLS overloads ext_seq with 1 + replay words; stream TLS leaves
    // it at 0.
    ctx.ext_seq != 0
}

/// Record update after a TLS record: the 64-bit sequence number, plus
/// the replay mask words for DTLS.
fn sequence_update(ctx: &TokenContext) -> u32 {
    let count = if is_dtls(ctx) { 1 + ctx.ext_seq } else { 2 };
    fw::CTX_SEQNUM + (count << 24) + ctx.seq_offset as u32
}

/// Decrypted TLS record payload, or an error when the packet cannot
/// contain one.
fn tls_payload_size(ctx: &TokenContext, packet_len: u32, bypass: u32) -> BuilderResult<u32> {
    let mut overhead = bypass + 5 + ctx.iv_byte_count + ctx.icv_byte_count;
    if ctx.esp_flags & super::context::DTLS_FLAG_CAPWAP != 0 {
        overhead += 4;
    }
    if is_dtls(ctx) {
        // Epoch and 48-bit sequence number precede the length.
        overhead += 8;
    }
    if packet_len <= overhead {
        return Err(invalid("packet too short for the record overhead"));
    }
    let payload = packet_len - overhead;
    if ctx.pad_block_byte_count > 1 && payload % ctx.pad_block_byte_count != 0 {
        return Err(invalid("encrypted record not a whole number of blocks"));
    }
    Ok(payload)
}

/// IV placement for outbound and token-sourced handling modes.
fn emit_outbound_iv(
    ctx: &TokenContext,
    params: &TokenParams<'_>,
    w: &mut TokenWriter<'_>,
) -> BuilderResult<()> {
    match ctx.iv_handling {
        IvHandling::OutboundToken2Words | IvHandling::CopyToken2Words => {
            w.op(insert(8, INS_ORIGIN_TOKEN | INS_TYPE_CRYPTO | INS_TYPE_OUTPUT, 0));
            let iv = match params.iv {
                Some(iv) if iv.len() >= 8 => &iv[..8],
                _ => return Err(invalid("token IV requires 8 bytes")),
            };
            w.data(iv);
        }
        IvHandling::OutboundToken4Words | IvHandling::CopyToken4Words => {
            w.op(insert(16, INS_ORIGIN_TOKEN | INS_TYPE_CRYPTO | INS_TYPE_OUTPUT, 0));
            let iv = match params.iv {
                Some(iv) if iv.len() >= 16 => &iv[..16],
                _ => return Err(invalid("token IV requires 16 bytes")),
            };
            w.data(iv);
        }
        IvHandling::OutboundCbc | IvHandling::OutboundCtr if ctx.iv_byte_count > 0 => {
            // Record or PRNG IV, emitted on the wire.
            w.op(insert(
                ctx.iv_byte_count,
                INS_ORIGIN_IV | INS_TYPE_CRYPTO | INS_TYPE_OUTPUT,
                0,
            ));
        }
        IvHandling::Outbound2Words | IvHandling::Outbound4Words => {
            let len = if ctx.iv_handling == IvHandling::Outbound2Words { 8 } else { 16 };
            w.op(insert(len, INS_ORIGIN_IV | INS_TYPE_CRYPTO | INS_TYPE_OUTPUT, 0));
        }
        IvHandling::InboundCbc | IvHandling::InboundCtr | IvHandling::CopyCbc
        | IvHandling::CopyCtr
            if ctx.iv_byte_count > 0 =>
        {
            // IV arrives at the front of the input.
            let instructions = if ctx.iv_handling == IvHandling::CopyCbc
                || ctx.iv_handling == IvHandling::CopyCtr
            {
                INS_TYPE_CRYPTO | INS_TYPE_OUTPUT
            } else {
                INS_TYPE_CRYPTO
            };
            w.op(direction(ctx.iv_byte_count, instructions, 0));
        }
        IvHandling::KasumiF8 | IvHandling::SnowUea2 | IvHandling::ZucEea3 => {
            let iv = iv_data(ctx, params)?;
            w.op(insert(
                ctx.iv_byte_count,
                INS_ORIGIN_TOKEN | INS_TYPE_CRYPTO,
                0,
            ));
            w.data(iv);
        }
        _ => {}
    }
    Ok(())
}

/// Write-back of cipher state after the packet, per the update mode.
fn emit_state_store(ctx: &TokenContext, params: &TokenParams<'_>, w: &mut TokenWriter<'_>) {
    match ctx.update_handling {
        super::context::UpdateHandling::Arc4 => {
            if params.packet_flags & packet_flags::ARC4_SAVE != 0 {
                w.op(ctx_store(ctx.iv_offset, 1));
            }
        }
        super::context::UpdateHandling::Iv2 => w.op(ctx_store(ctx.iv_offset, 2)),
        super::context::UpdateHandling::Iv4 | super::context::UpdateHandling::Block => {
            w.op(ctx_store(ctx.iv_offset, 4))
        }
        super::context::UpdateHandling::Null => {}
    }
}

/// Hash-only basic operations, including the wireless integrity modes.
fn emit_basic_hash(
    ctx: &TokenContext,
    params: &TokenParams<'_>,
    packet_len: u32,
    w: &mut TokenWriter<'_>,
) -> BuilderResult<()> {
    let bypass = params.bypass_byte_count;
    if bypass > 0 {
        w.op(direction(bypass, INS_TYPE_OUTPUT, 0));
    }
    let copy = ctx.ext_seq != 0;
    let hash_type = if copy {
        INS_TYPE_HASH | INS_TYPE_OUTPUT
    } else {
        INS_TYPE_HASH
    };
    let final_hash = params.packet_flags & packet_flags::HASH_FINAL != 0
        || params.packet_flags & (packet_flags::HASH_FIRST | packet_flags::HASH_APPEND) == 0;
    if packet_len <= bypass + ctx.anti_replay {
        return Err(invalid("packet too short for the ICV"));
    }
    w.op(direction(
        packet_len - bypass - ctx.anti_replay,
        hash_type | INS_LAST,
        if final_hash { STAT_LAST_HASH } else { 0 },
    ));
    let append = params.packet_flags & packet_flags::HASH_APPEND != 0 || ctx.seq_offset == 0;
    if ctx.anti_replay > 0 {
        // Extract-and-verify: the digest arrives at the packet tail.
        w.op(retrieve(ctx.anti_replay, INS_HASH_DIGEST, STAT_LAST_HASH));
        w.op(fw::VERIFY_NONE + fw::VERIFY_BIT_H + ctx.anti_replay);
    } else if append {
        w.op(insert(
            ctx.icv_byte_count,
            INS_HASH_DIGEST | INS_TYPE_OUTPUT,
            STAT_LAST_PACKET,
        ));
    } else {
        // Intermediate digest stored back into the record.
        let mut remaining = ctx.digest_word_count;
        let mut offset = ctx.seq_offset;
        while remaining > 0 {
            let count = remaining.min(CTX_WORDS_PER_INSTRUCTION);
            w.op(ctx_store(offset, count));
            offset += count as usize;
            remaining -= count;
        }
    }
    Ok(())
}

/// SRTP/SRTCP token: the RTP header is authenticated in the clear, the
/// payload is encrypted, and the IV is formed in the token from the
/// record salt and the packet's SSRC and rollover counter.
fn emit_srtp(
    ctx: &TokenContext,
    params: &TokenParams<'_>,
    packet: &[u8],
    w: &mut TokenWriter<'_>,
) -> BuilderResult<u32> {
    let packet_len = packet.len() as u32;
    let srtcp = ctx.ext_seq == 4;
    let outbound = ctx.protocol == TokenProtocol::SrtpOut;

    let header_len = srtp_offset(packet, srtcp)?;
    let mki = ctx.anti_replay;
    let trailer = if outbound {
        0
    } else {
        // Inbound strips SRTCP index, MKI and ICV.
        (if srtcp { 4 } else { 0 }) + mki + ctx.icv_byte_count
    };
    if packet_len <= header_len + trailer {
        return Err(invalid("packet too short for the SRTP layout"));
    }
    let payload = packet_len - header_len - trailer;

    w.op(direction(header_len, INS_TYPE_HASH | INS_TYPE_OUTPUT, 0));
    if ctx.iv_handling == IvHandling::TokenSrtp {
        let (iv1, iv2) = srtp_packet_salt(ctx, params, packet, srtcp)?;
        w.op(insert(16, INS_ORIGIN_TOKEN | INS_TYPE_CRYPTO, 0));
        w.op(ctx.salt_key[0]);
        w.op(iv1);
        w.op(iv2);
        w.op(ctx.salt_key[3]);
    }
    w.op(direction(
        payload,
        INS_TYPE_CRYPTO | INS_TYPE_HASH | INS_TYPE_OUTPUT | INS_LAST,
        0,
    ));

    let output;
    if outbound {
        if srtcp {
            // E-bit and 31-bit SRTCP index, authenticated and sent.
            w.op(insert(4, INS_ORIGIN_TOKEN | INS_TYPE_HASH | INS_TYPE_OUTPUT, 0));
            w.op((params.additional_value | 0x8000_0000).swap_bytes());
        }
        if mki > 0 {
            w.op(insert(mki, INS_ORIGIN_SPI_SEQ | INS_TYPE_OUTPUT, 0));
        }
        w.op(insert(
            ctx.icv_byte_count,
            INS_HASH_DIGEST | INS_TYPE_OUTPUT,
            STAT_LAST_HASH | STAT_LAST_PACKET,
        ));
        output = packet_len + (if srtcp { 4 } else { 0 }) + mki + ctx.icv_byte_count;
    } else {
        if srtcp {
            w.op(direction(4, INS_TYPE_HASH, 0));
        }
        if mki > 0 {
            w.op(direction(mki, 0, 0));
        }
        w.op(retrieve(ctx.icv_byte_count, INS_HASH_DIGEST, STAT_LAST_HASH));
        w.op(fw::VERIFY_NONE + fw::VERIFY_BIT_H + ctx.icv_byte_count);
        output = header_len + payload;
    }
    Ok(output)
}

/// Unencrypted RTP/RTCP header length: fixed header, CSRC list and,
/// for RTP, the extension header.
fn srtp_offset(packet: &[u8], srtcp: bool) -> BuilderResult<u32> {
    if packet.len() < 12 {
        return Err(invalid("packet too short for an RTP header"));
    }
    if srtcp {
        return Ok(8);
    }
    let csrc_count = (packet[0] & 0x0f) as u32;
    let mut offset = 12 + 4 * csrc_count;
    if packet[0] & 0x10 != 0 {
        // Extension header: 16-bit profile, 16-bit length in words.
        let ext = offset as usize;
        if packet.len() < ext + 4 {
            return Err(invalid("packet too short for the RTP extension"));
        }
        let ext_words = ((packet[ext + 2] as u32) << 8) | packet[ext + 3] as u32;
        offset += 4 + 4 * ext_words;
    }
    if (offset as usize) >= packet.len() {
        return Err(invalid("RTP header exceeds the packet"));
    }
    Ok(offset)
}

/// Middle IV words: salt XOR SSRC, salt XOR byte-swapped rollover
/// counter (or SRTCP index).
fn srtp_packet_salt(
    ctx: &TokenContext,
    params: &TokenParams<'_>,
    packet: &[u8],
    srtcp: bool,
) -> BuilderResult<(u32, u32)> {
    let ssrc_at = if srtcp { 4 } else { 8 };
    if packet.len() < ssrc_at + 4 {
        return Err(invalid("packet too short for the SSRC field"));
    }
    let ssrc = (packet[ssrc_at] as u32)
        | ((packet[ssrc_at + 1] as u32) << 8)
        | ((packet[ssrc_at + 2] as u32) << 16)
        | ((packet[ssrc_at + 3] as u32) << 24);
    let roc = params.additional_value.swap_bytes();
    Ok((ctx.salt_key[1] ^ ssrc, ctx.salt_key[2] ^ roc))
}

#[cfg(test)]
mod tests {
    use super::super::context::{build_context, ContextState};
    use super::*;
    use crate::sa::params::{
        basic_flags, ipsec_flags, AuthAlgo, Direction, ProtocolParams, SaParams,
    };

    fn esp_out_ctx() -> TokenContext {
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
        build_context(&params).unwrap()
    }

    #[test]
    fn test_esp_outbound_token_shape() {
        let ctx = esp_out_ctx();
        let packet = vec![0u8; 100];
        let mut words = vec![0u32; token_word_count(&ctx)];
        let desc = build_token(&ctx, &packet, &TokenParams::default(), &mut words).unwrap();

        assert!(desc.word_count <= words.len());
        assert_eq!(desc.header_word & 0x1ffff, 100);
        // 100 bytes + 2 trailer bytes round up to 112.
        assert_eq!(desc.pad_byte_count, 12);
        assert_eq!(desc.output_byte_count, 100 + 8 + 16 + 12 + 12);
        // Sequence update instruction closes the token.
        assert_eq!(
            words[desc.word_count - 1],
            fw::CTX_OUT_SEQNUM + (1 << 24) + 17
        );
    }

    #[test]
    fn test_esp_inbound_verify_and_replay_uword() {
        let mut params = SaParams::init_esp(
            0x1000,
            ipsec_flags::TUNNEL,
            ipsec_flags::IPV4,
            Direction::Inbound,
        )
        .unwrap();
        params.set_aes_gcm(&[0u8; 16], &[0u8; 4]);
        let ProtocolParams::Ipsec(ext) = &mut params.protocol else {
            unreachable!();
        };
        ext.ipsec_flags |= ipsec_flags::MASK_128;
        params.offsets.seq_num = 32;
        params.offsets.seq_mask = 34;
        let ctx = build_context(&params).unwrap();
        assert_eq!(ctx.anti_replay, 4);

        let packet = vec![0u8; 120];
        let mut words = vec![0u32; token_word_count(&ctx)];
        let desc = build_token(&ctx, &packet, &TokenParams::default(), &mut words).unwrap();

        // 128-bit replay mask rides in the U-word.
        assert_ne!(desc.header_word & HEADER_U, 0);
        assert_eq!(words[0], 0x00400000);
        let verify = fw::VERIFY_PADSPI + fw::VERIFY_BIT_H + 16 + fw::VERIFY_BIT_SEQ;
        assert!(words[..desc.word_count].contains(&verify));
        assert!(words[..desc.word_count]
            .contains(&(fw::CTX_SEQNUM + (6 << 24) + 32)));
        assert_eq!(desc.output_byte_count, 120 - 8 - 8 - 16);
    }

    #[test]
    fn test_esp_inbound_short_packet_rejected() {
        let ctx = esp_out_ctx();
        let mut params = SaParams::init_esp(
            0x1000,
            ipsec_flags::TUNNEL,
            ipsec_flags::IPV4,
            Direction::Inbound,
        )
        .unwrap();
        params.set_aes_cbc(&[0u8; 16]);
        params.set_hmac_sha1(&[0u8; 20], &[0u8; 20]);
        let in_ctx = build_context(&params).unwrap();

        let packet = vec![0u8; 20];
        let mut words = vec![0u32; token_word_count(&ctx)];
        assert!(build_token(&in_ctx, &packet, &TokenParams::default(), &mut words).is_err());
    }

    #[test]
    fn test_buffer_too_short() {
        let ctx = esp_out_ctx();
        let packet = vec![0u8; 64];
        let mut words = vec![0u32; 4];
        let err = build_token(&ctx, &packet, &TokenParams::default(), &mut words).unwrap_err();
        assert!(matches!(err, BuilderError::BufferTooShort { .. }));
    }

    #[test]
    fn test_hmac_precompute_stores_both_digests() {
        let mut params = SaParams::init_basic(Direction::Outbound);
        params.auth_algo = AuthAlgo::HmacSha1;
        params.offsets.digest0 = 2;
        params.offsets.digest1 = 7;
        let mut ctx = build_context(&params).unwrap();
        assert!(matches!(ctx.state, ContextState::PendingPrecompute { .. }));

        let key = vec![0u8; 70];
        let mut words = vec![0u32; token_word_count(&ctx)];
        let desc = build_token(&ctx, &key, &TokenParams::default(), &mut words).unwrap();

        // Options word: fresh hash, store, key longer than a block.
        assert_ne!(desc.header_word & HEADER_C, 0);
        assert_eq!(
            words[0],
            PERPKT_HASH_FIRST | PERPKT_HASH_STORE | PERPKT_HASH_CMPRKEY
        );
        // Inner and outer digests, 10 words from record word 2.
        assert!(words[..desc.word_count].contains(&ctx_store(2, 10)));
        assert_eq!(desc.output_byte_count, 0);

        assert!(ctx.advance());
        let desc = build_token(&ctx, &vec![0u8; 40], &TokenParams::default(), &mut words).unwrap();
        assert_eq!(desc.header_word & HEADER_C, 0);
    }

    #[test]
    fn test_basic_hash_stores_intermediate_digest() {
        let mut params = SaParams::init_basic(Direction::Outbound);
        params.auth_algo = AuthAlgo::HashSha2_256;
        params.flags |= crate::sa::params::flags::HASH_SAVE;
        params.offsets.digest0 = 8;
        let ctx = build_context(&params).unwrap();
        assert_eq!(ctx.seq_offset, 8);
        assert_eq!(ctx.digest_word_count, 24);

        let packet = vec![0u8; 256];
        let mut words = vec![0u32; token_word_count(&ctx)];
        let flags = TokenParams {
            packet_flags: packet_flags::HASH_FIRST,
            ..TokenParams::default()
        };
        let desc = build_token(&ctx, &packet, &flags, &mut words).unwrap();

        // 24 state words split into 15 + 9.
        assert!(words[..desc.word_count].contains(&ctx_store(8, 15)));
        assert!(words[..desc.word_count].contains(&ctx_store(23, 9)));
        // Hash left open for the next fragment.
        assert_eq!(words[0] & PERPKT_HASH_NO_FINAL, PERPKT_HASH_NO_FINAL);
    }

    #[test]
    fn test_basic_extract_icv_verifies() {
        let mut params = SaParams::init_basic(Direction::Inbound);
        params.auth_algo = AuthAlgo::HmacSha1;
        params.auth_key1 = Some(zeroize::Zeroizing::new(vec![0u8; 20]));
        params.auth_key2 = Some(zeroize::Zeroizing::new(vec![0u8; 20]));
        let ProtocolParams::Basic(ext) = &mut params.protocol else {
            unreachable!();
        };
        ext.basic_flags |= basic_flags::EXTRACT_ICV;
        let ctx = build_context(&params).unwrap();
        assert_eq!(ctx.anti_replay, 20);

        let packet = vec![0u8; 80];
        let mut words = vec![0u32; token_word_count(&ctx)];
        let desc = build_token(&ctx, &packet, &TokenParams::default(), &mut words).unwrap();
        assert!(words[..desc.word_count]
            .contains(&(fw::VERIFY_NONE + fw::VERIFY_BIT_H + 20)));
    }

    #[test]
    fn test_srtp_outbound_iv_from_packet() {
        let mut params = SaParams::init_srtp(Direction::Outbound);
        params.crypto_algo = crate::sa::params::CryptoAlgo::Aes;
        params.crypto_mode = crate::sa::params::CryptoMode::Icm;
        params.key = Some(zeroize::Zeroizing::new(vec![0u8; 16]));
        params.nonce = Some(vec![0xaa; 14]);
        params.auth_algo = AuthAlgo::HmacSha1;
        params.auth_key1 = Some(zeroize::Zeroizing::new(vec![0u8; 20]));
        params.auth_key2 = Some(zeroize::Zeroizing::new(vec![0u8; 20]));
        let ProtocolParams::Srtp(ext) = &mut params.protocol else {
            unreachable!();
        };
        ext.icv_byte_count = 10;
        let ctx = build_context(&params).unwrap();

        // RTP header with no CSRC, SSRC 0x11223344 in wire order.
        let mut packet = vec![0u8; 60];
        packet[0] = 0x80;
        packet[8..12].copy_from_slice(&[0x44, 0x33, 0x22, 0x11]);
        let mut words = vec![0u32; token_word_count(&ctx)];
        let desc = build_token(&ctx, &packet, &TokenParams::default(), &mut words).unwrap();

        // Second IV word is the salt XORed with the SSRC.
        assert!(words[..desc.word_count].contains(&(0xaaaaaaaa ^ 0x11223344)));
        assert_eq!(desc.output_byte_count, 60 + 10);
    }

    #[test]
    fn test_token_fits_reported_size() {
        let ctx = esp_out_ctx();
        for len in [33usize, 64, 100, 1499] {
            let packet = vec![0u8; len];
            let mut words = vec![0u32; token_word_count(&ctx)];
            let desc =
                build_token(&ctx, &packet, &TokenParams::default(), &mut words).unwrap();
            assert!(desc.word_count <= token_word_count(&ctx));
        }
    }
}
