//! Extended transform-record fields for DTLS
//!
//! DTLS records can only be classified inline for the common AEAD and
//! CBC suites; anything else is still a valid look-aside SA, so the
//! pass returns quietly without touching the firmware fields.

use crate::error::{invalid, unsupported, BuilderResult};

use super::super::builder::BuilderConfig;
use super::super::params::{
    ssltls_flags, AuthAlgo, CryptoAlgo, Direction, IvSrc, SaOffsets, SaParams, SslTlsParams,
    TlsVersion,
};
use super::super::ssltls::mask_bit_count;
use super::super::state::{SaBuffer, SaState};
use super::*;

pub(crate) fn set_extended_dtls_params(
    params: &SaParams,
    ext: &SslTlsParams,
    state: &mut SaState,
    buf: &mut SaBuffer<'_>,
    offsets: &mut SaOffsets,
    config: &BuilderConfig,
) -> BuilderResult<()> {
    let mut token_header_word = HEADER_DEFAULT;
    let mut flags: u32 = 0;

    if !matches!(ext.version, TlsVersion::Dtls1_0 | TlsVersion::Dtls1_2)
        || !matches!(
            params.crypto_algo,
            CryptoAlgo::Aes
                | CryptoAlgo::ChaCha20
                | CryptoAlgo::TripleDes
                | CryptoAlgo::Sm4
                | CryptoAlgo::Null
        )
    {
        // Valid for host look-aside only.
        return Ok(());
    }

    let mut anti_replay: u32 = if ext.ssltls_flags & ssltls_flags::NO_ANTI_REPLAY != 0 {
        0
    } else {
        1
    };
    let ipv6 = ext.ssltls_flags & ssltls_flags::IPV6 != 0;
    let capwap = ext.ssltls_flags & ssltls_flags::CAPWAP != 0;

    let esp_proto;
    let pad_block: u32;
    let iv_byte_count: u32;
    let header_proto;
    if params.direction == Direction::Outbound {
        if params.crypto_algo == CryptoAlgo::ChaCha20 || params.crypto_algo == CryptoAlgo::Null {
            esp_proto = DTLS_PROTO_OUT_CHACHAPOLY;
            pad_block = 0;
            iv_byte_count = 0;
        } else if params.auth_algo == AuthAlgo::AesGcm {
            esp_proto = DTLS_PROTO_OUT_GCM;
            pad_block = 0;
            iv_byte_count = 8;
        } else {
            match state.iv_src {
                IvSrc::Default | IvSrc::Prng => token_header_word |= HEADER_IV_PRNG,
                IvSrc::Sa | IvSrc::Token => {}
                _ => return Err(invalid("unsupported IV source for outbound DTLS CBC")),
            }
            esp_proto = DTLS_PROTO_OUT_CBC;
            if params.crypto_algo == CryptoAlgo::TripleDes {
                pad_block = 8;
                iv_byte_count = 8;
            } else {
                pad_block = 16;
                iv_byte_count = 16;
            }
        }
        header_proto = match (ipv6, capwap) {
            (false, false) => HDR_IPV4_OUT_DTLS,
            (false, true) => HDR_IPV4_OUT_DTLS_CAPWAP,
            (true, false) => HDR_IPV6_OUT_DTLS,
            (true, true) => HDR_IPV6_OUT_DTLS_CAPWAP,
        };
    } else {
        if params.crypto_algo == CryptoAlgo::ChaCha20 || params.crypto_algo == CryptoAlgo::Null {
            esp_proto = DTLS_PROTO_IN_CHACHAPOLY;
            pad_block = 0;
            iv_byte_count = 0;
        } else if params.auth_algo == AuthAlgo::AesGcm {
            esp_proto = DTLS_PROTO_IN_GCM;
            pad_block = 0;
            iv_byte_count = 8;
        } else {
            esp_proto = DTLS_PROTO_IN_CBC;
            token_header_word |= HEADER_PAD_VERIFY;
            if params.crypto_algo == CryptoAlgo::TripleDes {
                pad_block = 8;
                iv_byte_count = 8;
            } else {
                pad_block = 16;
                iv_byte_count = 16;
            }
        }
        header_proto = match (ipv6, capwap) {
            (false, false) => HDR_IPV4_IN_DTLS,
            (false, true) => HDR_IPV4_IN_DTLS_CAPWAP,
            (true, false) => HDR_IPV6_IN_DTLS,
            (true, true) => HDR_IPV6_IN_DTLS_CAPWAP,
        };
        anti_replay *= mask_bit_count(ext) / 32;
    }
    let seq_offset = offsets.seq_num as u32;

    let pad_block = if params.direction == Direction::Outbound
        && (ext.pad_alignment as u32) > pad_block
    {
        ext.pad_alignment as u32
    } else {
        pad_block
    };

    let icv_byte_count: u32 = match params.auth_algo {
        AuthAlgo::HmacMd5 => 16,
        AuthAlgo::HmacSha1 => 20,
        AuthAlgo::HmacSha2_256 | AuthAlgo::HmacSm3 => 32,
        AuthAlgo::HmacSha2_384 => 48,
        AuthAlgo::HmacSha2_512 => 64,
        AuthAlgo::AesGcm | AuthAlgo::Poly1305 => 16,
        _ => return Err(unsupported("unsupported authentication algorithm for DTLS")),
    };

    if ipv6 {
        flags |= 1 << 8;
    }
    if ext.ssltls_flags & ssltls_flags::PROCESS_IP_HEADERS != 0 {
        flags |= 1 << 19;
    }
    if ext.ssltls_flags & ssltls_flags::PLAINTEXT_HEADERS != 0 {
        flags |= 1 << 29;
    }

    let verify_instruction;
    let ctx_instruction;
    if params.direction == Direction::Outbound {
        verify_instruction = VERIFY_NONE;
        ctx_instruction = CTX_OUT_SEQNUM + (2 << 24) + seq_offset;
    } else {
        let mut verify = if pad_block != 0 { VERIFY_PAD } else { VERIFY_NONE };
        if icv_byte_count > 0 {
            verify += VERIFY_BIT_H + icv_byte_count;
        }
        if anti_replay > 0 {
            verify += VERIFY_BIT_SEQ;
        }
        verify_instruction = verify;
        ctx_instruction = CTX_SEQNUM + ((2 + anti_replay) << 24) + seq_offset;
    }

    let slot = if state.large {
        config.large_transform_offset
    } else {
        0
    };
    buf.write(TR_FLAGS + slot, flags);
    buf.write(TR_HDRPROC_CTX + slot, ext.context_ref);
    buf.write(
        TR_BYTE_PARAM + slot,
        pack_bytes(
            iv_byte_count,
            icv_byte_count,
            header_proto as u32,
            esp_proto as u32,
        ),
    );
    buf.write(TR_TK_HDR + slot, token_header_word);
    buf.write(TR_PAD_ALIGN + slot, pack_bytes(pad_block / 2, 0, 0, 0));
    buf.write(TR_CCM_SALT + slot, 0);
    buf.write(TR_TK_VFY_INST + slot, verify_instruction);
    buf.write(TR_TK_CTX_INST + slot, ctx_instruction);
    // Firmware matches the record version through this slot.
    buf.write(TR_NATT_PORTS + slot, ext.version.wire_value() as u32);
    buf.write(TR_TIME_STAMP_LO + slot, 0);
    buf.write(TR_TIME_STAMP_HI + slot, 0);
    buf.write(TR_STAT_OCT_LO + slot, 0);
    buf.write(TR_STAT_OCT_HI + slot, 0);
    buf.write(TR_STAT_PKT + slot, 0);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sa::params::ProtocolParams;

    fn dtls_params(version: TlsVersion, direction: Direction) -> (SaParams, SslTlsParams) {
        let params = SaParams::init_ssltls(version, direction);
        let ext = match &params.protocol {
            ProtocolParams::SslTls(ext) => ext.clone(),
            _ => unreachable!(),
        };
        (params, ext)
    }

    fn run(
        params: &SaParams,
        ext: &SslTlsParams,
        state: &mut SaState,
        offsets: &mut SaOffsets,
        words: &mut [u32],
    ) -> BuilderResult<()> {
        let mut buf = SaBuffer::real(words);
        set_extended_dtls_params(
            params,
            ext,
            state,
            &mut buf,
            offsets,
            &BuilderConfig::default(),
        )
    }

    #[test]
    fn test_outbound_cbc_record_fields() {
        let (mut params, ext) = dtls_params(TlsVersion::Dtls1_2, Direction::Outbound);
        params.set_aes_cbc(&[0u8; 16]);
        params.set_hmac_sha1(&[0u8; 20], &[0u8; 20]);
        let mut state = SaState::new();
        state.iv_src = IvSrc::Prng;
        let mut offsets = SaOffsets {
            seq_num: 4,
            ..SaOffsets::default()
        };
        let mut words = [0u32; 64];
        run(&params, &ext, &mut state, &mut offsets, &mut words).unwrap();

        assert_eq!(
            words[TR_BYTE_PARAM],
            pack_bytes(16, 20, HDR_IPV4_OUT_DTLS as u32, DTLS_PROTO_OUT_CBC as u32)
        );
        assert_eq!(words[TR_TK_HDR], HEADER_DEFAULT | HEADER_IV_PRNG);
        assert_eq!(words[TR_TK_VFY_INST], VERIFY_NONE);
        assert_eq!(words[TR_TK_CTX_INST], CTX_OUT_SEQNUM + (2 << 24) + 4);
        assert_eq!(words[TR_NATT_PORTS], 0xfefd);
    }

    #[test]
    fn test_inbound_gcm_verify_and_ctx() {
        let (mut params, ext) = dtls_params(TlsVersion::Dtls1_2, Direction::Inbound);
        params.set_aes_gcm(&[0u8; 16], &[0u8; 4]);
        let mut state = SaState::new();
        let mut offsets = SaOffsets {
            seq_num: 4,
            ..SaOffsets::default()
        };
        let mut words = [0u32; 64];
        run(&params, &ext, &mut state, &mut offsets, &mut words).unwrap();

        assert_eq!(
            words[TR_BYTE_PARAM],
            pack_bytes(8, 16, HDR_IPV4_IN_DTLS as u32, DTLS_PROTO_IN_GCM as u32)
        );
        // AEAD: no pad verification, hash and replay checks only.
        assert_eq!(words[TR_TK_VFY_INST], VERIFY_NONE + VERIFY_BIT_H + 16 + VERIFY_BIT_SEQ);
        // Default 64-bit mask gives a two-word replay update.
        assert_eq!(words[TR_TK_CTX_INST], CTX_SEQNUM + (4 << 24) + 4);
    }

    #[test]
    fn test_capwap_header_protocol() {
        let (mut params, mut ext) = dtls_params(TlsVersion::Dtls1_0, Direction::Outbound);
        params.set_aes_gcm(&[0u8; 16], &[0u8; 4]);
        ext.ssltls_flags |= ssltls_flags::CAPWAP | ssltls_flags::IPV6;
        let mut state = SaState::new();
        let mut offsets = SaOffsets::default();
        let mut words = [0u32; 64];
        run(&params, &ext, &mut state, &mut offsets, &mut words).unwrap();
        assert_eq!(
            (words[TR_BYTE_PARAM] >> 16) & 0xff,
            HDR_IPV6_OUT_DTLS_CAPWAP as u32
        );
        assert_ne!(words[TR_FLAGS] & (1 << 8), 0);
    }

    #[test]
    fn test_non_dtls_version_is_lookaside_only() {
        let (mut params, ext) = dtls_params(TlsVersion::Tls1_2, Direction::Outbound);
        params.set_aes_gcm(&[0u8; 16], &[0u8; 4]);
        let mut state = SaState::new();
        let mut offsets = SaOffsets::default();
        let mut words = [0u32; 64];
        run(&params, &ext, &mut state, &mut offsets, &mut words).unwrap();
        // Nothing written.
        assert!(words.iter().all(|w| *w == 0));
    }
}
