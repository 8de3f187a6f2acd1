//! Extended transform-record fields for the Basic protocol
//!
//! Inline classification only handles combined cipher + hash records
//! (and plain bypass); the AEAD suites and single-operation records
//! stay look-aside and leave the firmware fields untouched.

use crate::error::{unsupported, BuilderResult};

use super::super::builder::BuilderConfig;
use super::super::params::{
    basic_flags, flags as sa_flags, AuthAlgo, BasicParams, CryptoAlgo, CryptoMode, Direction,
    IvSrc, SaOffsets, SaParams,
};
use super::super::state::{SaBuffer, SaState};
use super::*;

pub(crate) fn set_extended_basic_params(
    params: &SaParams,
    ext: &BasicParams,
    state: &mut SaState,
    buf: &mut SaBuffer<'_>,
    _offsets: &mut SaOffsets,
    config: &BuilderConfig,
) -> BuilderResult<()> {
    let combined = params.crypto_algo != CryptoAlgo::Null
        && params.crypto_algo != CryptoAlgo::Arc4
        && params.crypto_algo != CryptoAlgo::ChaCha20
        && params.auth_algo != AuthAlgo::Null
        && !matches!(
            params.auth_algo,
            AuthAlgo::AesGcm | AuthAlgo::AesGmac | AuthAlgo::AesCcm
        );
    let bypass = params.crypto_algo == CryptoAlgo::Null && params.auth_algo == AuthAlgo::Null;
    if !combined && !bypass {
        // Look-aside only.
        return Ok(());
    }

    let mut token_header_word = HEADER_DEFAULT;
    let mut pad_block: u32 = 1;
    let mut iv_byte_count: u32 = 0;
    let mut icv_byte_count: u32 = 0;
    let mut flags: u32 = 0;
    let mut iv_instruction: u32 = 0;
    let esp_proto;
    let header_proto;
    let verify_instruction;

    if params.crypto_algo == CryptoAlgo::Null {
        esp_proto = ESP_PROTO_NONE;
        header_proto = if ext.basic_flags & basic_flags::XFRM_API != 0 {
            HDR_BASIC_IN_NO_PAD
        } else {
            HDR_BYPASS
        };
        verify_instruction = VERIFY_NONE;
    } else {
        let encrypt_after_hash = ext.basic_flags & basic_flags::ENCRYPT_AFTER_HASH != 0;
        if encrypt_after_hash {
            if params.direction == Direction::Outbound {
                esp_proto = BASIC_PROTO_OUT_HASHENC;
                header_proto = HDR_BASIC_OUT_TPAD;
            } else {
                esp_proto = BASIC_PROTO_IN_DECHASH;
                token_header_word |= HEADER_PAD_VERIFY;
                header_proto = HDR_BASIC_IN_PAD;
            }
        } else if params.direction == Direction::Outbound {
            esp_proto = BASIC_PROTO_OUT_ENCHASH;
            header_proto = HDR_BASIC_OUT_ZPAD;
        } else {
            esp_proto = BASIC_PROTO_IN_HASHDEC;
            header_proto = HDR_BASIC_IN_NO_PAD;
        }

        if params.flags & sa_flags::SUPPRESS_HEADER == 0 {
            flags |= 1 << 29;
        }

        match params.crypto_algo {
            CryptoAlgo::Des | CryptoAlgo::TripleDes => {
                iv_byte_count = 8;
                pad_block = 8;
            }
            CryptoAlgo::Aes | CryptoAlgo::Sm4 | CryptoAlgo::Bc0 => {
                iv_byte_count = 16;
                pad_block = 16;
            }
            _ => return Err(unsupported("unsupported cipher for an inline basic record")),
        }

        match params.crypto_mode {
            CryptoMode::Ecb => {
                iv_byte_count = 0;
                // NOP instruction
                iv_instruction = 0x20000004;
            }
            CryptoMode::Cbc => {
                if matches!(state.iv_src, IvSrc::Default | IvSrc::Input) {
                    iv_instruction = RETR_HASH_IV0 + iv_byte_count;
                } else {
                    iv_instruction = INS_NONE_IV0 + iv_byte_count;
                    iv_byte_count = 0;
                }
                if state.iv_src == IvSrc::Prng {
                    token_header_word |= HEADER_IV_PRNG;
                }
                if params.flags & sa_flags::COPY_IV != 0 {
                    // IV to output and into the hash.
                    iv_instruction |= (1 << 25) | (1 << 24);
                }
                if encrypt_after_hash {
                    // The hash must not cover the IV for HASHENC.
                    iv_instruction &= !(1 << 25);
                }
            }
            CryptoMode::Ctr => {
                iv_byte_count = 8;
                pad_block = 1;
                if matches!(state.iv_src, IvSrc::Default | IvSrc::Input) {
                    iv_instruction = RETR_HASH_IV1 + iv_byte_count;
                } else {
                    iv_instruction = INS_NONE_IV1 + iv_byte_count;
                    iv_byte_count = 0;
                }
                if params.flags & sa_flags::COPY_IV != 0 {
                    iv_instruction |= (1 << 25) | (1 << 24);
                }
            }
            CryptoMode::Icm => {
                iv_byte_count = 16;
                pad_block = 1;
                if matches!(state.iv_src, IvSrc::Default | IvSrc::Input) {
                    iv_instruction = RETR_HASH_IV0 + iv_byte_count;
                } else {
                    iv_instruction = INS_NONE_IV0 + iv_byte_count;
                    iv_byte_count = 0;
                }
                if params.flags & sa_flags::COPY_IV != 0 {
                    iv_instruction |= (1 << 25) | (1 << 24);
                }
            }
            _ => return Err(unsupported("unsupported cipher mode for an inline basic record")),
        }

        icv_byte_count = match params.auth_algo {
            AuthAlgo::HashMd5 | AuthAlgo::SslMacMd5 | AuthAlgo::HmacMd5 => 16,
            AuthAlgo::HashSha1 | AuthAlgo::SslMacSha1 | AuthAlgo::HmacSha1 => 20,
            AuthAlgo::HashSha3_224 | AuthAlgo::KeyedHashSha3_224 | AuthAlgo::HmacSha3_224 => 28,
            AuthAlgo::HashSha2_224
            | AuthAlgo::HmacSha2_224
            | AuthAlgo::HashSha2_256
            | AuthAlgo::HmacSha2_256
            | AuthAlgo::HmacSm3
            | AuthAlgo::HashSm3
            | AuthAlgo::HashSha3_256
            | AuthAlgo::KeyedHashSha3_256
            | AuthAlgo::HmacSha3_256 => 32,
            AuthAlgo::HashSha3_384 | AuthAlgo::KeyedHashSha3_384 | AuthAlgo::HmacSha3_384 => 48,
            AuthAlgo::HashSha2_384 | AuthAlgo::HmacSha2_384 => {
                if encrypt_after_hash {
                    48
                } else {
                    64
                }
            }
            AuthAlgo::HashSha3_512
            | AuthAlgo::KeyedHashSha3_512
            | AuthAlgo::HmacSha3_512
            | AuthAlgo::HashSha2_512
            | AuthAlgo::HmacSha2_512 => 64,
            AuthAlgo::XcbcMac | AuthAlgo::Cmac128 | AuthAlgo::Cmac192 | AuthAlgo::Cmac256 => 16,
            _ => {
                return Err(unsupported(
                    "unsupported authentication algorithm for an inline basic record",
                ))
            }
        };
        if ext.icv_byte_count != 0 && (ext.icv_byte_count as u32) < icv_byte_count {
            icv_byte_count = ext.icv_byte_count as u32;
        }

        if params.direction == Direction::Outbound {
            verify_instruction = VERIFY_NONE;
        } else {
            let base = if encrypt_after_hash {
                VERIFY_PAD
            } else {
                VERIFY_NONE
            };
            verify_instruction = base + VERIFY_BIT_H + icv_byte_count;
        }
    }

    let ctx_instruction = CTX_NONE + config.record_word_count as u32
        + if state.large {
            config.large_transform_offset as u32
        } else {
            0
        }
        - 1;

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
    // The salt slot is reused for the per-packet IV instruction.
    buf.write(TR_CCM_SALT + slot, iv_instruction);
    buf.write(TR_TK_VFY_INST + slot, verify_instruction);
    buf.write(TR_TK_CTX_INST + slot, ctx_instruction);
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

    fn basic_params(direction: Direction) -> (SaParams, BasicParams) {
        let params = SaParams::init_basic(direction);
        let ext = match &params.protocol {
            ProtocolParams::Basic(ext) => ext.clone(),
            _ => unreachable!(),
        };
        (params, ext)
    }

    fn run(
        params: &SaParams,
        ext: &BasicParams,
        state: &mut SaState,
        words: &mut [u32],
    ) -> BuilderResult<()> {
        let mut buf = SaBuffer::real(words);
        set_extended_basic_params(
            params,
            ext,
            state,
            &mut buf,
            &mut SaOffsets::default(),
            &BuilderConfig::default(),
        )
    }

    #[test]
    fn test_outbound_cbc_hmac_record_fields() {
        let (mut params, ext) = basic_params(Direction::Outbound);
        params.set_aes_cbc(&[0u8; 16]);
        params.set_hmac_sha1(&[0u8; 20], &[0u8; 20]);
        let mut state = SaState::new();
        state.iv_src = IvSrc::Input;
        let mut words = [0u32; 64];
        run(&params, &ext, &mut state, &mut words).unwrap();

        assert_eq!(
            words[TR_BYTE_PARAM],
            pack_bytes(
                16,
                20,
                HDR_BASIC_OUT_ZPAD as u32,
                BASIC_PROTO_OUT_ENCHASH as u32
            )
        );
        assert_eq!(words[TR_CCM_SALT], RETR_HASH_IV0 + 16);
        assert_eq!(words[TR_PAD_ALIGN], pack_bytes(8, 0, 0, 0));
        assert_eq!(words[TR_TK_VFY_INST], VERIFY_NONE);
        assert_eq!(words[TR_TK_CTX_INST], CTX_NONE + 64 - 1);
        assert_ne!(words[TR_FLAGS] & (1 << 29), 0);
    }

    #[test]
    fn test_inbound_encrypt_after_hash() {
        let (mut params, mut ext) = basic_params(Direction::Inbound);
        params.set_aes_cbc(&[0u8; 16]);
        params.set_hmac_sha2_256(&[0u8; 32], &[0u8; 32]);
        ext.basic_flags |= basic_flags::ENCRYPT_AFTER_HASH;
        let mut state = SaState::new();
        state.iv_src = IvSrc::Input;
        let mut words = [0u32; 64];
        run(&params, &ext, &mut state, &mut words).unwrap();

        assert_eq!(
            (words[TR_BYTE_PARAM] >> 24) & 0xff,
            BASIC_PROTO_IN_DECHASH as u32
        );
        assert_eq!(
            (words[TR_BYTE_PARAM] >> 16) & 0xff,
            HDR_BASIC_IN_PAD as u32
        );
        assert_ne!(words[TR_TK_HDR] & HEADER_PAD_VERIFY, 0);
        assert_eq!(words[TR_TK_VFY_INST], VERIFY_PAD + VERIFY_BIT_H + 32);
    }

    #[test]
    fn test_null_bypass_record() {
        let (params, ext) = basic_params(Direction::Outbound);
        let mut state = SaState::new();
        let mut words = [0u32; 64];
        run(&params, &ext, &mut state, &mut words).unwrap();
        assert_eq!(
            words[TR_BYTE_PARAM],
            pack_bytes(0, 0, HDR_BYPASS as u32, ESP_PROTO_NONE as u32)
        );
        assert_eq!(words[TR_TK_VFY_INST], VERIFY_NONE);
        assert_eq!(words[TR_PAD_ALIGN], pack_bytes(0, 0, 0, 0));
    }

    #[test]
    fn test_hash_only_stays_lookaside() {
        let (mut params, ext) = basic_params(Direction::Outbound);
        params.auth_algo = AuthAlgo::HmacSha1;
        let mut state = SaState::new();
        let mut words = [0u32; 64];
        run(&params, &ext, &mut state, &mut words).unwrap();
        assert!(words.iter().all(|w| *w == 0));
    }
}
