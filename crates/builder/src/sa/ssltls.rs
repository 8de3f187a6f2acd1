//! SSL/TLS/DTLS protocol pass
//!
//! Lays out the version word, 48/64-bit sequence number, DTLS replay
//! mask and nonce/IV words for record protection transforms.

use crate::error::{invalid, BuilderResult};

use super::builder::BuilderConfig;
use super::cw;
use super::params::{
    ssltls_flags, AuthAlgo, CryptoAlgo, CryptoMode, Direction, IvSrc, SaOffsets, SaParams,
    SslTlsParams, TlsVersion,
};
use super::state::{SaBuffer, SaState};

/// DTLS anti-replay mask width in bits, applying the flag defaults
/// when the extension leaves the explicit count at zero.
pub(crate) fn mask_bit_count(ext: &SslTlsParams) -> u32 {
    if ext.sequence_mask_bit_count != 0 {
        ext.sequence_mask_bit_count
    } else if ext.ssltls_flags & ssltls_flags::MASK_128 != 0 {
        128
    } else if ext.ssltls_flags & ssltls_flags::MASK_32 != 0 {
        32
    } else {
        64
    }
}

pub(crate) fn set_ssltls_params(
    params: &SaParams,
    ext: &SslTlsParams,
    state: &mut SaState,
    buf: &mut SaBuffer<'_>,
    offsets: &mut SaOffsets,
    config: &BuilderConfig,
) -> BuilderResult<()> {
    let mut iv_offset: Option<usize> = None;
    let mut fixed_seq_offset = false;
    let is_dtls = ext.version.is_dtls();

    if params.crypto_algo == CryptoAlgo::Arc4
        && (ext.version == TlsVersion::Tls1_3 || is_dtls)
    {
        return Err(invalid("ARC4 not allowed with DTLS or TLS 1.3"));
    }
    if ext.version == TlsVersion::Tls1_3
        && (params.crypto_mode == CryptoMode::Cbc || params.crypto_algo == CryptoAlgo::Null)
    {
        return Err(invalid("CBC and null crypto not allowed with TLS 1.3"));
    }
    if (params.crypto_algo == CryptoAlgo::ChaCha20
        || params.crypto_mode == CryptoMode::Gcm
        || params.crypto_mode == CryptoMode::Ccm)
        && !matches!(
            ext.version,
            TlsVersion::Tls1_2 | TlsVersion::Tls1_3 | TlsVersion::Dtls1_2
        )
    {
        return Err(invalid(
            "AEAD ciphers require TLS 1.2, TLS 1.3 or DTLS 1.2",
        ));
    }
    if params.crypto_algo == CryptoAlgo::Arc4 && params.crypto_mode != CryptoMode::Stateful {
        return Err(invalid("ARC4 must be stateful in TLS"));
    }

    match params.crypto_algo {
        CryptoAlgo::Null
        | CryptoAlgo::Arc4
        | CryptoAlgo::Des
        | CryptoAlgo::TripleDes
        | CryptoAlgo::Aes
        | CryptoAlgo::ChaCha20
        | CryptoAlgo::Sm4
        | CryptoAlgo::Bc0 => {}
        _ => return Err(invalid("crypto algorithm not usable with TLS")),
    }
    if params.crypto_algo != CryptoAlgo::Null
        && !matches!(
            params.crypto_mode,
            CryptoMode::Stateful
                | CryptoMode::Cbc
                | CryptoMode::Gcm
                | CryptoMode::Ccm
                | CryptoMode::ChaChaCtr32
        )
    {
        return Err(invalid("crypto mode not usable with TLS"));
    }
    match params.auth_algo {
        AuthAlgo::HmacMd5
        | AuthAlgo::SslMacMd5
        | AuthAlgo::HmacSha1
        | AuthAlgo::SslMacSha1
        | AuthAlgo::HmacSha2_256
        | AuthAlgo::HmacSha2_384
        | AuthAlgo::HmacSha2_512
        | AuthAlgo::HmacSm3
        | AuthAlgo::AesGcm
        | AuthAlgo::AesCcm
        | AuthAlgo::Poly1305 => {}
        _ => return Err(invalid("auth algorithm not usable with TLS")),
    }

    // TLS 1.3 records carry the 1.2 version on the wire.
    let wire_version = if ext.version == TlsVersion::Tls1_3 {
        TlsVersion::Tls1_2.wire_value()
    } else {
        ext.version.wire_value()
    };
    buf.write(state.cursor, u32::from(wire_version) << 16);
    state.cursor += 1;

    if params.direction == Direction::Inbound && is_dtls {
        let mask_bits = mask_bit_count(ext);
        if mask_bits > config.sequence_max_bits.min(384) || mask_bits & 0x1f != 0 {
            return Err(invalid("illegal sequence mask size"));
        }
        if config.fixed_seq_offset
            || mask_bits > 128
            || ext.ssltls_flags & ssltls_flags::FIXED_SEQ_OFFSET != 0
        {
            fixed_seq_offset = true;
        }
        if mask_bits == 32 {
            // Not available with a 32-bit mask.
            fixed_seq_offset = false;
        }
    }

    if fixed_seq_offset {
        // The nonce slot stays just after the version word; the
        // sequence number moves to one of the two fixed offsets.
        iv_offset = Some(state.cursor);
        state.cursor = if state.cursor < cw::SEQNUM_LO_FIX_OFFSET {
            cw::SEQNUM_LO_FIX_OFFSET
        } else {
            cw::SEQNUM_HI_FIX_OFFSET
        };
        offsets.seq_num = state.cursor;
        offsets.seq_num_words = 2;
        state.cw1 |= cw::CW1_SEQNUM_STORE;
        state.cw0 |= cw::CW0_SPI | cw::CW0_SEQNUM_48_FIX;
        buf.write(state.cursor, ext.seq_num);
        buf.write(
            state.cursor + 1,
            (ext.seq_num_hi & 0xffff) | (u32::from(ext.epoch) << 16),
        );
        state.cursor += 2;
    } else {
        offsets.seq_num = state.cursor;
        offsets.seq_num_words = 2;
        state.cw1 |= cw::CW1_SEQNUM_STORE;
        buf.write(state.cursor, ext.seq_num);
        state.cursor += 1;
        if !is_dtls {
            state.cw0 |= cw::CW0_SPI | cw::CW0_SEQNUM_64;
            buf.write(state.cursor, ext.seq_num_hi);
        } else {
            state.cw0 |= cw::CW0_SPI | cw::CW0_SEQNUM_48;
            buf.write(
                state.cursor,
                (ext.seq_num_hi & 0xffff) | (u32::from(ext.epoch) << 16),
            );
        }
        state.cursor += 1;
    }

    if params.direction == Direction::Outbound {
        state.cw0 |= if params.crypto_algo == CryptoAlgo::Null {
            cw::CW0_TOP_HASH_OUT
        } else if params.crypto_mode == CryptoMode::Gcm
            || params.crypto_algo == CryptoAlgo::ChaCha20
        {
            cw::CW0_TOP_ENCRYPT_HASH
        } else {
            cw::CW0_TOP_HASH_ENCRYPT
        };

        // Newer engines update the sequence number early, so several
        // pipes can process packets from one SA in parallel.
        state.cw1 |= cw::CW1_EARLY_SEQNUM_UPDATE;
        state.cw1 |= (offsets.seq_num as u32) << 24;

        if params.crypto_mode == CryptoMode::Ccm {
            if ext.version == TlsVersion::Tls1_3 {
                state.cw1 = (state.cw1 & !cw::CW1_IV_MODE_MASK)
                    | cw::CW1_IV_ORIG_SEQ
                    | cw::CW1_NONCE_XOR;
                state.cw1 |=
                    cw::CW1_IV0 | cw::CW1_IV1 | cw::CW1_IV2 | cw::CW1_IV3 | cw::CW1_CCM_IV_SHIFT;
                let nonce = params.nonce_bytes(12)?;
                buf.copy_key_mat(state.cursor, &nonce[..12]);
                buf.write(state.cursor + 3, cw::CCM_FLAG_L3 << 24);
                state.cursor += 4;
            } else {
                state.cw1 = (state.cw1 & !cw::CW1_IV_MODE_MASK) | cw::CW1_IV_ORIG_SEQ;
                state.cw1 |= cw::CW1_IV0 | cw::CW1_IV3 | cw::CW1_CCM_IV_SHIFT;
                let nonce = params.nonce_bytes(4)?;
                buf.copy_key_mat(state.cursor, &nonce[..4]);
                buf.write(state.cursor + 1, cw::CCM_FLAG_L3 << 24);
                state.cursor += 2;
            }
        } else if ext.version == TlsVersion::Tls1_3 || params.crypto_algo == CryptoAlgo::ChaCha20
        {
            state.cw1 =
                (state.cw1 & !cw::CW1_IV_MODE_MASK) | cw::CW1_IV_ORIG_SEQ | cw::CW1_NONCE_XOR;
            state.cw1 |= cw::CW1_IV0 | cw::CW1_IV1 | cw::CW1_IV2;
            // The implicit salt always lives in the SA.
            let nonce = params.nonce_bytes(12)?;
            buf.copy_key_mat(state.cursor, &nonce[..12]);
            state.cursor += 3;
        } else if params.crypto_mode == CryptoMode::Gcm {
            if state.iv_src == IvSrc::Default {
                state.iv_src = IvSrc::Seq;
            }
            match state.iv_src {
                IvSrc::Seq => state.cw1 |= cw::CW1_IV_ORIG_SEQ,
                IvSrc::XorSeq => {
                    state.cw1 |= cw::CW1_IV_CTR | cw::CW1_NONCE_XOR;
                    state.cw1 |= cw::CW1_IV0 | cw::CW1_IV1 | cw::CW1_IV2;
                }
                IvSrc::Sa => {
                    state.cw1 |= cw::CW1_IV_CTR | cw::CW1_IV1 | cw::CW1_IV2;
                    let iv = params.iv_bytes(8)?;
                    offsets.iv = state.cursor;
                    offsets.iv_words = 2;
                    buf.copy_key_mat(state.cursor, &iv[..8]);
                    state.cursor += 2;
                }
                _ => state.cw1 |= cw::CW1_IV_CTR,
            }
            state.cw1 |= cw::CW1_IV0;
            // The implicit salt always lives in the SA.
            let nonce = params.nonce_bytes(4)?;
            buf.copy_key_mat(state.cursor, &nonce[..4]);
            state.cursor += 1;
            if state.iv_src == IvSrc::XorSeq {
                // Fixed 8-byte value to XOR with the sequence number.
                let iv = params.iv_bytes(8)?;
                buf.copy_key_mat(state.cursor, &iv[..8]);
                state.cursor += 2;
            }
        } else if state.iv_words > 0 {
            // CBC with a real cipher.
            if matches!(ext.version, TlsVersion::Ssl3_0 | TlsVersion::Tls1_0) {
                // These versions chain the IV across records.
                state.iv_src = IvSrc::Sa;
                state.cw1 |= cw::CW1_CRYPTO_STORE;
            } else if state.iv_src == IvSrc::Default {
                state.iv_src = IvSrc::Prng;
            }
            state.cw1 |= cw::CW1_IV_FULL;
            if state.iv_src == IvSrc::Sa {
                state.cw1 |= cw::CW1_IV0 | cw::CW1_IV1;
                if state.iv_words == 4 {
                    state.cw1 |= cw::CW1_IV2 | cw::CW1_IV3;
                }
                let iv = params.iv_bytes(state.iv_words * 4)?;
                offsets.iv = state.cursor;
                offsets.iv_words = state.iv_words;
                buf.copy_key_mat(state.cursor, &iv[..state.iv_words * 4]);
                state.cursor += state.iv_words;
            }
        }
    } else {
        state.cw0 |= if params.crypto_algo == CryptoAlgo::Null {
            cw::CW0_TOP_HASH_IN
        } else if params.crypto_mode == CryptoMode::Gcm
            || params.crypto_algo == CryptoAlgo::ChaCha20
        {
            cw::CW0_TOP_HASH_DECRYPT
        } else {
            cw::CW0_TOP_DECRYPT_HASH
        };

        if params.crypto_mode != CryptoMode::Gcm
            && params.crypto_mode != CryptoMode::Ccm
            && params.crypto_algo != CryptoAlgo::ChaCha20
            && state.iv_words > 0
        {
            state.cw1 |= cw::CW1_PREPKT_OP;
            state.cw1 |= if ext.version == TlsVersion::Ssl3_0 {
                cw::CW1_PAD_SSL
            } else {
                cw::CW1_PAD_TLS
            };
        }
        if ext.version == TlsVersion::Tls1_3 {
            state.cw1 |= cw::CW1_PAD_TLS | cw::CW1_AEAD;
        }

        // DTLS is the only member with a replay mask.
        if is_dtls {
            let input_mask_words = (mask_bit_count(ext) / 32) as usize;
            offsets.seq_mask = state.cursor;
            let alloc_mask_words = if input_mask_words == 1 {
                state.cw0 |= cw::CW0_MASK_32;
                1
            } else if input_mask_words == 2 {
                state.cw0 |= if fixed_seq_offset {
                    cw::CW0_MASK_64_FIX
                } else {
                    cw::CW0_MASK_64
                };
                2
            } else if input_mask_words <= 4 {
                state.cw0 |= if fixed_seq_offset {
                    cw::CW0_MASK_128_FIX
                } else {
                    cw::CW0_MASK_128
                };
                4
            } else if input_mask_words <= 8 {
                state.cw0 |= cw::CW0_MASK_256_FIX;
                8
            } else {
                state.cw0 |= cw::CW0_MASK_384_FIX;
                12
            };
            for (i, word) in ext.seq_mask[..input_mask_words.min(ext.seq_mask.len())]
                .iter()
                .enumerate()
            {
                buf.write(offsets.seq_mask + i, *word);
            }
            // Words past the supplied mask read as all-invalid.
            for i in input_mask_words..alloc_mask_words {
                buf.write(offsets.seq_mask + i, 0xffffffff);
            }
            state.cursor += alloc_mask_words;
            offsets.seq_mask_words = input_mask_words;
        }

        let mut nonce_offset = iv_offset.unwrap_or(state.cursor);
        if state.iv_words > 0
            && matches!(ext.version, TlsVersion::Ssl3_0 | TlsVersion::Tls1_0)
        {
            // These versions chain the IV across records.
            state.iv_src = IvSrc::Sa;
            state.cw1 |= cw::CW1_IV_FULL;
            state.cw1 |= cw::CW1_IV0 | cw::CW1_IV1 | cw::CW1_CRYPTO_STORE;
            if state.iv_words == 4 {
                state.cw1 |= cw::CW1_IV2 | cw::CW1_IV3;
            }
            let iv = params.iv_bytes(state.iv_words * 4)?;
            offsets.iv = nonce_offset;
            offsets.iv_words = state.iv_words;
            buf.copy_key_mat(nonce_offset, &iv[..state.iv_words * 4]);
            nonce_offset += state.iv_words;
        }

        if params.crypto_mode == CryptoMode::Ccm {
            if ext.version == TlsVersion::Tls1_3 {
                state.cw1 = (state.cw1 & !cw::CW1_IV_MODE_MASK)
                    | cw::CW1_IV_ORIG_SEQ
                    | cw::CW1_NONCE_XOR;
                state.cw1 |=
                    cw::CW1_IV0 | cw::CW1_IV1 | cw::CW1_IV2 | cw::CW1_IV3 | cw::CW1_CCM_IV_SHIFT;
                let nonce = params.nonce_bytes(12)?;
                buf.copy_key_mat(state.cursor, &nonce[..12]);
                buf.write(state.cursor + 3, cw::CCM_FLAG_L3 << 24);
                state.cursor += 4;
            } else {
                state.cw1 &= !cw::CW1_IV_MODE_MASK;
                state.cw1 |= cw::CW1_IV0 | cw::CW1_IV3 | cw::CW1_CCM_IV_SHIFT;
                let nonce = params.nonce_bytes(4)?;
                buf.copy_key_mat(state.cursor, &nonce[..4]);
                buf.write(state.cursor + 1, cw::CCM_FLAG_L3 << 24);
                state.cursor += 2;
            }
        } else if ext.version == TlsVersion::Tls1_3 || params.crypto_algo == CryptoAlgo::ChaCha20
        {
            if ext.version == TlsVersion::Dtls1_2 {
                // DTLS extracts the sequence number from the packet;
                // run in delayed one-time-key mode.
                state.cw1 |= cw::CW1_IV_CTR | cw::CW1_NONCE_XOR;
            } else {
                // TLS increments the sequence number internally, so
                // the OTK calculation can start early.
                state.cw1 = (state.cw1 & !cw::CW1_IV_MODE_MASK)
                    | cw::CW1_IV_ORIG_SEQ
                    | cw::CW1_NONCE_XOR;
            }
            state.cw1 |= cw::CW1_IV0 | cw::CW1_IV1 | cw::CW1_IV2;
            // The implicit salt always lives in the SA.
            let nonce = params.nonce_bytes(12)?;
            buf.copy_key_mat(nonce_offset, &nonce[..12]);
            nonce_offset += 3;
        } else if params.crypto_mode == CryptoMode::Gcm {
            state.cw1 |= cw::CW1_IV_CTR | cw::CW1_IV0;
            // The implicit salt always lives in the SA.
            let nonce = params.nonce_bytes(4)?;
            buf.copy_key_mat(nonce_offset, &nonce[..4]);
            nonce_offset += 1;
        }
        if nonce_offset > state.cursor {
            state.cursor = nonce_offset;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sa::params::ProtocolParams;

    fn tls_params(version: TlsVersion, direction: Direction) -> (SaParams, SslTlsParams) {
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
        words: &mut [u32],
    ) -> BuilderResult<(SaState, SaOffsets)> {
        let mut state = SaState::new();
        state.cursor = 10;
        if params.crypto_mode == CryptoMode::Cbc {
            state.iv_words = 4;
        }
        let mut offsets = SaOffsets::default();
        let mut buf = SaBuffer::real(words);
        set_ssltls_params(
            params,
            ext,
            &mut state,
            &mut buf,
            &mut offsets,
            &BuilderConfig::default(),
        )?;
        Ok((state, offsets))
    }

    #[test]
    fn test_tls12_outbound_gcm() {
        let (mut params, mut ext) = tls_params(TlsVersion::Tls1_2, Direction::Outbound);
        params.set_aes_gcm(&[0u8; 16], &[1, 2, 3, 4]);
        ext.seq_num = 9;
        ext.seq_num_hi = 1;
        let mut words = [0u32; 64];
        let (state, offsets) = run(&params, &ext, &mut words).unwrap();
        assert_eq!(words[10], 0x0303 << 16);
        assert_eq!(offsets.seq_num, 11);
        assert_eq!(offsets.seq_num_words, 2);
        assert_eq!(words[11], 9);
        assert_eq!(words[12], 1);
        assert_eq!(state.cw0 & 0xf, cw::CW0_TOP_ENCRYPT_HASH);
        assert_eq!(state.cw0 & 0x30000000, cw::CW0_SEQNUM_64);
        // nonce word after the sequence number
        assert_eq!(words[13], 0x04030201);
        assert_eq!(state.cw1 & cw::CW1_IV_MODE_MASK, cw::CW1_IV_ORIG_SEQ);
        assert_eq!(state.iv_src, IvSrc::Seq);
    }

    #[test]
    fn test_tls13_writes_tls12_version_word() {
        let (mut params, ext) = tls_params(TlsVersion::Tls1_3, Direction::Outbound);
        params.set_aes_gcm(&[0u8; 32], &[0u8; 12]);
        let mut words = [0u32; 64];
        let (state, _) = run(&params, &ext, &mut words).unwrap();
        assert_eq!(words[10], 0x0303 << 16);
        // TLS 1.3 stores a 3-word salt XORed with the sequence number
        assert_ne!(state.cw1 & cw::CW1_NONCE_XOR, 0);
        assert_eq!(
            state.cw1 & (cw::CW1_IV0 | cw::CW1_IV1 | cw::CW1_IV2),
            cw::CW1_IV0 | cw::CW1_IV1 | cw::CW1_IV2
        );
    }

    #[test]
    fn test_dtls12_inbound_packs_epoch() {
        let (mut params, mut ext) = tls_params(TlsVersion::Dtls1_2, Direction::Inbound);
        params.set_aes_gcm(&[0u8; 16], &[1, 2, 3, 4]);
        ext.epoch = 7;
        ext.seq_num = 100;
        let mut words = [0u32; 64];
        let (state, offsets) = run(&params, &ext, &mut words).unwrap();
        assert_eq!(words[10], 0xfefd << 16);
        assert_eq!(words[11], 100);
        assert_eq!(words[12], 7 << 16);
        assert_eq!(state.cw0 & 0x30000000, cw::CW0_SEQNUM_48);
        // default 64-bit replay mask
        assert_eq!(offsets.seq_mask, 13);
        assert_eq!(offsets.seq_mask_words, 2);
        assert_eq!(state.cw0 & 0xc0000000, cw::CW0_MASK_64);
        assert_eq!(state.cw0 & 0xf, cw::CW0_TOP_HASH_DECRYPT);
    }

    #[test]
    fn test_version_cipher_legality() {
        let (mut params, ext) = tls_params(TlsVersion::Dtls1_2, Direction::Outbound);
        params.crypto_algo = CryptoAlgo::Arc4;
        params.crypto_mode = CryptoMode::Stateful;
        params.auth_algo = AuthAlgo::HmacSha1;
        let mut state = SaState::new();
        assert!(set_ssltls_params(
            &params,
            &ext,
            &mut state,
            &mut SaBuffer::dry(),
            &mut SaOffsets::default(),
            &BuilderConfig::default(),
        )
        .is_err());

        let (mut params, ext) = tls_params(TlsVersion::Tls1_3, Direction::Outbound);
        params.set_aes_cbc(&[0u8; 16]);
        params.auth_algo = AuthAlgo::HmacSha2_256;
        let mut state = SaState::new();
        assert!(set_ssltls_params(
            &params,
            &ext,
            &mut state,
            &mut SaBuffer::dry(),
            &mut SaOffsets::default(),
            &BuilderConfig::default(),
        )
        .is_err());

        let (mut params, ext) = tls_params(TlsVersion::Tls1_0, Direction::Outbound);
        params.crypto_algo = CryptoAlgo::Aes;
        params.crypto_mode = CryptoMode::Gcm;
        params.auth_algo = AuthAlgo::AesGcm;
        let mut state = SaState::new();
        assert!(set_ssltls_params(
            &params,
            &ext,
            &mut state,
            &mut SaBuffer::dry(),
            &mut SaOffsets::default(),
            &BuilderConfig::default(),
        )
        .is_err());
    }

    #[test]
    fn test_ssl30_inbound_cbc_chains_iv() {
        let (mut params, ext) = tls_params(TlsVersion::Ssl3_0, Direction::Inbound);
        params.set_aes_cbc(&[0u8; 16]);
        params.auth_algo = AuthAlgo::SslMacSha1;
        params.iv = Some(vec![0x42; 16]);
        let mut words = [0u32; 64];
        let (state, offsets) = run(&params, &ext, &mut words).unwrap();
        assert_ne!(state.cw1 & cw::CW1_PREPKT_OP, 0);
        assert_eq!(state.cw1 & 0x1c000, cw::CW1_PAD_SSL);
        assert_ne!(state.cw1 & cw::CW1_CRYPTO_STORE, 0);
        assert_eq!(state.iv_src, IvSrc::Sa);
        // IV right after the two sequence number words, no mask
        assert_eq!(offsets.iv, 13);
        assert_eq!(offsets.iv_words, 4);
        assert_eq!(words[13], 0x42424242);
        assert_eq!(state.cursor, 17);
    }
}
