//! IPsec ESP protocol pass
//!
//! Lays out the SPI, sequence number, anti-replay mask and nonce/IV
//! words and selects the pipeline topology for ESP transforms.

use crate::error::{invalid, unsupported, BuilderResult};

use super::builder::BuilderConfig;
use super::cw;
use super::params::{
    ipsec_flags, AuthAlgo, CryptoAlgo, CryptoMode, Direction, IpsecParams, IvSrc, SaOffsets,
    SaParams,
};
use super::state::{SaBuffer, SaState};

/// Anti-replay mask width in bits, applying the flag defaults when the
/// extension leaves the explicit count at zero.
pub(crate) fn mask_bit_count(ext: &IpsecParams) -> u32 {
    if ext.sequence_mask_bit_count != 0 {
        ext.sequence_mask_bit_count
    } else if ext.ipsec_flags & ipsec_flags::MASK_384 != 0 {
        384
    } else if ext.ipsec_flags & ipsec_flags::MASK_256 != 0 {
        256
    } else if ext.ipsec_flags & ipsec_flags::MASK_128 != 0 {
        128
    } else if ext.ipsec_flags & ipsec_flags::MASK_32 != 0 {
        32
    } else {
        64
    }
}

/// CCM salt word: three nonce bytes in the upper lanes plus the L=4
/// counter flag byte.
fn ccm_salt_word(nonce: &[u8]) -> u32 {
    (u32::from(nonce[0]) << 8)
        | (u32::from(nonce[1]) << 16)
        | (u32::from(nonce[2]) << 24)
        | cw::CCM_FLAG_L4
}

pub(crate) fn set_ipsec_params(
    params: &SaParams,
    ext: &IpsecParams,
    state: &mut SaState,
    buf: &mut SaBuffer<'_>,
    offsets: &mut SaOffsets,
    config: &BuilderConfig,
) -> BuilderResult<()> {
    let mut iv_offset: Option<usize> = None;
    let mut fixed_seq_offset = false;

    if ext.ipsec_flags & ipsec_flags::AH != 0 {
        return Err(unsupported("AH transforms are not supported"));
    }

    match params.crypto_algo {
        CryptoAlgo::Null
        | CryptoAlgo::Des
        | CryptoAlgo::TripleDes
        | CryptoAlgo::Aes
        | CryptoAlgo::ChaCha20
        | CryptoAlgo::Sm4
        | CryptoAlgo::Bc0 => {}
        _ => return Err(invalid("crypto algorithm not usable with ESP")),
    }
    if params.crypto_algo != CryptoAlgo::Null
        && !matches!(
            params.crypto_mode,
            CryptoMode::Cbc
                | CryptoMode::Ctr
                | CryptoMode::Gcm
                | CryptoMode::Gmac
                | CryptoMode::Ccm
                | CryptoMode::ChaChaCtr32
        )
    {
        return Err(invalid("crypto mode not usable with ESP"));
    }
    match params.auth_algo {
        AuthAlgo::Null
        | AuthAlgo::HmacMd5
        | AuthAlgo::HmacSha1
        | AuthAlgo::HmacSha2_256
        | AuthAlgo::HmacSha2_384
        | AuthAlgo::HmacSha2_512
        | AuthAlgo::HmacSm3
        | AuthAlgo::XcbcMac
        | AuthAlgo::Cmac128
        | AuthAlgo::AesGcm
        | AuthAlgo::AesGmac
        | AuthAlgo::AesCcm
        | AuthAlgo::Poly1305 => {}
        _ => return Err(invalid("auth algorithm not usable with ESP")),
    }

    buf.write(state.cursor, ext.spi);
    state.cursor += 1;

    let mask_bits = mask_bit_count(ext);
    if params.direction == Direction::Inbound {
        if mask_bits > config.sequence_max_bits || mask_bits & 0x1f != 0 {
            return Err(invalid("illegal sequence mask size"));
        }
        if config.fixed_seq_offset
            || mask_bits > 128
            || ext.ipsec_flags & ipsec_flags::FIXED_SEQ_OFFSET != 0
        {
            fixed_seq_offset = true;
        }
        if mask_bits == 32 {
            // Not available with a 32-bit mask.
            fixed_seq_offset = false;
        }
    }

    if fixed_seq_offset {
        // The nonce slot stays just after the SPI; the sequence number
        // moves to one of the two fixed offsets.
        iv_offset = Some(state.cursor);
        state.cursor = if state.cursor < cw::SEQNUM_LO_FIX_OFFSET {
            cw::SEQNUM_LO_FIX_OFFSET
        } else {
            cw::SEQNUM_HI_FIX_OFFSET
        };
        offsets.seq_num = state.cursor;
        buf.write(state.cursor, ext.seq_num);
        if ext.ipsec_flags & ipsec_flags::LONG_SEQ != 0 {
            buf.write(state.cursor + 1, ext.seq_num_hi);
            state.cw0 |= cw::CW0_SPI | cw::CW0_SEQNUM_64_FIX;
            offsets.seq_num_words = 2;
        } else {
            state.cw0 |= cw::CW0_SPI | cw::CW0_SEQNUM_32_FIX;
            offsets.seq_num_words = 1;
        }
        // Two words are always reserved at the fixed offset.
        state.cursor += 2;
    } else {
        offsets.seq_num = state.cursor;
        buf.write(state.cursor, ext.seq_num);
        state.cursor += 1;
        if ext.ipsec_flags & ipsec_flags::LONG_SEQ != 0 {
            buf.write(state.cursor, ext.seq_num_hi);
            state.cw0 |= cw::CW0_SPI | cw::CW0_SEQNUM_64;
            state.cursor += 1;
            offsets.seq_num_words = 2;
        } else {
            state.cw0 |= cw::CW0_SPI | cw::CW0_SEQNUM_32;
            offsets.seq_num_words = 1;
        }
    }

    if params.direction == Direction::Outbound {
        state.cw0 |= match (params.crypto_algo, params.auth_algo) {
            (CryptoAlgo::Null, AuthAlgo::Null) => cw::CW0_TOP_NULL_OUT,
            (CryptoAlgo::Null, _) => cw::CW0_TOP_HASH_OUT,
            (_, AuthAlgo::Null) => cw::CW0_TOP_ENCRYPT,
            (_, AuthAlgo::AesCcm | AuthAlgo::AesGmac) => cw::CW0_TOP_HASH_ENCRYPT,
            _ => cw::CW0_TOP_ENCRYPT_HASH,
        };

        // Newer engines update the sequence number early so several
        // pipes can process packets from one SA in parallel.
        state.cw1 |= cw::CW1_EARLY_SEQNUM_UPDATE;
        state.cw1 |= (offsets.seq_num as u32) << 24;
        state.cw1 |= cw::CW1_SEQNUM_STORE;

        if ext.ipsec_flags & ipsec_flags::NO_ANTI_REPLAY != 0
            && ext.ipsec_flags & ipsec_flags::LONG_SEQ == 0
        {
            // Suppress rollover detection by storing a 64-bit sequence
            // number; the high word never enters authentication.
            buf.write(state.cursor, 0);
            state.cw0 |= cw::CW0_SEQNUM_64;
            state.cursor += 1;
        }

        if matches!(
            params.crypto_mode,
            CryptoMode::Ctr
                | CryptoMode::Gcm
                | CryptoMode::Gmac
                | CryptoMode::Ccm
                | CryptoMode::ChaChaCtr32
        ) {
            if state.iv_src == IvSrc::Default {
                state.iv_src = IvSrc::Seq;
            }

            // The nonce word is always present.
            state.cw1 |= cw::CW1_IV0;
            if params.crypto_mode == CryptoMode::Ccm {
                let nonce = params.nonce_bytes(3)?;
                buf.write(state.cursor, ccm_salt_word(nonce));
            } else {
                let nonce = params.nonce_bytes(4)?;
                buf.copy_key_mat(state.cursor, &nonce[..4]);
            }
            state.cursor += 1;

            match state.iv_src {
                IvSrc::Seq => state.cw1 |= cw::CW1_IV_ORIG_SEQ,
                IvSrc::Implicit => state.cw1 |= cw::CW1_IV_INCR_SEQ,
                IvSrc::XorSeq => {
                    state.cw1 |= cw::CW1_IV_CTR | cw::CW1_NONCE_XOR;
                    state.cw1 |= cw::CW1_IV0 | cw::CW1_IV1 | cw::CW1_IV2;
                    let iv = params.iv_bytes(8)?;
                    buf.copy_key_mat(state.cursor, &iv[..8]);
                    state.cursor += 2;
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

            if params.crypto_mode == CryptoMode::Ccm {
                // Zero counter field in IV3.
                state.cw1 |= cw::CW1_IV3;
                buf.write(state.cursor, 0);
                state.cursor += 1;
            }
        } else if state.iv_words > 0 {
            // CBC with a real cipher.
            if state.iv_src == IvSrc::Default {
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
        let input_mask_words = (mask_bits / 32) as usize;

        state.cw0 |= match (params.crypto_algo, params.auth_algo) {
            (CryptoAlgo::Null, AuthAlgo::Null) => cw::CW0_TOP_NULL_IN,
            (CryptoAlgo::Null, _) => cw::CW0_TOP_HASH_IN,
            (_, AuthAlgo::Null) => cw::CW0_TOP_DECRYPT,
            (_, AuthAlgo::AesCcm) => cw::CW0_TOP_DECRYPT_HASH,
            _ => cw::CW0_TOP_HASH_DECRYPT,
        };
        state.cw1 |= cw::CW1_PAD_IPSEC;

        // A mask is always present, even with anti-replay disabled.
        offsets.seq_mask = state.cursor;

        if ext.ipsec_flags & ipsec_flags::APPEND_SEQNUM != 0 {
            state.cw0 |= cw::CW0_SEQNUM_APPEND;
        }

        // Round up to the nearest mask size the hardware supports.
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
        } else if input_mask_words <= 12 {
            state.cw0 |= cw::CW0_MASK_384_FIX;
            12
        } else {
            state.cw0 |= cw::CW0_MASK_1024_FIX;
            state.large_mask = true;
            state.large = true;
            32
        };

        if input_mask_words <= ext.seq_mask.len() && alloc_mask_words <= ext.seq_mask.len() {
            for (i, word) in ext.seq_mask[..input_mask_words].iter().enumerate() {
                buf.write(offsets.seq_mask + i, *word);
            }
            // Words past the supplied mask read as all-invalid.
            for i in input_mask_words..alloc_mask_words {
                buf.write(offsets.seq_mask + i, 0xffffffff);
            }
        } else {
            // Mask wider than the parameter block: start all-zero with
            // a single valid bit at the initial sequence number.
            for i in 0..alloc_mask_words {
                buf.write(offsets.seq_mask + i, 0);
            }
            let word_idx = ((ext.seq_num & 0x3ff) >> 5) as usize;
            buf.write(offsets.seq_mask + word_idx, 1 << (ext.seq_num & 0x1f));
        }
        state.cursor += alloc_mask_words;
        offsets.seq_mask_words = input_mask_words;

        // Nonce for the counter-derived modes, placed just after the
        // SPI when the fixed layout reserved that slot.
        if matches!(
            params.crypto_mode,
            CryptoMode::Ctr
                | CryptoMode::Gcm
                | CryptoMode::Gmac
                | CryptoMode::Ccm
                | CryptoMode::ChaChaCtr32
        ) {
            let mut nonce_offset = iv_offset.unwrap_or(state.cursor);

            state.cw1 |= cw::CW1_IV0;
            if params.crypto_mode == CryptoMode::ChaChaCtr32 {
                // XOR-IV with delayed one-time key, so the OTK can be
                // derived from the extracted IV.
                state.cw1 |= cw::CW1_NONCE_XOR | cw::CW1_CHACHA_POLY_OTK;
                state.cw1 |= cw::CW1_IV1 | cw::CW1_IV2;
                if state.iv_src == IvSrc::Implicit {
                    state.cw1 |= cw::CW1_IV_CTR;
                }
            } else if state.iv_src == IvSrc::Implicit {
                state.cw1 |= cw::CW1_IV_ORIG_SEQ;
            }

            if params.crypto_mode == CryptoMode::Ccm {
                let nonce = params.nonce_bytes(3)?;
                buf.write(nonce_offset, ccm_salt_word(nonce));
            } else {
                let nonce = params.nonce_bytes(4)?;
                buf.copy_key_mat(nonce_offset, &nonce[..4]);
            }
            nonce_offset += 1;

            if params.crypto_mode == CryptoMode::Ccm {
                // Zero counter field in IV3.
                state.cw1 |= cw::CW1_IV3;
                buf.write(nonce_offset, 0);
                nonce_offset += 1;
            } else if params.crypto_mode == CryptoMode::ChaChaCtr32 {
                // IV1 and IV2 must read as zero.
                buf.zero_fill(nonce_offset, 8);
                nonce_offset += 2;
            }
            if nonce_offset > state.cursor {
                state.cursor = nonce_offset;
            }
        }
    }
    Ok(())
}
