//! Basic (raw crypto/hash) protocol pass

use crate::error::{invalid, BuilderResult};

use super::builder::BuilderConfig;
use super::cw;
use super::params::{
    basic_flags, flags, AuthAlgo, BasicParams, CryptoAlgo, CryptoMode, Direction, IvSrc,
    SaOffsets, SaParams,
};
use super::state::{SaBuffer, SaState};

pub(crate) fn set_basic_params(
    params: &SaParams,
    ext: &BasicParams,
    state: &mut SaState,
    buf: &mut SaBuffer<'_>,
    offsets: &mut SaOffsets,
    _config: &BuilderConfig,
) -> BuilderResult<()> {
    if ext.direction_bit > 1 || ext.bearer > 32 {
        return Err(invalid("illegal value for bearer or direction"));
    }

    if matches!(
        params.auth_algo,
        AuthAlgo::HashMd5
            | AuthAlgo::HashSha1
            | AuthAlgo::HashSha2_224
            | AuthAlgo::HashSha2_256
            | AuthAlgo::HashSha2_384
            | AuthAlgo::HashSha2_512
            | AuthAlgo::HashSm3
    ) && params.flags & (flags::HASH_LOAD | flags::HASH_SAVE | flags::HASH_INTERMEDIATE) != 0
    {
        // Plain hash with stored state: the record carries the block
        // count alongside the digest.
        state.cw1 |= cw::CW1_HASH_STORE | cw::CW1_DIGEST_CNT;
        buf.write(state.cursor, u32::from(ext.digest_block_count));
        state.cursor += 1;
    } else if params.auth_algo != AuthAlgo::Null && params.flags & flags::HASH_SAVE != 0 {
        state.cw1 |= cw::CW1_HASH_STORE;
    }

    if matches!(
        params.auth_algo,
        AuthAlgo::KasumiF9 | AuthAlgo::SnowUia2 | AuthAlgo::ZucEia3
    ) && ext.direction_bit != 0
    {
        state.cw1 |= cw::CW1_WIRELESS_DIR;
    }

    if params.crypto_algo != CryptoAlgo::Null {
        if params.direction == Direction::Outbound {
            state.cw0 |= if params.auth_algo == AuthAlgo::Null {
                cw::CW0_TOP_ENCRYPT
            } else if matches!(params.auth_algo, AuthAlgo::AesCcm | AuthAlgo::AesGmac) {
                cw::CW0_TOP_HASH_ENCRYPT
            } else if ext.basic_flags & basic_flags::ENCRYPT_AFTER_HASH != 0 {
                cw::CW0_TOP_HASH_ENCRYPT
            } else {
                cw::CW0_TOP_ENCRYPT_HASH
            };
        } else if params.auth_algo == AuthAlgo::Null {
            state.cw0 |= cw::CW0_TOP_DECRYPT;
        } else if params.auth_algo == AuthAlgo::AesCcm {
            state.cw0 |= cw::CW0_TOP_DECRYPT_HASH;
        } else if ext.basic_flags & basic_flags::ENCRYPT_AFTER_HASH != 0 {
            state.cw0 |= cw::CW0_TOP_DECRYPT_HASH;
            state.cw1 |= cw::CW1_PREPKT_OP;
            state.cw1 |= cw::CW1_PAD_TLS;
        } else {
            state.cw0 |= cw::CW0_TOP_HASH_DECRYPT;
        }

        if matches!(params.crypto_mode, CryptoMode::Cfb1 | CryptoMode::Cfb8) {
            return Err(invalid("crypto mode not supported"));
        }
        if ext.basic_flags & basic_flags::ENCRYPT_AFTER_HASH != 0
            && params.crypto_mode != CryptoMode::Cbc
        {
            return Err(invalid("encrypt-after-hash requires CBC"));
        }

        if matches!(params.crypto_mode, CryptoMode::Xts | CryptoMode::XtsStateful) {
            // XTS Key2 arrives through the nonce field, sized like the
            // primary key.
            let key_len = params.key_bytes()?.len();
            let key2 = params.nonce_bytes(key_len)?;
            buf.copy_key_mat(state.cursor, &key2[..key_len]);
            state.cursor += state.cipher_key_words;
        }

        if matches!(
            params.crypto_mode,
            CryptoMode::F8 | CryptoMode::Uea2 | CryptoMode::Eea3
        ) {
            // Wireless modes take their IV from the token.
            state.iv_src = IvSrc::Token;
        } else if params.crypto_algo != CryptoAlgo::Arc4
            && params.crypto_mode != CryptoMode::Ecb
            && !(params.crypto_algo == CryptoAlgo::Kasumi
                && params.crypto_mode == CryptoMode::Basic)
        {
            // ARC4, ECB block ciphers and basic Kasumi carry no IV.
            if state.iv_src == IvSrc::Default {
                state.iv_src = IvSrc::Input;
            }

            if matches!(
                params.crypto_mode,
                CryptoMode::Ctr | CryptoMode::Ccm | CryptoMode::Gmac | CryptoMode::Gcm
            ) {
                if state.iv_src == IvSrc::Token {
                    // All four IV words load from the token, including
                    // the block counter.
                    state.cw1 &= !cw::CW1_MODE_MASK;
                    state.cw1 |= cw::CW1_MODE_CTR_LOAD;
                } else {
                    state.cw1 |= cw::CW1_IV0;
                    if params.crypto_mode == CryptoMode::Ccm {
                        let nonce = params.nonce_bytes(3)?;
                        buf.write(
                            state.cursor,
                            (u32::from(nonce[0]) << 8)
                                | (u32::from(nonce[1]) << 16)
                                | (u32::from(nonce[2]) << 24)
                                | cw::CCM_FLAG_L4,
                        );
                    } else {
                        let nonce = params.nonce_bytes(4)?;
                        buf.copy_key_mat(state.cursor, &nonce[..4]);
                    }
                    state.cursor += 1;
                }

                if state.iv_src == IvSrc::Sa {
                    state.cw1 |= cw::CW1_IV_CTR | cw::CW1_IV1 | cw::CW1_IV2;
                    let iv = params.iv_bytes(8)?;
                    offsets.iv = state.cursor;
                    offsets.iv_words = 2;
                    buf.copy_key_mat(state.cursor, &iv[..8]);
                    state.cursor += 2;
                } else {
                    state.cw1 |= cw::CW1_IV_CTR;
                }

                if state.iv_src != IvSrc::Token && params.crypto_mode == CryptoMode::Ccm {
                    // Zero counter field in IV3.
                    state.cw1 |= cw::CW1_IV3;
                    buf.write(state.cursor, 0);
                    state.cursor += 1;
                }
            } else {
                if params.crypto_mode == CryptoMode::Icm {
                    // ICM also loads the full IV through the token.
                    state.cw1 &= !cw::CW1_MODE_MASK;
                    state.cw1 |= cw::CW1_MODE_CTR_LOAD;
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
                    if matches!(
                        params.crypto_algo,
                        CryptoAlgo::Des
                            | CryptoAlgo::TripleDes
                            | CryptoAlgo::Aes
                            | CryptoAlgo::Sm4
                            | CryptoAlgo::Bc0
                    ) {
                        state.cw1 |= cw::CW1_CRYPTO_STORE;
                    }
                }
            }
        }
    } else {
        // Bypass or authenticate-only; verification runs inbound.
        state.cw0 |= if params.auth_algo == AuthAlgo::Null {
            cw::CW0_TOP_NULL_OUT
        } else if ext.basic_flags & basic_flags::EXTRACT_ICV != 0 {
            cw::CW0_TOP_HASH_IN
        } else {
            cw::CW0_TOP_HASH_OUT
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sa::params::ProtocolParams;

    fn basic_ext(params: &SaParams) -> BasicParams {
        match &params.protocol {
            ProtocolParams::Basic(ext) => ext.clone(),
            _ => unreachable!(),
        }
    }

    fn run(params: &SaParams, ext: &BasicParams, words: &mut [u32]) -> (SaState, SaOffsets) {
        let mut state = SaState::new();
        state.cursor = 6;
        state.iv_words = match params.crypto_mode {
            CryptoMode::Cbc | CryptoMode::Icm => 4,
            _ => 0,
        };
        let mut offsets = SaOffsets::default();
        let mut buf = SaBuffer::real(words);
        set_basic_params(
            params,
            ext,
            &mut state,
            &mut buf,
            &mut offsets,
            &BuilderConfig::default(),
        )
        .unwrap();
        (state, offsets)
    }

    #[test]
    fn test_hash_only_defaults_to_outbound_topology() {
        let mut params = SaParams::init_basic(Direction::Outbound);
        params.auth_algo = AuthAlgo::HashSha2_256;
        let ext = basic_ext(&params);
        let mut words = [0u32; 16];
        let (state, _) = run(&params, &ext, &mut words);
        assert_eq!(state.cw0 & 0xf, cw::CW0_TOP_HASH_OUT);
    }

    #[test]
    fn test_intermediate_hash_stores_block_count() {
        let mut params = SaParams::init_basic(Direction::Outbound);
        params.auth_algo = AuthAlgo::HashSha1;
        params.flags |= flags::HASH_LOAD | flags::HASH_INTERMEDIATE;
        let mut ext = basic_ext(&params);
        ext.digest_block_count = 3;
        let mut words = [0u32; 16];
        let (state, _) = run(&params, &ext, &mut words);
        assert_ne!(state.cw1 & cw::CW1_HASH_STORE, 0);
        assert_ne!(state.cw1 & cw::CW1_DIGEST_CNT, 0);
        assert_eq!(words[6], 3);
        assert_eq!(state.cursor, 7);
    }

    #[test]
    fn test_inbound_encrypt_after_hash() {
        let mut params = SaParams::init_basic(Direction::Inbound);
        params.set_aes_cbc(&[0u8; 16]);
        params.auth_algo = AuthAlgo::HmacSha1;
        let mut ext = basic_ext(&params);
        ext.basic_flags |= basic_flags::ENCRYPT_AFTER_HASH;
        let mut words = [0u32; 16];
        let (state, _) = run(&params, &ext, &mut words);
        assert_eq!(state.cw0 & 0xf, cw::CW0_TOP_DECRYPT_HASH);
        assert_ne!(state.cw1 & cw::CW1_PREPKT_OP, 0);
        assert_eq!(state.cw1 & 0x1c000, cw::CW1_PAD_TLS);
        assert_eq!(state.iv_src, IvSrc::Input);
    }

    #[test]
    fn test_ctr_nonce_from_sa() {
        let mut params = SaParams::init_basic(Direction::Outbound);
        params.set_aes_ctr(&[0u8; 16], &[9, 8, 7, 6]);
        params.iv_src = IvSrc::Sa;
        params.iv = Some(vec![0x10; 8]);
        let ext = basic_ext(&params);
        let mut state = SaState::new();
        state.cursor = 6;
        state.iv_src = params.iv_src;
        let mut offsets = SaOffsets::default();
        let mut words = [0u32; 16];
        let mut buf = SaBuffer::real(&mut words);
        set_basic_params(
            &params,
            &ext,
            &mut state,
            &mut buf,
            &mut offsets,
            &BuilderConfig::default(),
        )
        .unwrap();
        assert_eq!(words[6], 0x06070809);
        assert_eq!(offsets.iv, 7);
        assert_eq!(offsets.iv_words, 2);
        assert_eq!(words[7], 0x10101010);
        assert_eq!(state.cursor, 9);
        assert_ne!(state.cw1 & cw::CW1_IV_CTR, 0);
    }

    #[test]
    fn test_wireless_mac_direction_bit() {
        let mut params = SaParams::init_basic(Direction::Outbound);
        params.auth_algo = AuthAlgo::SnowUia2;
        let mut ext = basic_ext(&params);
        ext.direction_bit = 1;
        let mut words = [0u32; 16];
        let (state, _) = run(&params, &ext, &mut words);
        assert_ne!(state.cw1 & cw::CW1_WIRELESS_DIR, 0);
    }

    #[test]
    fn test_rejects_cfb1() {
        let mut params = SaParams::init_basic(Direction::Outbound);
        params.crypto_algo = CryptoAlgo::Aes;
        params.crypto_mode = CryptoMode::Cfb1;
        params.key = Some(zeroize::Zeroizing::new(vec![0u8; 16]));
        let ext = basic_ext(&params);
        let mut state = SaState::new();
        assert!(set_basic_params(
            &params,
            &ext,
            &mut state,
            &mut SaBuffer::dry(),
            &mut SaOffsets::default(),
            &BuilderConfig::default(),
        )
        .is_err());
    }
}
