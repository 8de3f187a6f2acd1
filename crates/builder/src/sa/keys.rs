//! Cipher and authentication key installation
//!
//! Maps the algorithm selection onto control-word bits and key/IV word
//! counts, then copies the key material into the record. Digest areas
//! for HMAC are precomputed values supplied by the caller; when both
//! are absent the space is reserved zero-filled and completed later
//! through the token-context precompute path.

use super::cw;
use super::params::{AuthAlgo, CryptoAlgo, CryptoMode, SaOffsets, SaParams};
use super::state::{SaBuffer, SaState};
use crate::error::{invalid, BuilderResult};
use crate::logging;

fn is_wireless(algo: CryptoAlgo) -> bool {
    matches!(algo, CryptoAlgo::Kasumi | CryptoAlgo::Snow | CryptoAlgo::Zuc)
}

fn is_block_cipher(algo: CryptoAlgo) -> bool {
    matches!(
        algo,
        CryptoAlgo::Des | CryptoAlgo::TripleDes | CryptoAlgo::Aes | CryptoAlgo::Sm4 | CryptoAlgo::Bc0
    )
}

/// Install the cipher key: control-word bits, key/IV word counts, key
/// copy and mode legality checks.
pub(crate) fn set_cipher_keys(
    params: &SaParams,
    state: &mut SaState,
    buf: &mut SaBuffer<'_>,
) -> BuilderResult<()> {
    if params.crypto_algo == CryptoAlgo::Null {
        state.cw0 |= cw::CW0_CRYPTO_NULL;
        return Ok(());
    }
    let key = params.key_bytes()?;

    match params.crypto_algo {
        CryptoAlgo::Null => unreachable!(),
        CryptoAlgo::Des => {
            state.cipher_key_words = 2;
            state.iv_words = 2;
            state.cw0 |= cw::CW0_CRYPTO_DES;
        }
        CryptoAlgo::TripleDes => {
            state.cipher_key_words = 6;
            state.iv_words = 2;
            state.cw0 |= cw::CW0_CRYPTO_3DES;
        }
        CryptoAlgo::Aes => {
            match key.len() {
                16 => {
                    state.cipher_key_words = 4;
                    state.cw0 |= cw::CW0_CRYPTO_AES_128;
                }
                24 => {
                    state.cipher_key_words = 6;
                    state.cw0 |= cw::CW0_CRYPTO_AES_192;
                }
                32 => {
                    state.cipher_key_words = 8;
                    state.cw0 |= cw::CW0_CRYPTO_AES_256;
                }
                _ => {
                    logging::log_rejected("set_cipher_keys", "bad AES key length");
                    return Err(invalid("AES key must be 16, 24 or 32 bytes"));
                }
            }
            state.iv_words = 4;
        }
        CryptoAlgo::Arc4 => {
            state.cw0 |= cw::CW0_CRYPTO_ARC4;
            if key.len() < 5 || key.len() > 16 {
                logging::log_rejected("set_cipher_keys", "bad ARC4 key length");
                return Err(invalid("ARC4 key must be 5..=16 bytes"));
            }
            state.cw1 |= key.len() as u32;
            state.cipher_key_words = key.len().div_ceil(4);
            if params.crypto_mode != CryptoMode::Stateless {
                state.arc4_state = true;
                state.cw1 |=
                    cw::CW1_ARC4_IJ_PTR | cw::CW1_ARC4_STATE_SEL | cw::CW1_CRYPTO_STORE;
            }
        }
        CryptoAlgo::Kasumi => {
            state.cipher_key_words = 4;
            state.iv_words = 0;
            state.cw0 |= cw::CW0_CRYPTO_KASUMI;
        }
        CryptoAlgo::Snow => {
            state.cipher_key_words = 4;
            state.iv_words = 4;
            state.cw0 |= cw::CW0_CRYPTO_SNOW;
        }
        CryptoAlgo::Zuc => {
            state.cipher_key_words = 4;
            state.iv_words = 4;
            state.cw0 |= cw::CW0_CRYPTO_ZUC;
        }
        CryptoAlgo::ChaCha20 => {
            state.cw0 |= cw::CW0_CRYPTO_CHACHA20;
            match key.len() {
                16 => {
                    state.cw1 |= cw::CW1_CHACHA128;
                    state.cipher_key_words = 4;
                }
                32 => {
                    state.cw1 |= cw::CW1_CHACHA256;
                    state.cipher_key_words = 8;
                }
                _ => {
                    logging::log_rejected("set_cipher_keys", "bad ChaCha20 key length");
                    return Err(invalid("ChaCha20 key must be 16 or 32 bytes"));
                }
            }
        }
        CryptoAlgo::Sm4 => {
            state.cipher_key_words = 4;
            state.iv_words = 4;
            state.cw0 |= cw::CW0_CRYPTO_SM4;
        }
        CryptoAlgo::Bc0 => {
            state.cipher_key_words = 8;
            state.iv_words = 4;
            state.cw0 |= cw::CW0_CRYPTO_BC0 + (u32::from(params.crypto_parameter & 0x3) << 17);
            state.cw1 |= cw::CW1_EXT_CIPHER_SET;
        }
    }

    if params.crypto_algo != CryptoAlgo::Arc4 && state.cipher_key_words * 4 != key.len() {
        logging::log_rejected("set_cipher_keys", "key length mismatch");
        return Err(invalid("cipher key length does not match the algorithm"));
    }

    // A 128-bit ChaCha20 key fills the 256-bit key slot twice.
    if params.crypto_algo == CryptoAlgo::ChaCha20 && key.len() == 16 {
        buf.copy_key_mat(state.cursor, key);
        state.cursor += state.cipher_key_words;
    }
    buf.copy_key_mat(state.cursor, key);
    logging::log_key_placed("cipher", state.cursor, key);
    if params.crypto_algo == CryptoAlgo::Arc4 {
        state.cursor += 4;
    } else {
        state.cursor += state.cipher_key_words;
    }

    if is_wireless(params.crypto_algo) && params.auth_algo != AuthAlgo::Null {
        return Err(invalid("wireless ciphers cannot be combined with authentication"));
    }

    if is_block_cipher(params.crypto_algo) {
        match params.crypto_mode {
            CryptoMode::Ecb => {
                state.cw1 |= cw::CW1_MODE_ECB;
                state.iv_words = 0;
            }
            CryptoMode::Cbc => state.cw1 |= cw::CW1_MODE_CBC,
            CryptoMode::Cfb => state.cw1 |= cw::CW1_MODE_CFB,
            CryptoMode::Ofb => state.cw1 |= cw::CW1_MODE_OFB,
            CryptoMode::Ctr => state.cw1 |= cw::CW1_MODE_CTR,
            CryptoMode::Icm => state.cw1 |= cw::CW1_MODE_ICM,
            CryptoMode::Ccm => {
                state.cw1 |= cw::CW1_MODE_CTR_LOAD;
                if params.auth_algo != AuthAlgo::AesCcm {
                    return Err(invalid("CCM mode requires the CCM authentication algorithm"));
                }
            }
            CryptoMode::Gcm => {
                state.cw1 |= cw::CW1_MODE_CTR;
                if params.auth_algo != AuthAlgo::AesGcm {
                    return Err(invalid("GCM mode requires the GCM authentication algorithm"));
                }
            }
            CryptoMode::Gmac => {
                state.cw1 |= cw::CW1_MODE_CTR;
                if params.auth_algo != AuthAlgo::AesGmac {
                    return Err(invalid("GMAC mode requires the GMAC authentication algorithm"));
                }
            }
            CryptoMode::Xts => {
                state.cw1 |= cw::CW1_MODE_XTS;
                if params.auth_algo != AuthAlgo::Null {
                    return Err(invalid("XTS cannot be combined with authentication"));
                }
            }
            CryptoMode::XtsStateful => {
                state.cw1 |= cw::CW1_MODE_XTS | cw::CW1_XTS_STATEFUL;
                if params.auth_algo != AuthAlgo::Null {
                    return Err(invalid("XTS cannot be combined with authentication"));
                }
            }
            _ => {
                return Err(invalid("cipher mode not valid for a block cipher"));
            }
        }
    } else if is_wireless(params.crypto_algo) {
        match params.crypto_mode {
            CryptoMode::F8 | CryptoMode::Uea2 | CryptoMode::Eea3 => {
                state.cw1 |= cw::CW1_MODE_F8_UEA;
            }
            CryptoMode::Basic | CryptoMode::Ecb => {}
            _ => {
                return Err(invalid("cipher mode not valid for a wireless cipher"));
            }
        }
    } else if params.crypto_algo == CryptoAlgo::ChaCha20 {
        state.iv_words = 4;
        match params.auth_algo {
            AuthAlgo::Poly1305 | AuthAlgo::KeyedPoly1305 => {
                state.cw1 |= cw::CW1_CHACHA_CTR32 | cw::CW1_AEAD;
            }
            AuthAlgo::Null => match params.crypto_mode {
                CryptoMode::ChaChaCtr64 => state.cw1 |= cw::CW1_CHACHA_CTR64,
                CryptoMode::ChaChaCtr32 => state.cw1 |= cw::CW1_CHACHA_CTR32,
                _ => {
                    return Err(invalid("cipher mode not valid for ChaCha20"));
                }
            },
            _ => {
                return Err(invalid("ChaCha20 only pairs with Poly1305 authentication"));
            }
        }
    }

    match params.crypto_mode {
        CryptoMode::Ccm
        | CryptoMode::Gcm
        | CryptoMode::Gmac
        | CryptoMode::Xts
        | CryptoMode::XtsStateful => {
            if params.crypto_algo != CryptoAlgo::Aes {
                return Err(invalid("AEAD and XTS modes require AES"));
            }
        }
        CryptoMode::Ctr | CryptoMode::Icm => {
            if !matches!(
                params.crypto_algo,
                CryptoAlgo::Aes | CryptoAlgo::Sm4 | CryptoAlgo::Bc0
            ) {
                return Err(invalid("counter modes require AES, SM4 or BC0"));
            }
        }
        _ => {}
    }

    Ok(())
}

/// Map the authentication algorithm to control-word bits and
/// inner/outer digest word counts.
fn set_auth_size_and_mode(
    params: &SaParams,
    state: &mut SaState,
) -> BuilderResult<(usize, usize)> {
    let load_digest = params.flags
        & (super::params::flags::HASH_LOAD
            | super::params::flags::HASH_SAVE
            | super::params::flags::HASH_INTERMEDIATE)
        != 0;
    let save_digest = params.flags & super::params::flags::HASH_SAVE != 0;

    let (mut a1, mut a2) = (0usize, 0usize);
    match params.auth_algo {
        AuthAlgo::Null => state.cw0 |= cw::CW0_AUTH_NULL,
        AuthAlgo::HashMd5 => {
            state.cw0 |= cw::CW0_AUTH_HASH_MD5;
            if load_digest {
                state.cw0 |= cw::CW0_HASH_LOAD_DIGEST;
                a1 = 4;
            }
        }
        AuthAlgo::HashSha1 => {
            state.cw0 |= cw::CW0_AUTH_HASH_SHA1;
            if load_digest {
                state.cw0 |= cw::CW0_HASH_LOAD_DIGEST;
                a1 = 5;
            }
        }
        AuthAlgo::HashSha2_224 => {
            state.cw0 |= cw::CW0_AUTH_HASH_SHA2_224;
            if load_digest {
                state.cw0 |= cw::CW0_HASH_LOAD_DIGEST;
                a1 = 8;
            }
        }
        AuthAlgo::HashSha2_256 => {
            state.cw0 |= cw::CW0_AUTH_HASH_SHA2_256;
            if load_digest {
                state.cw0 |= cw::CW0_HASH_LOAD_DIGEST;
                a1 = 8;
            }
        }
        AuthAlgo::HashSha2_384 => {
            state.cw0 |= cw::CW0_AUTH_HASH_SHA2_384;
            if load_digest {
                state.cw0 |= cw::CW0_HASH_LOAD_DIGEST;
                a1 = 16;
            }
        }
        AuthAlgo::HashSha2_512 => {
            state.cw0 |= cw::CW0_AUTH_HASH_SHA2_512;
            if load_digest {
                state.cw0 |= cw::CW0_HASH_LOAD_DIGEST;
                a1 = 16;
            }
        }
        AuthAlgo::HashSm3 => {
            state.cw0 |= cw::CW0_AUTH_HASH_SM3;
            if load_digest {
                state.cw0 |= cw::CW0_HASH_LOAD_DIGEST;
                a1 = 8;
            }
        }
        // Plain SHA3: the engine keeps the whole Keccak state when a
        // saved digest is requested.
        AuthAlgo::HashSha3_224 => {
            state.cw0 |= cw::CW0_AUTH_HASH_SHA3_224;
            if save_digest {
                a1 = 36;
            }
        }
        AuthAlgo::HashSha3_256 => {
            state.cw0 |= cw::CW0_AUTH_HASH_SHA3_256;
            if save_digest {
                a1 = 34;
            }
        }
        AuthAlgo::HashSha3_384 => {
            state.cw0 |= cw::CW0_AUTH_HASH_SHA3_384;
            if save_digest {
                a1 = 26;
            }
        }
        AuthAlgo::HashSha3_512 => {
            state.cw0 |= cw::CW0_AUTH_HASH_SHA3_512;
            if save_digest {
                a1 = 18;
            }
        }
        AuthAlgo::KeyedHashSha3_224 => {
            state.cw0 |= cw::CW0_AUTH_KEYED_HASH_SHA3_224 | cw::CW0_HASH_LOAD_DIGEST;
            a1 = 36;
        }
        AuthAlgo::KeyedHashSha3_256 => {
            state.cw0 |= cw::CW0_AUTH_KEYED_HASH_SHA3_256 | cw::CW0_HASH_LOAD_DIGEST;
            a1 = 34;
        }
        AuthAlgo::KeyedHashSha3_384 => {
            state.cw0 |= cw::CW0_AUTH_KEYED_HASH_SHA3_384 | cw::CW0_HASH_LOAD_DIGEST;
            a1 = 26;
        }
        AuthAlgo::KeyedHashSha3_512 => {
            state.cw0 |= cw::CW0_AUTH_KEYED_HASH_SHA3_512 | cw::CW0_HASH_LOAD_DIGEST;
            a1 = 18;
        }
        AuthAlgo::SslMacMd5 | AuthAlgo::HmacMd5 => {
            state.cw0 |= cw::CW0_AUTH_HMAC_MD5;
            a1 = 4;
            a2 = 4;
        }
        AuthAlgo::SslMacSha1 => {
            state.cw0 |= cw::CW0_AUTH_SSLMAC_SHA1;
            a1 = 5;
        }
        AuthAlgo::HmacSha1 => {
            state.cw0 |= cw::CW0_AUTH_HMAC_SHA1;
            a1 = 5;
            a2 = 5;
        }
        AuthAlgo::HmacSha2_224 => {
            state.cw0 |= cw::CW0_AUTH_HMAC_SHA2_224;
            a1 = 8;
            a2 = 8;
        }
        AuthAlgo::HmacSha2_256 => {
            state.cw0 |= cw::CW0_AUTH_HMAC_SHA2_256;
            a1 = 8;
            a2 = 8;
        }
        AuthAlgo::HmacSha2_384 => {
            state.cw0 |= cw::CW0_AUTH_HMAC_SHA2_384;
            a1 = 16;
            a2 = 16;
        }
        AuthAlgo::HmacSha2_512 => {
            state.cw0 |= cw::CW0_AUTH_HMAC_SHA2_512;
            a1 = 16;
            a2 = 16;
        }
        AuthAlgo::HmacSm3 => {
            state.cw0 |= cw::CW0_AUTH_HMAC_SM3;
            a1 = 8;
            a2 = 8;
        }
        AuthAlgo::HmacSha3_224 => {
            state.cw0 |= cw::CW0_AUTH_HMAC_SHA3_224;
            a1 = 36;
        }
        AuthAlgo::HmacSha3_256 => {
            state.cw0 |= cw::CW0_AUTH_HMAC_SHA3_256;
            a1 = 34;
        }
        AuthAlgo::HmacSha3_384 => {
            state.cw0 |= cw::CW0_AUTH_HMAC_SHA3_384;
            a1 = 26;
        }
        AuthAlgo::HmacSha3_512 => {
            state.cw0 |= cw::CW0_AUTH_HMAC_SHA3_512;
            a1 = 18;
        }
        AuthAlgo::XcbcMac | AuthAlgo::Cmac128 => {
            state.cw0 |= cw::CW0_AUTH_CMAC_128;
            a1 = 4;
            a2 = 4;
        }
        AuthAlgo::Cmac192 => {
            state.cw0 |= cw::CW0_AUTH_CMAC_192;
            a1 = 6;
            a2 = 4;
        }
        AuthAlgo::Cmac256 => {
            state.cw0 |= cw::CW0_AUTH_CMAC_256;
            a1 = 8;
            a2 = 4;
        }
        AuthAlgo::AesCcm => {
            if params.crypto_mode != CryptoMode::Ccm {
                return Err(invalid("CCM authentication requires CCM cipher mode"));
            }
            let key = params.key_bytes()?;
            match key.len() {
                16 => {
                    a1 = 4;
                    state.cw0 |= cw::CW0_AUTH_CMAC_128;
                }
                24 => {
                    a1 = 6;
                    state.cw0 |= cw::CW0_AUTH_CMAC_192;
                }
                32 => {
                    a1 = 8;
                    state.cw0 |= cw::CW0_AUTH_CMAC_256;
                }
                _ => return Err(invalid("AES key must be 16, 24 or 32 bytes")),
            }
            a2 = 4;
            state.cw1 |= cw::CW1_ENCRYPT_HASHRES;
        }
        AuthAlgo::AesGcm => {
            if params.crypto_mode != CryptoMode::Gcm {
                return Err(invalid("GCM authentication requires GCM cipher mode"));
            }
            state.cw0 |= cw::CW0_AUTH_GHASH;
            a1 = 4;
            state.cw1 |= cw::CW1_ENCRYPT_HASHRES;
        }
        AuthAlgo::AesGmac => {
            if params.crypto_mode != CryptoMode::Gmac {
                return Err(invalid("GMAC authentication requires GMAC cipher mode"));
            }
            state.cw0 |= cw::CW0_AUTH_GHASH;
            a1 = 4;
            state.cw1 |= cw::CW1_ENCRYPT_HASHRES;
        }
        AuthAlgo::KasumiF9 => {
            if params.crypto_algo != CryptoAlgo::Null {
                return Err(invalid("wireless MACs require NULL crypto"));
            }
            state.cw0 |= cw::CW0_AUTH_KASUMI_F9;
            a1 = 4;
        }
        AuthAlgo::SnowUia2 => {
            if params.crypto_algo != CryptoAlgo::Null {
                return Err(invalid("wireless MACs require NULL crypto"));
            }
            state.cw0 |= cw::CW0_AUTH_SNOW_UIA2;
            a1 = 4;
        }
        AuthAlgo::ZucEia3 => {
            if params.crypto_algo != CryptoAlgo::Null {
                return Err(invalid("wireless MACs require NULL crypto"));
            }
            state.cw0 |= cw::CW0_AUTH_ZUC_EIA3;
            a1 = 4;
        }
        AuthAlgo::KeyedPoly1305 => {
            if params.crypto_algo != CryptoAlgo::Null {
                return Err(invalid("keyed Poly1305 requires NULL crypto"));
            }
            if load_digest {
                state.cw0 |= cw::CW0_HASH_LOAD_DIGEST;
                a1 = 4;
                a2 = 8;
            } else {
                a1 = 8;
            }
            state.cw0 |= cw::CW0_AUTH_KEYED_HASH_POLY1305;
        }
        AuthAlgo::Poly1305 => {
            if params.crypto_algo != CryptoAlgo::ChaCha20 {
                return Err(invalid("Poly1305 requires the ChaCha20 cipher"));
            }
            state.cw0 |= cw::CW0_AUTH_POLY1305;
            state.cw1 |= cw::CW1_IV_CTR | cw::CW1_CHACHA_POLY_OTK | cw::CW1_ENCRYPT_HASHRES;
        }
    }
    Ok((a1, a2))
}

fn is_sha3(algo: AuthAlgo) -> bool {
    matches!(
        algo,
        AuthAlgo::HashSha3_224
            | AuthAlgo::HashSha3_256
            | AuthAlgo::HashSha3_384
            | AuthAlgo::HashSha3_512
            | AuthAlgo::KeyedHashSha3_224
            | AuthAlgo::KeyedHashSha3_256
            | AuthAlgo::KeyedHashSha3_384
            | AuthAlgo::KeyedHashSha3_512
            | AuthAlgo::HmacSha3_224
            | AuthAlgo::HmacSha3_256
            | AuthAlgo::HmacSha3_384
            | AuthAlgo::HmacSha3_512
    )
}

fn is_keyed_sha3(algo: AuthAlgo) -> bool {
    matches!(
        algo,
        AuthAlgo::KeyedHashSha3_224
            | AuthAlgo::KeyedHashSha3_256
            | AuthAlgo::KeyedHashSha3_384
            | AuthAlgo::KeyedHashSha3_512
    )
}

fn copy_digest(
    buf: &mut SaBuffer<'_>,
    offset: usize,
    material: Option<&[u8]>,
    word_count: usize,
    kind: &str,
) -> BuilderResult<()> {
    match material {
        Some(bytes) => {
            if bytes.len() != word_count * 4 {
                return Err(invalid("digest length does not match the algorithm"));
            }
            buf.copy_key_mat(offset, bytes);
            logging::log_key_placed(kind, offset, bytes);
        }
        None => buf.zero_fill(offset, word_count * 4),
    }
    Ok(())
}

/// Install the authentication keys or digest areas and record their
/// offsets.
pub(crate) fn set_auth_keys(
    params: &SaParams,
    state: &mut SaState,
    buf: &mut SaBuffer<'_>,
    offsets: &mut SaOffsets,
) -> BuilderResult<()> {
    let (a1, a2) = set_auth_size_and_mode(params, state)?;
    let key1 = params.auth_key1.as_deref().map(|k| k.as_slice());
    let key2 = params.auth_key2.as_deref().map(|k| k.as_slice());
    let key3 = params.auth_key3.as_deref().map(|k| k.as_slice());

    if params.auth_algo == AuthAlgo::AesCcm {
        // CBC-MAC pre-block plus the swapped cipher key.
        let key = params.key_bytes()?;
        offsets.digest0 = state.cursor;
        buf.zero_fill(state.cursor, 32);
        state.cursor += 8;
        buf.copy_key_mat_swap(state.cursor, key);
        state.cursor += state.cipher_key_words;
        if state.cipher_key_words == 6 {
            buf.zero_fill(state.cursor, 8);
            state.cursor += 2;
        }
        return Ok(());
    }

    if matches!(
        params.auth_algo,
        AuthAlgo::XcbcMac | AuthAlgo::Cmac128 | AuthAlgo::Cmac192 | AuthAlgo::Cmac256
    ) {
        let (Some(k1), Some(k2), Some(k3)) = (key1, key2, key3) else {
            return Err(invalid("XCBC/CMAC requires all three subkeys"));
        };
        if k1.len() != a1 * 4 || k2.len() != 16 || k3.len() != 16 {
            return Err(invalid("XCBC/CMAC subkey length mismatch"));
        }
        offsets.digest0 = state.cursor;
        buf.copy_key_mat_swap(state.cursor, k2);
        buf.copy_key_mat_swap(state.cursor + 4, k3);
        buf.copy_key_mat_swap(state.cursor + 8, k1);
        state.cursor += 8 + a1;
        if a1 == 6 {
            buf.zero_fill(state.cursor, 8);
            state.cursor += 2;
        }
        return Ok(());
    }

    if is_sha3(params.auth_algo) {
        if a1 > 0 {
            let key_len = key1.map_or(0, |k| k.len());
            if key_len > a1 * 4 {
                return Err(invalid("SHA3 key longer than the engine state"));
            }
            offsets.digest0 = state.cursor;
            buf.zero_fill(state.cursor, a1 * 4);
            if let Some(k1) = key1 {
                buf.copy_key_mat(state.cursor, k1);
                logging::log_key_placed("auth", state.cursor, k1);
            }
            state.cursor += a1;
            if is_keyed_sha3(params.auth_algo) && key_len < a1 * 4 {
                // Short keys pass their byte count in the top byte of
                // the last state word.
                state.cw1 |= cw::CW1_DIGEST_CNT;
                buf.merge(state.cursor - 1, (key_len as u32) << 24);
            }
        }
        return Ok(());
    }

    if a1 > 0 && a2 > 0 && key1.is_none() && key2.is_none() {
        // Deferred HMAC precompute: reserve both digest areas; the
        // token-context precompute path fills them on first use.
        offsets.digest0 = state.cursor;
        offsets.digest1 = state.cursor + a1;
        buf.zero_fill(state.cursor, (a1 + a2) * 4);
        state.cursor += a1 + a2;
        return Ok(());
    }

    if a1 > 0 {
        offsets.digest0 = state.cursor;
        copy_digest(buf, state.cursor, key1, a1, "auth inner")?;
        state.cursor += a1;
        if params.auth_algo == AuthAlgo::SslMacSha1 {
            buf.zero_fill(state.cursor, a1 * 4);
            state.cursor += a1;
        }
    }
    if a2 > 0 {
        offsets.digest1 = state.cursor;
        copy_digest(buf, state.cursor, key2, a2, "auth outer")?;
        state.cursor += a2;
    }
    Ok(())
}
