//! SRTP/SRTCP protocol pass
//!
//! SRTP keeps almost everything per-packet: the session salt lives in
//! the SA as four IV words and the packet index is folded in by the
//! token. Only an optional master key identifier is emitted besides
//! the salt.

use crate::error::{invalid, BuilderResult};

use super::builder::BuilderConfig;
use super::cw;
use super::params::{
    srtp_flags, AuthAlgo, CryptoAlgo, CryptoMode, Direction, SaOffsets, SaParams, SrtpParams,
};
use super::state::{SaBuffer, SaState};

/// Salt length carried in SRTP key material (RFC 3711).
pub(crate) const SRTP_SALT_BYTE_COUNT: usize = 14;

pub(crate) fn set_srtp_params(
    params: &SaParams,
    ext: &SrtpParams,
    state: &mut SaState,
    buf: &mut SaBuffer<'_>,
    offsets: &mut SaOffsets,
    _config: &BuilderConfig,
) -> BuilderResult<()> {
    match (params.crypto_algo, params.crypto_mode) {
        (CryptoAlgo::Null, _) | (CryptoAlgo::Aes, CryptoMode::Icm) => {}
        _ => return Err(invalid("SRTP requires AES-ICM or null crypto")),
    }
    if !matches!(params.auth_algo, AuthAlgo::Null | AuthAlgo::HmacSha1) {
        return Err(invalid("SRTP requires HMAC-SHA1 or null auth"));
    }

    if params.direction == Direction::Outbound {
        state.cw0 |= match (params.crypto_algo, params.auth_algo) {
            (CryptoAlgo::Null, AuthAlgo::Null) => cw::CW0_TOP_NULL_OUT,
            (CryptoAlgo::Null, _) => cw::CW0_TOP_HASH_OUT,
            (_, AuthAlgo::Null) => cw::CW0_TOP_ENCRYPT,
            _ => cw::CW0_TOP_ENCRYPT_HASH,
        };
    } else {
        state.cw0 |= match (params.crypto_algo, params.auth_algo) {
            (CryptoAlgo::Null, AuthAlgo::Null) => cw::CW0_TOP_NULL_IN,
            (CryptoAlgo::Null, _) => cw::CW0_TOP_HASH_IN,
            (_, AuthAlgo::Null) => cw::CW0_TOP_DECRYPT,
            _ => cw::CW0_TOP_HASH_DECRYPT,
        };
        state.cw1 |= cw::CW1_PAD_RTP;
    }

    if params.crypto_algo != CryptoAlgo::Null {
        // The 14-byte session salt occupies all four IV words; the
        // token XORs the SSRC and packet index into it per packet.
        state.cw1 |= cw::CW1_IV0 | cw::CW1_IV1 | cw::CW1_IV2 | cw::CW1_IV3;
        let salt = params.nonce_bytes(SRTP_SALT_BYTE_COUNT)?;
        offsets.iv = state.cursor;
        offsets.iv_words = 4;
        buf.copy_key_mat(state.cursor, &salt[..SRTP_SALT_BYTE_COUNT]);
        state.cursor += 4;
    }

    if ext.srtp_flags & srtp_flags::INCLUDE_MKI != 0 {
        buf.write(state.cursor, ext.mki);
        state.cursor += 1;
    }

    Ok(())
}
