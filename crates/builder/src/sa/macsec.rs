//! MACsec protocol pass
//!
//! MACsec records carry the packet number, the inbound replay window
//! and the SCI, which doubles as the GCM IV together with the packet
//! number.

use crate::error::{invalid, BuilderResult};

use super::builder::BuilderConfig;
use super::cw;
use super::params::{
    macsec_flags, AuthAlgo, CryptoMode, Direction, MacSecParams, SaOffsets, SaParams,
};
use super::state::{SaBuffer, SaState};

pub(crate) fn set_macsec_params(
    params: &SaParams,
    ext: &MacSecParams,
    state: &mut SaState,
    buf: &mut SaBuffer<'_>,
    offsets: &mut SaOffsets,
    _config: &BuilderConfig,
) -> BuilderResult<()> {
    if !matches!(params.auth_algo, AuthAlgo::AesGcm | AuthAlgo::AesGmac) {
        return Err(invalid("MACsec requires AES-GCM or AES-GMAC"));
    }
    if ext.macsec_flags & macsec_flags::ES != 0 && ext.macsec_flags & macsec_flags::SC != 0 {
        return Err(invalid("MACsec ES and SC flags are mutually exclusive"));
    }

    // Packet number.
    state.cw0 |= cw::CW0_SEQNUM_32;
    offsets.seq_num = state.cursor;
    offsets.seq_num_words = 1;
    state.cw1 |= cw::CW1_SEQNUM_STORE;
    buf.write(state.cursor, ext.seq_num);
    state.cursor += 1;

    if params.direction == Direction::Outbound {
        state.cw0 |= if params.crypto_mode == CryptoMode::Gcm {
            cw::CW0_TOP_ENCRYPT_HASH
        } else {
            cw::CW0_TOP_HASH_ENCRYPT
        };
        // Newer engines update the sequence number early, so several
        // pipes can process packets from one SA in parallel.
        state.cw1 |= cw::CW1_EARLY_SEQNUM_UPDATE;
        state.cw1 |= (offsets.seq_num as u32) << 24;
    } else {
        state.cw0 |= cw::CW0_TOP_HASH_DECRYPT;

        // The mask slot holds the replay window size, not a bitmask.
        offsets.seq_mask = state.cursor;
        buf.write(state.cursor, ext.replay_window);
        buf.write(state.cursor + 1, 0); // dummy mask word
        offsets.seq_mask_words = 1;
        state.cursor += 2;
        state.cw0 |= cw::CW0_MASK_32;
        state.cw1 |= cw::CW1_MACSEC_SEQCHECK | cw::CW1_NO_MASK_UPDATE;
    }

    // SCI in IV0/IV1.
    state.cw1 |= cw::CW1_IV_CTR | cw::CW1_IV0 | cw::CW1_IV1 | cw::CW1_IV2;
    offsets.iv = state.cursor;
    offsets.iv_words = 2;
    buf.copy_key_mat(state.cursor, &ext.sci);
    state.cursor += 2;

    // Packet number once more, as IV2.
    buf.write(state.cursor, ext.seq_num);
    state.cursor += 1;

    Ok(())
}
