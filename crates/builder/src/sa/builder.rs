//! SA record assembly
//!
//! [`SaBuilder`] drives the shared pipeline twice: once without a
//! buffer to size the record ([`SaBuilder::get_sizes`]) and once with
//! the caller's buffer to fill it ([`SaBuilder::build_sa`]). Both runs
//! execute the same passes, so a record never outgrows its measured
//! size.

use crate::error::{invalid, BuilderError, BuilderResult};
use crate::logging;

use super::basic::set_basic_params;
use super::cw;
use super::extended;
use super::ipsec::set_ipsec_params;
use super::keys::{set_auth_keys, set_cipher_keys};
use super::macsec::set_macsec_params;
use super::params::{flags, ProtocolParams, SaOffsets, SaParams};
use super::srtp::set_srtp_params;
use super::ssltls::set_ssltls_params;
use super::state::{SaBuffer, SaState};

/// Build-time configuration of the record layout.
///
/// The defaults match the record-cache firmware: 64-word records with
/// a 16-word large-transform extension and the extended (inline
/// classification) fields filled in.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Base transform record size in words.
    pub record_word_count: usize,
    /// Extra words appended for large transforms.
    pub large_transform_offset: usize,
    /// Fill in the firmware transform-record fields.
    pub extended: bool,
    /// Largest supported anti-replay mask in bits.
    pub sequence_max_bits: u32,
    /// Always place sequence numbers at the fixed offsets.
    pub fixed_seq_offset: bool,
    /// Reject parameter sets with missing optional material.
    pub strict: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            record_word_count: 64,
            large_transform_offset: 16,
            extended: true,
            sequence_max_bits: 384,
            fixed_seq_offset: false,
            strict: true,
        }
    }
}

/// Buffer sizes required for one SA, in 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaSizes {
    /// Total record size, including any co-located ARC4 state.
    pub sa_word_count: usize,
    /// Size of the ARC4 state area (0 when no state is kept).
    pub arc4_state_word_count: usize,
}

/// Compiles [`SaParams`] into binary SA records.
#[derive(Debug, Clone, Default)]
pub struct SaBuilder {
    config: BuilderConfig,
}

impl SaBuilder {
    /// Builder with the default record layout.
    pub fn new() -> Self {
        SaBuilder::default()
    }

    /// Builder with an explicit record layout.
    pub fn with_config(config: BuilderConfig) -> Self {
        SaBuilder { config }
    }

    /// Change the distance between the small and large record layouts.
    ///
    /// Only meaningful for extended (firmware flow record) layouts, and
    /// the large record may not grow past twice the base size.
    pub fn set_large_transform_offset(&mut self, offset: usize) -> BuilderResult<()> {
        if !self.config.extended {
            return Err(invalid(
                "large transform offset requires extended records",
            ));
        }
        if offset > self.config.record_word_count {
            return Err(invalid("large transform offset out of range"));
        }
        self.config.large_transform_offset = offset;
        Ok(())
    }

    fn run_base_passes(
        &self,
        params: &SaParams,
        state: &mut SaState,
        buf: &mut SaBuffer<'_>,
        offsets: &mut SaOffsets,
    ) -> BuilderResult<()> {
        set_cipher_keys(params, state, buf)?;
        set_auth_keys(params, state, buf, offsets)?;
        match &params.protocol {
            ProtocolParams::Basic(ext) => {
                set_basic_params(params, ext, state, buf, offsets, &self.config)
            }
            ProtocolParams::Ipsec(ext) => {
                set_ipsec_params(params, ext, state, buf, offsets, &self.config)
            }
            ProtocolParams::SslTls(ext) => {
                set_ssltls_params(params, ext, state, buf, offsets, &self.config)
            }
            ProtocolParams::MacSec(ext) => {
                set_macsec_params(params, ext, state, buf, offsets, &self.config)
            }
            ProtocolParams::Srtp(ext) => {
                set_srtp_params(params, ext, state, buf, offsets, &self.config)
            }
        }
    }

    fn run_extended_passes(
        &self,
        params: &SaParams,
        state: &mut SaState,
        buf: &mut SaBuffer<'_>,
        offsets: &mut SaOffsets,
    ) -> BuilderResult<()> {
        match &params.protocol {
            ProtocolParams::Ipsec(ext) => {
                extended::ipsec::set_extended_ipsec_params(
                    params,
                    ext,
                    state,
                    buf,
                    offsets,
                    &self.config,
                )
            }
            ProtocolParams::SslTls(ext) => {
                extended::dtls::set_extended_dtls_params(
                    params,
                    ext,
                    state,
                    buf,
                    offsets,
                    &self.config,
                )
            }
            ProtocolParams::Basic(ext) => {
                extended::basic::set_extended_basic_params(
                    params,
                    ext,
                    state,
                    buf,
                    offsets,
                    &self.config,
                )
            }
            ProtocolParams::MacSec(_) | ProtocolParams::Srtp(_) => Ok(()),
        }
    }

    /// Compute the buffer sizes an SA with these parameters needs.
    ///
    /// Runs the full pipeline without a buffer, so it performs the
    /// same validation as [`SaBuilder::build_sa`].
    pub fn get_sizes(&self, params: &SaParams) -> BuilderResult<SaSizes> {
        let mut state = SaState::new();
        state.iv_src = params.iv_src;
        let mut offsets = SaOffsets::default();
        let mut buf = SaBuffer::dry();

        self.run_base_passes(params, &mut state, &mut buf, &mut offsets)?;

        if state.arc4_state {
            // IJ pointer and state pointer words.
            state.cursor += 2;
        }
        if state.cursor == 2 {
            // At least one non-context word.
            state.cursor += 1;
        }

        if self.config.extended {
            // The firmware fields can force a large record, so run the
            // extended pass before settling the size.
            self.run_extended_passes(params, &mut state, &mut buf, &mut offsets)?;

            if offsets.seq_num <= cw::SEQNUM_LO_FIX_OFFSET && !state.large {
                state.cursor = self.config.record_word_count;
            } else if state.cursor
                <= self.config.record_word_count + self.config.large_transform_offset
            {
                state.cursor =
                    self.config.record_word_count + self.config.large_transform_offset;
            } else {
                return Err(invalid("SA filled beyond the record size"));
            }
        } else {
            if state.cursor > self.config.record_word_count {
                return Err(invalid("SA filled beyond the record size"));
            }
            // Fixed size for engines with record caches.
            state.cursor = self.config.record_word_count;
        }

        let mut arc4_state_word_count = 0;
        if state.arc4_state {
            arc4_state_word_count = 64;
            if params.offset_arc4_state_record > 0 {
                if params.offset_arc4_state_record < state.cursor {
                    return Err(invalid("ARC4 state offset lies inside the record"));
                }
                state.cursor = params.offset_arc4_state_record + 64;
            } else {
                state.cursor += 64;
            }
        }

        logging::log_sa_sizes(params.protocol.name(), state.cursor, arc4_state_word_count);
        Ok(SaSizes {
            sa_word_count: state.cursor,
            arc4_state_word_count,
        })
    }

    /// Build the SA record into `record` and write the field offsets
    /// back into `params.offsets`.
    pub fn build_sa(&self, params: &mut SaParams, record: &mut [u32]) -> BuilderResult<()> {
        let sizes = self.get_sizes(params)?;
        if record.len() < sizes.sa_word_count {
            return Err(BuilderError::BufferTooShort {
                required: sizes.sa_word_count,
                available: record.len(),
            });
        }

        let mut state = SaState::new();
        state.iv_src = params.iv_src;
        let mut offsets = SaOffsets::default();
        let mut buf = SaBuffer::real(record);

        self.run_base_passes(params, &mut state, &mut buf, &mut offsets)?;

        if self.config.extended && offsets.seq_num > cw::SEQNUM_LO_FIX_OFFSET {
            state.large = true;
        }

        if state.arc4_state {
            let arc4_offset = if params.offset_arc4_state_record > 0 {
                params.offset_arc4_state_record
            } else if state.large {
                self.config.record_word_count + self.config.large_transform_offset
            } else {
                self.config.record_word_count
            };
            buf.write(state.cursor, (arc4_offset * 4) as u32);
            buf.write(state.cursor + 1, 0);

            if params.flags & flags::ARC4_STATE_LOAD != 0 {
                // Nonce carries the i and j variables, the IV the
                // 256-byte state array.
                if let Some(nonce) = params.nonce.as_deref() {
                    if nonce.len() >= 2 {
                        buf.write(
                            state.cursor + 1,
                            ((nonce[0] as u32 + 1) & 0xff) | ((nonce[1] as u32) << 8),
                        );
                    }
                }
                if let Some(iv) = params.iv.as_deref() {
                    if iv.len() < 256 {
                        return Err(invalid("ARC4 state array must be 256 bytes"));
                    }
                    buf.copy_key_mat(arc4_offset, &iv[..256]);
                }
            }

            offsets.ij_ptr = state.cursor + 1;
            offsets.arc4_state = state.cursor;
            state.cursor += 2;
        }

        if state.cursor == 2 {
            // At least one non-context word.
            buf.write(state.cursor, 0);
            state.cursor += 1;
        }

        if !state.large_mask {
            state.cw0 |= ((state.cursor - 2) as u32) << 8;
        } else {
            state.cw0 |= if state.cursor == 66 { 0x0200 } else { 0x0300 };
        }
        buf.write(0, state.cw0);
        buf.write(1, state.cw1);
        offsets.cw0 = state.cw0;
        offsets.cw1 = state.cw1;

        if self.config.extended {
            self.run_extended_passes(params, &mut state, &mut buf, &mut offsets)?;

            let slot = if state.large {
                self.config.large_transform_offset
            } else {
                0
            };
            if state.large {
                buf.merge(0, cw::CW0_SW_IS_LARGE);
            }
            // Redirection applies regardless of protocol.
            if params.flags & flags::REDIRECT != 0 {
                buf.merge(
                    extended::TR_FLAGS + slot,
                    (1 << 11) | (((params.redirect_interface & 0xf) as u32) << 12),
                );
            }
            state.cursor = self.config.record_word_count + slot;
        } else {
            state.cursor = self.config.record_word_count;
        }

        params.offsets = offsets;
        params.iv_src = state.iv_src;
        logging::log_sa_built(
            params.protocol.name(),
            params.direction.name(),
            state.cursor,
            state.large,
        );
        Ok(())
    }
}
