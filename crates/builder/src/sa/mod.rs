//! Security Association record compiler
//!
//! An SA record is an array of 32-bit words: two control words (CW0,
//! CW1), then key material, precomputed digests, IVs, sequence numbers
//! and replay masks in the exact order the engine's micro-program reads
//! them for the selected protocol. Field order is the wire format.
//!
//! The same pipeline runs twice: once without a buffer to compute the
//! layout ([`SaBuilder::get_sizes`]) and once against a real buffer to
//! emit the words ([`SaBuilder::build_sa`]). Both runs share one code
//! path, so the reported size and the emitted content cannot disagree.

pub mod builder;
pub mod params;

pub(crate) mod basic;
pub(crate) mod cw;
pub(crate) mod extended;
pub(crate) mod ipsec;
pub(crate) mod keys;
pub(crate) mod macsec;
pub(crate) mod srtp;
pub(crate) mod ssltls;
pub(crate) mod state;

pub use builder::{BuilderConfig, SaBuilder, SaSizes};
pub use params::{
    basic_flags, flags, ipsec_flags, macsec_flags, srtp_flags, ssltls_flags, AuthAlgo,
    BasicParams, CryptoAlgo, CryptoMode, Direction, IpsecParams, IvSrc, MacSecParams,
    ProtocolParams, SaOffsets, SaParams, SrtpParams, SslTlsParams, TlsVersion,
};
