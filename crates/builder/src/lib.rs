//! # Sabre Builder
//!
//! Compilers for the binary control structures consumed by inline
//! packet-engine hardware:
//!
//! - **SA records**: arrays of 32-bit words holding the control words,
//!   key material, IVs, sequence numbers and replay masks that drive a
//!   transform. Built by [`sa::SaBuilder`].
//! - **Token contexts**: a per-SA structure compiled once from the same
//!   parameters, from which per-packet instruction tokens are generated.
//!   Built by [`token::build_context`] and consumed by
//!   [`token::build_token`].
//!
//! No cryptography is computed here. The builders only validate parameter
//! combinations and pack bits; key material passes through untouched.
//!
//! # Example
//!
//! ```
//! use sabre_builder::sa::{ipsec_flags, Direction, SaBuilder, SaParams};
//!
//! let key = [0u8; 16];
//! let inner = [0u8; 20];
//! let outer = [0u8; 20];
//! let mut params = SaParams::init_esp(
//!     0x11223344,
//!     ipsec_flags::TUNNEL,
//!     ipsec_flags::IPV4,
//!     Direction::Outbound,
//! )?;
//! params.set_aes_cbc(&key);
//! params.set_hmac_sha1(&inner, &outer);
//!
//! let builder = SaBuilder::new();
//! let sizes = builder.get_sizes(&params)?;
//! let mut record = vec![0u32; sizes.sa_word_count];
//! builder.build_sa(&mut params, &mut record)?;
//! # Ok::<(), sabre_builder::BuilderError>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod sa;
pub mod token;

pub use error::{BuilderError, BuilderResult};
