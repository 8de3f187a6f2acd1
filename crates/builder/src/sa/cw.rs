//! Control word bit definitions
//!
//! CW0 and CW1 are the first two words of every SA record. Their
//! encoding is a hardware contract; the values here must match the
//! engine's micro-program bit for bit.

// CW0: pipeline topology (bits 0..4).
pub(crate) const CW0_TOP_NULL_OUT: u32 = 0x0;
pub(crate) const CW0_TOP_NULL_IN: u32 = 0x1;
pub(crate) const CW0_TOP_HASH_OUT: u32 = 0x2;
pub(crate) const CW0_TOP_HASH_IN: u32 = 0x3;
pub(crate) const CW0_TOP_ENCRYPT: u32 = 0x4;
pub(crate) const CW0_TOP_DECRYPT: u32 = 0x5;
pub(crate) const CW0_TOP_ENCRYPT_HASH: u32 = 0x6;
pub(crate) const CW0_TOP_DECRYPT_HASH: u32 = 0x7;
pub(crate) const CW0_TOP_HASH_ENCRYPT: u32 = 0xe;
pub(crate) const CW0_TOP_HASH_DECRYPT: u32 = 0xf;

/// Software-managed bit marking the large record layout.
pub(crate) const CW0_SW_IS_LARGE: u32 = 0x10;

// CW0: cipher algorithm field.
pub(crate) const CW0_CRYPTO_NULL: u32 = 0;
pub(crate) const CW0_CRYPTO_DES: u32 = 0x00010000;
pub(crate) const CW0_CRYPTO_ARC4: u32 = 0x00030000;
pub(crate) const CW0_CRYPTO_3DES: u32 = 0x00050000;
pub(crate) const CW0_CRYPTO_KASUMI: u32 = 0x00070000;
pub(crate) const CW0_CRYPTO_AES_128: u32 = 0x000b0000;
pub(crate) const CW0_CRYPTO_AES_192: u32 = 0x000d0000;
pub(crate) const CW0_CRYPTO_AES_256: u32 = 0x000f0000;
pub(crate) const CW0_CRYPTO_CHACHA20: u32 = 0x00110000;
pub(crate) const CW0_CRYPTO_SNOW: u32 = 0x00130000;
pub(crate) const CW0_CRYPTO_ZUC: u32 = 0x00190000;
pub(crate) const CW0_CRYPTO_SM4: u32 = 0x001b0000;
// BC0 aliases the ZUC code; the two are mutually exclusive per build.
pub(crate) const CW0_CRYPTO_BC0: u32 = 0x00190000;

// CW0: hash algorithm field.
pub(crate) const CW0_AUTH_NULL: u32 = 0;
pub(crate) const CW0_AUTH_HASH_MD5: u32 = 0x00000000;
pub(crate) const CW0_AUTH_HASH_SHA1: u32 = 0x01000000;
pub(crate) const CW0_AUTH_HASH_SHA2_256: u32 = 0x01800000;
pub(crate) const CW0_AUTH_HASH_SHA2_224: u32 = 0x02000000;
pub(crate) const CW0_AUTH_HASH_SHA2_512: u32 = 0x02800000;
pub(crate) const CW0_AUTH_HASH_SHA2_384: u32 = 0x03000000;
pub(crate) const CW0_AUTH_HASH_SM3: u32 = 0x03800000;
pub(crate) const CW0_AUTH_HASH_SHA3_256: u32 = 0x05800000;
pub(crate) const CW0_AUTH_HASH_SHA3_224: u32 = 0x06000000;
pub(crate) const CW0_AUTH_HASH_SHA3_512: u32 = 0x06800000;
pub(crate) const CW0_AUTH_HASH_SHA3_384: u32 = 0x07000000;
pub(crate) const CW0_AUTH_KEYED_HASH_SHA3_256: u32 = 0x05a00000;
pub(crate) const CW0_AUTH_KEYED_HASH_SHA3_224: u32 = 0x06200000;
pub(crate) const CW0_AUTH_KEYED_HASH_SHA3_512: u32 = 0x06a00000;
pub(crate) const CW0_AUTH_KEYED_HASH_SHA3_384: u32 = 0x07200000;
pub(crate) const CW0_AUTH_SSLMAC_SHA1: u32 = 0x00e00000;
pub(crate) const CW0_AUTH_HMAC_MD5: u32 = 0x00600000;
pub(crate) const CW0_AUTH_HMAC_SHA1: u32 = 0x01600000;
pub(crate) const CW0_AUTH_HMAC_SHA2_256: u32 = 0x01e00000;
pub(crate) const CW0_AUTH_HMAC_SHA2_224: u32 = 0x02600000;
pub(crate) const CW0_AUTH_HMAC_SHA2_512: u32 = 0x02e00000;
pub(crate) const CW0_AUTH_HMAC_SHA2_384: u32 = 0x03600000;
pub(crate) const CW0_AUTH_HMAC_SM3: u32 = 0x03e00000;
pub(crate) const CW0_AUTH_HMAC_SHA3_256: u32 = 0x05e00000;
pub(crate) const CW0_AUTH_HMAC_SHA3_224: u32 = 0x06600000;
pub(crate) const CW0_AUTH_HMAC_SHA3_512: u32 = 0x06e00000;
pub(crate) const CW0_AUTH_HMAC_SHA3_384: u32 = 0x07600000;
pub(crate) const CW0_AUTH_CMAC_128: u32 = 0x00c00000;
pub(crate) const CW0_AUTH_CMAC_192: u32 = 0x01400000;
pub(crate) const CW0_AUTH_CMAC_256: u32 = 0x01c00000;
pub(crate) const CW0_AUTH_GHASH: u32 = 0x02400000;
pub(crate) const CW0_AUTH_SNOW_UIA2: u32 = 0x03400000;
pub(crate) const CW0_AUTH_KASUMI_F9: u32 = 0x03c00000;
pub(crate) const CW0_AUTH_ZUC_EIA3: u32 = 0x02c00000;
pub(crate) const CW0_AUTH_POLY1305: u32 = 0x07800000;
pub(crate) const CW0_AUTH_KEYED_HASH_POLY1305: u32 = 0x07c00000;

/// Digest is loaded from the SA rather than the standard init vector.
pub(crate) const CW0_HASH_LOAD_DIGEST: u32 = 0x00200000;

/// An SPI word is present in the record.
pub(crate) const CW0_SPI: u32 = 0x08000000;

// CW0: sequence number size, cursor-relative and fixed-offset variants.
pub(crate) const CW0_SEQNUM_32: u32 = 0x10000000;
pub(crate) const CW0_SEQNUM_48: u32 = 0x20000000;
pub(crate) const CW0_SEQNUM_64: u32 = 0x30000000;
pub(crate) const CW0_SEQNUM_32_FIX: u32 = 0x00008000;
pub(crate) const CW0_SEQNUM_64_FIX: u32 = 0x10008000;
pub(crate) const CW0_SEQNUM_48_FIX: u32 = 0x20008000;

// CW0: replay mask size, cursor-relative and fixed-offset variants.
pub(crate) const CW0_MASK_64: u32 = 0x40000000;
pub(crate) const CW0_MASK_32: u32 = 0x80000000;
pub(crate) const CW0_MASK_128: u32 = 0xc0000000;
pub(crate) const CW0_MASK_64_FIX: u32 = 0x00008000;
pub(crate) const CW0_MASK_128_FIX: u32 = 0x40008000;
pub(crate) const CW0_MASK_256_FIX: u32 = 0xc0008000;
pub(crate) const CW0_MASK_384_FIX: u32 = 0x80008000;
pub(crate) const CW0_MASK_1024_FIX: u32 = 0x40008000;

/// Append the sequence number to the output packet.
pub(crate) const CW0_SEQNUM_APPEND: u32 = 0x00004000;

// CW1: cipher mode field (bits 0..2).
pub(crate) const CW1_MODE_ECB: u32 = 0;
pub(crate) const CW1_MODE_CBC: u32 = 1;
pub(crate) const CW1_MODE_F8_UEA: u32 = 1;
pub(crate) const CW1_MODE_CTR: u32 = 2;
pub(crate) const CW1_MODE_ICM: u32 = 3;
pub(crate) const CW1_MODE_OFB: u32 = 4;
pub(crate) const CW1_MODE_CFB: u32 = 5;
pub(crate) const CW1_MODE_CTR_LOAD: u32 = 6;
pub(crate) const CW1_MODE_XTS: u32 = 7;
pub(crate) const CW1_MODE_MASK: u32 = 0x7;

// CW1: ChaCha20 key/counter configuration.
pub(crate) const CW1_CHACHA256: u32 = 0;
pub(crate) const CW1_CHACHA128: u32 = 1;
pub(crate) const CW1_CHACHA_CTR32: u32 = 2;
pub(crate) const CW1_CHACHA_CTR64: u32 = 0;
pub(crate) const CW1_CHACHA_POLY_OTK: u32 = 4;

pub(crate) const CW1_AEAD: u32 = 0x8;
pub(crate) const CW1_NONCE_XOR: u32 = 0x10;

// CW1: which IV words the engine loads from the SA.
pub(crate) const CW1_IV0: u32 = 0x20;
pub(crate) const CW1_IV1: u32 = 0x40;
pub(crate) const CW1_IV2: u32 = 0x80;
pub(crate) const CW1_IV3: u32 = 0x100;

pub(crate) const CW1_DIGEST_CNT: u32 = 0x200;

// CW1: IV derivation mode.
pub(crate) const CW1_IV_FULL: u32 = 0;
pub(crate) const CW1_IV_CTR: u32 = 0x400;
pub(crate) const CW1_IV_ORIG_SEQ: u32 = 0x800;
pub(crate) const CW1_IV_INCR_SEQ: u32 = 0xc00;
pub(crate) const CW1_IV_MODE_MASK: u32 = 0xc00;

pub(crate) const CW1_CRYPTO_STORE: u32 = 0x1000;
pub(crate) const CW1_PREPKT_OP: u32 = 0x2000;

// CW1: pad type field.
pub(crate) const CW1_PAD_RTP: u32 = 0xc000;
pub(crate) const CW1_PAD_IPSEC: u32 = 0x10000;
pub(crate) const CW1_PAD_TLS: u32 = 0x14000;
pub(crate) const CW1_PAD_SSL: u32 = 0x18000;

pub(crate) const CW1_ENCRYPT_HASHRES: u32 = 0x20000;
pub(crate) const CW1_MACSEC_SEQCHECK: u32 = 0x40000;
pub(crate) const CW1_WIRELESS_DIR: u32 = 0x40000;
pub(crate) const CW1_HASH_STORE: u32 = 0x80000;
pub(crate) const CW1_EXT_CIPHER_SET: u32 = 0x100000;
pub(crate) const CW1_ARC4_IJ_PTR: u32 = 0x100000;
pub(crate) const CW1_ARC4_STATE_SEL: u32 = 0x200000;
pub(crate) const CW1_CCM_IV_SHIFT: u32 = 0x200000;
pub(crate) const CW1_XTS_STATEFUL: u32 = 0x200000;
pub(crate) const CW1_SEQNUM_STORE: u32 = 0x400000;
pub(crate) const CW1_NO_MASK_UPDATE: u32 = 0x800000;
pub(crate) const CW1_EARLY_SEQNUM_UPDATE: u32 = 0x40000000;

// Fixed-offset placement for sequence numbers in large layouts.
pub(crate) const SEQNUM_LO_FIX_OFFSET: usize = 32;
pub(crate) const SEQNUM_HI_FIX_OFFSET: usize = 48;

// CCM counter flag bytes (L field encodings).
pub(crate) const CCM_FLAG_L4: u32 = 0x3;
pub(crate) const CCM_FLAG_L3: u32 = 0x2;
