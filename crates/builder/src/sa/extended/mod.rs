//! Extended transform-record builders
//!
//! When the builder runs in extended mode, a second pass appends the
//! "transform record" fields shared with the companion classification
//! firmware: header-processing protocol codes, packed byte parameters,
//! pre-encoded verify/context instructions, tunnel addresses and
//! statistics placeholders. Every value below is part of that firmware
//! contract and must land at the exact word offset the firmware reads.

pub(crate) mod basic;
pub(crate) mod dtls;
pub(crate) mod ipsec;

// Packet-flow protocol codes, shared with the firmware.
pub(crate) const ESP_PROTO_NONE: u8 = 0;
pub(crate) const ESP_PROTO_OUT_CBC: u8 = 1;
pub(crate) const ESP_PROTO_OUT_NULLAUTH: u8 = 2;
pub(crate) const ESP_PROTO_OUT_CTR: u8 = 3;
pub(crate) const ESP_PROTO_OUT_CCM: u8 = 4;
pub(crate) const ESP_PROTO_OUT_GCM: u8 = 5;
pub(crate) const ESP_PROTO_OUT_GMAC: u8 = 6;
pub(crate) const ESP_PROTO_IN_CBC: u8 = 7;
pub(crate) const ESP_PROTO_IN_NULLAUTH: u8 = 8;
pub(crate) const ESP_PROTO_IN_CTR: u8 = 9;
pub(crate) const ESP_PROTO_IN_CCM: u8 = 10;
pub(crate) const ESP_PROTO_IN_GCM: u8 = 11;
pub(crate) const ESP_PROTO_IN_GMAC: u8 = 12;
pub(crate) const DTLS_PROTO_OUT_CBC: u8 = 13;
pub(crate) const DTLS_PROTO_OUT_GCM: u8 = 14;
pub(crate) const DTLS_PROTO_IN_CBC: u8 = 15;
pub(crate) const DTLS_PROTO_IN_GCM: u8 = 16;
pub(crate) const BASIC_PROTO_OUT_ENCHASH: u8 = 21;
pub(crate) const BASIC_PROTO_IN_HASHDEC: u8 = 22;
pub(crate) const BASIC_PROTO_OUT_HASHENC: u8 = 23;
pub(crate) const BASIC_PROTO_IN_DECHASH: u8 = 24;
pub(crate) const ESP_PROTO_OUT_CHACHAPOLY: u8 = 25;
pub(crate) const ESP_PROTO_IN_CHACHAPOLY: u8 = 26;
pub(crate) const DTLS_PROTO_OUT_CHACHAPOLY: u8 = 27;
pub(crate) const DTLS_PROTO_IN_CHACHAPOLY: u8 = 28;
pub(crate) const ESP_PROTO_OUT_XFRM_CBC: u8 = 31;
pub(crate) const ESP_PROTO_IN_XFRM_CBC: u8 = 32;
pub(crate) const ESP_PROTO_OUT_XFRM_GCM: u8 = 33;
pub(crate) const ESP_PROTO_IN_XFRM_GCM: u8 = 34;

// Header-processing protocol codes, shared with the firmware.
pub(crate) const HDR_BYPASS: u8 = 0;
pub(crate) const HDR_IPV4_OUT_TRANSP_HDRBYPASS: u8 = 1;
pub(crate) const HDR_IPV4_OUT_TUNNEL: u8 = 2;
pub(crate) const HDR_IPV4_IN_TRANSP_HDRBYPASS: u8 = 3;
pub(crate) const HDR_IPV4_IN_TUNNEL: u8 = 4;
pub(crate) const HDR_IPV4_OUT_TRANSP: u8 = 5;
pub(crate) const HDR_IPV4_IN_TRANSP: u8 = 6;
pub(crate) const HDR_IPV6_OUT_TUNNEL: u8 = 7;
pub(crate) const HDR_IPV6_IN_TUNNEL: u8 = 8;
pub(crate) const HDR_IPV6_OUT_TRANSP_HDRBYPASS: u8 = 9;
pub(crate) const HDR_IPV6_IN_TRANSP_HDRBYPASS: u8 = 10;
pub(crate) const HDR_IPV6_OUT_TRANSP: u8 = 11;
pub(crate) const HDR_IPV6_IN_TRANSP: u8 = 12;
pub(crate) const HDR_IPV4_OUT_DTLS: u8 = 13;
pub(crate) const HDR_IPV4_IN_DTLS: u8 = 14;
pub(crate) const HDR_IPV6_OUT_DTLS: u8 = 15;
pub(crate) const HDR_IPV6_IN_DTLS: u8 = 16;
pub(crate) const HDR_IPV4_OUT_DTLS_CAPWAP: u8 = 17;
pub(crate) const HDR_IPV4_IN_DTLS_CAPWAP: u8 = 18;
pub(crate) const HDR_IPV6_OUT_DTLS_CAPWAP: u8 = 19;
pub(crate) const HDR_IPV6_IN_DTLS_CAPWAP: u8 = 20;
/// Distance from each IPsec header code to its NAT-T counterpart.
pub(crate) const HDR_NATT_OFFSET: u8 = 20;
pub(crate) const HDR_BASIC_OUT_ZPAD: u8 = 35;
pub(crate) const HDR_BASIC_IN_NO_PAD: u8 = 36;
pub(crate) const HDR_BASIC_OUT_TPAD: u8 = 37;
pub(crate) const HDR_BASIC_IN_PAD: u8 = 38;
pub(crate) const HDR_IPV4_OUT_XFRM: u8 = 39;
pub(crate) const HDR_IPV6_OUT_XFRM: u8 = 40;
pub(crate) const HDR_IPV4_IN_XFRM: u8 = 41;
pub(crate) const HDR_IPV6_IN_XFRM: u8 = 42;

// Token header word construction.
pub(crate) const HEADER_RC_NO_REUSE: u32 = 0x00000000;
pub(crate) const HEADER_IP: u32 = 0x00020000;
pub(crate) const HEADER_DEFAULT: u32 = HEADER_RC_NO_REUSE | HEADER_IP;
pub(crate) const HEADER_UPD_HDR: u32 = 0x00400000;
pub(crate) const HEADER_PAD_VERIFY: u32 = 0x01000000;
pub(crate) const HEADER_IV_PRNG: u32 = 0x04000000;
pub(crate) const HEADER_IV_TOKEN_2WORDS: u32 = 0x18000000;
pub(crate) const HEADER_IV_TOKEN_4WORDS: u32 = 0x1e000000;

/// CCM flag byte with the AAD-present bit and L=4 (L=3 for the TLS
/// nonce layout).
pub(crate) const CCM_FLAG_ADATA_L4: u32 = 0x43;
pub(crate) const CCM_FLAG_ADATA_L3: u32 = 0x42;

// Pre-encoded VERIFY instruction variants.
pub(crate) const VERIFY_NONE: u32 = 0xd0060000;
pub(crate) const VERIFY_PAD: u32 = 0xd1060000;
pub(crate) const VERIFY_PADSPI: u32 = 0xd5060000;
pub(crate) const VERIFY_BIT_H: u32 = 0x00010000;
pub(crate) const VERIFY_BIT_SEQ: u32 = 0x08000000;

// Pre-encoded CTX (context update) instruction variants.
pub(crate) const CTX_SEQNUM: u32 = 0xe0561800;
pub(crate) const CTX_INSEQNUM: u32 = 0xe02e1800;
pub(crate) const CTX_OUT_SEQNUM: u32 = 0xe0560800;
pub(crate) const CTX_NONE: u32 = 0xe1560000;

// Pre-encoded RETR/INS instructions for IV handling (basic protocol).
pub(crate) const RETR_HASH_IV0: u32 = 0x42a00000;
pub(crate) const INS_NONE_IV0: u32 = 0x20a00000;
pub(crate) const RETR_HASH_IV1: u32 = 0x42a80000;
pub(crate) const INS_NONE_IV1: u32 = 0x20a80000;

// Firmware transform-record word offsets (small layout; the large
// layout adds the configured large-transform offset to each).
pub(crate) const TR_TK_HDR: usize = 48;
pub(crate) const TR_FLAGS: usize = 49;
pub(crate) const TR_PAD_ALIGN: usize = 50;
pub(crate) const TR_HDRPROC_CTX: usize = 51;
pub(crate) const TR_BYTE_PARAM: usize = 52;
pub(crate) const TR_NATT_PORTS: usize = 53;
pub(crate) const TR_TK_VFY_INST: usize = 54;
pub(crate) const TR_TK_CTX_INST: usize = 55;
pub(crate) const TR_CCM_SALT: usize = 56;
pub(crate) const TR_PATH_MTU: usize = 57;
pub(crate) const TR_TIME_STAMP_LO: usize = 58;
pub(crate) const TR_TIME_STAMP_HI: usize = 59;
pub(crate) const TR_STAT_PKT: usize = 60;
pub(crate) const TR_STAT_OCT_LO: usize = 62;
pub(crate) const TR_STAT_OCT_HI: usize = 63;
pub(crate) const TR_TUNNEL_SRC: usize = 40;
pub(crate) const TR_TUNNEL_DST: usize = 44;
pub(crate) const TR_CHECKSUM: usize = 41;

/// Little-endian byte packing used throughout the firmware fields.
pub(crate) fn pack_bytes(b0: u32, b1: u32, b2: u32, b3: u32) -> u32 {
    (b3 << 24) | (b2 << 16) | (b1 << 8) | b0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_bytes_order() {
        assert_eq!(pack_bytes(1, 2, 3, 4), 0x04030201);
        assert_eq!(pack_bytes(0xff, 0, 0, 0), 0xff);
    }
}
