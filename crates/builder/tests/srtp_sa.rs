//! SRTP/SRTCP SA scenarios.

use sabre_builder::sa::{
    srtp_flags, AuthAlgo, CryptoAlgo, CryptoMode, Direction, ProtocolParams, SaBuilder, SaParams,
};

fn srtp_icm_sha1(direction: Direction) -> SaParams {
    let mut params = SaParams::init_srtp(direction);
    params.crypto_algo = CryptoAlgo::Aes;
    params.crypto_mode = CryptoMode::Icm;
    params.key = Some(zeroize::Zeroizing::new(vec![0u8; 16]));
    params.nonce = Some((1u8..=14).collect());
    params.auth_algo = AuthAlgo::HmacSha1;
    params.set_hmac_sha1(&[0x11u8; 20], &[0x22u8; 20]);
    params
}

#[test]
fn outbound_salt_in_iv_words() {
    let builder = SaBuilder::new();
    let mut params = srtp_icm_sha1(Direction::Outbound);
    let sizes = builder.get_sizes(&params).unwrap();
    assert_eq!(sizes.sa_word_count, 64);

    let mut record = vec![0u32; sizes.sa_word_count];
    builder.build_sa(&mut params, &mut record).unwrap();
    assert_eq!(params.offsets.iv_words, 4);
    assert_eq!(record[params.offsets.iv], 0x04030201);
    // 14 salt bytes zero padded to the fourth word.
    assert_eq!(record[params.offsets.iv + 3], 0x00000e0d);
}

#[test]
fn mki_word_follows_salt() {
    let builder = SaBuilder::new();
    let mut params = srtp_icm_sha1(Direction::Outbound);
    if let ProtocolParams::Srtp(ext) = &mut params.protocol {
        ext.srtp_flags |= srtp_flags::INCLUDE_MKI;
        ext.mki = 0xa1b2c3d4;
    }
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut params, &mut record).unwrap();
    assert_eq!(record[params.offsets.iv + 4], 0xa1b2c3d4);
}

#[test]
fn short_salt_rejected() {
    let builder = SaBuilder::new();
    let mut params = srtp_icm_sha1(Direction::Outbound);
    params.nonce = Some(vec![0u8; 10]);
    assert!(builder.get_sizes(&params).is_err());
}

#[test]
fn cbc_mode_rejected() {
    let builder = SaBuilder::new();
    let mut params = SaParams::init_srtp(Direction::Outbound);
    params.set_aes_cbc(&[0u8; 16]);
    assert!(builder.get_sizes(&params).is_err());
}

#[test]
fn sha256_auth_rejected() {
    let builder = SaBuilder::new();
    let mut params = srtp_icm_sha1(Direction::Inbound);
    params.set_hmac_sha2_256(&[0u8; 32], &[0u8; 32]);
    assert!(builder.get_sizes(&params).is_err());
}
