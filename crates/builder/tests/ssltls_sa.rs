//! SSL/TLS/DTLS record-protection SA scenarios.

use sabre_builder::sa::{
    ssltls_flags, CryptoAlgo, CryptoMode, Direction, ProtocolParams, SaBuilder, SaParams,
    TlsVersion,
};

fn tls12_cbc_sha256(direction: Direction) -> SaParams {
    let mut params = SaParams::init_ssltls(TlsVersion::Tls1_2, direction);
    params.set_aes_cbc(&[0u8; 16]);
    params.set_hmac_sha2_256(&[0x33u8; 32], &[0x44u8; 32]);
    params
}

#[test]
fn tls12_cbc_builds_small_record() {
    let builder = SaBuilder::new();
    let mut params = tls12_cbc_sha256(Direction::Outbound);
    let sizes = builder.get_sizes(&params).unwrap();
    assert_eq!(sizes.sa_word_count, 64);

    let mut record = vec![0u32; sizes.sa_word_count];
    builder.build_sa(&mut params, &mut record).unwrap();
    // Wire version 0x0303 in the high half of the version word.
    assert!(record.contains(&0x0303_0000));
    assert!(params.offsets.seq_num != 0);
}

#[test]
fn tls13_presents_the_12_wire_version() {
    let builder = SaBuilder::new();
    let mut params = SaParams::init_ssltls(TlsVersion::Tls1_3, Direction::Outbound);
    params.set_aes_gcm(&[0u8; 16], &[0u8; 4]);
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut params, &mut record).unwrap();
    assert!(record.contains(&0x0303_0000));
    assert!(!record.contains(&0x0304_0000));
}

#[test]
fn dtls_inbound_wide_mask_builds() {
    let builder = SaBuilder::new();
    let mut params = SaParams::init_ssltls(TlsVersion::Dtls1_2, Direction::Inbound);
    params.set_aes_gcm(&[0u8; 16], &[0u8; 4]);
    if let ProtocolParams::SslTls(ext) = &mut params.protocol {
        ext.ssltls_flags |= ssltls_flags::MASK_128;
        ext.epoch = 3;
    }
    let sizes = builder.get_sizes(&params).unwrap();
    let mut record = vec![0u32; sizes.sa_word_count];
    builder.build_sa(&mut params, &mut record).unwrap();
    assert_eq!(params.offsets.seq_mask_words, 4);
}

#[test]
fn arc4_is_rejected_for_dtls() {
    let builder = SaBuilder::new();
    let mut params = SaParams::init_ssltls(TlsVersion::Dtls1_0, Direction::Outbound);
    params.crypto_algo = CryptoAlgo::Arc4;
    params.crypto_mode = CryptoMode::Stateful;
    params.key = Some(zeroize::Zeroizing::new(vec![0u8; 16]));
    params.set_hmac_sha1(&[0u8; 20], &[0u8; 20]);
    assert!(builder.get_sizes(&params).is_err());
}

#[test]
fn tls13_rejects_cbc() {
    let builder = SaBuilder::new();
    let mut params = SaParams::init_ssltls(TlsVersion::Tls1_3, Direction::Outbound);
    params.set_aes_cbc(&[0u8; 16]);
    params.set_hmac_sha2_256(&[0u8; 32], &[0u8; 32]);
    assert!(builder.get_sizes(&params).is_err());
}

#[test]
fn aead_requires_a_modern_version() {
    let builder = SaBuilder::new();
    let mut params = SaParams::init_ssltls(TlsVersion::Tls1_0, Direction::Outbound);
    params.set_aes_gcm(&[0u8; 16], &[0u8; 4]);
    assert!(builder.get_sizes(&params).is_err());
}
