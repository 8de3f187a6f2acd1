//! MACsec SA scenarios.

use sabre_builder::sa::{Direction, ProtocolParams, SaBuilder, SaParams};
use sabre_builder::token;

fn macsec_gcm(direction: Direction) -> SaParams {
    let mut params =
        SaParams::init_macsec([0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80], 1, direction)
            .unwrap();
    params.set_aes_gcm(&[0u8; 16], &[0u8; 4]);
    params
}

#[test]
fn outbound_gcm_builds_small_record() {
    let builder = SaBuilder::new();
    let mut params = macsec_gcm(Direction::Outbound);
    let sizes = builder.get_sizes(&params).unwrap();
    assert_eq!(sizes.sa_word_count, 64);

    let mut record = vec![0u32; sizes.sa_word_count];
    builder.build_sa(&mut params, &mut record).unwrap();
    // Packet number, then the SCI in the IV words.
    assert_ne!(params.offsets.seq_num, 0);
    assert_eq!(params.offsets.iv, params.offsets.seq_num + 1);
    assert_eq!(record[params.offsets.iv], 0x40302010);
}

#[test]
fn inbound_mask_slot_carries_window_size() {
    let builder = SaBuilder::new();
    let mut params = macsec_gcm(Direction::Inbound);
    if let ProtocolParams::MacSec(ext) = &mut params.protocol {
        ext.replay_window = 64;
    }
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut params, &mut record).unwrap();
    assert_eq!(record[params.offsets.seq_mask], 64);
}

#[test]
fn association_number_above_three_rejected() {
    assert!(SaParams::init_macsec([0u8; 8], 4, Direction::Outbound).is_err());
}

#[test]
fn hmac_auth_rejected() {
    let builder = SaBuilder::new();
    let mut params = macsec_gcm(Direction::Outbound);
    params.set_aes_cbc(&[0u8; 16]);
    params.set_hmac_sha1(&[0u8; 20], &[0u8; 20]);
    assert!(builder.get_sizes(&params).is_err());
}

#[test]
fn frames_are_not_tokenized() {
    let builder = SaBuilder::new();
    let mut params = macsec_gcm(Direction::Outbound);
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut params, &mut record).unwrap();
    assert!(token::build_context(&params).is_err());
}
