//! SA build to per-packet token generation, end to end.

use sabre_builder::sa::{
    ipsec_flags, AuthAlgo, Direction, ProtocolParams, SaBuilder, SaParams, TlsVersion,
};
use sabre_builder::token::{
    build_context, build_token, token_word_count, TokenParams, TokenProtocol,
};
use sabre_builder::BuilderError;

fn esp_cbc_sha1(direction: Direction) -> SaParams {
    let mut params = SaParams::init_esp(
        0x11223344,
        ipsec_flags::TUNNEL,
        ipsec_flags::IPV4,
        direction,
    )
    .unwrap();
    params.set_aes_cbc(&[0x42u8; 16]);
    params.set_hmac_sha1(&[0x11u8; 20], &[0x22u8; 20]);
    params
}

#[test]
fn esp_outbound_full_flow() {
    let builder = SaBuilder::new();
    let mut params = esp_cbc_sha1(Direction::Outbound);
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut params, &mut record).unwrap();

    let ctx = build_context(&params).unwrap();
    assert_eq!(ctx.protocol, TokenProtocol::EspOut);
    assert_eq!(ctx.seq_offset, params.offsets.seq_num);

    let packet = vec![0u8; 100];
    let mut token = vec![0u32; token_word_count(&ctx)];
    let desc = build_token(&ctx, &packet, &TokenParams::default(), &mut token).unwrap();

    assert!(desc.word_count <= token.len());
    // Packet length rides in the low header bits.
    assert_eq!(desc.header_word & 0x1ffff, 100);
    // 100 payload bytes plus the two trailer bytes round up to 112.
    assert_eq!(desc.pad_byte_count, 12);
    // ESP header, IV, padding and the truncated ICV.
    assert_eq!(desc.output_byte_count, 100 + 8 + 16 + 12 + 12);
}

#[test]
fn esp_inbound_strips_what_outbound_added() {
    let builder = SaBuilder::new();
    let mut out_params = esp_cbc_sha1(Direction::Outbound);
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut out_params, &mut record).unwrap();
    let out_ctx = build_context(&out_params).unwrap();

    let plain = vec![0u8; 100];
    let mut token = vec![0u32; token_word_count(&out_ctx)];
    let out_desc =
        build_token(&out_ctx, &plain, &TokenParams::default(), &mut token).unwrap();

    let mut in_params = esp_cbc_sha1(Direction::Inbound);
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut in_params, &mut record).unwrap();
    let in_ctx = build_context(&in_params).unwrap();

    let wire = vec![0u8; out_desc.output_byte_count as usize];
    let mut token = vec![0u32; token_word_count(&in_ctx)];
    let in_desc = build_token(&in_ctx, &wire, &TokenParams::default(), &mut token).unwrap();
    // The decrypted output still carries the ESP padding; the engine
    // trims it using the pad-length byte, so the token only accounts
    // for the header, IV and ICV.
    assert_eq!(
        in_desc.output_byte_count,
        out_desc.output_byte_count - 8 - 16 - 12
    );
}

#[test]
fn deferred_hmac_keys_flow_through_a_precompute_token() {
    let builder = SaBuilder::new();
    let mut params = SaParams::init_basic(Direction::Outbound);
    params.auth_algo = AuthAlgo::HmacSha1;
    // No precomputed digests: the SA reserves both areas.
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut params, &mut record).unwrap();
    assert_ne!(params.offsets.digest1, 0);

    let mut ctx = build_context(&params).unwrap();
    assert!(ctx.is_pending());
    assert_eq!(ctx.protocol, TokenProtocol::BasicHmacCtxPrepare);

    // First "packet" carries the raw key and produces no output.
    let key = vec![0x5au8; 32];
    let mut token = vec![0u32; token_word_count(&ctx)];
    let desc = build_token(&ctx, &key, &TokenParams::default(), &mut token).unwrap();
    assert_eq!(desc.output_byte_count, 0);

    assert!(ctx.advance());
    assert_eq!(ctx.protocol, TokenProtocol::BasicHash);
    assert!(!ctx.is_pending());

    // From here on, regular hash tokens: payload copied through with
    // the digest appended.
    let packet = vec![0u8; 80];
    let desc = build_token(&ctx, &packet, &TokenParams::default(), &mut token).unwrap();
    assert_eq!(desc.output_byte_count, 80 + ctx.icv_byte_count);
}

#[test]
fn pkt_id_moves_only_for_constructed_ipv4_tunnels() {
    let builder = SaBuilder::new();

    let mut plain = esp_cbc_sha1(Direction::Outbound);
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut plain, &mut record).unwrap();
    let plain_ctx = build_context(&plain).unwrap();

    let mut tunnel = esp_cbc_sha1(Direction::Outbound);
    if let ProtocolParams::Ipsec(ext) = &mut tunnel.protocol {
        ext.ipsec_flags |= ipsec_flags::PROCESS_IP_HEADERS;
        ext.src_ip_addr = Some(vec![192, 168, 0, 1]);
        ext.dest_ip_addr = Some(vec![192, 168, 0, 2]);
        ext.ttl = 64;
    }
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut tunnel, &mut record).unwrap();
    let tunnel_ctx = build_context(&tunnel).unwrap();

    let mut id = 100u16;
    plain_ctx.next_pkt_id(&mut id);
    assert_eq!(id, 100);
    tunnel_ctx.next_pkt_id(&mut id);
    assert_eq!(id, 101);
}

#[test]
fn tls_inbound_block_alignment_enforced() {
    let builder = SaBuilder::new();
    let mut params = SaParams::init_ssltls(TlsVersion::Tls1_2, Direction::Inbound);
    params.set_aes_cbc(&[0u8; 16]);
    params.set_hmac_sha2_256(&[0u8; 32], &[0u8; 32]);
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut params, &mut record).unwrap();
    let ctx = build_context(&params).unwrap();

    // Header (5) + explicit IV (16) + ICV (32), encrypted part of 64.
    let good = vec![0u8; 5 + 16 + 32 + 64];
    let mut token = vec![0u32; token_word_count(&ctx)];
    let desc = build_token(&ctx, &good, &TokenParams::default(), &mut token).unwrap();
    assert_eq!(desc.output_byte_count, 64);

    // Ragged ciphertext cannot have come from whole blocks.
    let bad = vec![0u8; 5 + 16 + 32 + 60];
    assert!(build_token(&ctx, &bad, &TokenParams::default(), &mut token).is_err());
}

#[test]
fn token_buffer_size_is_honored() {
    let builder = SaBuilder::new();
    let mut params = esp_cbc_sha1(Direction::Outbound);
    let mut record = vec![0u32; 64];
    builder.build_sa(&mut params, &mut record).unwrap();
    let ctx = build_context(&params).unwrap();

    let packet = vec![0u8; 1400];
    let mut short = vec![0u32; token_word_count(&ctx) - 1];
    match build_token(&ctx, &packet, &TokenParams::default(), &mut short) {
        Err(BuilderError::BufferTooShort { required, .. }) => {
            assert_eq!(required, token_word_count(&ctx));
        }
        other => panic!("expected BufferTooShort, got {other:?}"),
    }

    let mut exact = vec![0u32; token_word_count(&ctx)];
    let desc = build_token(&ctx, &packet, &TokenParams::default(), &mut exact).unwrap();
    assert!(desc.word_count <= exact.len());
}
