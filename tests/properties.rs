use lcsio::version::MIN_SUPPORTED;
use lcsio::{check_version, valid_sio_name, SioReadExt, SioWriteExt, StringDecoder, VersionId};
use proptest::prelude::*;
use std::io::Cursor;

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

proptest! {
    #[test]
    fn int_roundtrip(v in any::<i32>()) {
        let mut buf = Vec::new();
        buf.write_int(v).unwrap();
        prop_assert_eq!(buf.len(), 4);
        prop_assert_eq!(Cursor::new(buf).read_int().unwrap(), v);
    }

    #[test]
    fn long64_roundtrip(v in any::<i64>()) {
        let mut buf = Vec::new();
        buf.write_long64(v).unwrap();
        prop_assert_eq!(buf.len(), 8);
        prop_assert_eq!(Cursor::new(buf).read_long64().unwrap(), v);
    }

    #[test]
    fn float_roundtrip_is_bit_exact(bits in any::<u32>()) {
        let v = f32::from_bits(bits);
        let mut buf = Vec::new();
        buf.write_float(v).unwrap();
        prop_assert_eq!(Cursor::new(buf).read_float().unwrap().to_bits(), bits);
    }

    #[test]
    fn size_roundtrip_within_u32(v in 0..=u32::MAX as u64) {
        let mut buf = Vec::new();
        buf.write_size(v as usize).unwrap();
        prop_assert_eq!(Cursor::new(buf).read_size().unwrap(), v as usize);
    }

    #[test]
    fn strings_keep_embedded_nuls(bytes in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let mut buf = Vec::new();
        buf.write_string(&bytes).unwrap();
        buf.write_string(b"tail").unwrap();

        let mut dec = StringDecoder::with_limits(16, 4096);
        let mut cur = Cursor::new(buf);
        prop_assert_eq!(dec.read(&mut cur).unwrap(), &bytes[..]);
        prop_assert_eq!(dec.read(&mut cur).unwrap(), b"tail");
    }

    #[test]
    fn sanitized_names_are_identifiers(label in "\\PC{0,40}") {
        let name = valid_sio_name(&label);
        prop_assert!(is_identifier(&name), "{:?} -> {:?}", label, name);
    }

    #[test]
    fn sanitizing_is_idempotent(label in "[a-zA-Z0-9_./\\\\ -]{0,40}") {
        let once = valid_sio_name(&label);
        prop_assert_eq!(valid_sio_name(&once), once);
    }

    #[test]
    fn version_gate_is_a_threshold(major in 0u16..4, minor in 0u16..40) {
        let v = VersionId::new(major, minor);
        prop_assert_eq!(check_version(v).is_ok(), v >= MIN_SUPPORTED);
    }
}
