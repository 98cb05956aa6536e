use chrono::{DateTime, Utc};
use oxplist::{decode, encode, Dictionary, Format, Value};
use proptest::prelude::*;

/// Text drawn from printable ASCII plus a few non-Latin ranges, so both the
/// one-byte and the UTF-16 binary string paths get exercised. Control
/// characters are left out because the XML writer rejects them by contract.
fn text() -> impl Strategy<Value = String> {
    let ch = prop_oneof![
        6 => prop::char::range(' ', '~'),
        1 => prop::char::range('\u{00A0}', '\u{04FF}'),
        1 => prop::char::range('\u{1F300}', '\u{1F64F}'),
        1 => Just('\t'),
        1 => Just('\n'),
    ];
    prop::collection::vec(ch, 0..24).prop_map(|chars| chars.into_iter().collect())
}

/// Whole-second instants between 1950 and 2100.
fn date() -> impl Strategy<Value = DateTime<Utc>> {
    (-631_152_000i64..4_102_444_800i64)
        .prop_map(|secs| DateTime::from_timestamp(secs, 0).unwrap())
}

/// Finite reals of both signs; NaN breaks equality by arithmetic and gets a
/// dedicated deterministic test instead.
fn real() -> impl Strategy<Value = f64> {
    prop::num::f64::POSITIVE
        | prop::num::f64::NEGATIVE
        | prop::num::f64::NORMAL
        | prop::num::f64::SUBNORMAL
        | prop::num::f64::ZERO
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        text().prop_map(Value::String),
        any::<i64>().prop_map(Value::Integer),
        real().prop_map(Value::Real),
        any::<bool>().prop_map(Value::Boolean),
        date().prop_map(Value::Date),
        prop::collection::vec(any::<u8>(), 0..48).prop_map(Value::Data),
    ]
}

fn tree() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,8}", inner), 0..6)
                .prop_map(|pairs| Value::Dict(pairs.into_iter().collect::<Dictionary>())),
        ]
    })
}

fn format() -> impl Strategy<Value = Format> {
    prop_oneof![Just(Format::Binary), Just(Format::Xml)]
}

proptest! {
    #[test]
    fn prop_binary_roundtrip(original in tree()) {
        let bytes = encode(&original, Format::Binary).unwrap();
        prop_assert_eq!(decode(&bytes).unwrap(), original);
    }

    #[test]
    fn prop_xml_roundtrip(original in tree()) {
        let bytes = encode(&original, Format::Xml).unwrap();
        prop_assert_eq!(decode(&bytes).unwrap(), original);
    }

    #[test]
    fn prop_formats_agree(original in tree()) {
        let from_binary = decode(&encode(&original, Format::Binary).unwrap()).unwrap();
        let from_xml = decode(&encode(&original, Format::Xml).unwrap()).unwrap();
        prop_assert_eq!(&from_binary, &from_xml);
        prop_assert_eq!(&from_binary, &original);
    }

    #[test]
    fn prop_detection_matches_encoder(original in tree(), format in format()) {
        let bytes = encode(&original, format).unwrap();
        prop_assert_eq!(Format::detect(&bytes), Some(format));
    }

    #[test]
    fn prop_encoding_is_deterministic(original in tree(), format in format()) {
        prop_assert_eq!(
            encode(&original, format).unwrap(),
            encode(&original, format).unwrap()
        );
    }

    #[test]
    fn prop_binary_truncations_fail_cleanly(original in tree(), cut in 0.0f64..1.0) {
        let bytes = encode(&original, Format::Binary).unwrap();
        let len = (bytes.len() as f64 * cut) as usize;
        // A strict prefix can never carry a consistent trailer.
        prop_assert!(decode(&bytes[..len]).is_err());
    }
}
