//! Property tests for this crate's universally-quantified round-trip laws:
//! `Numb` reparses to identical digits/sign/scale, `Value::deserialize`
//! inverts `Value::serialize`, and `normalize_name` is idempotent.

use cif::document::normalize_name;
use cif::value::{List, Table, Value};
use proptest::prelude::*;

fn arb_digits() -> impl Strategy<Value = String> {
    "[1-9][0-9]{0,8}|0"
}

fn arb_numb_text() -> impl Strategy<Value = String> {
    (proptest::bool::ANY, arb_digits(), proptest::option::of(arb_digits()))
        .prop_map(|(negative, digits, su)| {
            let sign = if negative && digits != "0" { "-" } else { "" };
            match su {
                Some(su) => format!("{sign}{digits}({su})"),
                None => format!("{sign}{digits}"),
            }
        })
}

proptest! {
    #[test]
    fn numb_reparses_to_identical_digits_sign_and_scale(text in arb_numb_text()) {
        let n = cif::Numb::parse(&text).expect("generated text matches the NUMB grammar");
        let again = cif::Numb::parse(n.display_text()).expect("rendered text must itself be valid NUMB");
        prop_assert_eq!(n.sign(), again.sign());
        prop_assert_eq!(n.digits(), again.digits());
        prop_assert_eq!(n.su_digits(), again.su_digits());
        prop_assert_eq!(n.scale(), again.scale());
    }

    #[test]
    fn value_deserialize_inverts_serialize_for_scalars(
        text in "[a-zA-Z0-9 ]{0,16}",
        quoted in proptest::bool::ANY,
        num_text in arb_numb_text(),
    ) {
        let values = [
            Value::Unknown,
            Value::NotApplicable,
            Value::Char { text, quoted },
            Value::number(&num_text).unwrap(),
        ];
        for v in values {
            prop_assert_eq!(Value::deserialize(&v.serialize()).unwrap(), v);
        }
    }

    #[test]
    fn value_deserialize_inverts_serialize_for_list_and_table(
        items in proptest::collection::vec("[a-z0-9]{0,8}", 0..4),
        keys in proptest::collection::vec("[a-z][a-z0-9]{0,6}", 0..4),
    ) {
        let list: List = items.into_iter().map(Value::text).collect();
        let v = Value::List(list);
        prop_assert_eq!(Value::deserialize(&v.serialize()).unwrap(), v.clone());

        let mut table = Table::new();
        for (i, key) in keys.iter().enumerate() {
            table.insert(key, Value::text(i.to_string())).unwrap();
        }
        let v = Value::Table(table);
        prop_assert_eq!(Value::deserialize(&v.serialize()).unwrap(), v);
    }

    #[test]
    fn normalize_name_is_idempotent(name in "_[a-zA-Z][a-zA-Z0-9_.]{0,20}") {
        let once = normalize_name(&name).unwrap();
        let twice = normalize_name(&once).unwrap();
        prop_assert_eq!(once, twice);
    }
}
