//! Laws for stored values of any shape.

use proptest::prelude::*;
use shelfdb_codec::{from_cbor, to_cbor, Value};
use shelfdb_core::Record;
use shelfdb_testkit::prelude::*;
use std::cmp::Ordering;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn cbor_preserves_values(value in value_strategy()) {
        let bytes = to_cbor(&value).unwrap();
        prop_assert_eq!(from_cbor(&bytes).unwrap(), value);
    }

    #[test]
    fn ordering_is_total(a in scalar_strategy(), b in scalar_strategy(), c in scalar_strategy()) {
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        prop_assert_eq!(a == b, a.cmp(&b) == Ordering::Equal);
        if a <= b && b <= c {
            prop_assert!(a <= c);
        }
    }

    #[test]
    fn undeclared_fields_keep_any_value(value in value_strategy(), age in age_strategy()) {
        with_users(|users| {
            let record = Record::new()
                .with("name", "Marcus")
                .with("age", age)
                .with("extra", value.clone());
            let stored = users.insert(record).unwrap();
            let key = stored.get("id").cloned().unwrap();
            let fetched = users.get(key).unwrap();
            prop_assert_eq!(fetched.get("extra"), Some(&value));
            Ok(())
        })?;
    }
}
