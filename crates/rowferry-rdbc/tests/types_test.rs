//! Value and kind behavior across the closed type set

use chrono::{NaiveDate, NaiveTime};
use num_bigint::BigInt;
use rowferry_rdbc::types::{Value, ValueKind};
use rust_decimal::Decimal;

#[test]
fn every_variant_reports_its_kind() {
    let cases = [
        (Value::Text("x".into()), ValueKind::Text),
        (Value::Integer(1), ValueKind::Integer),
        (Value::Long(1), ValueKind::Long),
        (Value::Decimal(Decimal::new(125, 2)), ValueKind::Decimal),
        (Value::Float64(0.5), ValueKind::Float64),
        (Value::Boolean(true), ValueKind::Boolean),
        (
            Value::Date(NaiveDate::from_ymd_opt(2024, 5, 4).unwrap()),
            ValueKind::Date,
        ),
        (
            Value::Timestamp(
                NaiveDate::from_ymd_opt(2024, 5, 4)
                    .unwrap()
                    .and_hms_opt(1, 2, 3)
                    .unwrap(),
            ),
            ValueKind::Timestamp,
        ),
        (
            Value::Time(NaiveTime::from_hms_opt(1, 2, 3).unwrap()),
            ValueKind::Time,
        ),
        (Value::BigInt(BigInt::from(u64::MAX)), ValueKind::BigInt),
    ];

    for (value, kind) in cases {
        assert_eq!(value.kind(), Some(kind));
    }
    assert_eq!(Value::Null.kind(), None);
}

#[test]
fn declared_type_mapping_covers_common_names() {
    let mapped = [
        ("varchar(100)", ValueKind::Text),
        ("TEXT", ValueKind::Text),
        ("smallint", ValueKind::Integer),
        ("BIGINT", ValueKind::Long),
        ("bigint unsigned", ValueKind::BigInt),
        ("NUMERIC(12,4)", ValueKind::Decimal),
        ("double precision", ValueKind::Float64),
        ("BOOLEAN", ValueKind::Boolean),
        ("date", ValueKind::Date),
        ("DATETIME2", ValueKind::Timestamp),
        ("time", ValueKind::Time),
    ];
    for (name, kind) in mapped {
        assert_eq!(
            ValueKind::from_type_name(name),
            Some(kind),
            "type name: {}",
            name
        );
    }

    // Unmapped names fall back to the driver's native type
    assert_eq!(ValueKind::from_type_name("HIERARCHYID"), None);
}

#[test]
fn display_text_round_trips_watermark_values() {
    assert_eq!(Value::Integer(42).display_text().as_deref(), Some("42"));
    assert_eq!(
        Value::Decimal(Decimal::new(125, 2)).display_text().as_deref(),
        Some("1.25")
    );
    assert_eq!(
        Value::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
            .display_text()
            .as_deref(),
        Some("2024-01-02")
    );
    assert_eq!(Value::Null.display_text(), None);
}

#[test]
fn big_int_holds_values_beyond_i64() {
    let wide: BigInt = BigInt::from(i64::MAX) * 10;
    let value = Value::BigInt(wide.clone());
    assert_eq!(value.display_text().unwrap(), wide.to_string());
    assert!(value.is_numeric_or_boolean());
}
