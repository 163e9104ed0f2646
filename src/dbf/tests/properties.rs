//! Property-based tests for §8 Properties 1 through 6, generated over small
//! schemas and record sequences within the engine's stated limits.

use dbase_table::{Date, DbfTable, Field, FieldType, MemoryIoHooks};
use proptest::prelude::*;

fn open_table() -> DbfTable<MemoryIoHooks> {
    DbfTable::create(MemoryIoHooks::new(), "prop.dbf", None).unwrap()
}

fn numeric_field(max_digits: u16) -> impl Strategy<Value = (Field, i64)> {
    (2..max_digits).prop_flat_map(|width| {
        let bound = 10i64.pow((width - 1) as u32) - 1;
        (-bound..=bound).prop_map(move |value| {
            (Field::new("N", FieldType::Number, width, 0).unwrap(), value)
        })
    })
}

proptest! {
    // Property 2 (partial): integer values round-trip exactly when they fit
    // within the declared width.
    #[test]
    fn integer_round_trips_within_width((field, value) in numeric_field(12)) {
        let mut table = open_table();
        table.add_field(field).unwrap();
        table.write_int(0, 0, value).unwrap();
        prop_assert_eq!(table.read_int(0, 0).unwrap(), Some(value));
    }

    // Property 2 (partial): a string round-trips when it fits the field
    // width, modulo the trailing-space padding the codec always applies.
    #[test]
    fn string_round_trips_within_width(width in 1usize..40, text in "[a-zA-Z0-9]{0,40}") {
        let truncated: String = text.chars().take(width).collect();
        let mut table = open_table();
        table.add_field(Field::new("S", FieldType::Character, width as u16, 0).unwrap()).unwrap();
        table.write_string(0, 0, &text).unwrap_or(());
        let read_back = table.read_string(0, 0).unwrap().unwrap_or_default();
        prop_assert_eq!(read_back, truncated);
    }

    // Property 3: NULL is idempotent and clears on the next non-null write.
    #[test]
    fn null_then_overwrite_clears_null(value in -999_999i64..999_999) {
        let mut table = open_table();
        table.add_field(Field::new("N", FieldType::Number, 10, 0).unwrap()).unwrap();
        table.write_int(0, 0, value).unwrap();
        table.write_null(0, 0).unwrap();
        prop_assert!(table.is_null(0, 0).unwrap());
        table.write_int(0, 0, value).unwrap();
        prop_assert!(!table.is_null(0, 0).unwrap());
        prop_assert_eq!(table.read_int(0, 0).unwrap(), Some(value));
    }

    // Property 4: the deletion flag is per-record and does not perturb any
    // other record's bytes.
    #[test]
    fn deletion_flag_is_independent(n in 2u32..8, target in 0u32..8) {
        let target = target % n;
        let mut table = open_table();
        table.add_field(Field::new("X", FieldType::Number, 4, 0).unwrap()).unwrap();
        for i in 0..n {
            table.write_int(i, 0, i as i64).unwrap();
        }
        table.mark_deleted(target, true).unwrap();
        for i in 0..n {
            prop_assert_eq!(table.is_deleted(i).unwrap(), i == target);
            prop_assert_eq!(table.read_int(i, 0).unwrap(), Some(i as i64));
        }
    }

    // Property 6: the header's record count survives a close/reopen cycle.
    #[test]
    fn record_count_survives_close_and_reopen(n in 0u32..12) {
        let hooks = MemoryIoHooks::new();
        let mut table = DbfTable::create(hooks.clone(), "count.dbf", None).unwrap();
        table.add_field(Field::new("X", FieldType::Number, 4, 0).unwrap()).unwrap();
        for i in 0..n {
            table.write_int(i, 0, i as i64).unwrap();
        }
        table.close().unwrap();

        let reopened = DbfTable::open(hooks, "count.dbf", "r+b").unwrap();
        prop_assert_eq!(reopened.n_records(), n);
    }

    // Property 1 (partial): a schema's field count, types and widths survive
    // a close/reopen cycle.
    #[test]
    fn schema_shape_survives_close_and_reopen(widths in prop::collection::vec(1u16..200, 1..6)) {
        let hooks = MemoryIoHooks::new();
        let mut table = DbfTable::create(hooks.clone(), "schema.dbf", None).unwrap();
        for (i, &width) in widths.iter().enumerate() {
            table.add_field(Field::new(format!("F{i}"), FieldType::Character, width, 0).unwrap()).unwrap();
        }
        table.close().unwrap();

        let reopened = DbfTable::open(hooks, "schema.dbf", "r").unwrap();
        prop_assert_eq!(reopened.schema().len(), widths.len());
        for (i, &width) in widths.iter().enumerate() {
            prop_assert_eq!(reopened.schema().get(i).unwrap().width, width);
            prop_assert_eq!(reopened.schema().get(i).unwrap().field_type, FieldType::Character);
        }
    }

    // Property 6 (date variant): a date field round-trips exactly within its
    // digit limits.
    #[test]
    fn date_round_trips(year in 1900u16..2100, month in 1u8..13, day in 1u8..29) {
        let mut table = open_table();
        table.add_field(Field::new("D", FieldType::Date, 8, 0).unwrap()).unwrap();
        table.write_date(0, 0, Date::new(year, month, day)).unwrap();
        prop_assert_eq!(table.read_date(0, 0).unwrap(), Some(Date::new(year, month, day)));
    }

    // Property 5: add_field appends a new column without perturbing record
    // count, deletion flags, or any existing field's value.
    #[test]
    fn add_field_preserves_count_deletions_and_other_fields(
        n in 1u32..6,
        deleted_mask in prop::collection::vec(any::<bool>(), 1..6),
    ) {
        let mut table = open_table();
        table.add_field(Field::new("X", FieldType::Number, 5, 0).unwrap()).unwrap();
        for i in 0..n {
            table.write_int(i, 0, i as i64).unwrap();
            if *deleted_mask.get(i as usize).unwrap_or(&false) {
                table.mark_deleted(i, true).unwrap();
            }
        }
        let deleted_before: Vec<bool> = (0..n).map(|i| table.is_deleted(i).unwrap()).collect();

        table.add_field(Field::new("Y", FieldType::Number, 3, 0).unwrap()).unwrap();

        prop_assert_eq!(table.n_records(), n);
        for i in 0..n {
            prop_assert_eq!(table.is_deleted(i).unwrap(), deleted_before[i as usize]);
            prop_assert_eq!(table.read_int(i, 0).unwrap(), Some(i as i64));
            prop_assert!(table.is_null(i, 1).unwrap());
        }
    }

    // Property 5: delete_field drops one column without perturbing record
    // count, deletion flags, or the surviving column's values.
    #[test]
    fn delete_field_preserves_count_deletions_and_other_field(n in 1u32..6, target in 0u32..6) {
        let target = target % n;
        let mut table = open_table();
        table.add_field(Field::new("A", FieldType::Character, 4, 0).unwrap()).unwrap();
        table.add_field(Field::new("B", FieldType::Number, 5, 0).unwrap()).unwrap();
        for i in 0..n {
            table.write_string(i, 0, "abcd").unwrap();
            table.write_int(i, 1, i as i64).unwrap();
        }
        table.mark_deleted(target, true).unwrap();
        let deleted_before: Vec<bool> = (0..n).map(|i| table.is_deleted(i).unwrap()).collect();

        table.delete_field(0).unwrap();

        prop_assert_eq!(table.n_records(), n);
        for i in 0..n {
            prop_assert_eq!(table.is_deleted(i).unwrap(), deleted_before[i as usize]);
            prop_assert_eq!(table.read_int(i, 0).unwrap(), Some(i as i64));
        }
    }
}
