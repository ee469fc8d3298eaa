//! S4: binarizing two stations' defect calls and classifying the
//! resulting loss points against each other produces exactly the
//! expected good/bad transition at each shared coordinate.

use aoi_model::transforms::{binarize, classify_loss_points};
use aoi_model::{CellValue, LossStatus, Row, Table};
use std::collections::HashSet;

fn defect_table(rows: &[(i64, i64, &str)]) -> Table {
    let mut table = Table::new(vec!["Col".to_string(), "Row".to_string(), "DefectType".to_string()]);
    for (col, r, defect) in rows {
        let mut row = Row::new();
        row.insert("Col".to_string(), CellValue::Int(*col));
        row.insert("Row".to_string(), CellValue::Int(*r));
        row.insert("DefectType".to_string(), CellValue::Text(defect.to_string()));
        table.push_row(row);
    }
    table
}

#[test]
fn s4_mt_to_dc2_transition_matches_expected_status_per_point() {
    let good: HashSet<String> = ["ok".to_string()].into_iter().collect();

    let mt = defect_table(&[(1, 1, "ok"), (1, 2, "ok"), (1, 3, "dirty")]);
    let dc2 = defect_table(&[(1, 1, "ok"), (1, 2, "dirty"), (1, 3, "dirty")]);

    let mt_binary = binarize(&mt, &good);
    let dc2_binary = binarize(&dc2, &good);

    let classified = classify_loss_points(&mt_binary, &dc2_binary);
    let mut classified = classified;
    classified.sort_by_key(|(c, r, _)| (*c, *r));

    assert_eq!(
        classified,
        vec![
            (1, 1, LossStatus::GoodToGood),
            (1, 2, LossStatus::GoodToBad),
            (1, 3, LossStatus::BadToBad),
        ]
    );
}
