//! Mapping between summary-level and detail-level sector codes.
use crate::input::layout::CrosswalkLayout;
use crate::table::TableLoader;
use anyhow::Result;
use ndarray::Array2;
use std::collections::HashMap;
use std::path::Path;

/// The detail-level codes belonging to each summary-level code
pub type Crosswalk = HashMap<String, Vec<String>>;

/// Build a crosswalk from parallel columns of summary and detail codes.
///
/// The table lists each summary code on its own row, followed by rows with a blank summary cell and
/// one detail code each. Those detail codes belong to the last summary code seen above them. Rows
/// where both cells are filled, or both are blank, contribute no detail codes.
pub fn parse_crosswalk(summary_codes: &[String], detail_codes: &[String]) -> Crosswalk {
    let mut crosswalk = Crosswalk::new();
    let mut current_summary = String::new();
    for (summary, detail) in summary_codes.iter().zip(detail_codes) {
        if !summary.is_empty() {
            current_summary.clone_from(summary);
        }
        if summary.is_empty() && !detail.is_empty() {
            crosswalk
                .entry(current_summary.clone())
                .or_default()
                .push(detail.clone());
        }
    }
    crosswalk
}

/// Read the crosswalk table from a summary-level workbook
pub fn build_crosswalk(
    loader: &TableLoader,
    file: &Path,
    layout: &CrosswalkLayout,
) -> Result<Crosswalk> {
    let summary_codes = loader.text_column(file, &layout.sheet, layout.summary_col, layout.rows)?;
    let detail_codes = loader.text_column(file, &layout.sheet, layout.detail_col, layout.rows)?;
    Ok(parse_crosswalk(&summary_codes, &detail_codes))
}

/// The position of each code in `codes`
pub fn index_lookup(codes: &[String]) -> HashMap<String, usize> {
    codes
        .iter()
        .enumerate()
        .map(|(i, code)| (code.clone(), i))
        .collect()
}

/// Expand a summary-level matrix to detail level.
///
/// Each detail-level entry takes the value of the summary-level entry whose row and column codes
/// the detail codes belong to. Detail codes in the crosswalk which are not in `expanded_row_codes`
/// or `expanded_col_codes` are skipped.
///
/// # Panics
///
/// If a row or column code is missing from the crosswalk, or if the expansion does not fill every
/// row and column of the output exactly once. Either means the crosswalk and tables are out of
/// step with each other.
pub fn expand_matrix(
    m: &Array2<f64>,
    row_codes: &[String],
    col_codes: &[String],
    expanded_row_codes: &[String],
    expanded_col_codes: &[String],
    crosswalk: &Crosswalk,
) -> Array2<f64> {
    let mut out = Array2::zeros((expanded_row_codes.len(), expanded_col_codes.len()));
    let row_indices = index_lookup(expanded_row_codes);
    let col_indices = index_lookup(expanded_col_codes);
    let detail_codes = |code: &String| {
        crosswalk
            .get(code)
            .unwrap_or_else(|| panic!("crosswalk missing code {code}"))
    };

    let mut rows_filled = 0;
    for (old_j, row_code) in row_codes.iter().enumerate() {
        for new_row in detail_codes(row_code) {
            let Some(&j) = row_indices.get(new_row) else {
                continue;
            };
            rows_filled += 1;

            let mut cols_filled = 0;
            for (old_i, col_code) in col_codes.iter().enumerate() {
                for new_col in detail_codes(col_code) {
                    let Some(&i) = col_indices.get(new_col) else {
                        continue;
                    };
                    cols_filled += 1;
                    out[[j, i]] = m[[old_j, old_i]];
                }
            }
            assert!(
                cols_filled == expanded_col_codes.len(),
                "filled wrong number of columns: {cols_filled} != {}",
                expanded_col_codes.len()
            );
        }
    }
    assert!(
        rows_filled == expanded_row_codes.len(),
        "filled wrong number of rows: {rows_filled} != {}",
        expanded_row_codes.len()
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn strings(codes: &[&str]) -> Vec<String> {
        codes.iter().map(ToString::to_string).collect()
    }

    fn crosswalk() -> Crosswalk {
        parse_crosswalk(
            &strings(&["Summary", "111CA", "", "", "", "211", "", ""]),
            &strings(&["Detail", "", "1111A0", "1111B0", "", "", "211000", "212100"]),
        )
    }

    #[test]
    fn test_parse_crosswalk_carry_forward() {
        let crosswalk = crosswalk();
        assert_eq!(crosswalk.len(), 2);
        assert_eq!(crosswalk["111CA"], ["1111A0", "1111B0"]);
        assert_eq!(crosswalk["211"], ["211000", "212100"]);
    }

    #[test]
    fn test_parse_crosswalk_leading_detail() {
        // Detail codes before any summary code are grouped under the empty code
        let crosswalk = parse_crosswalk(&strings(&["", "A"]), &strings(&["x", ""]));
        assert_eq!(crosswalk[""], ["x"]);
        assert!(!crosswalk.contains_key("A"));
    }

    #[test]
    fn test_expand_matrix() {
        let m = array![[1.0, 2.0], [3.0, 4.0]];
        let detail = strings(&["1111A0", "1111B0", "211000", "212100"]);
        let out = expand_matrix(
            &m,
            &strings(&["111CA", "211"]),
            &strings(&["111CA", "211"]),
            &detail,
            &detail,
            &crosswalk(),
        );
        assert_eq!(
            out,
            array![
                [1.0, 1.0, 2.0, 2.0],
                [1.0, 1.0, 2.0, 2.0],
                [3.0, 3.0, 4.0, 4.0],
                [3.0, 3.0, 4.0, 4.0]
            ]
        );
    }

    #[test]
    fn test_expand_vector_with_dummy_column() {
        let m = array![[2.0], [0.5]];
        let out = expand_matrix(
            &m,
            &strings(&["111CA", "211"]),
            &strings(&["211"]),
            &strings(&["1111A0", "1111B0", "211000", "212100"]),
            &strings(&["211000"]),
            &crosswalk(),
        );
        assert_eq!(out, array![[2.0], [2.0], [0.5], [0.5]]);
    }

    #[test]
    fn test_expand_skips_codes_not_in_target() {
        let m = array![[5.0]];
        let out = expand_matrix(
            &m,
            &strings(&["211"]),
            &strings(&["211"]),
            &strings(&["212100"]),
            &strings(&["211000"]),
            &crosswalk(),
        );
        assert_eq!(out, array![[5.0]]);
    }

    #[test]
    #[should_panic(expected = "crosswalk missing code 221")]
    fn test_expand_missing_code() {
        let m = array![[1.0]];
        expand_matrix(
            &m,
            &strings(&["221"]),
            &strings(&["211"]),
            &strings(&["211000"]),
            &strings(&["211000"]),
            &crosswalk(),
        );
    }

    #[test]
    #[should_panic(expected = "filled wrong number of rows: 2 != 3")]
    fn test_expand_row_count_mismatch() {
        let m = array![[1.0]];
        expand_matrix(
            &m,
            &strings(&["211"]),
            &strings(&["211"]),
            &strings(&["211000", "212100", "221100"]),
            &strings(&["211000"]),
            &crosswalk(),
        );
    }

    #[test]
    #[should_panic(expected = "filled wrong number of columns: 1 != 2")]
    fn test_expand_col_count_mismatch() {
        let m = array![[1.0]];
        expand_matrix(
            &m,
            &strings(&["211"]),
            &strings(&["211"]),
            &strings(&["211000"]),
            &strings(&["211000", "221100"]),
            &crosswalk(),
        );
    }

    #[test]
    fn test_index_lookup() {
        let lookup = index_lookup(&strings(&["a", "b"]));
        assert_eq!(lookup["a"], 0);
        assert_eq!(lookup["b"], 1);
    }
}
