//! Tabular views of a metrology report for spreadsheet export
//!
//! One table per SNR method and image category; element images get one
//! table per slice. Rows are acquisitions, columns are slices (combined) or
//! elements (element images). Absent values are simply missing from a row.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::acquisition::ImageCategory;
use crate::metrology::{MetrologyReport, UnitResult};
use crate::snr::{NemaStatus, SnrMethod};

const GROUP_PREFIX: &str = "Group_";

/// One acquisition (date + series time + repeat) of a table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub date: String,
    pub acquisition_id: String,
    pub cells: BTreeMap<String, f64>,
}

impl ResultRow {
    pub fn cell(&self, column: &str) -> Option<f64> {
        self.cells.get(column).copied()
    }
}

/// Values of one SNR method for one image category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    pub method: SnrMethod,
    pub category: ImageCategory,
    /// Set for element tables, which are split per slice
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slice: Option<u32>,
    /// Value columns in display order
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
}

impl ResultTable {
    /// Sheet-style name, e.g. `NEMA_Combined` or `noise_av_DelRec_slice_0`
    pub fn name(&self) -> String {
        match self.slice {
            Some(slice) => format!("{}_{}_slice_{slice}", self.method, self.category),
            None => format!("{}_{}", self.method, self.category),
        }
    }

    /// Identifying columns plus the `Group_*` columns only
    #[must_use]
    pub fn group_view(&self) -> Self {
        let keep = |column: &str| column.starts_with(GROUP_PREFIX);
        Self {
            method: self.method,
            category: self.category,
            slice: self.slice,
            columns: self.columns.iter().filter(|c| keep(c)).cloned().collect(),
            rows: self
                .rows
                .iter()
                .map(|row| ResultRow {
                    date: row.date.clone(),
                    acquisition_id: row.acquisition_id.clone(),
                    cells: row
                        .cells
                        .iter()
                        .filter(|(c, _)| keep(c))
                        .map(|(c, v)| (c.clone(), *v))
                        .collect(),
                })
                .collect(),
        }
    }

    fn row_mut(&mut self, result: &UnitResult) -> &mut ResultRow {
        let date = &result.key.date;
        let acquisition_id = result.key.acquisition_id();
        let index = match self
            .rows
            .iter()
            .position(|r| &r.date == date && r.acquisition_id == acquisition_id)
        {
            Some(index) => index,
            None => {
                self.rows.push(ResultRow {
                    date: date.clone(),
                    acquisition_id,
                    cells: BTreeMap::new(),
                });
                self.rows.len() - 1
            }
        };
        &mut self.rows[index]
    }

    fn add_column(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }

    fn set(&mut self, result: &UnitResult, column: String, value: Option<f64>) {
        self.add_column(&column);
        if let Some(value) = value {
            self.row_mut(result).cells.insert(column, value);
        } else {
            // Keep the row even when every value is absent
            self.row_mut(result);
        }
    }
}

fn table_for(
    tables: &mut Vec<ResultTable>,
    method: SnrMethod,
    category: ImageCategory,
    slice: Option<u32>,
) -> &mut ResultTable {
    let index = match tables
        .iter()
        .position(|t| t.method == method && t.category == category && t.slice == slice)
    {
        Some(index) => index,
        None => {
            tables.push(ResultTable {
                method,
                category,
                slice,
                columns: Vec::new(),
                rows: Vec::new(),
            });
            tables.len() - 1
        }
    };
    &mut tables[index]
}

/// Lay out every unit result as rows of per-method tables
///
/// Results are visited in key order, so rows come out sorted by date then
/// acquisition id and columns by slice then element. NEMA tables list a
/// measured pair once, under its first repeat.
pub fn build_tables(report: &MetrologyReport) -> Vec<ResultTable> {
    let mut tables = Vec::new();
    for method in SnrMethod::ALL {
        for result in &report.results {
            let key = &result.key;
            if method == SnrMethod::Nema && is_paired_second_repeat(result) {
                continue;
            }
            match (key.category, key.element) {
                (ImageCategory::Combined, _) => {
                    let n = key.slice;
                    let table = table_for(&mut tables, method, ImageCategory::Combined, None);
                    table.set(result, format!("SNR_slice_{n}"), result.snr.get(method));
                    table.set(result, format!("Uniformity_slice_{n}"), result.uniformity);
                    table.set(
                        result,
                        format!("{GROUP_PREFIX}SNR_slice_{n}"),
                        result.group.get(method),
                    );
                    table.set(
                        result,
                        format!("{GROUP_PREFIX}uniformity_slice_{n}"),
                        result.group.uniformity,
                    );
                }
                (ImageCategory::DelRec, Some(e)) => {
                    let table =
                        table_for(&mut tables, method, ImageCategory::DelRec, Some(key.slice));
                    table.set(result, format!("SNR_element_{e}"), result.snr.get(method));
                    table.set(
                        result,
                        format!("{GROUP_PREFIX}SNR_element_{e}"),
                        result.group.get(method),
                    );
                }
                (ImageCategory::DelRec, None) => {}
            }
        }
    }
    tables
}

fn is_paired_second_repeat(result: &UnitResult) -> bool {
    result.key.repeat > 0 && result.snr.nema_status == NemaStatus::Computed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::AcquisitionKey;
    use crate::metrology::{aggregate, GroupValues};
    use crate::snr::SnrResult;

    fn result(key: AcquisitionKey, nema: Option<f64>, snr: f64) -> UnitResult {
        let uniformity = (key.category == ImageCategory::Combined).then_some(0.9);
        UnitResult {
            key,
            snr: SnrResult {
                nema,
                nema_status: if nema.is_some() {
                    NemaStatus::Computed
                } else {
                    NemaStatus::MissingRepeat
                },
                noise_std: snr,
                noise_av: snr,
            },
            uniformity,
            group: GroupValues::default(),
        }
    }

    fn sample_report() -> MetrologyReport {
        let mut results = vec![
            result(AcquisitionKey::combined("20240101", "1015", 0, 0), Some(40.0), 100.0),
            result(AcquisitionKey::combined("20240101", "1015", 1, 0), Some(40.0), 110.0),
            result(AcquisitionKey::element("20240101", "1015", 0, 0, 1), Some(8.0), 20.0),
            result(AcquisitionKey::element("20240101", "1015", 0, 0, 2), Some(9.0), 30.0),
            result(AcquisitionKey::element("20240101", "1015", 1, 0, 1), Some(8.0), 22.0),
            result(AcquisitionKey::element("20240101", "1015", 1, 0, 2), Some(9.0), 32.0),
        ];
        aggregate(&mut results);
        MetrologyReport {
            element_count: 2,
            results,
        }
    }

    #[test]
    fn test_table_layout() {
        let tables = build_tables(&sample_report());
        // Three methods, one combined and one element table each
        assert_eq!(tables.len(), 6);

        let combined = &tables[0];
        assert_eq!(combined.name(), "NEMA_Combined");
        assert_eq!(
            combined.columns,
            [
                "SNR_slice_0",
                "Uniformity_slice_0",
                "Group_SNR_slice_0",
                "Group_uniformity_slice_0"
            ]
        );
        assert_eq!(combined.rows.len(), 1);
        assert_eq!(combined.rows[0].acquisition_id, "1015_0");
        assert_eq!(combined.rows[0].cell("SNR_slice_0"), Some(40.0));

        let elements = &tables[1];
        assert_eq!(elements.name(), "NEMA_DelRec_slice_0");
        assert_eq!(
            elements.columns,
            [
                "SNR_element_1",
                "Group_SNR_element_1",
                "SNR_element_2",
                "Group_SNR_element_2"
            ]
        );
    }

    #[test]
    fn test_group_columns_hold_group_means() {
        let tables = build_tables(&sample_report());
        let noise_av = tables
            .iter()
            .find(|t| t.method == SnrMethod::NoiseAv && t.category == ImageCategory::Combined)
            .unwrap();
        for row in &noise_av.rows {
            assert_eq!(row.cell("Group_SNR_slice_0"), Some(105.0));
            assert_eq!(row.cell("Group_uniformity_slice_0"), Some(0.9));
        }
    }

    #[test]
    fn test_group_view() {
        let tables = build_tables(&sample_report());
        let view = tables[1].group_view();
        assert_eq!(view.columns, ["Group_SNR_element_1", "Group_SNR_element_2"]);
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].cell("Group_SNR_element_2"), Some(9.0));
        assert_eq!(view.rows[0].cell("SNR_element_2"), None);
    }

    #[test]
    fn test_absent_nema_stays_absent() {
        let mut results = vec![result(AcquisitionKey::combined("d", "t", 0, 0), None, 50.0)];
        aggregate(&mut results);
        let tables = build_tables(&MetrologyReport {
            element_count: 1,
            results,
        });
        let nema = &tables[0];
        assert_eq!(nema.method, SnrMethod::Nema);
        assert_eq!(nema.rows.len(), 1);
        assert_eq!(nema.rows[0].cell("SNR_slice_0"), None);
        assert_eq!(nema.rows[0].cell("Group_SNR_slice_0"), None);
        assert_eq!(nema.rows[0].cell("Uniformity_slice_0"), Some(0.9));
    }

    #[test]
    fn test_nema_tables_list_pairs_once() {
        let tables = build_tables(&sample_report());
        for table in &tables {
            let ids: Vec<&str> = table.rows.iter().map(|r| r.acquisition_id.as_str()).collect();
            match table.method {
                SnrMethod::Nema => assert_eq!(ids, ["1015_0"]),
                _ => assert_eq!(ids, ["1015_0", "1015_1"]),
            }
        }
    }

    #[test]
    fn test_lone_second_repeat_keeps_nema_row() {
        let mut results = vec![result(AcquisitionKey::combined("d", "t", 1, 0), None, 50.0)];
        aggregate(&mut results);
        let tables = build_tables(&MetrologyReport {
            element_count: 1,
            results,
        });
        assert_eq!(tables[0].method, SnrMethod::Nema);
        assert_eq!(tables[0].rows.len(), 1);
        assert_eq!(tables[0].rows[0].acquisition_id, "t_1");
    }
}
