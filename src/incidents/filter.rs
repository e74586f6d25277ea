use anyhow::{Context, Result};
use arrow::{
    array::{BooleanArray, StringArray},
    compute::{and, filter_record_batch, kernels::cmp::eq},
    record_batch::RecordBatch,
};
use serde::{Deserialize, Serialize};

use super::{string_column, IncidentTable, CATEGORY, SERVICE_TYPE};

/// The two dropdown values. `None` means "no filter on that field".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selection {
    pub category: Option<String>,
    pub service_type: Option<String>,
}

impl Selection {
    pub fn new(category: Option<&str>, service_type: Option<&str>) -> Self {
        Self {
            category: category.map(str::to_string),
            service_type: service_type.map(str::to_string),
        }
        .normalized()
    }

    /// A cleared dropdown posts `""`; treat it the same as unset.
    pub fn normalized(self) -> Self {
        Self {
            category: self.category.filter(|s| !s.is_empty()),
            service_type: self.service_type.filter(|s| !s.is_empty()),
        }
    }
}

/// Rows of the incident table matching a [`Selection`].
#[derive(Debug, Clone)]
pub struct FilteredView {
    batch: RecordBatch,
}

impl FilteredView {
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }
}

impl IncidentTable {
    /// Exact, case-sensitive match on every supplied selector. Null cells
    /// never match; an unknown value just yields an empty view.
    pub fn filter(&self, selection: &Selection) -> Result<FilteredView> {
        let mut mask: Option<BooleanArray> = None;

        for (column, wanted) in [
            (CATEGORY, selection.category.as_deref()),
            (SERVICE_TYPE, selection.service_type.as_deref()),
        ] {
            let Some(wanted) = wanted.filter(|s| !s.is_empty()) else {
                continue;
            };
            let values = string_column(self.batch(), column)?;
            let hits = eq(values, &StringArray::new_scalar(wanted))
                .with_context(|| format!("comparing `{}`", column))?;
            mask = Some(match mask {
                Some(prev) => and(&prev, &hits)?,
                None => hits,
            });
        }

        let batch = match mask {
            Some(mask) => filter_record_batch(self.batch(), &mask).context("filtering incidents")?,
            None => self.batch().clone(),
        };
        Ok(FilteredView { batch })
    }
}
