use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::calibration::domain::{AreaKind, AssessmentScope, LevelAssessment, MatrixSnapshot};

use crate::calibration::assessments::SUB_LEVELS;

/// Column group of the level histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistogramBucket {
    General,
    Craft,
    Collab,
    Leadership,
    Impact,
}

impl HistogramBucket {
    pub const ALL: [Self; 5] = [
        Self::General,
        Self::Craft,
        Self::Collab,
        Self::Leadership,
        Self::Impact,
    ];

    pub const fn from_area_kind(kind: AreaKind) -> Self {
        match kind {
            AreaKind::Craft => Self::Craft,
            AreaKind::Collab => Self::Collab,
            AreaKind::Leadership => Self::Leadership,
            AreaKind::Impact => Self::Impact,
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Craft => AreaKind::Craft.key(),
            Self::Collab => AreaKind::Collab.key(),
            Self::Leadership => AreaKind::Leadership.key(),
            Self::Impact => AreaKind::Impact.key(),
        }
    }
}

pub type SubLevelCounts = [u32; SUB_LEVELS as usize];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramRow {
    pub main_level: u32,
    /// Every bucket is present, zero-filled when nobody landed in it.
    pub buckets: BTreeMap<HistogramBucket, SubLevelCounts>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelHistogram {
    /// Distinct main levels present, ascending.
    pub rows: Vec<HistogramRow>,
    /// Area assessments whose area has no kind.
    pub unmapped: u32,
    /// Records with a main or sub level outside the accepted range.
    pub out_of_range: u32,
}

impl LevelHistogram {
    pub fn row(&self, main_level: u32) -> Option<&HistogramRow> {
        self.rows.iter().find(|row| row.main_level == main_level)
    }

    pub fn count(&self, main_level: u32, bucket: HistogramBucket, sub_level: u8) -> u32 {
        let Some(slot) = usize::from(sub_level).checked_sub(1) else {
            return 0;
        };
        self.row(main_level)
            .and_then(|row| row.buckets.get(&bucket))
            .and_then(|counts| counts.get(slot))
            .copied()
            .unwrap_or(0)
    }
}

/// Bucket level assessments by main level, then by area kind, then by sub level.
/// Assessments recorded against another matrix are ignored.
pub fn level_histogram<'a, I>(snapshot: &MatrixSnapshot, assessments: I) -> LevelHistogram
where
    I: IntoIterator<Item = &'a LevelAssessment>,
{
    let mut rows: BTreeMap<u32, BTreeMap<HistogramBucket, SubLevelCounts>> = BTreeMap::new();
    let mut unmapped = 0;
    let mut out_of_range = 0;

    for assessment in assessments {
        if assessment.comp_matrix_id != snapshot.id() {
            continue;
        }
        if assessment.main_level < 1 || !(1..=SUB_LEVELS).contains(&assessment.sub_level) {
            out_of_range += 1;
            continue;
        }
        let bucket = match assessment.scope {
            AssessmentScope::General => HistogramBucket::General,
            AssessmentScope::Area(area) => match snapshot.area_kind(area) {
                Some(kind) => HistogramBucket::from_area_kind(kind),
                None => {
                    unmapped += 1;
                    continue;
                }
            },
        };
        let row = rows.entry(assessment.main_level).or_insert_with(|| {
            HistogramBucket::ALL
                .into_iter()
                .map(|bucket| (bucket, SubLevelCounts::default()))
                .collect()
        });
        if let Some(counts) = row.get_mut(&bucket) {
            counts[usize::from(assessment.sub_level - 1)] += 1;
        }
    }

    if unmapped > 0 || out_of_range > 0 {
        warn!(
            matrix_id = %snapshot.id(),
            unmapped,
            out_of_range,
            "level assessments left out of histogram"
        );
    }

    LevelHistogram {
        rows: rows
            .into_iter()
            .map(|(main_level, buckets)| HistogramRow {
                main_level,
                buckets,
            })
            .collect(),
        unmapped,
        out_of_range,
    }
}
