use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::warn;

use crate::calibration::domain::{CurrentRating, DefinitionId, MatrixSnapshot, RatingOptionId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSegment {
    pub rating_option_id: RatingOptionId,
    pub title: String,
    pub color: String,
    pub count: u32,
}

/// Populated bar of one definition; `segments` follow the rating options' sort order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionBar {
    pub definition_id: DefinitionId,
    pub total: u32,
    pub segments: Vec<DistributionSegment>,
}

impl DistributionBar {
    /// Share of the bar taken by one option, in `[0, 1]`.
    pub fn share(&self, option: RatingOptionId) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.segments
            .iter()
            .find(|segment| segment.rating_option_id == option)
            .map_or(0.0, |segment| f64::from(segment.count) / f64::from(self.total))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingDistribution {
    pub bars: BTreeMap<DefinitionId, DistributionBar>,
}

impl RatingDistribution {
    pub fn bar(&self, definition: DefinitionId) -> Option<&DistributionBar> {
        self.bars.get(&definition)
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// Manager-rating histogram per definition. Definitions nobody rated get no bar, and
/// options nobody picked get no segment.
pub fn rating_distribution<'a, I>(snapshot: &MatrixSnapshot, ratings: I) -> RatingDistribution
where
    I: IntoIterator<Item = &'a CurrentRating>,
{
    let mut counts: HashMap<DefinitionId, HashMap<RatingOptionId, u32>> = HashMap::new();
    for rating in ratings {
        let Some(option) = rating.manager_option() else {
            continue;
        };
        let scored = snapshot
            .definition(rating.definition_id)
            .is_some_and(|definition| definition.is_scored());
        if !scored {
            continue;
        }
        if snapshot.rating_option(option).is_none() {
            warn!(
                rating_option_id = %option,
                matrix_id = %snapshot.id(),
                "rating option outside matrix ignored"
            );
            continue;
        }
        *counts
            .entry(rating.definition_id)
            .or_default()
            .entry(option)
            .or_default() += 1;
    }

    let bars = counts
        .into_iter()
        .filter_map(|(definition_id, by_option)| {
            let segments: Vec<DistributionSegment> = snapshot
                .rating_options
                .iter()
                .filter_map(|option| {
                    let count = by_option.get(&option.id).copied().unwrap_or(0);
                    (count > 0).then(|| DistributionSegment {
                        rating_option_id: option.id,
                        title: option.title.clone(),
                        color: option.color.clone(),
                        count,
                    })
                })
                .collect();
            let total = segments.iter().map(|segment| segment.count).sum();
            (total > 0).then_some((
                definition_id,
                DistributionBar {
                    definition_id,
                    total,
                    segments,
                },
            ))
        })
        .collect();

    RatingDistribution { bars }
}
