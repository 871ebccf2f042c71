use crate::model::{Evaluation, Student};
use serde::Serialize;

pub const AXES: [&str; 5] = ["handwriting", "originality", "creativity", "grammar", "overall"];

pub const SERIES_COLORS: [&str; 6] = [
    "#4F46E5", "#10B981", "#F59E0B", "#EF4444", "#8B5CF6", "#EC4899",
];

/// Each punctuation error costs five grammar points, floored at zero.
pub fn grammar_score(ev: &Evaluation) -> f64 {
    (100.0 - ev.punctuation_errors.len() as f64 * 5.0).max(0.0)
}

pub fn radar_values(ev: &Evaluation) -> [f64; 5] {
    [
        ev.handwriting_score,
        ev.originality_score,
        ev.creativity_score,
        grammar_score(ev),
        ev.overall_score,
    ]
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarPoint {
    pub axis: &'static str,
    pub value: f64,
}

pub fn radar(ev: &Evaluation) -> Vec<RadarPoint> {
    AXES.iter()
        .zip(radar_values(ev))
        .map(|(axis, value)| RadarPoint { axis, value })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSeries {
    pub student_id: String,
    pub name: String,
    pub color: &'static str,
    pub values: [f64; 5],
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonChart {
    pub axes: [&'static str; 5],
    pub series: Vec<ComparisonSeries>,
}

/// Series for the selected students whose evaluation matches their current
/// work image, in selection order.
pub fn comparison<'a>(
    selected: &[String],
    students: impl IntoIterator<Item = &'a Student> + Clone,
) -> ComparisonChart {
    let series = selected
        .iter()
        .filter_map(|id| {
            students
                .clone()
                .into_iter()
                .find(|s| &s.id == id)
                .and_then(|s| s.current_evaluation().map(|ev| (s, ev)))
        })
        .enumerate()
        .map(|(idx, (s, ev))| ComparisonSeries {
            student_id: s.id.clone(),
            name: s.name.clone(),
            color: SERIES_COLORS[idx % SERIES_COLORS.len()],
            values: radar_values(ev),
        })
        .collect();
    ComparisonChart { axes: AXES, series }
}
