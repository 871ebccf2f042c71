use serde::{Deserialize, Serialize};
use tracing::warn;

pub const UNKNOWN_CLASS_NAME: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub grade_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    /// Set when a new work image replaced the one `evaluation` was produced from.
    #[serde(default, skip_serializing_if = "is_false")]
    pub evaluation_stale: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    NoImage,
    ImagePending,
    Evaluated,
}

impl Student {
    pub fn status(&self) -> StudentStatus {
        if self.work_image.is_none() {
            return StudentStatus::NoImage;
        }
        match &self.evaluation {
            Some(_) if !self.evaluation_stale => StudentStatus::Evaluated,
            _ => StudentStatus::ImagePending,
        }
    }

    /// The evaluation that belongs to the current work image, if any.
    pub fn current_evaluation(&self) -> Option<&Evaluation> {
        match self.status() {
            StudentStatus::Evaluated => self.evaluation.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub handwriting_score: f64,
    pub originality_score: f64,
    pub creativity_score: f64,
    pub overall_score: f64,
    #[serde(default)]
    pub punctuation_errors: Vec<String>,
    #[serde(default)]
    pub concept_knowledge: String,
    #[serde(default)]
    pub transcribed_text: String,
    #[serde(default)]
    pub plagiarism_note: String,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedReport {
    pub id: String,
    pub student_name: String,
    pub grade_name: String,
    pub timestamp: String,
    pub evaluation: Evaluation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_image: Option<String>,
}

/// The single persisted document. Field names are part of the backup file
/// format; every field defaults so partial documents load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub grades: Vec<ClassGroup>,
    pub students: Vec<Student>,
    pub saved_reports: Vec<ArchivedReport>,
    pub reference_text: String,
}

impl Snapshot {
    /// Merge-with-defaults parse. Any absent or null top-level field becomes
    /// an empty collection or blank text. Students whose class is missing are
    /// dropped.
    pub fn from_json_tolerant(text: &str) -> anyhow::Result<Snapshot> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        let serde_json::Value::Object(mut map) = raw else {
            anyhow::bail!("snapshot must be a JSON object");
        };
        map.retain(|_, v| !v.is_null());
        let mut snap: Snapshot = serde_json::from_value(serde_json::Value::Object(map))?;
        let orphans = snap.drop_orphan_students();
        if orphans > 0 {
            warn!(count = orphans, "dropped students that reference no class");
        }
        Ok(snap)
    }

    fn drop_orphan_students(&mut self) -> usize {
        let before = self.students.len();
        let grades = &self.grades;
        self.students
            .retain(|s| grades.iter().any(|g| g.id == s.grade_id));
        before - self.students.len()
    }

    pub fn grade_name(&self, grade_id: &str) -> Option<&str> {
        self.grades
            .iter()
            .find(|g| g.id == grade_id)
            .map(|g| g.name.as_str())
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}
